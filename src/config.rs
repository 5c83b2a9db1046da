use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Which cache-control headers accompany a response that carries an active session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum CacheLimiter {
    Off,
    Public,
    PrivateNoExpire,
    Private,
    #[default]
    NoCache,
}

impl CacheLimiter {
    /// The config key for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Public => "public",
            Self::PrivateNoExpire => "private_no_expire",
            Self::Private => "private",
            Self::NoCache => "nocache",
        }
    }
}

impl fmt::Display for CacheLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheLimiter {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "off" => Ok(Self::Off),
            "public" => Ok(Self::Public),
            "private_no_expire" => Ok(Self::PrivateNoExpire),
            "private" => Ok(Self::Private),
            "nocache" => Ok(Self::NoCache),
            other => Err(ConfigurationError::UnknownCacheLimiter(other.to_owned())),
        }
    }
}

impl TryFrom<String> for CacheLimiter {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionHeadersConfig {
    pub(crate) cache_limiter: CacheLimiter,
    pub(crate) cache_expire_minutes: u32,
}

impl Default for SessionHeadersConfig {
    fn default() -> Self {
        Self {
            cache_limiter: CacheLimiter::NoCache,
            cache_expire_minutes: 180,
        }
    }
}

impl SessionHeadersConfig {
    #[must_use]
    pub fn with_cache_limiter(mut self, cache_limiter: CacheLimiter) -> Self {
        self.cache_limiter = cache_limiter;
        self
    }

    /// Zero is accepted and yields `max-age=0`.
    #[must_use]
    pub fn with_cache_expire_minutes(mut self, minutes: u32) -> Self {
        self.cache_expire_minutes = minutes;
        self
    }

    pub fn cache_limiter(&self) -> CacheLimiter {
        self.cache_limiter
    }

    pub fn cache_expire_minutes(&self) -> u32 {
        self.cache_expire_minutes
    }

    pub(crate) fn max_age_seconds(&self) -> i64 {
        i64::from(self.cache_expire_minutes) * 60
    }
}
