use http::{
    HeaderName,
    header::{CACHE_CONTROL, EXPIRES, LAST_MODIFIED, PRAGMA},
};
use time::{Duration, OffsetDateTime, error::Format};

use crate::{
    config::CacheLimiter,
    cookie::{PAST_EXPIRES, http_date},
};

/// Header name/value pairs in emission order.
pub type HeaderSet = Vec<(HeaderName, String)>;

impl CacheLimiter {
    /// Cache headers for a response carrying an active session, in emission order.
    ///
    /// Every timestamp derives from `now`, so the same inputs always give the same values.
    pub fn headers(self, now: OffsetDateTime, max_age_seconds: i64) -> Result<HeaderSet, Format> {
        match self {
            Self::Off => Ok(Vec::new()),
            Self::Public => public(now, max_age_seconds),
            Self::PrivateNoExpire => private_no_expire(now, max_age_seconds),
            Self::Private => private(now, max_age_seconds),
            Self::NoCache => Ok(nocache()),
        }
    }
}

fn public(now: OffsetDateTime, max_age: i64) -> Result<HeaderSet, Format> {
    Ok(vec![
        (EXPIRES, http_date(now + Duration::seconds(max_age))?),
        (CACHE_CONTROL, format!("public, max-age={max_age}")),
        (LAST_MODIFIED, http_date(now)?),
    ])
}

fn private_no_expire(now: OffsetDateTime, max_age: i64) -> Result<HeaderSet, Format> {
    Ok(vec![
        (
            CACHE_CONTROL,
            format!("private, max-age={max_age}, pre-check={max_age}"),
        ),
        (LAST_MODIFIED, http_date(now)?),
    ])
}

fn private(now: OffsetDateTime, max_age: i64) -> Result<HeaderSet, Format> {
    let mut headers = vec![(EXPIRES, PAST_EXPIRES.to_owned())];
    headers.extend(private_no_expire(now, max_age)?);
    Ok(headers)
}

fn nocache() -> HeaderSet {
    vec![
        (EXPIRES, PAST_EXPIRES.to_owned()),
        (
            CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, post-check=0, pre-check=0".to_owned(),
        ),
        (PRAGMA, "no-cache".to_owned()),
    ]
}
