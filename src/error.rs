use thiserror::Error;

/// Boxed error used at the middleware seams, matching what `tower` itself uses.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raised when [`SessionHeadersLayer`](crate::SessionHeadersLayer) is built against a session
/// runtime that would emit its own headers, or when a cache limiter name is not recognized.
///
/// None of these are retryable: fix the runtime settings or config and construct the layer again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("session runtime setting `use_trans_sid` must be false")]
    TransSidEnabled,

    #[error("session runtime setting `use_cookies` must be false")]
    RuntimeCookiesEnabled,

    #[error("session runtime setting `use_only_cookies` must be true")]
    CookiesOnlyDisabled,

    #[error("session runtime setting `cache_limiter` must be empty, found `{0}`")]
    RuntimeCacheLimiter(String),

    #[error("unknown cache limiter `{0}`")]
    UnknownCacheLimiter(String),
}

/// Request body parsing failures raised by the content layers.
#[cfg(feature = "content")]
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Error parsing JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error parsing JSON: maximum nesting depth of {0} exceeded")]
    Depth(usize),

    #[error("failed to read request body: {0}")]
    Body(BoxError),
}
