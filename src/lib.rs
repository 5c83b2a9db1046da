//! Session header middleware for `tower`.
//!
//! [`SessionHeadersLayer`] watches an externally owned session subsystem (a [`SessionStore`])
//! across a request. When the inner service starts or regenerates the session it appends a
//! `Set-Cookie` for the new id, and whenever a session is active it appends the cache-limiter
//! headers for the configured [`CacheLimiter`] mode. It never writes the session itself and never
//! touches status or body.
//!
//! The session runtime behind the store must leave header emission to this layer; construction
//! fails with a [`ConfigurationError`] otherwise (see [`RuntimeSettings::manual`]).
//!
//! The crate also ships two small companions for the same chain:
//! - [`ContentHandlerLayer`] parses JSON or form request bodies into a [`ParsedBody`] extension
//!   (`content` feature, on by default).
//! - [`ExceptionHandlerLayer`] turns inner service errors into `500` responses.

mod config;
#[cfg(feature = "content")]
pub mod content;
pub mod cookie;
mod error;
pub mod exception;
pub mod layer;
mod limiter;
mod store;

pub use crate::config::{CacheLimiter, SessionHeadersConfig};
pub use crate::error::{BoxError, ConfigurationError};
pub use crate::exception::ExceptionHandlerLayer;
pub use crate::layer::SessionHeadersLayer;
pub use crate::limiter::HeaderSet;
pub use crate::store::{CookieParams, LocalSession, RuntimeSettings, SessionStore};

#[cfg(feature = "content")]
pub use crate::content::{ContentHandlerLayer, FormContent, JsonContent, ParsedBody};

#[cfg(feature = "content")]
pub use crate::error::ContentError;

/// Session cookie name used by [`LocalSession::default`].
pub const DEFAULT_SESSION_NAME: &str = "SESSID";

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::body::Body;
    use http::{Request, Response, header};
    use tower::{ServiceBuilder, ServiceExt as _};

    use crate::{
        CacheLimiter, LocalSession, SessionHeadersConfig, SessionHeadersLayer, SessionStore,
    };

    async fn start_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let session = req
            .extensions()
            .get::<LocalSession>()
            .cloned()
            .expect("request includes LocalSession extension");
        session.start(None);
        Ok(Response::new(Body::empty()))
    }

    #[tokio::test]
    async fn basic_service_test() {
        let store = LocalSession::new("SESSID");
        let layer = SessionHeadersLayer::with_config(
            store.clone(),
            SessionHeadersConfig::default().with_cache_limiter(CacheLimiter::Off),
        )
        .expect("layer builds");
        let svc = ServiceBuilder::new().layer(layer).service_fn(start_handler);

        let req = Request::builder()
            .body(Body::empty())
            .expect("request builds successfully");
        let res = svc.oneshot(req).await.expect("service call succeeds");

        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("response includes set-cookie header");
        let set_cookie = set_cookie.to_str().expect("set-cookie is ascii");
        let id = set_cookie
            .strip_prefix("SESSID=")
            .expect("set-cookie names the session");
        assert!(!id.is_empty());
        assert_eq!(res.headers().len(), 1);

        // The session was started on the request's own context, not on the layer's store.
        assert!(!store.is_active());
    }
}
