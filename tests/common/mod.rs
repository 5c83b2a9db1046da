#![allow(dead_code)]

// Shared helpers for integration tests.
//
// Handlers reach the session store through the request extensions, the same way an application
// handler would, and drive it the way a session-aware endpoint does (start, resume, regenerate,
// destroy).
use std::convert::Infallible;

use axum::body::Body;
use http::{Request, Response, header};
use http_body_util::BodyExt as _;
use time::OffsetDateTime;
use tower_cookies::{Cookie, Cookies};
use tower_session_headers::{
    LocalSession, SessionHeadersConfig, SessionHeadersLayer, SessionStore,
};

pub const T0: i64 = 1_000_000;

pub fn fixed_clock() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(T0).expect("timestamp in range")
}

pub fn make_layer(
    store: &LocalSession,
    config: SessionHeadersConfig,
) -> SessionHeadersLayer<LocalSession> {
    // Layer with a frozen clock so every timestamp in a response is predictable.
    SessionHeadersLayer::with_config(store.clone(), config)
        .expect("layer builds with manual runtime settings")
        .with_clock(fixed_clock)
}

pub fn session(req: &Request<Body>) -> LocalSession {
    req.extensions()
        .get::<LocalSession>()
        .cloned()
        .expect("request includes LocalSession extension")
}

fn incoming_cookie(req: &Request<Body>, name: &str) -> Option<String> {
    req.extensions()
        .get::<Cookies>()
        .and_then(|cookies| cookies.get(name))
        .map(|cookie| cookie.value().to_owned())
}

pub async fn noop_handler(_: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Handler that does not touch the session at all.
    Ok(Response::new(Body::empty()))
}

pub async fn start_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Start a session, resuming the one named by the incoming cookie if there is one.
    let session = session(&req);
    let incoming = incoming_cookie(&req, &session.name());
    session.start(incoming.as_deref());
    Ok(Response::new(Body::empty()))
}

pub async fn regenerate_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Resume the incoming session and then rotate its id (e.g. after login).
    let session = session(&req);
    let incoming = incoming_cookie(&req, &session.name());
    session.start(incoming.as_deref());
    session.regenerate();
    Ok(Response::new(Body::empty()))
}

pub async fn destroy_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    // Resume the incoming session and destroy it (e.g. logout).
    let session = session(&req);
    let incoming = incoming_cookie(&req, &session.name());
    session.start(incoming.as_deref());
    session.destroy();
    Ok(Response::new(Body::empty()))
}

pub fn request() -> Request<Body> {
    Request::builder()
        .body(Body::empty())
        .expect("request builds successfully")
}

pub fn request_with_cookie(name: &str, value: &str) -> Request<Body> {
    Request::builder()
        .header(header::COOKIE, format!("{name}={value}"))
        .body(Body::empty())
        .expect("request builds successfully")
}

pub fn header_pairs(res: &Response<Body>) -> Vec<(String, String)> {
    // Flatten the header map in emission order for golden comparisons.
    res.headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                value
                    .to_str()
                    .expect("header value is valid ascii")
                    .to_owned(),
            )
        })
        .collect()
}

pub fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

pub fn get_session_cookie(res: &Response<Body>) -> Cookie<'static> {
    // Parse the `Set-Cookie` header the way a browser would.
    let set_cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .expect("response includes set-cookie header");
    let set_cookie = set_cookie
        .to_str()
        .expect("set-cookie header is valid utf-8");
    Cookie::parse_encoded(set_cookie)
        .expect("set-cookie parses successfully")
        .into_owned()
}

pub fn session_id(res: &Response<Body>) -> String {
    get_session_cookie(res).value().to_owned()
}

pub async fn body_string(body: Body) -> String {
    // Collect an Axum body into a UTF-8 string for assertions.
    let bytes = body
        .collect()
        .await
        .expect("body collects successfully")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}
