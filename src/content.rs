//! Request body parsing by content type.
//!
//! A [`ContentHandlerLayer`] buffers the body of requests whose media type its parser accepts,
//! stores the parsed value as a [`ParsedBody`] extension and hands the same bytes on to the inner
//! service. `GET` and `HEAD` requests are never parsed, and a request that already carries a
//! `ParsedBody` is left alone so layers can be stacked.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::{Method, Request, header::CONTENT_TYPE};
use http_body::Body;
use http_body_util::BodyExt as _;
use percent_encoding::percent_decode_str;
use serde::Deserialize as _;
use serde_json::{Map, Value};
use tower_layer::Layer;
use tower_service::Service;

use crate::error::{BoxError, ContentError};

/// The parsed request body, inserted into the request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

pub trait ContentParser: Clone + Send + Sync + 'static {
    /// Whether this parser handles `mime` (already lowercased, parameters stripped).
    fn accepts(&self, mime: &str) -> bool;

    fn parse(&self, body: &[u8]) -> Result<Value, ContentError>;
}

/// `application/json` bodies, plus any `application/*+json` structured-syntax type such as
/// `application/vnd.api+json`.
///
/// Arrays and objects may nest `max_depth` levels (default 512); deeper documents fail with
/// [`ContentError::Depth`].
#[derive(Debug, Clone, Copy)]
pub struct JsonContent {
    max_depth: usize,
}

impl Default for JsonContent {
    fn default() -> Self {
        Self { max_depth: 512 }
    }
}

impl JsonContent {
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Rejects documents whose arrays and objects nest deeper than `max_depth`, before any parsing.
fn check_depth(body: &[u8], max_depth: usize) -> Result<(), ContentError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in body {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > max_depth {
                    return Err(ContentError::Depth(max_depth));
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

impl ContentParser for JsonContent {
    fn accepts(&self, mime: &str) -> bool {
        mime == "application/json"
            || mime
                .strip_prefix("application/")
                .is_some_and(|subtype| subtype.ends_with("+json"))
    }

    fn parse(&self, body: &[u8]) -> Result<Value, ContentError> {
        check_depth(body, self.max_depth)?;

        // Nesting is bounded above; serde_stacker grows the stack for deep documents.
        let mut de = serde_json::Deserializer::from_slice(body);
        de.disable_recursion_limit();
        let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
        de.end()?;
        Ok(value)
    }
}

/// `application/x-www-form-urlencoded` bodies.
///
/// Values are strings. `key[]` appends to a list and `key[sub]` nests a map; otherwise the last
/// occurrence of a key wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormContent;

fn form_decode(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Splits `a[b][]` into `("a", ["b", ""])`.
fn key_path(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let (base, mut rest) = key.split_at(open);
    let mut segments = Vec::new();
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            break;
        };
        segments.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    if segments.is_empty() || base.is_empty() {
        return (key, Vec::new());
    }
    (base, segments)
}

fn insert_path(slot: &mut Value, segments: &[&str], value: String) {
    let Some((head, tail)) = segments.split_first() else {
        *slot = Value::String(value);
        return;
    };

    if head.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(Value::Null);
            if let Some(last) = items.last_mut() {
                insert_path(last, tail, value);
            }
        }
        return;
    }

    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        insert_path(child, tail, value);
    }
}

impl ContentParser for FormContent {
    fn accepts(&self, mime: &str) -> bool {
        mime == "application/x-www-form-urlencoded"
    }

    fn parse(&self, body: &[u8]) -> Result<Value, ContentError> {
        let body = String::from_utf8_lossy(body);
        let mut root = Map::new();

        for pair in body.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = form_decode(key);
            if key.is_empty() {
                continue;
            }
            let value = form_decode(value);

            let (base, segments) = key_path(&key);
            let slot = root.entry(base.to_owned()).or_insert(Value::Null);
            insert_path(slot, &segments, value);
        }

        Ok(Value::Object(root))
    }
}

#[derive(Debug, Clone)]
pub struct ContentHandlerLayer<P> {
    parser: P,
}

impl<P: ContentParser> ContentHandlerLayer<P> {
    pub fn new(parser: P) -> Self {
        Self { parser }
    }
}

impl ContentHandlerLayer<JsonContent> {
    pub fn json() -> Self {
        Self::new(JsonContent::default())
    }
}

impl ContentHandlerLayer<FormContent> {
    pub fn form() -> Self {
        Self::new(FormContent)
    }
}

impl<S, P: Clone> Layer<S> for ContentHandlerLayer<P> {
    type Service = ContentHandler<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        ContentHandler {
            inner,
            parser: self.parser.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentHandler<S, P> {
    inner: S,
    parser: P,
}

fn media_type<B>(req: &Request<B>) -> Option<String> {
    let value = req.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    let mime = value.split(';').next().unwrap_or_default();
    Some(mime.trim().to_ascii_lowercase())
}

fn wants_parse<B, P: ContentParser>(req: &Request<B>, parser: &P) -> bool {
    if *req.method() == Method::GET || *req.method() == Method::HEAD {
        return false;
    }
    if req.extensions().get::<ParsedBody>().is_some() {
        return false;
    }
    media_type(req).is_some_and(|mime| parser.accepts(&mime))
}

impl<ReqBody, S, P> Service<Request<ReqBody>> for ContentHandler<S, P>
where
    S: Service<Request<ReqBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Body + From<Bytes> + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    P: ContentParser,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let parser = self.parser.clone();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if !wants_parse(&req, &parser) {
                return inner.call(req).await.map_err(Into::into);
            }

            let (parts, body) = req.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|err| ContentError::Body(err.into()))?
                .to_bytes();

            let parsed = parser.parse(&bytes).inspect_err(|err| {
                tracing::debug!(err = %err, "request body rejected");
            })?;

            let mut req = Request::from_parts(parts, ReqBody::from(bytes));
            req.extensions_mut().insert(ParsedBody(parsed));

            inner.call(req).await.map_err(Into::into)
        })
    }
}
