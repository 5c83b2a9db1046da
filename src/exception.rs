use std::{
    convert::Infallible,
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::{Request, Response, StatusCode};
use tower_layer::Layer;
use tower_service::Service;

use crate::error::BoxError;

type ResponseFactory<B> = Arc<dyn Fn() -> Response<B> + Send + Sync>;

/// Turns an error from the inner service into a `500 Internal Server Error` response whose body
/// is the error message.
///
/// The body is the error's `Display` text alone, with no type name prefixed. A fresh response is
/// built from the factory for every failure.
pub struct ExceptionHandlerLayer<B> {
    factory: ResponseFactory<B>,
}

impl<B: Default + 'static> ExceptionHandlerLayer<B> {
    pub fn new() -> Self {
        Self {
            factory: Arc::new(Response::default),
        }
    }
}

impl<B: Default + 'static> Default for ExceptionHandlerLayer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> ExceptionHandlerLayer<B> {
    /// Uses `factory` for the base of each error response; its status is overwritten with 500 and
    /// its body replaced by the error message.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Response<B> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl<B> Clone for ExceptionHandlerLayer<B> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

impl<B> fmt::Debug for ExceptionHandlerLayer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandlerLayer").finish_non_exhaustive()
    }
}

impl<S, B> Layer<S> for ExceptionHandlerLayer<B> {
    type Service = ExceptionHandler<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        ExceptionHandler {
            inner,
            factory: self.factory.clone(),
        }
    }
}

pub struct ExceptionHandler<S, B> {
    inner: S,
    factory: ResponseFactory<B>,
}

impl<S: Clone, B> Clone for ExceptionHandler<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<S: fmt::Debug, B> fmt::Debug for ExceptionHandler<S, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandler")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

fn error_response<B: From<String>>(factory: &ResponseFactory<B>, err: BoxError) -> Response<B> {
    tracing::error!(err = %err, "request failed");
    let (mut parts, _) = factory().into_parts();
    parts.status = StatusCode::INTERNAL_SERVER_ERROR;
    Response::from_parts(parts, B::from(err.to_string()))
}

impl<ReqBody, B, S> Service<Request<ReqBody>> for ExceptionHandler<S, B>
where
    S: Service<Request<ReqBody>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    B: From<String> + Send + 'static,
{
    type Response = Response<B>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Inner readiness is polled in the response future; a readiness error becomes a 500 too.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let factory = self.factory.clone();

        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Err(err) = std::future::poll_fn(|cx| inner.poll_ready(cx)).await {
                return Ok(error_response(&factory, err.into()));
            }

            match inner.call(req).await {
                Ok(res) => Ok(res),
                Err(err) => Ok(error_response(&factory, err.into())),
            }
        })
    }
}
