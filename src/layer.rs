use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use http::{HeaderValue, Request, Response, header::SET_COOKIE};
use time::{OffsetDateTime, error::Format};
use tower_cookies::{CookieManager, Cookies};
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    config::SessionHeadersConfig,
    cookie::session_cookie,
    error::ConfigurationError,
    limiter::HeaderSet,
    store::{RuntimeSettings, SessionStore},
};

/// Wall clock read once per request, right after the inner service returns.
pub type Clock = fn() -> OffsetDateTime;

/// Emits the session `Set-Cookie` and cache-limiter headers for whatever the inner service did
/// to the session.
///
/// The store given here is a template: every request gets its own context from
/// [`SessionStore::for_request`].
#[derive(Debug, Clone)]
pub struct SessionHeadersLayer<St> {
    store: St,
    config: SessionHeadersConfig,
    clock: Clock,
}

impl<St: SessionStore + Clone> SessionHeadersLayer<St> {
    /// Builds the layer with the default config (`nocache`, 180 minutes).
    pub fn new(store: St) -> Result<Self, ConfigurationError> {
        Self::with_config(store, SessionHeadersConfig::default())
    }

    /// Fails unless the store's runtime leaves all session headers to this layer.
    pub fn with_config(
        store: St,
        config: SessionHeadersConfig,
    ) -> Result<Self, ConfigurationError> {
        check_runtime(&store.runtime_settings())?;
        tracing::debug!(
            cache_limiter = %config.cache_limiter,
            cache_expire_minutes = config.cache_expire_minutes,
            "session headers layer configured"
        );
        Ok(Self {
            store,
            config,
            clock: OffsetDateTime::now_utc,
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SessionHeadersConfig {
        &self.config
    }
}

fn check_runtime(settings: &RuntimeSettings) -> Result<(), ConfigurationError> {
    if settings.use_trans_sid {
        return Err(ConfigurationError::TransSidEnabled);
    }
    if settings.use_cookies {
        return Err(ConfigurationError::RuntimeCookiesEnabled);
    }
    if !settings.use_only_cookies {
        return Err(ConfigurationError::CookiesOnlyDisabled);
    }
    if !settings.cache_limiter.is_empty() {
        return Err(ConfigurationError::RuntimeCacheLimiter(
            settings.cache_limiter.clone(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SessionHeaders<S, St> {
    inner: S,
    store: St,
    config: SessionHeadersConfig,
    clock: Clock,
}

impl<S, St: Clone> Layer<S> for SessionHeadersLayer<St> {
    type Service = CookieManager<SessionHeaders<S, St>>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieManager::new(SessionHeaders {
            inner,
            store: self.store.clone(),
            config: self.config.clone(),
            clock: self.clock,
        })
    }
}

/// Headers owed to the response once the inner service has run.
///
/// `old_id` is the session cookie the client sent (empty when absent). A changed id gets a
/// `Set-Cookie`; any active session gets the cache-limiter set. A session destroyed downstream
/// gets neither.
pub fn synthesize<St: SessionStore + ?Sized>(
    store: &St,
    config: &SessionHeadersConfig,
    old_id: &str,
    now: OffsetDateTime,
) -> Result<HeaderSet, Format> {
    let new_id = store.current_id();
    let mut headers = HeaderSet::new();

    if new_id != old_id {
        // Name and cookie params are read now: the inner service may have changed them.
        let cookie = session_cookie(&store.name(), &new_id, &store.cookie_params(), now)?;
        headers.push((SET_COOKIE, cookie));
    }

    if !new_id.is_empty() {
        headers.extend(
            config
                .cache_limiter
                .headers(now, config.max_age_seconds())?,
        );
    }

    Ok(headers)
}

fn incoming_id<B>(req: &Request<B>, name: &str) -> String {
    match req.extensions().get::<Cookies>() {
        Some(cookies) => cookies
            .get(name)
            .map(|cookie| cookie.value().to_owned())
            .unwrap_or_default(),
        None => {
            tracing::warn!("request has no cookie jar; treating session cookie as absent");
            String::new()
        }
    }
}

impl<ReqBody, ResBody, S, St> Service<Request<ReqBody>> for SessionHeaders<S, St>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send,
    St: SessionStore + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let store = self.store.for_request();
        let config = self.config.clone();
        let clock = self.clock;

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let old_id = incoming_id(&req, &store.name());
            req.extensions_mut().insert(store.clone());

            let mut res = inner.call(req).await?;

            let now = clock();
            let headers = match synthesize(&store, &config, &old_id, now) {
                Ok(headers) => headers,
                Err(err) => {
                    tracing::warn!(err = %err, "failed to format session headers");
                    return Ok(res);
                }
            };
            if headers.is_empty() {
                return Ok(res);
            }

            let map = res.headers_mut();
            for (name, value) in headers {
                match HeaderValue::try_from(value) {
                    Ok(value) => {
                        map.append(name, value);
                    }
                    Err(err) => {
                        tracing::warn!(
                            err = %err,
                            header = name.as_str(),
                            "skipping invalid session header"
                        );
                    }
                }
            }

            Ok(res)
        })
    }
}
