use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tower_sessions_core::session::Id;

/// Attributes the session runtime wants on the session cookie.
///
/// Empty strings, `false` and a zero lifetime all mean "omit the attribute".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieParams {
    /// Lifetime in seconds. Zero makes it a browser-session cookie.
    pub lifetime: u32,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub http_only: bool,
}

/// How the session runtime itself is configured.
///
/// [`SessionHeadersLayer`](crate::SessionHeadersLayer) only works when the runtime leaves all
/// header emission to it; see [`RuntimeSettings::manual`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Propagate the session id through rewritten URLs.
    pub use_trans_sid: bool,
    /// Let the runtime write its own `Set-Cookie` header.
    pub use_cookies: bool,
    /// Only accept the session id from a cookie.
    pub use_only_cookies: bool,
    /// The runtime's own cache limiter; empty when disabled.
    pub cache_limiter: String,
}

impl RuntimeSettings {
    /// Settings under which the runtime emits no headers of its own.
    pub fn manual() -> Self {
        Self {
            use_trans_sid: false,
            use_cookies: false,
            use_only_cookies: true,
            cache_limiter: String::new(),
        }
    }

    /// The stock runtime configuration, which emits its own cookie and cache headers.
    pub fn ambient() -> Self {
        Self {
            use_trans_sid: false,
            use_cookies: true,
            use_only_cookies: true,
            cache_limiter: "nocache".to_owned(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::manual()
    }
}

/// The session subsystem observed by [`SessionHeaders`](crate::layer::SessionHeaders).
///
/// The layer holds one store and calls [`SessionStore::for_request`] at the start of every
/// request; the returned context is what downstream handlers find in the request extensions and
/// what the layer observes once they return. The middleware only reads `name`, `current_id`,
/// `cookie_params` and `runtime_settings`. `start`, `regenerate` and `destroy` are for downstream
/// handlers.
pub trait SessionStore: Send + Sync + 'static {
    /// A context for one request: same name, cookie params and runtime settings, no active
    /// session. Nothing done to it is visible to other requests.
    fn for_request(&self) -> Self
    where
        Self: Sized;

    /// Session cookie name.
    fn name(&self) -> String;

    /// The active session id, or an empty string when no session is active.
    fn current_id(&self) -> String;

    fn cookie_params(&self) -> CookieParams;

    fn runtime_settings(&self) -> RuntimeSettings;

    /// Starts (or resumes, when `id` is given) a session and returns its id.
    fn start(&self, id: Option<&str>) -> String;

    /// Replaces the active session id with a fresh one and returns it.
    fn regenerate(&self) -> String;

    fn destroy(&self);
}

#[derive(Debug)]
struct State {
    name: String,
    id: String,
    cookie_params: CookieParams,
}

/// In-process session context.
///
/// Clones share state, so the copy handed to downstream handlers and the copy held by the layer
/// observe the same id. [`SessionStore::for_request`] gives each request its own state.
#[derive(Debug, Clone)]
pub struct LocalSession {
    state: Arc<Mutex<State>>,
    settings: RuntimeSettings,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new(crate::DEFAULT_SESSION_NAME)
    }
}

impl LocalSession {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                name: name.into(),
                id: String::new(),
                cookie_params: CookieParams::default(),
            })),
            settings: RuntimeSettings::manual(),
        }
    }

    #[must_use]
    pub fn with_cookie_params(self, cookie_params: CookieParams) -> Self {
        self.set_cookie_params(cookie_params);
        self
    }

    #[must_use]
    pub fn with_runtime_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn set_name<N: Into<String>>(&self, name: N) {
        self.lock().name = name.into();
    }

    pub fn set_cookie_params(&self, cookie_params: CookieParams) {
        self.lock().cookie_params = cookie_params;
    }

    pub fn is_active(&self) -> bool {
        !self.lock().id.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is plain data; a panic mid-update cannot leave it inconsistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generate_id() -> String {
        Id::default().to_string()
    }
}

impl SessionStore for LocalSession {
    fn for_request(&self) -> Self {
        let state = self.lock();
        Self {
            state: Arc::new(Mutex::new(State {
                name: state.name.clone(),
                id: String::new(),
                cookie_params: state.cookie_params.clone(),
            })),
            settings: self.settings.clone(),
        }
    }

    fn name(&self) -> String {
        self.lock().name.clone()
    }

    fn current_id(&self) -> String {
        self.lock().id.clone()
    }

    fn cookie_params(&self) -> CookieParams {
        self.lock().cookie_params.clone()
    }

    fn runtime_settings(&self) -> RuntimeSettings {
        self.settings.clone()
    }

    fn start(&self, id: Option<&str>) -> String {
        let mut state = self.lock();
        if state.id.is_empty() {
            state.id = match id {
                Some(id) if !id.is_empty() => id.to_owned(),
                _ => Self::generate_id(),
            };
            tracing::debug!(session.name = %state.name, "session started");
        }
        state.id.clone()
    }

    fn regenerate(&self) -> String {
        let mut state = self.lock();
        state.id = Self::generate_id();
        tracing::debug!(session.name = %state.name, "session id regenerated");
        state.id.clone()
    }

    fn destroy(&self) {
        let mut state = self.lock();
        state.id.clear();
        tracing::debug!(session.name = %state.name, "session destroyed");
    }
}
