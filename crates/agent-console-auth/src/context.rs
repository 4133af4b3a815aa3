use std::sync::Arc;

use crate::authorization::AuthorizationCache;
use crate::clock::Clock;
use crate::config::ConsoleAuthConfig;
use crate::events::{AuthEventBus, UiEventBus};
use crate::routes::{DeferredNavigation, Navigator, clean_path};
use crate::service::AuthService;
use crate::session::{KeyValueStorage, SessionStore};

/// Collaborators shared by every session component.
///
/// Built once per process and cloned into each component; clones share the
/// same buses, stores and queues.
#[derive(Clone)]
pub struct AuthContext {
    pub config: Arc<ConsoleAuthConfig>,
    pub auth_bus: AuthEventBus,
    pub ui_bus: UiEventBus,
    pub service: Arc<dyn AuthService>,
    pub session_store: SessionStore,
    pub navigator: Arc<dyn Navigator>,
    pub deferred_navigation: Arc<DeferredNavigation>,
    pub authz_cache: Arc<AuthorizationCache>,
}

impl AuthContext {
    pub fn new(
        config: ConsoleAuthConfig,
        service: Arc<dyn AuthService>,
        storage: Arc<dyn KeyValueStorage>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            auth_bus: AuthEventBus::new(),
            ui_bus: UiEventBus::new(),
            service,
            session_store: SessionStore::new(storage, clock),
            navigator,
            deferred_navigation: Arc::new(DeferredNavigation::new()),
            authz_cache: Arc::new(AuthorizationCache::new()),
        }
    }

    /// `pathname` with the configured locale prefix removed.
    pub fn clean_path(&self, pathname: &str) -> String {
        clean_path(pathname, &self.config.locales)
    }

    pub fn is_home(&self, pathname: &str) -> bool {
        self.clean_path(pathname) == self.config.home_path
    }

    pub fn current_clean_path(&self) -> String {
        self.clean_path(&self.navigator.current_path())
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
