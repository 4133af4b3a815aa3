//! Authorization engine: the authoritative user/permission/route snapshot,
//! its refresh policy and the per-navigation route guard.
//!
//! Lifecycle: `Uninitialized -> Fetching -> Ready`, `Ready -> Fetching` on a
//! refresh, and `Ready | Fetching -> Cleared` on logout or expiry. `Cleared`
//! behaves like `Uninitialized`.
//!
//! Every fetch takes a request id from a monotonically increasing counter and
//! a clear advances the same counter, so only the newest fetch issued since
//! the last clear may write the snapshot.

mod cache;
mod guard;
mod snapshot;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub use cache::AuthorizationCache;
pub use guard::{GuardSkipReason, RouteGuardOutcome};
pub use snapshot::{AuthorizationSnapshot, SnapshotRejection};

use crate::config::FetchPolicy;
use crate::context::AuthContext;
use crate::events::{AuthEvent, AuthEventName, Subscription};
use crate::service::{AuthServiceError, UserInfo};
use crate::sync::{lock, spawn_detached};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationPhase {
    Uninitialized,
    Fetching,
    Ready,
    Cleared,
}

impl AuthorizationPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Fetching => "fetching",
            Self::Ready => "ready",
            Self::Cleared => "cleared",
        }
    }
}

/// Result of one authorization fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// The response lacked a required field; the snapshot is unchanged.
    Rejected(SnapshotRejection),
    /// The service answered without a user; the snapshot is unchanged.
    NoUser,
    Failed(AuthServiceError),
    /// A newer fetch or a clear superseded this one.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    AlreadyInitialized,
    ReusedCache,
    NoSession,
    Fetched(FetchOutcome),
}

#[derive(Debug)]
struct EngineState {
    phase: AuthorizationPhase,
    snapshot: AuthorizationSnapshot,
    ready: bool,
    cleared: bool,
    latest_request_id: u64,
    last_checked_path: Option<String>,
    authz_prompt_open: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            phase: AuthorizationPhase::Uninitialized,
            snapshot: AuthorizationSnapshot::default(),
            ready: false,
            cleared: false,
            latest_request_id: 0,
            last_checked_path: None,
            authz_prompt_open: false,
        }
    }
}

impl EngineState {
    fn settled_phase(&self) -> AuthorizationPhase {
        if self.ready {
            AuthorizationPhase::Ready
        } else if self.cleared {
            AuthorizationPhase::Cleared
        } else {
            AuthorizationPhase::Uninitialized
        }
    }

    fn install(&mut self, snapshot: AuthorizationSnapshot) {
        self.snapshot = snapshot;
        self.ready = true;
        self.cleared = false;
        self.phase = AuthorizationPhase::Ready;
        self.last_checked_path = None;
    }
}

pub struct AuthorizationEngine {
    ctx: AuthContext,
    state: Mutex<EngineState>,
    initialized: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AuthorizationEngine {
    /// Creates the engine and subscribes it to the auth bus.
    pub fn new(ctx: AuthContext) -> Arc<Self> {
        let engine = Arc::new(Self {
            ctx,
            state: Mutex::new(EngineState::default()),
            initialized: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        });
        engine.attach();
        engine
    }

    fn attach(self: &Arc<Self>) {
        let mut subscriptions = lock(&self.subscriptions);
        if !subscriptions.is_empty() {
            return;
        }
        let bus = &self.ctx.auth_bus;

        let weak = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::LoginSuccess, move |_| {
            if let Some(engine) = weak.upgrade() {
                engine.spawn_fetch("login_success");
            }
            Ok(())
        }));

        let weak = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::PermissionsReady, move |_| {
            if let Some(engine) = weak.upgrade() {
                let current = engine.ctx.navigator.current_path();
                engine.guard_route(&current);
            }
            Ok(())
        }));

        for name in [AuthEventName::Logout, AuthEventName::SessionExpired] {
            let weak: Weak<Self> = Arc::downgrade(self);
            subscriptions.push(bus.on(name, move |_| {
                if let Some(engine) = weak.upgrade() {
                    engine.clear(name);
                }
                Ok(())
            }));
        }
    }

    /// Runs the mount-time policy once per mount.
    pub async fn initialize(self: &Arc<Self>) -> InitializeOutcome {
        if self.initialized.swap(true, Ordering::AcqRel) {
            tracing::debug!("authorization engine already initialized");
            return InitializeOutcome::AlreadyInitialized;
        }
        self.attach();

        let config = &self.ctx.config;
        if config.effective_fetch_policy() == FetchPolicy::Eager {
            tracing::info!(
                speed_mode = config.speed_mode,
                "eager policy: fetching authorization without session check"
            );
            return InitializeOutcome::Fetched(self.fetch_authorization().await);
        }

        let store = &self.ctx.session_store;
        if let Some(snapshot) = self
            .ctx
            .authz_cache
            .fresh(store.now_unix_ms(), config.staleness_window)
        {
            tracing::debug!("reusing cached authorization snapshot");
            self.install_cached(snapshot);
            return InitializeOutcome::ReusedCache;
        }

        if store.current_valid().is_some() {
            InitializeOutcome::Fetched(self.fetch_authorization().await)
        } else {
            tracing::debug!("no valid session; authorization stays uninitialized");
            InitializeOutcome::NoSession
        }
    }

    /// Fetches the current user's authorization and applies it if still current.
    pub async fn fetch_authorization(&self) -> FetchOutcome {
        let request_id = self.begin_fetch();
        self.complete_fetch(request_id).await
    }

    /// Manual refresh; failures are reported to the caller, never retried here.
    pub async fn refetch(&self) -> FetchOutcome {
        self.fetch_authorization().await
    }

    fn begin_fetch(&self) -> u64 {
        let mut state = lock(&self.state);
        state.latest_request_id += 1;
        state.phase = AuthorizationPhase::Fetching;
        state.latest_request_id
    }

    fn spawn_fetch(self: &Arc<Self>, trigger: &'static str) {
        let request_id = self.begin_fetch();
        let engine = Arc::clone(self);
        let spawned = spawn_detached(async move {
            let outcome = engine.complete_fetch(request_id).await;
            tracing::debug!(trigger, ?outcome, "background authorization fetch finished");
        });
        if !spawned {
            tracing::warn!(trigger, "no async runtime; authorization fetch not started");
            let mut state = lock(&self.state);
            if state.latest_request_id == request_id {
                state.phase = state.settled_phase();
            }
        }
    }

    async fn complete_fetch(&self, request_id: u64) -> FetchOutcome {
        let response = self.ctx.service.get_current_user_info().await;

        let snapshot = {
            let mut state = lock(&self.state);
            if state.latest_request_id != request_id {
                tracing::debug!(
                    request_id,
                    latest_request_id = state.latest_request_id,
                    "discarding superseded authorization response"
                );
                return FetchOutcome::Discarded;
            }

            let payload = match response {
                Ok(Some(info)) => info.user,
                Ok(None) => {
                    state.phase = state.settled_phase();
                    tracing::error!("auth service returned no user; keeping snapshot");
                    return FetchOutcome::NoUser;
                }
                Err(error) => {
                    state.phase = state.settled_phase();
                    tracing::error!(reason = %error, "authorization fetch failed; keeping snapshot");
                    return FetchOutcome::Failed(error);
                }
            };

            match AuthorizationSnapshot::from_payload(payload) {
                Ok(snapshot) => {
                    state.install(snapshot.clone());
                    // Under the state lock so a concurrent clear cannot be undone.
                    self.ctx
                        .authz_cache
                        .store(snapshot.clone(), self.ctx.session_store.now_unix_ms());
                    snapshot
                }
                Err(rejection) => {
                    state.phase = state.settled_phase();
                    tracing::warn!(
                        reason = rejection.as_str(),
                        "malformed authorization response; keeping snapshot"
                    );
                    return FetchOutcome::Rejected(rejection);
                }
            }
        };

        tracing::info!(
            permissions = snapshot.permissions.len(),
            routes = snapshot.accessible_routes.len(),
            "authorization snapshot applied"
        );
        if lock(&self.state).latest_request_id != request_id {
            tracing::debug!(request_id, "snapshot cleared before announcement");
            return FetchOutcome::Discarded;
        }
        self.ctx
            .auth_bus
            .emit(AuthEvent::PermissionsReady(Arc::new(snapshot)));
        FetchOutcome::Applied
    }

    fn install_cached(&self, snapshot: AuthorizationSnapshot) {
        {
            let mut state = lock(&self.state);
            state.latest_request_id += 1;
            state.install(snapshot.clone());
        }
        self.ctx
            .auth_bus
            .emit(AuthEvent::PermissionsReady(Arc::new(snapshot)));
    }

    fn clear(&self, reason: AuthEventName) {
        {
            let mut state = lock(&self.state);
            state.latest_request_id += 1;
            state.snapshot = AuthorizationSnapshot::default();
            state.ready = false;
            state.cleared = true;
            state.phase = AuthorizationPhase::Cleared;
            state.last_checked_path = None;
            state.authz_prompt_open = false;
            self.ctx.authz_cache.clear();
        }
        tracing::info!(reason = %reason, "authorization snapshot cleared");
    }

    /// Evaluates `pathname` against the accessible routes.
    ///
    /// A denial opens the authorization prompt and queues a redirect home on
    /// the deferred navigation queue; the host performs it after commit.
    pub fn guard_route(&self, pathname: &str) -> RouteGuardOutcome {
        let path = self.ctx.clean_path(pathname);
        let home = self.ctx.config.home_path.clone();

        {
            let mut state = lock(&self.state);
            let skip = if state.phase == AuthorizationPhase::Fetching {
                Some(GuardSkipReason::Loading)
            } else if state.snapshot.user.is_none() {
                // Anonymous visitors are prompted by the UI coordinator instead.
                Some(GuardSkipReason::NoUser)
            } else if state.snapshot.accessible_routes.is_empty() {
                Some(GuardSkipReason::RoutesNotLoaded)
            } else if state.last_checked_path.as_deref() == Some(path.as_str()) {
                Some(GuardSkipReason::AlreadyChecked)
            } else {
                None
            };
            if let Some(reason) = skip {
                tracing::debug!(path = %path, reason = reason.as_str(), "route guard skipped");
                return RouteGuardOutcome::Skipped(reason);
            }

            // The redirect target never moves the cursor, so a denial stays
            // memoized across its own redirect.
            if path == home {
                return RouteGuardOutcome::Granted { path };
            }
            state.last_checked_path = Some(path.clone());
            if state.snapshot.can_access_route(&path) {
                return RouteGuardOutcome::Granted { path };
            }
            state.authz_prompt_open = true;
        }

        tracing::warn!(path = %path, "route not accessible; redirecting home");
        self.ctx.deferred_navigation.push(home.clone());
        RouteGuardOutcome::Denied {
            path,
            redirect_to: home,
        }
    }

    /// Unsubscribes from the bus and drops per-mount state.
    pub fn unmount(&self) {
        for subscription in lock(&self.subscriptions).drain(..) {
            subscription.unsubscribe();
        }
        let mut state = lock(&self.state);
        state.last_checked_path = None;
        state.authz_prompt_open = false;
        drop(state);
        self.initialized.store(false, Ordering::Release);
    }

    pub fn phase(&self) -> AuthorizationPhase {
        lock(&self.state).phase
    }

    pub fn snapshot(&self) -> AuthorizationSnapshot {
        lock(&self.state).snapshot.clone()
    }

    pub fn user(&self) -> Option<UserInfo> {
        lock(&self.state).snapshot.user.clone()
    }

    pub fn group_ids(&self) -> Vec<i64> {
        lock(&self.state).snapshot.group_ids.clone()
    }

    pub fn permissions(&self) -> BTreeSet<String> {
        lock(&self.state).snapshot.permissions.clone()
    }

    pub fn accessible_routes(&self) -> BTreeSet<String> {
        lock(&self.state).snapshot.accessible_routes.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).phase == AuthorizationPhase::Fetching
    }

    pub fn is_authz_ready(&self) -> bool {
        lock(&self.state).ready
    }

    /// `!loading && user present && route accessible`, evaluated now.
    pub fn is_authorized(&self, current_route: &str) -> bool {
        let path = self.ctx.clean_path(current_route);
        let state = lock(&self.state);
        state.phase != AuthorizationPhase::Fetching
            && state.snapshot.user.is_some()
            && state.snapshot.can_access_route(&path)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        lock(&self.state).snapshot.has_permission(permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        lock(&self.state).snapshot.has_any_permission(permissions)
    }

    pub fn can_access_route(&self, route: &str) -> bool {
        let path = self.ctx.clean_path(route);
        lock(&self.state).snapshot.can_access_route(&path)
    }

    pub fn last_checked_path(&self) -> Option<String> {
        lock(&self.state).last_checked_path.clone()
    }

    pub fn is_authz_prompt_modal_open(&self) -> bool {
        lock(&self.state).authz_prompt_open
    }

    pub fn open_authz_prompt_modal(&self) {
        lock(&self.state).authz_prompt_open = true;
    }

    pub fn close_authz_prompt_modal(&self) {
        lock(&self.state).authz_prompt_open = false;
    }
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::ConsoleAuthConfig;
    use crate::session::{MemoryStorage, SessionRecord};
    use crate::testing::{ManualClock, RecordingNavigator, ScriptedAuthService, settle, user_info};
    use std::time::Duration;

    struct Harness {
        ctx: AuthContext,
        service: Arc<ScriptedAuthService>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: ConsoleAuthConfig) -> Harness {
        harness_at(config, "/")
    }

    fn harness_at(config: ConsoleAuthConfig, path: &str) -> Harness {
        let service = Arc::new(ScriptedAuthService::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let ctx = AuthContext::new(
            config,
            service.clone(),
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingNavigator::at(path)),
            clock.clone(),
        );
        Harness {
            ctx,
            service,
            clock,
        }
    }

    fn store_valid_session(h: &Harness) {
        let expires_at = (h.clock.now_unix_ms() / 1_000) as i64 + 3_600;
        h.ctx
            .session_store
            .write(&SessionRecord::new("tok", expires_at))
            .expect("write session");
    }

    #[tokio::test]
    async fn fetch_applies_snapshot_and_emits_permissions_ready() {
        let h = harness(ConsoleAuthConfig::default());
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat", "/space"]))));
        let engine = AuthorizationEngine::new(h.ctx.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = h.ctx.auth_bus.on(AuthEventName::PermissionsReady, move |event| {
            if let AuthEvent::PermissionsReady(snapshot) = event {
                lock(&sink).push(snapshot.accessible_routes.len());
            }
            Ok(())
        });

        assert_eq!(engine.fetch_authorization().await, FetchOutcome::Applied);
        assert!(engine.is_authz_ready());
        assert_eq!(engine.phase(), AuthorizationPhase::Ready);
        assert!(engine.has_permission("agent:read"));
        assert!(engine.is_authorized("/en/chat"));
        assert!(!engine.is_authorized("/agents"));
        assert_eq!(*lock(&seen), vec![2]);
    }

    #[tokio::test]
    async fn malformed_response_keeps_prior_snapshot() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        engine.fetch_authorization().await;
        let before = engine.snapshot();

        let mut malformed = user_info(&["agent:write"], &[]);
        malformed.user.accessible_routes = None;
        h.service.push_user_info(Ok(Some(malformed)));

        assert_eq!(
            engine.fetch_authorization().await,
            FetchOutcome::Rejected(SnapshotRejection::MissingAccessibleRoutes)
        );
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.phase(), AuthorizationPhase::Ready);
    }

    #[tokio::test]
    async fn failure_keeps_snapshot_and_does_not_retry() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        h.service
            .push_user_info(Err(AuthServiceError::Transport("503".to_string())));

        assert_eq!(
            engine.fetch_authorization().await,
            FetchOutcome::Failed(AuthServiceError::Transport("503".to_string()))
        );
        assert_eq!(engine.phase(), AuthorizationPhase::Uninitialized);
        assert!(!engine.is_authz_ready());
        assert_eq!(h.service.user_info_calls(), 1);
    }

    #[tokio::test]
    async fn logout_clears_without_network() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        engine.fetch_authorization().await;

        h.ctx.auth_bus.emit(AuthEvent::Logout);
        assert_eq!(engine.phase(), AuthorizationPhase::Cleared);
        assert!(engine.snapshot().is_empty());
        assert!(!engine.is_authz_ready());
        assert!(h.ctx.authz_cache.fetched_at_unix_ms().is_none());
        assert_eq!(h.service.user_info_calls(), 1);
    }

    #[tokio::test]
    async fn older_response_cannot_overwrite_newer_one() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        let first = h.service.hold_next_user_info();
        h.service
            .push_user_info(Ok(Some(user_info(&["new"], &["/space"]))));

        let slow_engine = Arc::clone(&engine);
        let slow = tokio::spawn(async move { slow_engine.fetch_authorization().await });
        tokio::task::yield_now().await;
        assert_eq!(engine.fetch_authorization().await, FetchOutcome::Applied);

        first.release(Ok(Some(user_info(&["old"], &["/chat"]))));
        assert_eq!(slow.await.expect("join"), FetchOutcome::Discarded);
        assert!(engine.has_permission("new"));
        assert!(!engine.has_permission("old"));
    }

    #[tokio::test]
    async fn initialize_runs_once_per_mount() {
        let h = harness(ConsoleAuthConfig::default());
        store_valid_session(&h);
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        let engine = AuthorizationEngine::new(h.ctx.clone());

        assert_eq!(
            engine.initialize().await,
            InitializeOutcome::Fetched(FetchOutcome::Applied)
        );
        assert_eq!(engine.initialize().await, InitializeOutcome::AlreadyInitialized);
        assert_eq!(h.service.user_info_calls(), 1);
    }

    #[tokio::test]
    async fn initialize_without_session_stays_uninitialized() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        assert_eq!(engine.initialize().await, InitializeOutcome::NoSession);
        assert_eq!(engine.phase(), AuthorizationPhase::Uninitialized);
        assert_eq!(h.service.user_info_calls(), 0);
    }

    #[tokio::test]
    async fn eager_policy_skips_cache() {
        let h = harness(ConsoleAuthConfig {
            fetch_policy: FetchPolicy::Eager,
            ..ConsoleAuthConfig::default()
        });
        store_valid_session(&h);
        h.ctx.authz_cache.store(
            AuthorizationSnapshot::from_payload(user_info(&["cached"], &["/chat"]).user)
                .expect("snapshot"),
            h.clock.now_unix_ms(),
        );
        h.service
            .push_user_info(Ok(Some(user_info(&["fresh"], &["/chat"]))));

        let engine = AuthorizationEngine::new(h.ctx.clone());
        engine.initialize().await;
        assert_eq!(h.service.user_info_calls(), 1);
        assert!(engine.has_permission("fresh"));
    }

    #[tokio::test]
    async fn cache_expires_after_staleness_window() {
        let h = harness(ConsoleAuthConfig::default());
        store_valid_session(&h);
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        AuthorizationEngine::new(h.ctx.clone()).initialize().await;

        h.clock.advance(Duration::from_secs(299));
        let second = AuthorizationEngine::new(h.ctx.clone());
        assert_eq!(second.initialize().await, InitializeOutcome::ReusedCache);
        assert!(second.is_authz_ready());

        h.clock.advance(Duration::from_secs(2));
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        let third = AuthorizationEngine::new(h.ctx.clone());
        assert_eq!(
            third.initialize().await,
            InitializeOutcome::Fetched(FetchOutcome::Applied)
        );
        assert_eq!(h.service.user_info_calls(), 2);
    }

    #[tokio::test]
    async fn guard_skips_until_snapshot_is_ready() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        assert_eq!(
            engine.guard_route("/agents"),
            RouteGuardOutcome::Skipped(GuardSkipReason::NoUser)
        );

        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &[]))));
        engine.fetch_authorization().await;
        assert_eq!(
            engine.guard_route("/agents"),
            RouteGuardOutcome::Skipped(GuardSkipReason::RoutesNotLoaded)
        );
        assert!(h.ctx.deferred_navigation.is_empty());
    }

    #[tokio::test]
    async fn guard_grants_home_and_records_cursor() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        engine.fetch_authorization().await;

        assert_eq!(
            engine.guard_route("/en/"),
            RouteGuardOutcome::Granted {
                path: "/".to_string()
            }
        );
        assert_eq!(engine.last_checked_path(), None);
        assert_eq!(
            engine.guard_route("/zh/chat"),
            RouteGuardOutcome::Granted {
                path: "/chat".to_string()
            }
        );
        assert_eq!(
            engine.guard_route("/en/chat"),
            RouteGuardOutcome::Skipped(GuardSkipReason::AlreadyChecked)
        );
        assert_eq!(engine.last_checked_path().as_deref(), Some("/chat"));
    }

    #[tokio::test]
    async fn applied_snapshot_guards_the_current_path() {
        let h = harness_at(ConsoleAuthConfig::default(), "/en/agents");
        let engine = AuthorizationEngine::new(h.ctx.clone());
        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat", "/space"]))));

        assert_eq!(engine.fetch_authorization().await, FetchOutcome::Applied);
        assert!(engine.is_authz_prompt_modal_open());
        assert_eq!(engine.last_checked_path().as_deref(), Some("/agents"));
        assert_eq!(h.ctx.deferred_navigation.pending(), vec!["/".to_string()]);
    }

    #[tokio::test]
    async fn cleared_fetch_never_reaches_the_cache() {
        let h = harness(ConsoleAuthConfig::default());
        store_valid_session(&h);
        let engine = AuthorizationEngine::new(h.ctx.clone());
        let announced = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&announced);
        let _ = h.ctx.auth_bus.on(AuthEventName::PermissionsReady, move |_| {
            *lock(&counter) += 1;
            Ok(())
        });

        let held = h.service.hold_next_user_info();
        let pending_engine = Arc::clone(&engine);
        let pending = tokio::spawn(async move { pending_engine.fetch_authorization().await });
        settle().await;
        h.ctx.auth_bus.emit(AuthEvent::Logout);
        held.release(Ok(Some(user_info(&["agent:read"], &["/chat"]))));

        assert_eq!(pending.await.expect("join"), FetchOutcome::Discarded);
        assert!(h.ctx.authz_cache.fetched_at_unix_ms().is_none());
        assert_eq!(*lock(&announced), 0);

        h.service
            .push_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
        let remount = AuthorizationEngine::new(h.ctx.clone());
        assert_eq!(
            remount.initialize().await,
            InitializeOutcome::Fetched(FetchOutcome::Applied)
        );
    }

    #[tokio::test]
    async fn unmount_detaches_from_bus() {
        let h = harness(ConsoleAuthConfig::default());
        let engine = AuthorizationEngine::new(h.ctx.clone());
        assert_eq!(h.ctx.auth_bus.subscriber_count(AuthEventName::Logout), 1);

        engine.unmount();
        assert_eq!(h.ctx.auth_bus.subscriber_count(AuthEventName::Logout), 0);
        assert_eq!(h.ctx.auth_bus.subscriber_count(AuthEventName::LoginSuccess), 0);

        engine.initialize().await;
        assert_eq!(h.ctx.auth_bus.subscriber_count(AuthEventName::Logout), 1);
    }
}
