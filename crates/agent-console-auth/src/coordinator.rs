//! Modal visibility and the redirect policy around authentication modals.

use std::sync::{Arc, Mutex, Weak};

use crate::context::AuthContext;
use crate::dedup::DedupGuard;
use crate::events::{AuthEvent, AuthEventName, Subscription, UiEvent};
use crate::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    Checking,
    Authenticated,
    Anonymous,
}

/// Where the next login attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginOrigin {
    #[default]
    Direct,
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalKind {
    Login,
    Register,
    AuthPrompt,
    SessionExpired,
}

impl ModalKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::AuthPrompt => "auth_prompt",
            Self::SessionExpired => "session_expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModalState {
    pub login: bool,
    pub register: bool,
    pub auth_prompt: bool,
    pub session_expired: bool,
    /// Closed-to-open transitions of the session-expired modal.
    pub session_expired_shown_count: u64,
}

impl ModalState {
    pub fn is_open(&self, kind: ModalKind) -> bool {
        match kind {
            ModalKind::Login => self.login,
            ModalKind::Register => self.register,
            ModalKind::AuthPrompt => self.auth_prompt,
            ModalKind::SessionExpired => self.session_expired,
        }
    }

    pub fn any_open(&self) -> bool {
        self.login || self.register || self.auth_prompt || self.session_expired
    }

    fn set(&mut self, kind: ModalKind, open: bool) {
        let flag = match kind {
            ModalKind::Login => &mut self.login,
            ModalKind::Register => &mut self.register,
            ModalKind::AuthPrompt => &mut self.auth_prompt,
            ModalKind::SessionExpired => &mut self.session_expired,
        };
        *flag = open;
    }
}

#[derive(Debug, Default)]
struct CoordinatorState {
    status: AuthStatus,
    modals: ModalState,
    login_origin: LoginOrigin,
}

pub struct AuthUiCoordinator {
    ctx: AuthContext,
    state: Mutex<CoordinatorState>,
    session_expired_guard: Arc<DedupGuard>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AuthUiCoordinator {
    pub fn new(ctx: AuthContext) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            ctx,
            state: Mutex::new(CoordinatorState::default()),
            session_expired_guard: Arc::new(DedupGuard::new()),
            subscriptions: Mutex::new(Vec::new()),
        });
        coordinator.attach();
        coordinator
    }

    fn attach(self: &Arc<Self>) {
        let mut subscriptions = lock(&self.subscriptions);
        if !subscriptions.is_empty() {
            return;
        }
        let bus = &self.ctx.auth_bus;

        let weak = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::SessionExpired, move |_| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.set_status(AuthStatus::Anonymous);
                coordinator.open_session_expired_modal();
            }
            Ok(())
        }));

        let weak = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::RegisterSuccess, move |_| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.set_modal(ModalKind::Register, false);
            }
            Ok(())
        }));

        let weak = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::LoginSuccess, move |_| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.set_status(AuthStatus::Authenticated);
                coordinator.set_modal(ModalKind::Login, false);
                coordinator.set_modal(ModalKind::AuthPrompt, false);
            }
            Ok(())
        }));

        let weak: Weak<Self> = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::PermissionsReady, move |event| {
            if let (Some(coordinator), AuthEvent::PermissionsReady(snapshot)) =
                (weak.upgrade(), event)
                && snapshot.user.is_some()
            {
                coordinator.set_status(AuthStatus::Authenticated);
            }
            Ok(())
        }));

        let weak = Arc::downgrade(self);
        subscriptions.push(bus.on(AuthEventName::Logout, move |_| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.set_status(AuthStatus::Anonymous);
            }
            Ok(())
        }));
    }

    /// Resolves the authentication status from the stored session.
    pub fn mount(self: &Arc<Self>) -> AuthStatus {
        self.attach();
        let status = if self.ctx.config.speed_mode
            || self.ctx.session_store.current_valid().is_some()
        {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Anonymous
        };
        self.set_status(status);
        status
    }

    pub fn status(&self) -> AuthStatus {
        lock(&self.state).status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::Authenticated
    }

    pub fn modal_state(&self) -> ModalState {
        lock(&self.state).modals
    }

    pub fn open_login_modal(&self) {
        self.set_modal(ModalKind::Login, true);
    }

    pub fn close_login_modal(&self) {
        self.close(ModalKind::Login);
    }

    pub fn open_register_modal(&self) {
        self.set_modal(ModalKind::Register, true);
    }

    pub fn close_register_modal(&self) {
        self.close(ModalKind::Register);
    }

    pub fn open_auth_prompt_modal(&self) {
        self.set_modal(ModalKind::AuthPrompt, true);
    }

    pub fn close_auth_prompt_modal(&self) {
        self.close(ModalKind::AuthPrompt);
    }

    /// Opens the session-expired modal unless one is already being shown.
    pub fn open_session_expired_modal(&self) -> bool {
        if !self.session_expired_guard.try_acquire() {
            tracing::debug!("session-expired modal already shown");
            return false;
        }
        let mut state = lock(&self.state);
        if !state.modals.session_expired {
            state.modals.session_expired = true;
            state.modals.session_expired_shown_count += 1;
        }
        drop(state);
        tracing::info!("session-expired modal opened");
        true
    }

    /// Guard held while the session-expired modal is shown and through its
    /// release cool-down.
    pub(crate) fn session_expired_guard(&self) -> &Arc<DedupGuard> {
        &self.session_expired_guard
    }

    pub fn close_session_expired_modal(&self) {
        self.close(ModalKind::SessionExpired);
    }

    /// Closes every modal without applying the close redirect policy.
    pub fn dismiss_all_modals(&self) {
        let was_expired_open = {
            let mut state = lock(&self.state);
            let was_open = state.modals.session_expired;
            let shown = state.modals.session_expired_shown_count;
            state.modals = ModalState {
                session_expired_shown_count: shown,
                ..ModalState::default()
            };
            was_open
        };
        if was_expired_open {
            self.session_expired_guard
                .release_after(self.ctx.config.expiry_dialog_cooldown);
        }
    }

    /// Redirects home after a modal closes while nobody is signed in.
    ///
    /// Returns `true` when the redirect policy fired.
    pub fn handle_unauthenticated_modal_close(&self) -> bool {
        if self.is_authenticated() || self.ctx.config.speed_mode {
            return false;
        }
        self.ctx.ui_bus.emit(UiEvent::NavigateHome);
        let current = self.ctx.navigator.current_path();
        if !self.ctx.is_home(&current) {
            tracing::debug!(from = %current, "modal closed while anonymous; navigating home");
            self.ctx.navigator.navigate(&self.ctx.config.home_path);
        }
        true
    }

    /// Opens the auth-required prompt when an anonymous visitor reaches a
    /// protected path. Returns whether the prompt was opened.
    pub fn on_path_change(&self, pathname: &str) -> bool {
        if self.ctx.config.speed_mode || self.ctx.is_home(pathname) {
            return false;
        }
        let mut state = lock(&self.state);
        if state.status != AuthStatus::Anonymous || state.modals.any_open() {
            return false;
        }
        state.modals.auth_prompt = true;
        drop(state);
        tracing::debug!(path = pathname, "anonymous visit to protected path; prompting");
        true
    }

    pub fn set_login_origin(&self, origin: LoginOrigin) {
        lock(&self.state).login_origin = origin;
    }

    /// Returns the recorded origin and resets it to `Direct`.
    pub fn take_login_origin(&self) -> LoginOrigin {
        std::mem::take(&mut lock(&self.state).login_origin)
    }

    pub fn unmount(&self) {
        for subscription in lock(&self.subscriptions).drain(..) {
            subscription.unsubscribe();
        }
        *lock(&self.state) = CoordinatorState::default();
        self.session_expired_guard.release();
    }

    fn set_status(&self, status: AuthStatus) {
        let previous = std::mem::replace(&mut lock(&self.state).status, status);
        if previous != status {
            tracing::debug!(?previous, ?status, "auth status changed");
        }
    }

    fn set_modal(&self, kind: ModalKind, open: bool) {
        lock(&self.state).modals.set(kind, open);
    }

    fn close(&self, kind: ModalKind) {
        let was_open = {
            let mut state = lock(&self.state);
            let was_open = state.modals.is_open(kind);
            state.modals.set(kind, false);
            was_open
        };
        if kind == ModalKind::SessionExpired && was_open {
            self.session_expired_guard
                .release_after(self.ctx.config.expiry_dialog_cooldown);
        }
        tracing::debug!(modal = kind.as_str(), "modal closed");
        self.handle_unauthenticated_modal_close();
    }
}

impl std::fmt::Debug for AuthUiCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthUiCoordinator")
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}
