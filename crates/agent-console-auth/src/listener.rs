//! Detects session expiry and drives the blocking "session expired" dialog.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::actions::AuthActions;
use crate::context::AuthContext;
use crate::coordinator::{AuthUiCoordinator, LoginOrigin};
use crate::dedup::DedupGuard;
use crate::events::{AuthEvent, AuthEventName, Subscription, UiEvent};
use crate::sync::lock;

/// The visitor's answer to the session-expired dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResolution {
    Relogin,
    GoHome,
}

/// Result of an active session check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Skipped,
    DialogOpen,
    NoRecord,
    Valid,
    /// `SESSION_EXPIRED` was emitted.
    Expired,
    /// The server could not be asked; the session is left alone.
    Unknown,
}

pub struct SessionListener {
    ctx: AuthContext,
    coordinator: Arc<AuthUiCoordinator>,
    actions: AuthActions,
    /// Shared with the coordinator: one guard per dialog, however it closes.
    modal_shown: Arc<DedupGuard>,
    /// `session_expired_shown_count` of the last dialog that was resolved.
    resolved_dialog: AtomicU64,
    mounted: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SessionListener {
    pub fn new(ctx: AuthContext, coordinator: Arc<AuthUiCoordinator>) -> Arc<Self> {
        let listener = Arc::new(Self {
            actions: AuthActions::new(ctx.clone()),
            modal_shown: Arc::clone(coordinator.session_expired_guard()),
            ctx,
            coordinator,
            resolved_dialog: AtomicU64::new(0),
            mounted: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        });
        listener.attach();
        listener
    }

    fn attach(self: &Arc<Self>) {
        let mut subscriptions = lock(&self.subscriptions);
        if !subscriptions.is_empty() {
            return;
        }

        let weak = Arc::downgrade(self);
        subscriptions.push(
            self.ctx
                .auth_bus
                .on(AuthEventName::SessionExpired, move |_| {
                    if let Some(listener) = weak.upgrade() {
                        listener.present();
                    }
                    Ok(())
                }),
        );

        let guard = Arc::clone(&self.modal_shown);
        subscriptions.push(self.ctx.ui_bus.on(UiEvent::ModalClosed, move |_| {
            if guard.is_held() {
                tracing::debug!("modal closed; releasing session-expired guard");
                guard.release();
            }
            Ok(())
        }));
    }

    /// First-mount check: a visitor with no stored session at all is expired.
    ///
    /// Returns `true` when `SESSION_EXPIRED` was emitted.
    pub fn mount(self: &Arc<Self>) -> bool {
        self.attach();
        if self.mounted.swap(true, Ordering::AcqRel) || self.ctx.config.speed_mode {
            return false;
        }
        if self.ctx.session_store.read().is_some() {
            return false;
        }
        tracing::info!("no stored session on first mount");
        self.ctx.auth_bus.emit(AuthEvent::SessionExpired);
        true
    }

    /// Validates the stored session locally, then with the server.
    pub async fn check_session(&self) -> SessionCheck {
        if self.ctx.config.speed_mode {
            return SessionCheck::Skipped;
        }
        if self.modal_shown.is_held() {
            return SessionCheck::DialogOpen;
        }
        let Some(record) = self.ctx.session_store.read() else {
            return SessionCheck::NoRecord;
        };
        if !self.ctx.session_store.is_valid(Some(&record)) {
            tracing::info!(expires_at = record.expires_at, "stored session expired");
            self.ctx.auth_bus.emit(AuthEvent::SessionExpired);
            return SessionCheck::Expired;
        }

        match self.ctx.service.get_session().await {
            Ok(Some(_)) => SessionCheck::Valid,
            Ok(None) => {
                tracing::info!("server reports no active session");
                self.ctx.auth_bus.emit(AuthEvent::SessionExpired);
                SessionCheck::Expired
            }
            Err(error) => {
                tracing::error!(reason = %error, "session check failed; keeping session");
                SessionCheck::Unknown
            }
        }
    }

    pub fn is_dialog_shown(&self) -> bool {
        self.modal_shown.is_held()
    }

    /// Applies the visitor's choice. Returns `false` if no dialog is open or
    /// the open one was already resolved.
    pub async fn resolve(&self, resolution: DialogResolution) -> bool {
        let modals = self.coordinator.modal_state();
        let dialog = modals.session_expired_shown_count;
        if !modals.session_expired
            || self.resolved_dialog.fetch_max(dialog, Ordering::AcqRel) >= dialog
        {
            tracing::debug!(?resolution, "no session-expired dialog to resolve");
            return false;
        }
        match resolution {
            DialogResolution::Relogin => self.confirm_relogin().await,
            DialogResolution::GoHome => self.go_home().await,
        }
        true
    }

    pub fn unmount(&self) {
        for subscription in lock(&self.subscriptions).drain(..) {
            subscription.unsubscribe();
        }
        self.resolved_dialog.store(0, Ordering::Release);
        self.modal_shown.release();
    }

    fn present(&self) {
        if self.coordinator.open_session_expired_modal() {
            tracing::info!("session-expired dialog presented");
        }
    }

    async fn confirm_relogin(&self) {
        self.actions.logout().await;
        self.coordinator.set_login_origin(LoginOrigin::SessionExpired);
        self.coordinator.dismiss_all_modals();
        self.coordinator.open_login_modal();
    }

    async fn go_home(&self) {
        self.actions.logout().await;
        self.coordinator.dismiss_all_modals();
        self.ctx.navigator.navigate(&self.ctx.config.home_path);
    }
}

impl std::fmt::Debug for SessionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionListener")
            .field("dialog_shown", &self.is_dialog_shown())
            .finish_non_exhaustive()
    }
}
