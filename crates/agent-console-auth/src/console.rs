//! Composition root wiring the session components for a host.

use std::sync::Arc;

use crate::actions::AuthActions;
use crate::authorization::{AuthorizationEngine, InitializeOutcome, RouteGuardOutcome};
use crate::context::AuthContext;
use crate::coordinator::{AuthStatus, AuthUiCoordinator};
use crate::listener::{SessionCheck, SessionListener};

/// What the session components did in response to one path change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChangeReport {
    pub guard: RouteGuardOutcome,
    pub auth_prompt_opened: bool,
    pub session: SessionCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountReport {
    pub status: AuthStatus,
    pub authorization: InitializeOutcome,
    pub path: PathChangeReport,
}

/// One mounted instance of the session layer.
///
/// Several consoles may be created from the same [`AuthContext`] over the
/// process lifetime; they share the buses, the session store and the
/// authorization cache. Unmount one before mounting the next.
#[derive(Debug)]
pub struct AuthConsole {
    ctx: AuthContext,
    engine: Arc<AuthorizationEngine>,
    coordinator: Arc<AuthUiCoordinator>,
    listener: Arc<SessionListener>,
    actions: AuthActions,
}

impl AuthConsole {
    pub fn new(ctx: AuthContext) -> Self {
        let engine = AuthorizationEngine::new(ctx.clone());
        let coordinator = AuthUiCoordinator::new(ctx.clone());
        let listener = SessionListener::new(ctx.clone(), Arc::clone(&coordinator));
        Self {
            actions: AuthActions::new(ctx.clone()),
            ctx,
            engine,
            coordinator,
            listener,
        }
    }

    /// Resolves the stored session, initializes authorization and evaluates
    /// the current path.
    pub async fn mount(&self) -> MountReport {
        let status = self.coordinator.mount();
        self.listener.mount();
        let authorization = self.engine.initialize().await;
        let current = self.ctx.navigator.current_path();
        let path = self.path_changed(&current).await;
        tracing::info!(
            ?status,
            phase = self.engine.phase().as_str(),
            "session layer mounted"
        );
        MountReport {
            status,
            authorization,
            path,
        }
    }

    /// Moves the host router to `path` and runs the path-change hooks.
    pub async fn navigate(&self, path: &str) -> PathChangeReport {
        self.ctx.navigator.navigate(path);
        self.path_changed(path).await
    }

    /// Path-change hooks for a host whose router already moved.
    pub async fn path_changed(&self, path: &str) -> PathChangeReport {
        let guard = self.engine.guard_route(path);
        let auth_prompt_opened = self.coordinator.on_path_change(path);
        let session = self.listener.check_session().await;
        PathChangeReport {
            guard,
            auth_prompt_opened,
            session,
        }
    }

    /// Performs the redirects queued during the last render.
    /// Returns how many were performed; when any ran, the path-change hooks
    /// are run once for the path the router ended on.
    pub async fn commit(&self) -> usize {
        let navigated = self
            .ctx
            .deferred_navigation
            .flush(self.ctx.navigator.as_ref());
        if navigated > 0 {
            let current = self.ctx.navigator.current_path();
            self.path_changed(&current).await;
        }
        navigated
    }

    pub fn unmount(&self) {
        self.engine.unmount();
        self.coordinator.unmount();
        self.listener.unmount();
        tracing::debug!("session layer unmounted");
    }

    pub fn context(&self) -> &AuthContext {
        &self.ctx
    }

    pub fn engine(&self) -> &Arc<AuthorizationEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &Arc<AuthUiCoordinator> {
        &self.coordinator
    }

    pub fn listener(&self) -> &Arc<SessionListener> {
        &self.listener
    }

    pub fn actions(&self) -> &AuthActions {
        &self.actions
    }
}
