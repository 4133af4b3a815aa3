use crate::context::AuthContext;
use crate::events::AuthEvent;
use crate::session::{SessionRecord, StorageError};

/// Flows that originate session transitions on the auth bus.
#[derive(Debug, Clone)]
pub struct AuthActions {
    ctx: AuthContext,
}

impl AuthActions {
    pub fn new(ctx: AuthContext) -> Self {
        Self { ctx }
    }

    /// Persists the new session and announces the login.
    pub fn login_succeeded(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.ctx.session_store.write(record)?;
        tracing::info!("login succeeded");
        self.ctx.auth_bus.emit(AuthEvent::LoginSuccess);
        Ok(())
    }

    pub fn register_succeeded(&self) {
        tracing::info!("registration succeeded");
        self.ctx.auth_bus.emit(AuthEvent::RegisterSuccess);
    }

    /// Ends the session locally even when the remote logout fails.
    pub async fn logout(&self) {
        if let Err(error) = self.ctx.service.logout().await {
            tracing::warn!(reason = %error, "remote logout failed; clearing local session anyway");
        }
        if let Err(error) = self.ctx.session_store.clear() {
            tracing::warn!(reason = %error, "failed to clear stored session");
        }
        tracing::info!("logged out");
        self.ctx.auth_bus.emit(AuthEvent::Logout);
    }
}
