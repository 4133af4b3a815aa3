//! Client-side session and authorization core for the agent console.
//!
//! The rendering layer talks to three cooperating components that never call
//! each other directly: the [`AuthorizationEngine`], the [`AuthUiCoordinator`]
//! and the [`SessionListener`]. They stay consistent by reacting to the same
//! [`AuthEvent`]s on an injected [`AuthEventBus`]. [`AuthConsole`] wires them
//! together for a host.

pub mod actions;
pub mod authorization;
pub mod clock;
pub mod config;
pub mod console;
pub mod context;
pub mod coordinator;
pub mod dedup;
pub mod events;
pub mod listener;
pub mod routes;
pub mod service;
pub mod session;
pub mod testing;

mod sync;

pub use actions::AuthActions;
pub use authorization::{
    AuthorizationCache, AuthorizationEngine, AuthorizationPhase, AuthorizationSnapshot,
    FetchOutcome, GuardSkipReason, InitializeOutcome, RouteGuardOutcome, SnapshotRejection,
};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, ConsoleAuthConfig, FetchPolicy};
pub use console::{AuthConsole, MountReport, PathChangeReport};
pub use context::AuthContext;
pub use coordinator::{AuthStatus, AuthUiCoordinator, LoginOrigin, ModalKind, ModalState};
pub use dedup::DedupGuard;
pub use events::{
    AuthEvent, AuthEventBus, AuthEventName, BusEvent, EventBus, HandlerError, Subscription,
    UiEvent, UiEventBus,
};
pub use listener::{DialogResolution, SessionCheck, SessionListener};
pub use routes::{DeferredNavigation, Navigator, clean_path};
pub use service::{AuthService, AuthServiceError, CurrentUserInfo, UserInfo, UserPayload};
pub use session::{
    FileStorage, KeyValueStorage, MemoryStorage, SESSION_STORAGE_KEY, SessionRecord,
    SessionStore, StorageError, is_session_valid,
};
