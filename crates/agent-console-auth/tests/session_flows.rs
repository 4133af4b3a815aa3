use std::sync::Arc;
use std::time::Duration;

use agent_console_auth::testing::{
    ManualClock, RecordingNavigator, ScriptedAuthService, settle, user_info,
};
use agent_console_auth::{
    AuthConsole, AuthContext, AuthEvent, AuthStatus, AuthorizationPhase, ConsoleAuthConfig,
    DialogResolution, FetchOutcome, FileStorage, GuardSkipReason, InitializeOutcome,
    KeyValueStorage, LoginOrigin, MemoryStorage, Navigator, RouteGuardOutcome, SessionCheck,
    SessionRecord, UiEvent,
};

const START_MS: u64 = 1_700_000_000_000;

struct Fixture {
    ctx: AuthContext,
    service: Arc<ScriptedAuthService>,
    navigator: Arc<RecordingNavigator>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new(config: ConsoleAuthConfig) -> Self {
        Self::with_storage(config, Arc::new(MemoryStorage::new()))
    }

    fn with_storage(config: ConsoleAuthConfig, storage: Arc<dyn KeyValueStorage>) -> Self {
        let service = Arc::new(ScriptedAuthService::new());
        let navigator = Arc::new(RecordingNavigator::at("/"));
        let clock = Arc::new(ManualClock::new(START_MS));
        let ctx = AuthContext::new(
            config,
            service.clone(),
            storage,
            navigator.clone(),
            clock.clone(),
        );
        Self {
            ctx,
            service,
            navigator,
            clock,
        }
    }

    fn session(&self) -> SessionRecord {
        SessionRecord::new("tok", self.clock.epoch_seconds_in(Duration::from_secs(3_600)))
    }

    /// Signed-in visitor whose server session is alive.
    fn signed_in(self, routes: &[&str]) -> anyhow::Result<Self> {
        self.ctx.session_store.write(&self.session())?;
        self.service.set_session(Ok(Some(self.session())));
        self.service
            .set_user_info(Ok(Some(user_info(&["agent:read"], routes))));
        Ok(self)
    }
}

#[tokio::test]
async fn repeated_expiry_opens_one_dialog() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default()).signed_in(&["/chat"])?;
    let console = AuthConsole::new(fixture.ctx.clone());
    console.mount().await;

    for _ in 0..10 {
        fixture.ctx.auth_bus.emit(AuthEvent::SessionExpired);
    }

    let modals = console.coordinator().modal_state();
    assert!(modals.session_expired);
    assert_eq!(modals.session_expired_shown_count, 1);
    assert_eq!(console.engine().phase(), AuthorizationPhase::Cleared);
    assert_eq!(fixture.service.logout_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn logout_wins_over_in_flight_login_fetch() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default());
    let console = AuthConsole::new(fixture.ctx.clone());
    let held = fixture.service.hold_next_user_info();

    console.actions().login_succeeded(&fixture.session())?;
    settle().await;
    assert_eq!(console.engine().phase(), AuthorizationPhase::Fetching);

    console.actions().logout().await;
    held.release(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
    settle().await;

    assert_eq!(console.engine().phase(), AuthorizationPhase::Cleared);
    assert!(console.engine().snapshot().is_empty());
    assert!(!console.engine().is_authz_ready());
    assert_eq!(fixture.service.user_info_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn denied_route_redirects_home_once() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default()).signed_in(&["/chat", "/space"])?;
    let console = AuthConsole::new(fixture.ctx.clone());
    console.mount().await;

    let report = console.navigate("/agents").await;
    assert_eq!(
        report.guard,
        RouteGuardOutcome::Denied {
            path: "/agents".to_string(),
            redirect_to: "/".to_string(),
        }
    );
    assert!(console.engine().is_authz_prompt_modal_open());
    assert!(!report.auth_prompt_opened);
    assert_eq!(console.commit().await, 1);
    assert_eq!(fixture.navigator.history(), vec!["/agents", "/"]);
    assert_eq!(console.engine().last_checked_path().as_deref(), Some("/agents"));

    console.engine().close_authz_prompt_modal();
    let again = console.navigate("/agents").await;
    assert_eq!(
        again.guard,
        RouteGuardOutcome::Skipped(GuardSkipReason::AlreadyChecked)
    );
    assert!(!console.engine().is_authz_prompt_modal_open());
    assert_eq!(console.commit().await, 0);
    Ok(())
}

#[tokio::test]
async fn login_on_forbidden_path_redirects_once_permissions_arrive() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default());
    fixture.navigator.navigate("/agents");
    fixture.service.set_session(Ok(Some(fixture.session())));
    fixture
        .service
        .set_user_info(Ok(Some(user_info(&["agent:read"], &["/chat", "/space"]))));
    let console = AuthConsole::new(fixture.ctx.clone());

    console.actions().login_succeeded(&fixture.session())?;
    settle().await;

    assert!(console.engine().is_authz_ready());
    assert!(console.engine().is_authz_prompt_modal_open());
    assert_eq!(fixture.ctx.deferred_navigation.pending(), vec!["/"]);
    assert_eq!(console.commit().await, 1);
    assert_eq!(fixture.navigator.current_path(), "/");
    assert_eq!(console.commit().await, 0);
    Ok(())
}

#[tokio::test]
async fn speed_mode_fetches_once_without_session() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig {
        speed_mode: true,
        ..ConsoleAuthConfig::default()
    });
    fixture
        .service
        .set_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
    let console = AuthConsole::new(fixture.ctx.clone());

    let mount = console.mount().await;
    assert_eq!(mount.status, AuthStatus::Authenticated);
    assert_eq!(
        mount.authorization,
        InitializeOutcome::Fetched(FetchOutcome::Applied)
    );
    assert_eq!(mount.path.session, SessionCheck::Skipped);
    assert_eq!(fixture.service.user_info_calls(), 1);
    assert_eq!(fixture.service.session_calls(), 0);
    assert!(!console.listener().is_dialog_shown());
    Ok(())
}

#[tokio::test]
async fn staleness_window_governs_remounts() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default()).signed_in(&["/chat"])?;

    let first = AuthConsole::new(fixture.ctx.clone());
    first.mount().await;
    first.unmount();
    assert_eq!(fixture.service.user_info_calls(), 1);

    for minutes in [1, 3] {
        fixture.clock.advance(Duration::from_secs(60 * minutes));
        let console = AuthConsole::new(fixture.ctx.clone());
        let mount = console.mount().await;
        assert_eq!(mount.authorization, InitializeOutcome::ReusedCache);
        assert!(console.engine().is_authz_ready());
        console.unmount();
    }
    assert_eq!(fixture.service.user_info_calls(), 1);

    fixture.clock.advance(Duration::from_secs(61));
    let late = AuthConsole::new(fixture.ctx.clone());
    late.mount().await;
    assert_eq!(fixture.service.user_info_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn server_without_session_expires_within_one_check() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default()).signed_in(&["/chat"])?;
    fixture.service.set_session(Ok(None));
    let console = AuthConsole::new(fixture.ctx.clone());

    let mount = console.mount().await;
    assert_eq!(mount.path.session, SessionCheck::Expired);
    assert!(console.listener().is_dialog_shown());
    assert_eq!(
        console.coordinator().modal_state().session_expired_shown_count,
        1
    );

    let next = console.navigate("/chat").await;
    assert_eq!(next.session, SessionCheck::DialogOpen);
    assert_eq!(fixture.service.session_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn expiry_takes_precedence_over_denial_prompt() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default()).signed_in(&["/chat"])?;
    let console = AuthConsole::new(fixture.ctx.clone());
    console.mount().await;

    fixture.service.set_session(Ok(None));
    let report = console.navigate("/agents").await;
    assert!(report.guard.is_denied());
    assert_eq!(report.session, SessionCheck::Expired);

    let modals = console.coordinator().modal_state();
    assert!(modals.session_expired);
    assert!(!modals.auth_prompt);
    assert!(!console.engine().is_authz_prompt_modal_open());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn anonymous_visit_relogin_and_browse() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default());
    fixture
        .service
        .set_user_info(Ok(Some(user_info(&["agent:read"], &["/chat"]))));
    let console = AuthConsole::new(fixture.ctx.clone());

    let mount = console.mount().await;
    assert_eq!(mount.status, AuthStatus::Anonymous);
    assert_eq!(mount.authorization, InitializeOutcome::NoSession);
    assert!(console.listener().is_dialog_shown());

    assert!(console.listener().resolve(DialogResolution::Relogin).await);
    assert!(console.coordinator().modal_state().login);
    assert_eq!(
        console.coordinator().take_login_origin(),
        LoginOrigin::SessionExpired
    );

    fixture.service.set_session(Ok(Some(fixture.session())));
    console.actions().login_succeeded(&fixture.session())?;
    settle().await;

    assert_eq!(console.coordinator().status(), AuthStatus::Authenticated);
    assert!(!console.coordinator().modal_state().login);
    assert!(console.engine().is_authz_ready());
    assert_eq!(fixture.service.user_info_calls(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let report = console.navigate("/en/chat").await;
    assert_eq!(
        report.guard,
        RouteGuardOutcome::Granted {
            path: "/chat".to_string()
        }
    );
    assert_eq!(report.session, SessionCheck::Valid);
    assert!(console.engine().is_authorized("/chat"));
    Ok(())
}

#[tokio::test]
async fn anonymous_protected_path_prompts_after_dialog_resolves() -> anyhow::Result<()> {
    let fixture = Fixture::new(ConsoleAuthConfig::default());
    let console = AuthConsole::new(fixture.ctx.clone());
    console.mount().await;
    console.listener().resolve(DialogResolution::GoHome).await;
    fixture.ctx.ui_bus.emit(UiEvent::ModalClosed);

    let report = console.navigate("/space").await;
    assert_eq!(report.guard, RouteGuardOutcome::Skipped(GuardSkipReason::NoUser));
    assert!(report.auth_prompt_opened);
    assert_eq!(report.session, SessionCheck::NoRecord);

    console.coordinator().close_auth_prompt_modal();
    assert_eq!(fixture.navigator.current_path(), "/");
    Ok(())
}

#[tokio::test]
async fn file_storage_session_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let first = Fixture::with_storage(
        ConsoleAuthConfig::default(),
        Arc::new(FileStorage::new(dir.path())),
    );
    first.ctx.session_store.write(&first.session())?;

    let second = Fixture::with_storage(
        ConsoleAuthConfig::default(),
        Arc::new(FileStorage::new(dir.path())),
    );
    assert_eq!(
        second.ctx.session_store.current_valid(),
        Some(first.session())
    );
    Ok(())
}
