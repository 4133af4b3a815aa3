use std::sync::Arc;
use std::time::Duration;

use agent_console_auth::testing::{RecordingNavigator, ScriptedAuthService, settle, user_info};
use agent_console_auth::{
    AuthConsole, AuthContext, Clock, ConsoleAuthConfig, DialogResolution, FileStorage,
    KeyValueStorage, MemoryStorage, SessionRecord, SystemClock,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// Anonymous first visit, re-login from the expiry dialog, then browse.
    Login,
    /// Signed-in visitor opens a route outside their accessible routes.
    Denied,
    /// Stored session that the server no longer recognises.
    Expiry,
}

#[derive(Parser, Debug)]
#[command(about = "Run scripted session scenarios against in-memory collaborators")]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::Login)]
    scenario: Scenario,
    /// Bypass session checks regardless of AGENT_CONSOLE_SPEED_MODE.
    #[arg(long)]
    speed_mode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ConsoleAuthConfig::from_env().context("load console auth config")?;
    config.speed_mode |= args.speed_mode;

    let storage: Arc<dyn KeyValueStorage> = match &config.session_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create session dir {}", dir.display()))?;
            Arc::new(FileStorage::new(dir.clone()))
        }
        None => Arc::new(MemoryStorage::new()),
    };
    let clock = Arc::new(SystemClock);
    let service = Arc::new(ScriptedAuthService::new());
    service.set_user_info(Ok(Some(user_info(
        &["agent:read", "chat:write"],
        &["/chat", "/space"],
    ))));
    let navigator = Arc::new(RecordingNavigator::at("/"));

    let ctx = AuthContext::new(config, service.clone(), storage, navigator.clone(), clock.clone());
    let fresh_session = || {
        let expires_at = i64::try_from(clock.now_unix_ms() / 1_000).unwrap_or(i64::MAX) + 3_600;
        SessionRecord::new("harness-token", expires_at)
    };

    match args.scenario {
        Scenario::Login => {
            ctx.session_store.clear().context("reset stored session")?;
            let console = AuthConsole::new(ctx.clone());
            let mount = console.mount().await;
            tracing::info!(?mount, "mounted anonymously");

            if console.listener().resolve(DialogResolution::Relogin).await {
                let origin = console.coordinator().take_login_origin();
                tracing::info!(?origin, "login modal opened from expiry dialog");
            }
            service.set_session(Ok(Some(fresh_session())));
            console
                .actions()
                .login_succeeded(&fresh_session())
                .context("persist session")?;
            settle().await;

            let report = console.navigate("/en/chat").await;
            tracing::info!(
                ?report,
                authorized = console.engine().is_authorized("/chat"),
                "navigated after login"
            );
            console.unmount();
        }
        Scenario::Denied => {
            ctx.session_store
                .write(&fresh_session())
                .context("seed stored session")?;
            service.set_session(Ok(Some(fresh_session())));
            let console = AuthConsole::new(ctx.clone());
            console.mount().await;

            let report = console.navigate("/agents").await;
            let redirects = console.commit().await;
            tracing::info!(
                ?report,
                redirects,
                prompt_open = console.engine().is_authz_prompt_modal_open(),
                history = ?navigator.history(),
                "denied navigation handled"
            );
            console.unmount();
        }
        Scenario::Expiry => {
            ctx.session_store
                .write(&fresh_session())
                .context("seed stored session")?;
            service.set_session(Ok(None));
            let console = AuthConsole::new(ctx.clone());
            let mount = console.mount().await;
            if !console.listener().is_dialog_shown() {
                bail!("expected the session-expired dialog after mount: {mount:?}");
            }
            console.listener().resolve(DialogResolution::GoHome).await;
            tokio::time::sleep(Duration::from_millis(600)).await;
            tracing::info!(
                modals = ?console.coordinator().modal_state(),
                history = ?navigator.history(),
                dialog_shown = console.listener().is_dialog_shown(),
                "expiry resolved"
            );
            console.unmount();
        }
    }

    Ok(())
}
