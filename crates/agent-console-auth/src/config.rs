use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const ENV_SPEED_MODE: &str = "AGENT_CONSOLE_SPEED_MODE";
pub const ENV_FETCH_POLICY: &str = "AGENT_CONSOLE_FETCH_POLICY";
pub const ENV_AUTHZ_STALENESS_SECONDS: &str = "AGENT_CONSOLE_AUTHZ_STALENESS_SECONDS";
pub const ENV_EXPIRY_DIALOG_COOLDOWN_MS: &str = "AGENT_CONSOLE_EXPIRY_DIALOG_COOLDOWN_MS";
pub const ENV_HOME_PATH: &str = "AGENT_CONSOLE_HOME_PATH";
pub const ENV_LOCALES: &str = "AGENT_CONSOLE_LOCALES";
pub const ENV_SESSION_DIR: &str = "AGENT_CONSOLE_SESSION_DIR";

pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_EXPIRY_DIALOG_COOLDOWN: Duration = Duration::from_millis(500);
pub const DEFAULT_HOME_PATH: &str = "/";
pub const DEFAULT_LOCALES: [&str; 2] = ["en", "zh"];

/// How the authorization engine decides whether to hit the network on mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Reuse a snapshot younger than the staleness window.
    CachedWithStaleness,
    /// Always fetch on mount.
    Eager,
}

impl FetchPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CachedWithStaleness => "cached",
            Self::Eager => "eager",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleAuthConfig {
    /// Single-tenant/demo deployments: no session checks, eager fetch.
    pub speed_mode: bool,
    pub fetch_policy: FetchPolicy,
    pub staleness_window: Duration,
    pub expiry_dialog_cooldown: Duration,
    pub home_path: String,
    pub locales: Vec<String>,
    pub session_dir: Option<PathBuf>,
}

impl Default for ConsoleAuthConfig {
    fn default() -> Self {
        Self {
            speed_mode: false,
            fetch_policy: FetchPolicy::CachedWithStaleness,
            staleness_window: DEFAULT_STALENESS_WINDOW,
            expiry_dialog_cooldown: DEFAULT_EXPIRY_DIALOG_COOLDOWN,
            home_path: DEFAULT_HOME_PATH.to_string(),
            locales: DEFAULT_LOCALES.iter().map(|locale| (*locale).to_string()).collect(),
            session_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid AGENT_CONSOLE_SPEED_MODE: {0}")]
    InvalidSpeedMode(String),
    #[error("invalid AGENT_CONSOLE_FETCH_POLICY: {0}")]
    InvalidFetchPolicy(String),
    #[error("invalid AGENT_CONSOLE_AUTHZ_STALENESS_SECONDS: {0}")]
    InvalidStalenessSeconds(String),
    #[error("invalid AGENT_CONSOLE_EXPIRY_DIALOG_COOLDOWN_MS: {0}")]
    InvalidExpiryDialogCooldown(String),
    #[error("invalid AGENT_CONSOLE_HOME_PATH: {0}")]
    InvalidHomePath(String),
}

impl ConsoleAuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let speed_mode = match env_non_empty(ENV_SPEED_MODE) {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidSpeedMode(raw))?,
            None => defaults.speed_mode,
        };
        let fetch_policy = match env_non_empty(ENV_FETCH_POLICY) {
            Some(raw) => parse_fetch_policy(&raw)?,
            None => defaults.fetch_policy,
        };
        let staleness_window = match env_non_empty(ENV_AUTHZ_STALENESS_SECONDS) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|error| ConfigError::InvalidStalenessSeconds(error.to_string()))?,
            None => defaults.staleness_window,
        };
        let expiry_dialog_cooldown = match env_non_empty(ENV_EXPIRY_DIALOG_COOLDOWN_MS) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|error| ConfigError::InvalidExpiryDialogCooldown(error.to_string()))?,
            None => defaults.expiry_dialog_cooldown,
        };
        let home_path = match env_non_empty(ENV_HOME_PATH) {
            Some(raw) if raw.starts_with('/') => raw,
            Some(raw) => return Err(ConfigError::InvalidHomePath(raw)),
            None => defaults.home_path,
        };
        let locales = env_non_empty(ENV_LOCALES).map_or(defaults.locales, |raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_ascii_lowercase)
                .collect()
        });
        let session_dir = env_non_empty(ENV_SESSION_DIR).map(PathBuf::from);

        Ok(Self {
            speed_mode,
            fetch_policy,
            staleness_window,
            expiry_dialog_cooldown,
            home_path,
            locales,
            session_dir,
        })
    }

    /// Effective policy after speed mode is taken into account.
    #[must_use]
    pub fn effective_fetch_policy(&self) -> FetchPolicy {
        if self.speed_mode {
            FetchPolicy::Eager
        } else {
            self.fetch_policy
        }
    }
}

fn parse_fetch_policy(raw: &str) -> Result<FetchPolicy, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "cached" | "stale" | "cached_with_staleness" => Ok(FetchPolicy::CachedWithStaleness),
        "eager" => Ok(FetchPolicy::Eager),
        _ => Err(ConfigError::InvalidFetchPolicy(raw.to_string())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
