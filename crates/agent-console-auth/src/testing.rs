//! In-memory collaborators for tests and the harness binary.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::clock::Clock;
use crate::routes::Navigator;
use crate::service::{AuthService, AuthServiceError, CurrentUserInfo, UserInfo, UserPayload};
use crate::session::SessionRecord;
use crate::sync::lock;

/// Clock whose time only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_unix_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_unix_ms: u64) -> Self {
        Self {
            now_unix_ms: AtomicU64::new(now_unix_ms),
        }
    }

    pub fn set(&self, now_unix_ms: u64) {
        self.now_unix_ms.store(now_unix_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_unix_ms.fetch_add(by_ms, Ordering::SeqCst);
    }

    /// Epoch seconds `offset` from now, as stored in a session record.
    pub fn epoch_seconds_in(&self, offset: Duration) -> i64 {
        let now_ms = self.now_unix_ms.load(Ordering::SeqCst);
        let target_ms = now_ms.saturating_add(u64::try_from(offset.as_millis()).unwrap_or(0));
        i64::try_from(target_ms / 1_000).unwrap_or(i64::MAX)
    }
}

impl Clock for ManualClock {
    fn now_unix_ms(&self) -> u64 {
        self.now_unix_ms.load(Ordering::SeqCst)
    }
}

/// Navigator that records every navigation it performs.
#[derive(Debug)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(path.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        lock(&self.current).clone()
    }

    fn navigate(&self, path: &str) {
        *lock(&self.current) = path.to_string();
        lock(&self.history).push(path.to_string());
    }
}

type UserInfoResponse = Result<Option<CurrentUserInfo>, AuthServiceError>;
type SessionResponse = Result<Option<SessionRecord>, AuthServiceError>;

/// Handle for a user-info call parked until the test releases it.
#[derive(Debug)]
pub struct HeldResponse {
    sender: oneshot::Sender<UserInfoResponse>,
}

impl HeldResponse {
    pub fn release(self, response: UserInfoResponse) {
        if self.sender.send(response).is_err() {
            tracing::debug!("held user-info call was dropped before release");
        }
    }
}

/// Auth service answering from scripted responses.
///
/// Queued responses are consumed in order; once the queue is empty the
/// standing response set with `set_*` is returned.
#[derive(Debug)]
pub struct ScriptedAuthService {
    user_info_queue: Mutex<VecDeque<UserInfoResponse>>,
    user_info_standing: Mutex<UserInfoResponse>,
    held: Mutex<VecDeque<oneshot::Receiver<UserInfoResponse>>>,
    session_queue: Mutex<VecDeque<SessionResponse>>,
    session_standing: Mutex<SessionResponse>,
    logout_response: Mutex<Result<(), AuthServiceError>>,
    user_info_calls: AtomicUsize,
    session_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl Default for ScriptedAuthService {
    fn default() -> Self {
        Self {
            user_info_queue: Mutex::new(VecDeque::new()),
            user_info_standing: Mutex::new(Err(AuthServiceError::Transport(
                "no scripted user info".to_string(),
            ))),
            held: Mutex::new(VecDeque::new()),
            session_queue: Mutex::new(VecDeque::new()),
            session_standing: Mutex::new(Err(AuthServiceError::Transport(
                "no scripted session".to_string(),
            ))),
            logout_response: Mutex::new(Ok(())),
            user_info_calls: AtomicUsize::new(0),
            session_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user_info(&self, response: UserInfoResponse) {
        lock(&self.user_info_queue).push_back(response);
    }

    pub fn set_user_info(&self, response: UserInfoResponse) {
        *lock(&self.user_info_standing) = response;
    }

    /// Parks the next user-info call until the returned handle is released.
    pub fn hold_next_user_info(&self) -> HeldResponse {
        let (sender, receiver) = oneshot::channel();
        lock(&self.held).push_back(receiver);
        HeldResponse { sender }
    }

    pub fn push_session(&self, response: SessionResponse) {
        lock(&self.session_queue).push_back(response);
    }

    pub fn set_session(&self, response: SessionResponse) {
        *lock(&self.session_standing) = response;
    }

    pub fn set_logout(&self, response: Result<(), AuthServiceError>) {
        *lock(&self.logout_response) = response;
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthService for ScriptedAuthService {
    async fn get_current_user_info(&self) -> Result<Option<CurrentUserInfo>, AuthServiceError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        let held = lock(&self.held).pop_front();
        if let Some(receiver) = held {
            return receiver.await.unwrap_or_else(|_| {
                Err(AuthServiceError::Transport(
                    "held response dropped".to_string(),
                ))
            });
        }
        let queued = lock(&self.user_info_queue).pop_front();
        queued.unwrap_or_else(|| lock(&self.user_info_standing).clone())
    }

    async fn get_session(&self) -> Result<Option<SessionRecord>, AuthServiceError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let queued = lock(&self.session_queue).pop_front();
        queued.unwrap_or_else(|| lock(&self.session_standing).clone())
    }

    async fn logout(&self) -> Result<(), AuthServiceError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.logout_response).clone()
    }
}

/// A well-formed user-info response for `ada`.
pub fn user_info(permissions: &[&str], accessible_routes: &[&str]) -> CurrentUserInfo {
    CurrentUserInfo {
        user: UserPayload {
            permissions: Some(permissions.iter().map(|p| (*p).to_string()).collect()),
            accessible_routes: Some(
                accessible_routes
                    .iter()
                    .map(|route| (*route).to_string())
                    .collect(),
            ),
            group_ids: vec![1],
            info: UserInfo::named("ada"),
        },
    }
}

/// Yields to the runtime until spawned handlers have had a chance to finish.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
