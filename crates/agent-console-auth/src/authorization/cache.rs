use std::sync::Mutex;
use std::time::Duration;

use super::AuthorizationSnapshot;
use crate::sync::lock;

#[derive(Debug, Clone)]
struct CachedAuthorization {
    snapshot: AuthorizationSnapshot,
    fetched_at_unix_ms: u64,
}

/// Last successful authorization fetch, shared across engine mounts.
#[derive(Debug, Default)]
pub struct AuthorizationCache {
    entry: Mutex<Option<CachedAuthorization>>,
}

impl AuthorizationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, snapshot: AuthorizationSnapshot, fetched_at_unix_ms: u64) {
        *lock(&self.entry) = Some(CachedAuthorization {
            snapshot,
            fetched_at_unix_ms,
        });
    }

    /// The cached snapshot if it is younger than `window` at `now_unix_ms`.
    pub fn fresh(&self, now_unix_ms: u64, window: Duration) -> Option<AuthorizationSnapshot> {
        let entry = lock(&self.entry);
        let cached = entry.as_ref()?;
        let age_ms = now_unix_ms.saturating_sub(cached.fetched_at_unix_ms);
        if u128::from(age_ms) < window.as_millis() {
            Some(cached.snapshot.clone())
        } else {
            None
        }
    }

    pub fn fetched_at_unix_ms(&self) -> Option<u64> {
        lock(&self.entry)
            .as_ref()
            .map(|cached| cached.fetched_at_unix_ms)
    }

    pub fn clear(&self) {
        *lock(&self.entry) = None;
    }
}
