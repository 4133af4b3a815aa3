//! One-at-a-time guard for UI elements such as the session-expired dialog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::sync::spawn_detached;

/// A flag that admits one holder at a time and can be released on a delay.
///
/// Every acquire and release bumps a generation counter, so a delayed release
/// scheduled for an earlier holder never frees a newer one.
#[derive(Debug, Default)]
pub struct DedupGuard {
    held: AtomicBool,
    generation: AtomicU64,
}

impl DedupGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the caller now holds the guard.
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if acquired {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        acquired
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn release(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.held.store(false, Ordering::Release);
    }

    /// Releases the current holder once `delay` has elapsed.
    ///
    /// Without a tokio runtime the guard is released immediately.
    pub fn release_after(self: &Arc<Self>, delay: Duration) {
        if !self.is_held() {
            return;
        }
        let generation = self.generation.load(Ordering::Acquire);
        let guard = Arc::clone(self);
        let scheduled = spawn_detached(async move {
            tokio::time::sleep(delay).await;
            guard.release_generation(generation);
        });
        if !scheduled {
            tracing::warn!("no async runtime for delayed guard release; releasing now");
            self.release();
        }
    }

    fn release_generation(&self, generation: u64) {
        if self
            .generation
            .compare_exchange(
                generation,
                generation + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.held.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_one_holder_until_released() {
        let guard = DedupGuard::new();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
        guard.release();
        assert!(guard.try_acquire());
    }

    #[test]
    fn release_after_without_runtime_releases_immediately() {
        let guard = Arc::new(DedupGuard::new());
        assert!(guard.try_acquire());
        guard.release_after(Duration::from_millis(500));
        assert!(!guard.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn release_after_waits_for_delay() {
        let guard = Arc::new(DedupGuard::new());
        assert!(guard.try_acquire());
        guard.release_after(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(guard.is_held());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!guard.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_delayed_release_does_not_free_new_holder() {
        let guard = Arc::new(DedupGuard::new());
        assert!(guard.try_acquire());
        guard.release_after(Duration::from_millis(500));
        guard.release();
        assert!(guard.try_acquire());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(guard.is_held());
    }
}
