use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the inner value if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns `future` on the ambient tokio runtime, if there is one.
///
/// Returns `false` when called outside a runtime; callers log and move on.
pub(crate) fn spawn_detached<F>(future: F) -> bool
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(_) => false,
    }
}
