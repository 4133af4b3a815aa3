//! Path normalization, the navigation port and the deferred redirect queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::sync::lock;

/// Host router seen by the session components.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, path: &str);
}

/// Strips query, fragment, a leading locale segment and any trailing slash.
///
/// `"/en/chat/"` becomes `"/chat"`; `"/zh"` becomes `"/"`.
pub fn clean_path<S: AsRef<str>>(pathname: &str, locales: &[S]) -> String {
    let path_only = pathname
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();

    let mut segments = path_only
        .split('/')
        .filter(|segment| !segment.is_empty())
        .peekable();
    let leading_locale = segments.peek().is_some_and(|first| {
        locales
            .iter()
            .any(|locale| locale.as_ref().eq_ignore_ascii_case(first))
    });
    if leading_locale {
        segments.next();
    }

    let rest = segments.collect::<Vec<_>>();
    if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    }
}

/// Redirects requested while a render is in progress.
///
/// Producers push targets; the host drains them with [`DeferredNavigation::flush`]
/// once the current render/commit phase has finished.
#[derive(Debug, Default)]
pub struct DeferredNavigation {
    pending: Mutex<VecDeque<String>>,
}

impl DeferredNavigation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `target`, collapsing an immediate repeat of the last entry.
    pub fn push(&self, target: impl Into<String>) {
        let target = target.into();
        let mut pending = lock(&self.pending);
        if pending.back() == Some(&target) {
            return;
        }
        pending.push_back(target);
    }

    pub fn pending(&self) -> Vec<String> {
        lock(&self.pending).iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.pending).is_empty()
    }

    /// Performs every queued redirect and returns how many navigations happened.
    pub fn flush(&self, navigator: &dyn Navigator) -> usize {
        let drained = lock(&self.pending).drain(..).collect::<Vec<_>>();
        let mut navigated = 0;
        for target in drained {
            if navigator.current_path() == target {
                tracing::debug!(target = %target, "deferred navigation already at target");
                continue;
            }
            tracing::info!(target = %target, "performing deferred navigation");
            navigator.navigate(&target);
            navigated += 1;
        }
        navigated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNavigator;

    const LOCALES: [&str; 2] = ["en", "zh"];

    #[test]
    fn clean_path_strips_locale_and_trailing_slash() {
        assert_eq!(clean_path("/en/chat/", &LOCALES), "/chat");
        assert_eq!(clean_path("/ZH/space/agents", &LOCALES), "/space/agents");
        assert_eq!(clean_path("/zh", &LOCALES), "/");
        assert_eq!(clean_path("", &LOCALES), "/");
        assert_eq!(clean_path("/agents?tab=mcp#top", &LOCALES), "/agents");
    }

    #[test]
    fn clean_path_only_strips_the_leading_segment() {
        assert_eq!(clean_path("/chat/en", &LOCALES), "/chat/en");
        assert_eq!(clean_path("/english/chat", &LOCALES), "/english/chat");
        assert_eq!(clean_path("/en/chat", &[] as &[&str]), "/en/chat");
    }

    #[test]
    fn flush_navigates_in_order_and_skips_current_path() {
        let navigator = RecordingNavigator::at("/agents");
        let queue = DeferredNavigation::new();
        queue.push("/");
        queue.push("/");
        queue.push("/chat");
        queue.push("/chat");
        assert_eq!(queue.pending(), vec!["/".to_string(), "/chat".to_string()]);

        assert_eq!(queue.flush(&navigator), 2);
        assert_eq!(navigator.history(), vec!["/".to_string(), "/chat".to_string()]);
        assert!(queue.is_empty());

        queue.push("/chat");
        assert_eq!(queue.flush(&navigator), 0);
    }
}
