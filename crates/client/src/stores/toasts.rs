//! Transient user notifications.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long a toast stays up unless told otherwise.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
            ToastKind::Warning => "warning",
            ToastKind::Info => "info",
        }
    }
}

impl std::fmt::Display for ToastKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub kind: ToastKind,
    pub created_at: Instant,
    /// `None` stays until removed.
    pub duration: Option<Duration>,
}

impl Toast {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.duration
            .is_some_and(|duration| now.saturating_duration_since(self.created_at) >= duration)
    }
}

#[derive(Debug, Default)]
struct Queue {
    next_id: u64,
    toasts: Vec<Toast>,
}

/// Shared toast list. Cloning gives another handle onto the same queue.
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    queue: Arc<Mutex<Queue>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: ToastKind,
        duration: Option<Duration>,
    ) -> u64 {
        let mut queue = self.queue.lock();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.toasts.push(Toast {
            id,
            title: title.into(),
            message: message.into(),
            kind,
            created_at: Instant::now(),
            duration,
        });
        id
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> u64 {
        self.show(title, message, ToastKind::Success, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> u64 {
        self.show(title, message, ToastKind::Error, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) -> u64 {
        self.show(title, message, ToastKind::Warning, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> u64 {
        self.show(title, message, ToastKind::Info, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.toasts.len();
        queue.toasts.retain(|t| t.id != id);
        queue.toasts.len() != before
    }

    pub fn clear(&self) {
        self.queue.lock().toasts.clear();
    }

    /// Drop toasts whose duration has elapsed. Returns how many were dropped.
    pub fn prune_expired(&self, now: Instant) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.toasts.len();
        queue.toasts.retain(|t| !t.is_expired(now));
        before - queue.toasts.len()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.queue.lock().toasts.clone()
    }

    /// Toasts whose id is at least `first_id`, oldest first.
    pub fn since(&self, first_id: u64) -> Vec<Toast> {
        self.queue
            .lock()
            .toasts
            .iter()
            .filter(|t| t.id >= first_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().toasts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase() {
        let toasts = ToastQueue::new();
        let a = toasts.info("a", "");
        let b = toasts.success("b", "");
        assert!(b > a);
        assert_eq!(toasts.len(), 2);
        assert!(toasts.remove(a));
        assert!(!toasts.remove(a));
        assert_eq!(toasts.toasts()[0].kind, ToastKind::Success);
    }

    #[test]
    fn since_skips_older_ids() {
        let toasts = ToastQueue::new();
        let first = toasts.info("first", "");
        let second = toasts.error("second", "");
        assert_eq!(toasts.since(first).len(), 2);
        let titles: Vec<_> = toasts.since(second).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["second"]);
        assert!(toasts.since(second + 1).is_empty());
    }

    #[test]
    fn prune_respects_durations() {
        let toasts = ToastQueue::new();
        toasts.warning("short", "");
        toasts.show("sticky", "", ToastKind::Error, None);
        toasts.show("long", "", ToastKind::Info, Some(Duration::from_secs(60)));

        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(toasts.prune_expired(later), 1);

        let titles: Vec<_> = toasts.toasts().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["sticky", "long"]);

        let much_later = Instant::now() + Duration::from_secs(3600);
        toasts.prune_expired(much_later);
        assert_eq!(toasts.len(), 1);

        toasts.clear();
        assert!(toasts.is_empty());
    }
}
