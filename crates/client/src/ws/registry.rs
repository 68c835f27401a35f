//! Event-type keyed listener registry.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use classroom_shared::ServerEvent;
use parking_lot::Mutex;

/// A callback interested in one event type.
///
/// Listeners are compared by pointer identity, so keep a clone of the handle
/// you subscribed with if you intend to unsubscribe later.
pub type Listener = Arc<dyn Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Maps event type names to listeners, invoked in registration order.
///
/// Cloning gives another handle onto the same registry.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    listeners: Arc<Mutex<HashMap<String, Vec<Listener>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event_type`. Registering the same listener twice
    /// means it runs twice per event.
    pub fn subscribe(&self, event_type: &str, listener: Listener) {
        self.listeners
            .lock()
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove the first registration of `listener` for `event_type`.
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, event_type: &str, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(registered) = listeners.get_mut(event_type) else {
            return false;
        };
        let Some(index) = registered.iter().position(|l| same_listener(l, listener)) else {
            return false;
        };
        registered.remove(index);
        if registered.is_empty() {
            listeners.remove(event_type);
        }
        true
    }

    /// Invoke every listener registered for `event_type`, in order.
    ///
    /// Works on a snapshot, so listeners may subscribe or unsubscribe while
    /// being called; such changes take effect from the next dispatch. A failing
    /// or panicking listener is logged and skipped. Returns how many listeners
    /// completed successfully.
    pub fn dispatch(&self, event_type: &str, event: &ServerEvent) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.lock().get(event_type) {
            Some(registered) => registered.clone(),
            None => {
                tracing::trace!(event_type, "no listeners");
                return 0;
            }
        };

        let mut delivered = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::error!(event_type, index, error = %e, "live-update listener failed");
                }
                Err(_) => {
                    tracing::error!(event_type, index, "live-update listener panicked");
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .lock()
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        let mut map = f.debug_map();
        for (event_type, registered) in listeners.iter() {
            map.entry(event_type, &registered.len());
        }
        map.finish()
    }
}
