//! Stores for application state.
//!
//! Each domain store owns its cached collections, talks to the REST API for
//! fetches and mutations, and (for assignments and attendance) reconciles live
//! events from the [`LiveClient`](crate::ws::LiveClient) into the same caches.
//! Derived views are computed from the caches on every read.

pub mod assignments;
pub mod attendance;
pub mod collection;
pub mod subjects;
pub mod toasts;

use std::future::Future;

use classroom_shared::{ApiError, Role};
use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::ws::{LiveClient, Listener};

pub use assignments::AssignmentStore;
pub use attendance::{AttendanceStats, AttendanceStore, DateRange, SubjectAttendance};
pub use collection::{Collection, Upsert};
pub use subjects::SubjectStore;
pub use toasts::{Toast, ToastKind, ToastQueue};

/// Loading flag and last error message, per store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatus {
    pub loading: bool,
    pub error: Option<String>,
}

/// Run an API call while maintaining `status`.
///
/// On failure the server's message (or `fallback`) becomes the store's error.
pub(crate) async fn tracked<T, F>(
    status: &RwLock<StoreStatus>,
    fallback: &str,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    {
        let mut status = status.write();
        status.loading = true;
        status.error = None;
    }

    let result = call.await;

    let mut status = status.write();
    status.loading = false;
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::error!(error = %e, "{}", fallback);
            status.error = Some(e.server_message().unwrap_or(fallback).to_string());
            Err(e.into())
        }
    }
}

pub(crate) fn require_role(actual: Role, required: Role) -> Result<(), StoreError> {
    if actual == required {
        Ok(())
    } else {
        Err(StoreError::WrongRole { required, actual })
    }
}

/// Listeners a store registered on a [`LiveClient`], so they can be removed
/// again as a group.
#[derive(Default)]
pub(crate) struct Attachment {
    slot: Mutex<Option<(LiveClient, Vec<(&'static str, Listener)>)>>,
}

impl Attachment {
    /// Register `listeners` on `client`, replacing any previous attachment.
    pub(crate) fn attach(&self, client: &LiveClient, listeners: Vec<(&'static str, Listener)>) {
        for (event_type, listener) in &listeners {
            client.on(event_type, listener.clone());
        }
        let previous = self.slot.lock().replace((client.clone(), listeners));
        if let Some((old_client, old_listeners)) = previous {
            for (event_type, listener) in &old_listeners {
                old_client.off(event_type, listener);
            }
        }
    }

    pub(crate) fn detach(&self) {
        let Some((client, listeners)) = self.slot.lock().take() else {
            return;
        };
        for (event_type, listener) in &listeners {
            client.off(event_type, listener);
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("attached", &self.is_attached())
            .finish()
    }
}
