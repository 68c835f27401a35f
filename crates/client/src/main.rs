//! Classroom Watch - Main entry point
//!
//! Resumes the persisted portal session and logs live updates as they arrive.
//! Assignment ids given as arguments get a per-assignment subscription once
//! the connection is up.

use anyhow::{bail, Context};
use classroom_client::stores::{Toast, ToastQueue};
use classroom_client::{
    listener, logging, ClientConfig, ConnectionState, LiveClient, Portal, SessionStorage,
};
use classroom_shared::{
    RecordId, ServerEvent, ASSIGNMENT_CREATED, ASSIGNMENT_UPDATED, ATTENDANCE_MARKED,
    SUBMISSION_CREATED, SUBMISSION_GRADED,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let assignment_ids = std::env::args()
        .skip(1)
        .map(|arg| {
            arg.parse::<RecordId>()
                .with_context(|| format!("not an assignment id: {arg}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let config = ClientConfig::from_env();
    let storage = SessionStorage::at(config.config_dir.as_deref())
        .context("no place to read the session from")?;
    tracing::info!(api = %config.api_url, ws = %config.ws_url, "starting");

    let portal = Portal::restore(config, storage);
    if !portal.is_authenticated() {
        bail!("no stored session; sign in to the portal first");
    }
    if let Err(e) = portal.refresh_user().await {
        bail!("session is no longer valid: {e}");
    }
    let Some(live) = portal.live() else {
        bail!("session ended while starting up");
    };
    if let Some(user) = portal.user() {
        tracing::info!(user = %user.email, role = %user.role, "watching live updates");
    }

    for event_type in [
        ASSIGNMENT_CREATED,
        ASSIGNMENT_UPDATED,
        SUBMISSION_CREATED,
        SUBMISSION_GRADED,
        ATTENDANCE_MARKED,
    ] {
        live.on(event_type, listener(log_event));
    }

    let subscriber = tokio::spawn(subscribe_when_connected(live.clone(), assignment_ids));
    let toast_reporter = tokio::spawn(report_toasts(portal.toasts().clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    subscriber.abort();
    toast_reporter.abort();
    live.disconnect();
    Ok(())
}

fn log_event(event: &ServerEvent) -> anyhow::Result<()> {
    match event {
        ServerEvent::AssignmentCreated(a) | ServerEvent::AssignmentUpdated(a) => {
            tracing::info!(kind = event.event_type(), id = a.id, title = %a.title, due = %a.due_date, "assignment");
        }
        ServerEvent::SubmissionCreated(s) | ServerEvent::SubmissionGraded(s) => {
            tracing::info!(
                kind = event.event_type(),
                id = s.id,
                assignment = s.assignment_id,
                grade = s.grade.as_deref().unwrap_or("-"),
                "submission"
            );
        }
        ServerEvent::AttendanceMarked(m) => {
            tracing::info!(subject = m.subject_id, records = m.records.len(), "attendance marked");
        }
        ServerEvent::Unknown { event_type, .. } => {
            tracing::debug!(%event_type, "unhandled event");
        }
    }
    Ok(())
}

/// Re-send the assignment subscriptions every time the connection comes up.
async fn subscribe_when_connected(live: LiveClient, assignment_ids: Vec<RecordId>) {
    let mut status = live.watch_status();
    loop {
        if status.borrow_and_update().state == ConnectionState::Connected {
            for id in &assignment_ids {
                live.subscribe_assignment(*id);
            }
        }
        if status.changed().await.is_err() {
            return;
        }
    }
}

async fn report_toasts(toasts: ToastQueue) {
    let mut seen = 0u64;
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tick.tick().await;
        for toast in unseen_toasts(&toasts, &mut seen) {
            tracing::warn!(kind = %toast.kind, title = %toast.title, "{}", toast.message);
        }
        toasts.prune_expired(std::time::Instant::now());
    }
}

/// Toasts shown since the last call, advancing `seen` past them.
fn unseen_toasts(toasts: &ToastQueue, seen: &mut u64) -> Vec<Toast> {
    let fresh = toasts.since(*seen);
    if let Some(last) = fresh.last() {
        *seen = last.id + 1;
    }
    fresh
}
