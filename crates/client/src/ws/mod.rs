//! Live-update module: the portal's persistent notification channel.
//!
//! This module provides:
//! - [`LiveClient`]: one WebSocket connection, authenticated with the session
//!   token, with bounded linear auto-reconnect
//! - [`ReconnectPolicy`]: the retry budget and delay schedule
//! - [`SubscriptionRegistry`]: event type -> ordered listeners
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────────────────────┐
//!   │         LiveClient         │  connect(token) / disconnect()
//!   │  (socket + ReconnectPolicy)│  send(type, payload)
//!   └────────────────────────────┘
//!                │ decoded ServerEvent
//!                ▼
//!   ┌────────────────────────────┐
//!   │    SubscriptionRegistry    │  "submission_graded" -> [l1, l2, ...]
//!   └────────────────────────────┘
//!                │
//!        ┌───────┴────────┐
//!        ▼                ▼
//!   AssignmentStore  AttendanceStore   (reconcile cached collections)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let live = LiveClient::from_config(&config);
//! live.on("submission_graded", listener(|event| {
//!     tracing::info!(?event, "graded");
//!     Ok(())
//! }));
//! live.connect(&token);
//! live.subscribe_assignment(42);
//! ```

mod connection;
mod reconnect;
mod registry;

pub use connection::{ConnectionState, LiveClient, LiveStatus};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::{listener, Listener, SubscriptionRegistry};
