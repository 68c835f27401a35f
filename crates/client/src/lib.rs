//! Classroom Client - live-update client for the school portal
//!
//! This crate contains the REST client, the live-update connection with its
//! reconnect policy and listener registry, and the stores that keep subjects,
//! assignments, submissions and attendance in sync for teachers and students.

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use auth_session::{AuthSession, Portal};
pub use config::ClientConfig;
pub use error::{AuthError, StoreError};
pub use routes::{guard, Navigation, Route};
pub use storage::{SessionStorage, StorageError};
pub use ws::{listener, ConnectionState, LiveClient, LiveStatus, Listener};
