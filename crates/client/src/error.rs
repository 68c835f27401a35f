//! Client-side error type for store and session operations.

use classroom_shared::{ApiError, Role};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("only {required}s can do this (signed in as {actual})")]
    WrongRole { required: Role, actual: Role },
    #[error("not signed in")]
    NotSignedIn,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    /// The session's credential was rejected by the server.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, StoreError::Api(e) if e.is_unauthorized())
    }
}

/// A failed login or registration, carrying the message to show the user.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
    #[source]
    pub source: ApiError,
}

impl AuthError {
    /// Use the server's message when it sent one, `fallback` otherwise.
    pub(crate) fn new(source: ApiError, fallback: &str) -> Self {
        let message = source.server_message().unwrap_or(fallback).to_string();
        Self { message, source }
    }
}
