use serde::{Deserialize, Serialize};

/// Failure taxonomy shared by the store boundary, the pager and the list views.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum KioskError {
    /// Remote read failed or the sort field is not orderable.
    #[error("query: {0}")]
    Query(String),
    /// Create/update/delete rejected by the store (e.g. uniqueness).
    #[error("mutation: {0}")]
    Mutation(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Another pagination transition is in flight.
    #[error("busy: {0}")]
    Busy(String),
    /// The transition was superseded before its fetch resolved.
    #[error("cancelled")]
    Cancelled,
    #[error("internal: {0}")]
    Internal(String),
}

impl KioskError {
    /// Whether the failure should be shown to the user as a notification.
    pub fn is_user_visible(&self) -> bool { !matches!(self, KioskError::Cancelled) }
}

pub type KioskResult<T> = Result<T, KioskError>;
