//! Engine error type and its coarse classification.

use uuid::Uuid;

use crate::domain::RequestStatus;
use crate::interfaces::{IdentityError, StorageError};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MileageError>;

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller.
    Validation,
    /// A referenced customer, request or route does not exist.
    NotFound,
    /// Duplicate submission or an invalid state transition.
    Conflict,
    /// Repository or gateway failure.
    Dependency,
    /// The actor lacks the role the operation needs.
    Forbidden,
}

/// Errors raised by the mileage engine.
#[derive(Debug, thiserror::Error)]
pub enum MileageError {
    #[error("Invalid booking class: {0}")]
    InvalidBookingClass(String),

    #[error("Invalid route: no distance between {from} and {to}")]
    RouteNotFound { from: String, to: String },

    #[error("Duplicate accrual request for ticket {ticket_id} / PNR {pnr}")]
    DuplicateRequest { ticket_id: String, pnr: String },

    #[error("Accrual request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Accrual request {id} is {status}, expected in_progress")]
    InvalidStatus { id: Uuid, status: RequestStatus },

    #[error("A reviewer identity is required")]
    MissingReviewer,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Concurrent update: {0}")]
    ConcurrentUpdate(String),

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MileageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MileageError::InvalidBookingClass(_)
            | MileageError::MissingReviewer
            | MileageError::Validation(_) => ErrorKind::Validation,
            MileageError::RouteNotFound { .. }
            | MileageError::RequestNotFound(_)
            | MileageError::CustomerNotFound(_) => ErrorKind::NotFound,
            MileageError::DuplicateRequest { .. }
            | MileageError::InvalidStatus { .. }
            | MileageError::ConcurrentUpdate(_) => ErrorKind::Conflict,
            MileageError::Forbidden(_) => ErrorKind::Forbidden,
            MileageError::Identity(IdentityError::NotFound(_)) => ErrorKind::NotFound,
            MileageError::Identity(_) => ErrorKind::Dependency,
            MileageError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            MileageError::Storage(StorageError::Conflict(_)) => ErrorKind::Conflict,
            MileageError::Storage(_) => ErrorKind::Dependency,
        }
    }

    /// Whether the message is safe to show to the caller as-is.
    pub fn is_user_facing(&self) -> bool {
        self.kind() != ErrorKind::Dependency
    }
}
