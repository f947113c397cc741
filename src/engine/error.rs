use thiserror::Error;
use ulid::Ulid;

use crate::model::{Ms, ReservationStatus};
use crate::store::StoreError;

/// Every error is a value returned to the caller; none is fatal to the host.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid interval [{start}, {end})")]
    InvalidInterval { start: Ms, end: Ms },
    /// Well-formed request outside the accepted timestamp window or span width.
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("resource not found: {0}")]
    ResourceNotFound(Ulid),
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),
    #[error("notification not found: {0}")]
    NotificationNotFound(Ulid),
    #[error("resource fully booked for this time slot (capacity {capacity}, booked {booked}, available {available})")]
    CapacityExceeded {
        capacity: u32,
        booked: usize,
        available: u32,
    },
    #[error("reservation is already {from}, cannot become {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// Transient persistence failure. Nothing was made visible.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownResource(id) => EngineError::ResourceNotFound(id),
            StoreError::UnknownReservation(id) => EngineError::ReservationNotFound(id),
            other => EngineError::StorageUnavailable(other.to_string()),
        }
    }
}

impl EngineError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::ResourceNotFound(_) => "resource_not_found",
            EngineError::ReservationNotFound(_) => "reservation_not_found",
            EngineError::NotificationNotFound(_) => "notification_not_found",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}
