use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{Engine, EngineError, TransitionPolicy};

const APPROVED_MESSAGE: &str = "Your reservation has been approved";
const REJECTED_MESSAGE: &str = "Your reservation has been rejected";

impl Engine {
    pub async fn approve(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Approved).await
    }

    pub async fn reject(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Rejected).await
    }

    /// Set the status, persist, then notify the requester (best effort).
    async fn transition(&self, id: Ulid, to: ReservationStatus) -> Result<Reservation, EngineError> {
        let result = self.apply_transition(id, to).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!(
            observability::TRANSITIONS_TOTAL,
            "to" => to.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        let reservation = result?;
        let message = match to {
            ReservationStatus::Approved => APPROVED_MESSAGE,
            _ => REJECTED_MESSAGE,
        };
        self.emit_best_effort(
            Target::User(reservation.requester_id),
            NotificationCategory::Reservation,
            message.to_string(),
        )
        .await;
        Ok(reservation)
    }

    async fn apply_transition(&self, id: Ulid, to: ReservationStatus) -> Result<Reservation, EngineError> {
        let resource_id = self
            .reservations
            .get(id)
            .await?
            .ok_or(EngineError::ReservationNotFound(id))?
            .resource_id;

        let _guard = self.lock_resource(resource_id).await;
        let mut reservation = self
            .reservations
            .get(id)
            .await?
            .ok_or(EngineError::ReservationNotFound(id))?;
        let from = reservation.status;

        if from.is_terminal() && self.policy == TransitionPolicy::Strict {
            return Err(EngineError::InvalidTransition { from, to });
        }

        // A rejected reservation freed its slot; taking it back must fit.
        if from == ReservationStatus::Rejected && to != ReservationStatus::Rejected {
            let resource = self
                .catalog
                .resource(resource_id)
                .await?
                .ok_or(EngineError::ResourceNotFound(resource_id))?;
            let booked = self
                .reservations
                .count_overlapping(resource_id, reservation.span, ReservationStatus::Rejected)
                .await?;
            if booked >= resource.capacity as usize {
                return Err(EngineError::CapacityExceeded {
                    capacity: resource.capacity,
                    booked,
                    available: resource.capacity.saturating_sub(booked as u32),
                });
            }
        }

        reservation.status = to;
        reservation.updated_at = self.clock.now_ms();
        self.reservations.update(reservation.clone()).await?;
        tracing::info!("reservation {id} {from} -> {to}");
        Ok(reservation)
    }
}
