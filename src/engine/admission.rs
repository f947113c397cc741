use std::time::Instant;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

/// Non-empty, then within the accepted timestamp window and span width.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp outside the supported range"));
    }
    if end - start > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("reservation longer than the maximum span"));
    }
    Ok(Span::new(start, end))
}

impl Engine {
    /// Admit a booking request as a `pending` reservation, or deny it.
    ///
    /// On success one broadcast notification announces the request to admins.
    pub async fn request_booking(
        &self,
        resource_id: Ulid,
        requester_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.admit(resource_id, requester_id, start, end).await;
        metrics::histogram!(observability::ADMISSION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "admitted",
            Err(e) => e.label(),
        };
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);

        let (reservation, resource) = result?;
        let requester = self.requester_name(requester_id).await;
        self.emit_best_effort(
            Target::Broadcast,
            NotificationCategory::Reservation,
            format!("New reservation request from {requester} for {}", resource.name),
        )
        .await;
        Ok(reservation)
    }

    async fn admit(
        &self,
        resource_id: Ulid,
        requester_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<(Reservation, ResourceInfo), EngineError> {
        let span = validate_span(start, end)?;
        let resource = self
            .catalog
            .resource(resource_id)
            .await?
            .ok_or(EngineError::ResourceNotFound(resource_id))?;

        let _guard = self.lock_resource(resource_id).await;
        let booked = self
            .reservations
            .count_overlapping(resource_id, span, ReservationStatus::Rejected)
            .await?;
        if booked >= resource.capacity as usize {
            tracing::debug!(
                "denied [{}, {}) on {resource_id}: {booked} booked, capacity {}",
                span.start,
                span.end,
                resource.capacity
            );
            return Err(EngineError::CapacityExceeded {
                capacity: resource.capacity,
                booked,
                available: resource.capacity.saturating_sub(booked as u32),
            });
        }

        let now = self.clock.now_ms();
        let reservation = Reservation {
            id: Ulid::new(),
            resource_id,
            requester_id,
            span,
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.reservations.insert(reservation.clone()).await?;
        tracing::info!(
            "admitted reservation {} on {resource_id} [{}, {}) for {requester_id}",
            reservation.id,
            span.start,
            span.end
        );
        Ok((reservation, resource))
    }

    /// Falls back to the id when the directory has no name or is unreachable.
    async fn requester_name(&self, requester_id: Ulid) -> String {
        match self.directory.display_name(requester_id).await {
            Ok(Some(name)) => name,
            Ok(None) => requester_id.to_string(),
            Err(e) => {
                tracing::debug!("directory lookup for {requester_id} failed: {e}");
                requester_id.to_string()
            }
        }
    }
}
