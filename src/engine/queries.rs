use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.reservations
            .get(id)
            .await?
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Newest first.
    pub async fn reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.reservations.list(filter).await?)
    }

    /// Idempotent: marking an already-read notification succeeds.
    pub async fn mark_notification_read(&self, id: Ulid) -> Result<(), EngineError> {
        if self.inbox.mark_read(id).await? {
            Ok(())
        } else {
            Err(EngineError::NotificationNotFound(id))
        }
    }

    /// Notifications targeted at `user_id`, newest first.
    pub async fn notifications_for_user(&self, user_id: Ulid) -> Result<Vec<Notification>, EngineError> {
        Ok(self.inbox.for_user(user_id).await?)
    }

    /// Admin view: broadcast and targeted, newest first.
    pub async fn all_notifications(&self) -> Result<Vec<Notification>, EngineError> {
        Ok(self.inbox.all().await?)
    }
}
