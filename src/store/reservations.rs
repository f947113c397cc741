use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

use super::{ReservationStore, StoreError, WalStore};

#[async_trait]
impl ReservationStore for WalStore {
    async fn count_overlapping(
        &self,
        resource_id: Ulid,
        span: Span,
        exclude: ReservationStatus,
    ) -> Result<usize, StoreError> {
        let Some(ledger) = self.ledgers.get(&resource_id).map(|e| e.value().clone()) else {
            return Ok(0);
        };
        let guard = ledger.read().await;
        Ok(guard.count_overlapping(&span, exclude))
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError> {
        let _gate = self.gate().await;
        if !self.resources.contains_key(&reservation.resource_id) {
            return Err(StoreError::UnknownResource(reservation.resource_id));
        }
        let ledger = self.ledger(reservation.resource_id);
        let mut guard = ledger.write().await;
        // Re-checked under the ledger lock: `remove_resource` holds it too.
        if !self.resources.contains_key(&reservation.resource_id) {
            return Err(StoreError::UnknownResource(reservation.resource_id));
        }

        self.journal
            .append(&Event::ReservationAdmitted { reservation: reservation.clone() })
            .await?;
        self.reservation_to_resource.insert(reservation.id, reservation.resource_id);
        guard.upsert(reservation);
        Ok(())
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        let Some(resource_id) = self.reservation_to_resource.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(ledger) = self.ledgers.get(&resource_id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let guard = ledger.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn update(&self, reservation: Reservation) -> Result<(), StoreError> {
        let _gate = self.gate().await;
        let resource_id = self
            .reservation_to_resource
            .get(&reservation.id)
            .map(|e| *e.value())
            .ok_or(StoreError::UnknownReservation(reservation.id))?;
        let ledger = self.ledger(resource_id);
        let mut guard = ledger.write().await;
        if guard.get(reservation.id).is_none() {
            return Err(StoreError::UnknownReservation(reservation.id));
        }

        self.journal
            .append(&Event::ReservationUpdated { reservation: reservation.clone() })
            .await?;
        guard.upsert(reservation);
        Ok(())
    }

    async fn list(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, StoreError> {
        let ledgers: Vec<_> = match filter.resource_id {
            Some(rid) => self.ledgers.get(&rid).map(|e| e.value().clone()).into_iter().collect(),
            None => self.ledgers.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for ledger in ledgers {
            let guard = ledger.read().await;
            out.extend(guard.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }
}
