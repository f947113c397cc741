use ulid::Ulid;

use crate::model::*;

/// Every reservation on one resource, sorted by `span.start`.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: Vec<Reservation>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.entries.iter()
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.entries.iter().find(|r| r.id == id)
    }

    /// Insert or replace by id, keeping sort order.
    pub fn upsert(&mut self, reservation: Reservation) {
        if let Some(pos) = self.entries.iter().position(|r| r.id == reservation.id) {
            if self.entries[pos].span == reservation.span {
                self.entries[pos] = reservation;
                return;
            }
            self.entries.remove(pos);
        }
        let pos = self
            .entries
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.entries.insert(pos, reservation);
    }

    /// Reservations whose span overlaps `query`. Entries starting at or after
    /// `query.end` are skipped by binary search.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self.entries.partition_point(|r| r.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |r| r.span.overlaps(query))
    }

    pub fn count_overlapping(&self, query: &Span, exclude: ReservationStatus) -> usize {
        self.overlapping(query).filter(|r| r.status != exclude).count()
    }
}
