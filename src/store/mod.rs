//! Collaborator contracts consumed by the engine, plus `WalStore`, the
//! write-ahead-logged backend that implements all of them.

mod catalog;
mod journal;
mod ledger;
mod notifications;
mod reservations;

pub use catalog::NewResource;
pub use journal::Journal;
pub use ledger::ResourceLedger;

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("journal writer shut down")]
    WriterClosed,
    #[error("unknown resource: {0}")]
    UnknownResource(Ulid),
    #[error("unknown reservation: {0}")]
    UnknownReservation(Ulid),
    #[error("unknown user: {0}")]
    UnknownUser(Ulid),
    /// A resource or user that reservations still reference.
    #[error("{0} still has reservations")]
    HasReservations(Ulid),
    #[error("capacity must be positive, got {0}")]
    InvalidCapacity(u32),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Backend-specific failure with context.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Read-only capacity lookup.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    async fn resource(&self, id: Ulid) -> Result<Option<ResourceInfo>, StoreError>;
}

/// Display names for requesters, used in notification text.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: Ulid) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Reservations on `resource_id` overlapping `span` whose status is not `exclude`.
    async fn count_overlapping(
        &self,
        resource_id: Ulid,
        span: Span,
        exclude: ReservationStatus,
    ) -> Result<usize, StoreError>;

    /// Durable before it becomes visible to readers.
    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError>;

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    /// Replace an existing reservation by id.
    async fn update(&self, reservation: Reservation) -> Result<(), StoreError>;

    /// Newest `created_at` first.
    async fn list(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, StoreError>;
}

/// Fire-and-forget notification intake. The sink assigns id and timestamp.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(
        &self,
        target: Target,
        category: NotificationCategory,
        message: String,
    ) -> Result<Notification, StoreError>;
}

/// Read side of the notification log.
#[async_trait]
pub trait NotificationInbox: Send + Sync {
    /// `Ok(false)` when no notification has this id. Already-read is `Ok(true)`.
    async fn mark_read(&self, id: Ulid) -> Result<bool, StoreError>;

    /// Targeted at `user_id`, newest first.
    async fn for_user(&self, user_id: Ulid) -> Result<Vec<Notification>, StoreError>;

    /// Broadcast and targeted, newest first.
    async fn all(&self) -> Result<Vec<Notification>, StoreError>;
}

pub type SharedLedger = Arc<RwLock<ResourceLedger>>;

/// In-memory state rebuilt from a WAL on open. Every mutation is appended to
/// the journal before it is applied, so a failed append leaves nothing visible.
pub struct WalStore {
    journal: Journal,
    /// Mutations hold it shared; compaction holds it exclusively so the
    /// snapshot it writes contains every acknowledged event.
    commit_gate: RwLock<()>,
    resources: DashMap<Ulid, ResourceInfo>,
    users: DashMap<Ulid, String>,
    ledgers: DashMap<Ulid, SharedLedger>,
    /// Reverse lookup: reservation id → resource id.
    reservation_to_resource: DashMap<Ulid, Ulid>,
    notifications: DashMap<Ulid, Notification>,
    hub: Arc<NotifyHub>,
    clock: Arc<dyn Clock>,
}

impl WalStore {
    /// Replay `path` and start the journal writer. Must run inside a tokio runtime.
    pub async fn open(
        path: &Path,
        hub: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let store = Self {
            journal: Journal::start(wal),
            commit_gate: RwLock::new(()),
            resources: DashMap::new(),
            users: DashMap::new(),
            ledgers: DashMap::new(),
            reservation_to_resource: DashMap::new(),
            notifications: DashMap::new(),
            hub,
            clock,
        };
        let replayed = events.len();
        for event in events {
            store.apply(event).await;
        }
        tracing::info!(
            "replayed {replayed} events from {}: {} resources, {} reservations, {} notifications",
            path.display(),
            store.resources.len(),
            store.reservation_to_resource.len(),
            store.notifications.len()
        );
        Ok(store)
    }

    pub fn hub(&self) -> &Arc<NotifyHub> {
        &self.hub
    }

    fn ledger(&self, resource_id: Ulid) -> SharedLedger {
        self.ledgers.entry(resource_id).or_default().value().clone()
    }

    /// Apply a replayed event. Live mutations apply their own event while
    /// holding the relevant lock.
    async fn apply(&self, event: Event) {
        match event {
            Event::ResourceRegistered { resource } | Event::ResourceUpdated { resource } => {
                self.resources.insert(resource.id, resource);
            }
            Event::ResourceRemoved { id } => {
                self.resources.remove(&id);
                self.ledgers.remove(&id);
            }
            Event::UserRegistered { id, display_name } => {
                self.users.insert(id, display_name);
            }
            Event::UserRemoved { id } => {
                self.users.remove(&id);
            }
            Event::ReservationAdmitted { reservation } | Event::ReservationUpdated { reservation } => {
                let ledger = self.ledger(reservation.resource_id);
                self.reservation_to_resource.insert(reservation.id, reservation.resource_id);
                ledger.write().await.upsert(reservation);
            }
            Event::NotificationEmitted { notification } => {
                self.notifications.insert(notification.id, notification);
            }
            Event::NotificationRead { id } => {
                if let Some(mut n) = self.notifications.get_mut(&id) {
                    n.read = true;
                }
            }
        }
    }

    /// Hold across journal append and in-memory apply.
    async fn gate(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().await
    }

    /// Rewrite the WAL with the minimal event set that recreates current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        for entry in self.resources.iter() {
            events.push(Event::ResourceRegistered { resource: entry.value().clone() });
        }
        for entry in self.users.iter() {
            events.push(Event::UserRegistered {
                id: *entry.key(),
                display_name: entry.value().clone(),
            });
        }

        let ledgers: Vec<SharedLedger> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        let mut reservations = Vec::new();
        for ledger in ledgers {
            reservations.extend(ledger.read().await.iter().cloned());
        }
        reservations.sort_by_key(|r| (r.created_at, r.id));
        events.extend(reservations.into_iter().map(|reservation| Event::ReservationAdmitted { reservation }));

        let mut notifications: Vec<Notification> =
            self.notifications.iter().map(|e| e.value().clone()).collect();
        notifications.sort_by_key(|n| (n.created_at, n.id));
        events.extend(notifications.into_iter().map(|notification| Event::NotificationEmitted { notification }));

        self.journal.compact(events).await
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}
