mod admission;
mod error;
mod lifecycle;
mod queries;

pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::model::*;
use crate::observability;
use crate::store::{
    NotificationInbox, NotificationSink, ReservationStore, ResourceCatalog, UserDirectory, WalStore,
};

/// What to do when approve/reject hits a reservation that already left `pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Overwrite the status and refresh `updated_at`.
    #[default]
    Overwrite,
    /// Fail with `InvalidTransition`.
    Strict,
}

/// The engine's external dependencies, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ResourceCatalog>,
    pub directory: Arc<dyn UserDirectory>,
    pub reservations: Arc<dyn ReservationStore>,
    pub sink: Arc<dyn NotificationSink>,
    pub inbox: Arc<dyn NotificationInbox>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Every role served by one `WalStore`.
    pub fn wal_backed(store: Arc<WalStore>) -> Self {
        Self {
            catalog: store.clone(),
            directory: store.clone(),
            reservations: store.clone(),
            sink: store.clone(),
            inbox: store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Reservation admission and lifecycle.
///
/// Admission on a resource is serialized by that resource's lock, held across
/// the overlap count and the insert. Different resources never contend.
pub struct Engine {
    catalog: Arc<dyn ResourceCatalog>,
    directory: Arc<dyn UserDirectory>,
    reservations: Arc<dyn ReservationStore>,
    sink: Arc<dyn NotificationSink>,
    inbox: Arc<dyn NotificationInbox>,
    clock: Arc<dyn Clock>,
    policy: TransitionPolicy,
    /// Per-resource admission locks, created on first use.
    admission_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(c: Collaborators, policy: TransitionPolicy) -> Self {
        Self {
            catalog: c.catalog,
            directory: c.directory,
            reservations: c.reservations,
            sink: c.sink,
            inbox: c.inbox,
            clock: c.clock,
            policy,
            admission_locks: DashMap::new(),
        }
    }

    pub(super) async fn lock_resource(&self, resource_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self
            .admission_locks
            .entry(resource_id)
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop admission locks nobody holds or waits on. A later request
    /// recreates the lock, so this also forgets removed resources.
    pub fn prune_idle_locks(&self) {
        self.admission_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Emit a notification and discard the outcome.
    ///
    /// The state change that triggered it is already durable and is never
    /// rolled back; a failure is only logged and counted.
    pub(super) async fn emit_best_effort(
        &self,
        target: Target,
        category: NotificationCategory,
        message: String,
    ) {
        if let Err(e) = self.sink.emit(target, category, message).await {
            metrics::counter!(observability::NOTIFICATIONS_DROPPED_TOTAL).increment(1);
            tracing::warn!("{} notification to {target:?} dropped: {e}", category.as_str());
        }
    }
}
