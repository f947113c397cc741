use async_trait::async_trait;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{NotificationSink, ResourceCatalog, SharedLedger, StoreError, UserDirectory, WalStore};

/// Administrative request to add a resource to the catalog.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub name: String,
    pub kind: ResourceKind,
    pub category: Option<String>,
    pub capacity: u32,
}

impl WalStore {
    /// Rooms always hold a single booking and carry no category.
    pub async fn register_resource(&self, req: NewResource) -> Result<ResourceInfo, StoreError> {
        if req.name.len() > MAX_NAME_LEN {
            return Err(StoreError::LimitExceeded("resource name too long"));
        }
        if self.resources.len() >= MAX_RESOURCES {
            return Err(StoreError::LimitExceeded("too many resources"));
        }
        let (capacity, category) = match req.kind {
            ResourceKind::Room => (1, "none".to_string()),
            ResourceKind::Equipment => (req.capacity, req.category.unwrap_or_else(|| "none".into())),
        };
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity(capacity));
        }

        let resource = ResourceInfo {
            id: Ulid::new(),
            name: req.name,
            kind: req.kind,
            category,
            capacity,
            created_at: self.clock.now_ms(),
        };
        {
            let _gate = self.gate().await;
            self.journal
                .append(&Event::ResourceRegistered { resource: resource.clone() })
                .await?;
            self.resources.insert(resource.id, resource.clone());
        }
        tracing::info!("registered resource {} ({}) capacity {}", resource.id, resource.name, resource.capacity);

        // Best effort: the resource stays registered if the announcement fails.
        if let Err(e) = self
            .emit(
                Target::Broadcast,
                NotificationCategory::Resource,
                format!("A new resource has been created: {}", resource.name),
            )
            .await
        {
            tracing::warn!("resource {} announcement dropped: {e}", resource.id);
        }
        Ok(resource)
    }

    /// Existing reservations are kept even if they now exceed the new capacity;
    /// only later admissions see it.
    pub async fn update_capacity(&self, id: Ulid, capacity: u32) -> Result<ResourceInfo, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity(capacity));
        }
        let _gate = self.gate().await;
        let mut resource = self
            .resources
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::UnknownResource(id))?;
        if resource.kind == ResourceKind::Room && capacity != 1 {
            return Err(StoreError::InvalidCapacity(capacity));
        }
        resource.capacity = capacity;
        self.journal
            .append(&Event::ResourceUpdated { resource: resource.clone() })
            .await?;
        self.resources.insert(id, resource.clone());
        tracing::info!("resource {id} capacity now {capacity}");
        Ok(resource)
    }

    /// Refused while any reservation, in any status, references the resource.
    pub async fn remove_resource(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.gate().await;
        if !self.resources.contains_key(&id) {
            return Err(StoreError::UnknownResource(id));
        }
        let ledger = self.ledger(id);
        let guard = ledger.write().await;
        if !guard.is_empty() {
            return Err(StoreError::HasReservations(id));
        }

        self.journal.append(&Event::ResourceRemoved { id }).await?;
        self.resources.remove(&id);
        self.ledgers.remove(&id);
        tracing::info!("removed resource {id}");
        Ok(())
    }

    pub async fn register_user(&self, id: Ulid, display_name: String) -> Result<(), StoreError> {
        if display_name.len() > MAX_NAME_LEN {
            return Err(StoreError::LimitExceeded("display name too long"));
        }
        let _gate = self.gate().await;
        self.journal
            .append(&Event::UserRegistered { id, display_name: display_name.clone() })
            .await?;
        self.users.insert(id, display_name);
        Ok(())
    }

    /// Refused while the user has reservations in any status. The engine does
    /// not require requesters to be registered, so an admission racing this
    /// call only loses the display name in later messages.
    pub async fn remove_user(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.gate().await;
        if !self.users.contains_key(&id) {
            return Err(StoreError::UnknownUser(id));
        }
        let ledgers: Vec<SharedLedger> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        for ledger in ledgers {
            if ledger.read().await.iter().any(|r| r.requester_id == id) {
                return Err(StoreError::HasReservations(id));
            }
        }

        self.journal.append(&Event::UserRemoved { id }).await?;
        self.users.remove(&id);
        tracing::info!("removed user {id}");
        Ok(())
    }

    /// Sorted by display name.
    pub fn users(&self) -> Vec<UserInfo> {
        let mut out: Vec<UserInfo> = self
            .users
            .iter()
            .map(|e| UserInfo { id: *e.key(), display_name: e.value().clone() })
            .collect();
        out.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        out
    }

    /// Oldest first.
    pub fn resources(&self) -> Vec<ResourceInfo> {
        let mut out: Vec<ResourceInfo> = self.resources.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        out
    }
}

#[async_trait]
impl ResourceCatalog for WalStore {
    async fn resource(&self, id: Ulid) -> Result<Option<ResourceInfo>, StoreError> {
        Ok(self.resources.get(&id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl UserDirectory for WalStore {
    async fn display_name(&self, user_id: Ulid) -> Result<Option<String>, StoreError> {
        Ok(self.users.get(&user_id).map(|e| e.value().clone()))
    }
}
