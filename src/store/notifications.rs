use async_trait::async_trait;
use ulid::Ulid;

use crate::limits::MAX_MESSAGE_LEN;
use crate::model::*;

use super::{NotificationInbox, NotificationSink, StoreError, WalStore};

fn newest_first(mut v: Vec<Notification>) -> Vec<Notification> {
    v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    v
}

#[async_trait]
impl NotificationSink for WalStore {
    async fn emit(
        &self,
        target: Target,
        category: NotificationCategory,
        message: String,
    ) -> Result<Notification, StoreError> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(StoreError::LimitExceeded("notification message too long"));
        }
        let notification = Notification {
            id: Ulid::new(),
            target,
            category,
            message,
            read: false,
            created_at: self.clock.now_ms(),
        };

        let _gate = self.gate().await;
        self.journal
            .append(&Event::NotificationEmitted { notification: notification.clone() })
            .await?;
        self.notifications.insert(notification.id, notification.clone());
        self.hub.publish(&notification);
        Ok(notification)
    }
}

#[async_trait]
impl NotificationInbox for WalStore {
    async fn mark_read(&self, id: Ulid) -> Result<bool, StoreError> {
        match self.notifications.get(&id).map(|n| n.read) {
            None => return Ok(false),
            Some(true) => return Ok(true),
            Some(false) => {}
        }

        let _gate = self.gate().await;
        self.journal.append(&Event::NotificationRead { id }).await?;
        if let Some(mut n) = self.notifications.get_mut(&id) {
            n.read = true;
        }
        Ok(true)
    }

    async fn for_user(&self, user_id: Ulid) -> Result<Vec<Notification>, StoreError> {
        let target = Target::User(user_id);
        Ok(newest_first(
            self.notifications
                .iter()
                .filter(|n| n.target == target)
                .map(|n| n.value().clone())
                .collect(),
        ))
    }

    async fn all(&self) -> Result<Vec<Notification>, StoreError> {
        Ok(newest_first(
            self.notifications.iter().map(|n| n.value().clone()).collect(),
        ))
    }
}
