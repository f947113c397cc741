use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Notification, Target};

const CHANNEL_CAPACITY: usize = 256;

/// Live fan-out of emitted notifications.
///
/// Admin subscribers see everything; a user subscriber sees only the
/// notifications targeted at that user.
pub struct NotifyHub {
    admin: broadcast::Sender<Notification>,
    users: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            admin: broadcast::channel(CHANNEL_CAPACITY).0,
            users: DashMap::new(),
        }
    }

    pub fn subscribe_admin(&self) -> broadcast::Receiver<Notification> {
        self.admin.subscribe()
    }

    /// Creates the user's channel if needed.
    pub fn subscribe_user(&self, user_id: Ulid) -> broadcast::Receiver<Notification> {
        self.users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op for audiences nobody is listening to.
    pub fn publish(&self, notification: &Notification) {
        let _ = self.admin.send(notification.clone());
        if let Target::User(user_id) = notification.target
            && let Some(sender) = self.users.get(&user_id)
        {
            let _ = sender.send(notification.clone());
        }
    }

    /// Drop a user's channel once its last receiver is gone.
    pub fn prune(&self) {
        self.users.retain(|_, sender| sender.receiver_count() > 0);
    }
}
