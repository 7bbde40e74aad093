use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Change;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub announcing committed cache changes per employee.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Change>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes touching an employee's row. Creates the channel if needed.
    pub fn subscribe(&self, owner_id: Ulid) -> broadcast::Receiver<Change> {
        let sender = self
            .channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a change to one employee's subscribers. No-op if nobody is listening.
    pub fn send(&self, owner_id: Ulid, change: &Change) {
        if let Some(sender) = self.channels.get(&owner_id) {
            let _ = sender.send(change.clone());
        }
    }

    /// Send a change to every subscriber (whole-snapshot replacement).
    pub fn broadcast(&self, change: &Change) {
        for entry in self.channels.iter() {
            let _ = entry.value().send(change.clone());
        }
    }

    /// Drop channels whose receivers are all gone.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
