//! Per-room publish/subscribe.
//!
//! Both backends share a process-local [`Registry`] of listeners. The local
//! bus dispatches into it directly on publish; the SQLite bus writes to the
//! shared event log and one listener task per process feeds the registry.

mod local;
mod sqlite;

pub use local::LocalBus;
pub use sqlite::{SqliteBus, DEFAULT_POLL_INTERVAL};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use splashdle_protocol::{RoomEvent, RoomId};

use crate::error::BusError;

pub type Listener = Arc<dyn Fn(&RoomEvent) + Send + Sync>;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, room_id: &RoomId, event: &RoomEvent) -> Result<(), BusError>;

    /// The listener stays registered until the returned handle is
    /// unsubscribed or dropped.
    async fn subscribe(&self, room_id: &RoomId, listener: Listener) -> Subscription;
}

#[derive(Default)]
pub(crate) struct Registry {
    rooms: DashMap<RoomId, Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn add(self: &Arc<Self>, room_id: &RoomId, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rooms
            .entry(room_id.clone())
            .or_default()
            .push((id, listener));
        Subscription {
            registry: Arc::downgrade(self),
            room_id: room_id.clone(),
            id,
            active: true,
        }
    }

    fn remove(&self, room_id: &RoomId, id: u64) {
        let emptied = match self.rooms.get_mut(room_id) {
            Some(mut entry) => {
                entry.retain(|(lid, _)| *lid != id);
                entry.is_empty()
            }
            None => false,
        };
        if emptied {
            self.rooms.remove_if(room_id, |_, v| v.is_empty());
        }
    }

    /// Calls every listener of `room_id`. Listeners run outside the map lock
    /// so they may subscribe or unsubscribe themselves.
    pub(crate) fn dispatch(&self, room_id: &RoomId, event: &RoomEvent) -> usize {
        let listeners: Vec<Listener> = match self.rooms.get(room_id) {
            Some(entry) => entry.iter().map(|(_, l)| l.clone()).collect(),
            None => return 0,
        };
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub(crate) fn listener_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map(|e| e.len()).unwrap_or(0)
    }
}

/// Registration handle returned by [`EventBus::subscribe`].
pub struct Subscription {
    registry: Weak<Registry>,
    room_id: RoomId,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.room_id, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("room_id", &self.room_id)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
