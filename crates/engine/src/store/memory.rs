use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use splashdle_protocol::{Room, RoomId};

use super::RoomRepository;
use crate::error::StoreError;

/// Ephemeral backend: a process-local table, invisible to other instances.
#[derive(Default)]
pub struct MemoryRooms {
    rooms: DashMap<RoomId, Room>,
}

impl MemoryRooms {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for MemoryRooms {
    async fn load(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(room_id).map(|r| r.value().clone()))
    }

    async fn persist(&self, room: &Room) -> Result<Room, StoreError> {
        let mut next = room.clone();
        next.revision = room.revision + 1;
        match self.rooms.entry(room.room_id.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().revision != room.revision {
                    return Err(StoreError::Conflict(room.room_id.clone()));
                }
                slot.insert(next.clone());
            }
            Entry::Vacant(slot) => {
                if room.revision != 0 {
                    return Err(StoreError::Conflict(room.room_id.clone()));
                }
                slot.insert(next.clone());
            }
        }
        Ok(next)
    }
}
