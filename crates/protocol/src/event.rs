use serde::{Deserialize, Serialize};

use crate::{GuessEvent, Puzzle, Room};

/// `{type, payload}` envelope carried by the bus and the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Snapshot sent first on every stream connection; `None` when the room
    /// does not exist yet.
    Init(Option<Box<Room>>),
    RoomUpdated(Box<Room>),
    Guess(GuessEvent),
    Puzzle(Puzzle),
}

impl RoomEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::Init(_) => "init",
            RoomEvent::RoomUpdated(_) => "room_updated",
            RoomEvent::Guess(_) => "guess",
            RoomEvent::Puzzle(_) => "puzzle",
        }
    }

    pub fn room_updated(room: &Room) -> Self {
        RoomEvent::RoomUpdated(Box::new(room.clone()))
    }
}
