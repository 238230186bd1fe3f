use async_trait::async_trait;
use splashdle_protocol::{Puzzle, Room, RoomId};

use crate::error::GameError;
use crate::identity::CallerContext;
use crate::service::RoomService;
use crate::stream::RoomStream;

/// How an online session reaches the shared room.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn join(&self, caller: &CallerContext, puzzle: Option<Puzzle>) -> Result<Room, GameError>;

    async fn guess(&self, caller: &CallerContext, character_key: &str) -> Result<Room, GameError>;

    async fn set_puzzle(&self, caller: &CallerContext, puzzle: Puzzle) -> Result<Room, GameError>;

    /// Event feed for the room, starting with an `init` snapshot.
    async fn subscribe(&self, room_id: &RoomId) -> Result<RoomStream, GameError>;
}

/// Talks to a [`RoomService`] living in the same process.
#[derive(Clone)]
pub struct InProcessTransport {
    service: RoomService,
}

impl InProcessTransport {
    pub fn new(service: RoomService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RoomTransport for InProcessTransport {
    async fn join(&self, caller: &CallerContext, puzzle: Option<Puzzle>) -> Result<Room, GameError> {
        Ok(self.service.join(caller, puzzle).await?)
    }

    async fn guess(&self, caller: &CallerContext, character_key: &str) -> Result<Room, GameError> {
        Ok(self.service.submit_guess(caller, character_key).await?)
    }

    async fn set_puzzle(&self, caller: &CallerContext, puzzle: Puzzle) -> Result<Room, GameError> {
        Ok(self.service.set_puzzle(caller, puzzle).await?)
    }

    async fn subscribe(&self, room_id: &RoomId) -> Result<RoomStream, GameError> {
        Ok(RoomStream::open(&self.service, room_id).await?)
    }
}
