//! Room repository: load and persist a room's full state by [`RoomId`].

mod memory;
mod sqlite;

pub use memory::MemoryRooms;
pub use sqlite::SqliteRooms;

use async_trait::async_trait;
use splashdle_protocol::{Room, RoomId};

use crate::error::StoreError;

#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// A missing or unreadable record is `Ok(None)`.
    async fn load(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError>;

    /// Writes `room` if the stored revision still equals `room.revision`
    /// (0 meaning "not stored yet") and returns the stored copy with its
    /// revision bumped. Fails with [`StoreError::Conflict`] otherwise.
    async fn persist(&self, room: &Room) -> Result<Room, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use splashdle_protocol::{GroupRound, Round};

    fn fresh_room() -> Room {
        Room::new(
            RoomId::new("g1", "c1").unwrap(),
            Round::Group(GroupRound::default()),
            1,
        )
    }

    async fn exercise(repo: &dyn RoomRepository) {
        let id = RoomId::new("g1", "c1").unwrap();
        assert!(repo.load(&id).await.unwrap().is_none());

        let mut room = fresh_room();
        room.upsert_player("u1", "Ana");
        let stored = repo.persist(&room).await.unwrap();
        assert_eq!(stored.revision, 1);

        let loaded = repo.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded, stored);

        // A second writer holding the pre-insert copy loses.
        assert!(matches!(
            repo.persist(&room).await,
            Err(StoreError::Conflict(_))
        ));

        let mut next = loaded.clone();
        next.upsert_player("u2", "Bo");
        let stored = repo.persist(&next).await.unwrap();
        assert_eq!(stored.revision, 2);
        assert!(matches!(
            repo.persist(&loaded).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(repo.load(&id).await.unwrap().unwrap().players.len(), 2);
    }

    #[tokio::test]
    async fn memory_backend_compares_revisions() {
        exercise(&MemoryRooms::default()).await;
    }

    #[tokio::test]
    async fn sqlite_backend_compares_revisions() {
        exercise(&SqliteRooms::new(crate::db::temp_db("rooms"))).await;
    }
}
