use async_trait::async_trait;
use rusqlite::OptionalExtension;
use splashdle_protocol::{Room, RoomId};

use super::RoomRepository;
use crate::db::{sql_err, Db};
use crate::error::StoreError;

/// Durable backend: one JSON document per room under `splashdle:room:<roomId>`.
pub struct SqliteRooms {
    db: Db,
}

impl SqliteRooms {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RoomRepository for SqliteRooms {
    async fn load(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError> {
        let key = room_id.record_key();
        let id = room_id.clone();
        self.db
            .run("load room", move |conn| {
                let row: Option<(String, i64)> = conn
                    .query_row(
                        "SELECT body, rev FROM rooms WHERE key = ?1",
                        [&key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(sql_err("load room"))?;
                let Some((body, rev)) = row else {
                    return Ok(None);
                };
                match serde_json::from_str::<Room>(&body) {
                    Ok(mut room) => {
                        room.revision = u64::try_from(rev).unwrap_or_default();
                        Ok(Some(room))
                    }
                    Err(err) => {
                        // Unreadable records count as absent; drop them so the
                        // next writer can start the room over.
                        tracing::warn!(room_id = %id, error = %err, "discarding unreadable room record");
                        conn.execute("DELETE FROM rooms WHERE key = ?1 AND rev = ?2", (&key, rev))
                            .map_err(sql_err("discard room"))?;
                        Ok(None)
                    }
                }
            })
            .await
    }

    async fn persist(&self, room: &Room) -> Result<Room, StoreError> {
        let mut next = room.clone();
        next.revision = room.revision + 1;
        let body = serde_json::to_string(&next).map_err(|e| StoreError::Codec(e.to_string()))?;
        let key = room.room_id.record_key();
        let expected = i64::try_from(room.revision).unwrap_or(i64::MAX);
        let updated_at = next.updated_at;

        let written = self
            .db
            .run("persist room", move |conn| {
                let n = if expected == 0 {
                    conn.execute(
                        "INSERT INTO rooms (key, body, rev, updated_at_ms) VALUES (?1, ?2, 1, ?3)
                         ON CONFLICT(key) DO NOTHING",
                        (&key, &body, updated_at),
                    )
                } else {
                    conn.execute(
                        "UPDATE rooms SET body = ?2, rev = rev + 1, updated_at_ms = ?3
                         WHERE key = ?1 AND rev = ?4",
                        (&key, &body, updated_at, expected),
                    )
                }
                .map_err(sql_err("persist room"))?;
                Ok(n)
            })
            .await?;

        if written == 0 {
            return Err(StoreError::Conflict(room.room_id.clone()));
        }
        Ok(next)
    }
}
