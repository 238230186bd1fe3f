use std::sync::Arc;
use std::time::Duration;

use crate::bus::{EventBus, LocalBus, SqliteBus};
use crate::db::Db;
use crate::store::{MemoryRooms, RoomRepository, SqliteRooms};

/// Storage strategy chosen once at process start. Repository and bus always
/// come from the same backend.
#[derive(Debug, Clone)]
pub enum Backend {
    /// In-process table and listeners; nothing crosses process boundaries.
    Ephemeral,
    /// SQLite file shared by every process that points at it.
    Durable { db: Db, poll_interval: Duration },
}

impl Backend {
    pub fn durable(db: Db) -> Self {
        Self::Durable {
            db,
            poll_interval: crate::bus::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Ephemeral => "ephemeral",
            Backend::Durable { .. } => "durable",
        }
    }

    pub fn build(&self) -> (Arc<dyn RoomRepository>, Arc<dyn EventBus>) {
        match self {
            Backend::Ephemeral => (Arc::new(MemoryRooms::new()), Arc::new(LocalBus::new())),
            Backend::Durable { db, poll_interval } => (
                Arc::new(SqliteRooms::new(db.clone())),
                Arc::new(SqliteBus::new(db.clone(), *poll_interval)),
            ),
        }
    }
}
