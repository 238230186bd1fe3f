//! SQLite file shared by every process of a durable deployment. It holds
//! the room records and the event log that carries cross-process fan-out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, ErrorCode, OpenFlags};

use crate::error::StoreError;

/// Extra attempts for a statement that hit a locked database.
pub const STORE_RETRIES: u32 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.path.clone();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrate(&conn)?;
        Ok(conn)
    }

    /// Runs `f` on a blocking thread with a fresh connection, retrying a
    /// bounded number of times while the database is locked.
    pub async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .open()
                .map_err(|e| StoreError::backend(operation, format!("{e:#}")))?;
            let mut attempt = 0;
            loop {
                match f(&conn) {
                    Err(StoreError::Locked(_)) if attempt < STORE_RETRIES => {
                        attempt += 1;
                        std::thread::sleep(RETRY_BACKOFF * attempt);
                    }
                    other => return other,
                }
            }
        })
        .await
        .map_err(|e| StoreError::backend(operation, e))?
    }
}

/// Maps a rusqlite error, tagging busy/locked failures as retryable.
pub fn sql_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |err| {
        let locked = matches!(
            err.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        );
        if locked {
            StoreError::Locked(operation)
        } else {
            StoreError::backend(operation, err)
        }
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS rooms (
  key TEXT PRIMARY KEY,
  body TEXT NOT NULL,
  rev INTEGER NOT NULL DEFAULT 0,
  updated_at_ms INTEGER NOT NULL
);

-- Cross-process pub/sub. Listeners tail this by seq and prune old rows.
CREATE TABLE IF NOT EXISTS room_events (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  channel TEXT NOT NULL,
  body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_room_events_ts ON room_events(ts_ms);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn temp_db(tag: &str) -> Db {
    let p = std::env::temp_dir().join(format!(
        "splashdle-{tag}-{}.db",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ));
    let db = Db::new(p);
    let _ = db.open().expect("open db");
    db
}
