use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use splashdle_protocol::{RoomEvent, RoomId};
use tokio::sync::OnceCell;

use super::{EventBus, Listener, Registry, Subscription};
use crate::db::{sql_err, Db};
use crate::error::{BusError, StoreError};
use crate::now_ms;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Log rows older than this are pruned; late listeners never replay them.
const EVENT_RETENTION_MS: i64 = 60_000;
const PRUNE_EVERY: Duration = Duration::from_secs(10);
const BATCH: i64 = 500;

/// Cross-process fan-out over the shared SQLite event log.
///
/// Publish appends `{type, payload}` to the log under the room's channel
/// name. The first subscribe in a process starts one listener task that
/// tails the log and hands each row to the local listeners of the room
/// named by its channel.
pub struct SqliteBus {
    db: Db,
    registry: Arc<Registry>,
    poll_interval: Duration,
    listener: OnceCell<()>,
}

impl SqliteBus {
    pub fn new(db: Db, poll_interval: Duration) -> Self {
        Self {
            db,
            registry: Arc::new(Registry::default()),
            poll_interval,
            listener: OnceCell::new(),
        }
    }

    async fn ensure_listener(&self) {
        self.listener
            .get_or_init(|| async {
                let start = latest_seq(&self.db).await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "event log unavailable; listening from the start");
                    0
                });
                tokio::spawn(listen(
                    self.db.clone(),
                    Arc::downgrade(&self.registry),
                    self.poll_interval,
                    start,
                ));
            })
            .await;
    }
}

#[async_trait]
impl EventBus for SqliteBus {
    async fn publish(&self, room_id: &RoomId, event: &RoomEvent) -> Result<(), BusError> {
        let body = serde_json::to_string(event).map_err(|e| BusError::Codec(e.to_string()))?;
        let channel = room_id.channel_name();
        self.db
            .run("publish event", move |conn| {
                conn.execute(
                    "INSERT INTO room_events (ts_ms, channel, body) VALUES (?1, ?2, ?3)",
                    (now_ms(), &channel, &body),
                )
                .map_err(sql_err("publish event"))
            })
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, room_id: &RoomId, listener: Listener) -> Subscription {
        let subscription = self.registry.add(room_id, listener);
        self.ensure_listener().await;
        subscription
    }
}

async fn latest_seq(db: &Db) -> Result<i64, StoreError> {
    db.run("event log head", |conn| {
        conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM room_events", [], |row| row.get(0))
            .map_err(sql_err("event log head"))
    })
    .await
}

async fn listen(db: Db, registry: Weak<Registry>, poll_interval: Duration, mut last_seq: i64) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_prune = tokio::time::Instant::now();

    loop {
        ticker.tick().await;
        let Some(registry) = registry.upgrade() else {
            tracing::debug!("event bus dropped; stopping listener");
            return;
        };

        let after = last_seq;
        let rows = db
            .run("tail events", move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT seq, channel, body FROM room_events WHERE seq > ?1 ORDER BY seq LIMIT ?2",
                    )
                    .map_err(sql_err("tail events"))?;
                let rows = stmt
                    .query_map((after, BATCH), |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })
                    .map_err(sql_err("tail events"))?;
                Ok(rows.filter_map(Result::ok).collect::<Vec<_>>())
            })
            .await;

        match rows {
            Ok(rows) => {
                for (seq, channel, body) in rows {
                    last_seq = seq;
                    match decode(&channel, &body) {
                        Some((room_id, event)) => {
                            registry.dispatch(&room_id, &event);
                        }
                        None => tracing::debug!(seq, channel = %channel, "dropping malformed event"),
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "event log poll failed"),
        }

        if last_prune.elapsed() >= PRUNE_EVERY {
            last_prune = tokio::time::Instant::now();
            let cutoff = now_ms() - EVENT_RETENTION_MS;
            if let Err(err) = db
                .run("prune events", move |conn| {
                    conn.execute("DELETE FROM room_events WHERE ts_ms < ?1", [cutoff])
                        .map_err(sql_err("prune events"))
                })
                .await
            {
                tracing::debug!(error = %err, "event log prune failed");
            }
        }
    }
}

/// Channel name back to a room id, body back to an event. `None` for
/// anything that does not parse.
fn decode(channel: &str, body: &str) -> Option<(RoomId, RoomEvent)> {
    let room_id = RoomId::from_channel_name(channel)?;
    let event = serde_json::from_str(body).ok()?;
    Some((room_id, event))
}
