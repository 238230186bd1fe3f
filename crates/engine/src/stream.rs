//! Per-client event feed: the room snapshot first, then every bus event.

use std::sync::Arc;

use futures_util::Stream;
use splashdle_protocol::{RoomEvent, RoomId};
use tokio::sync::mpsc;

use crate::bus::Subscription;
use crate::error::RoomError;
use crate::service::RoomService;

/// Ordered feed of [`RoomEvent`]s for one client. Dropping it releases the
/// underlying subscription or reader task.
pub struct RoomStream {
    first: Option<RoomEvent>,
    rx: mpsc::UnboundedReceiver<RoomEvent>,
    source: Source,
}

enum Source {
    Bus(#[allow(dead_code)] Subscription),
    Task(tokio::task::JoinHandle<()>),
}

impl RoomStream {
    /// Subscribes before reading the snapshot, so an event published in
    /// between is buffered rather than lost. The `init` snapshot is always
    /// yielded first.
    pub async fn open(service: &RoomService, room_id: &RoomId) -> Result<Self, RoomError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = service
            .bus()
            .subscribe(
                room_id,
                Arc::new(move |event: &RoomEvent| {
                    let _ = tx.send(event.clone());
                }),
            )
            .await;
        let snapshot = service.room(room_id).await?;
        tracing::debug!(room_id = %room_id, exists = snapshot.is_some(), "stream opened");
        Ok(Self {
            first: Some(RoomEvent::Init(snapshot.map(Box::new))),
            rx,
            source: Source::Bus(subscription),
        })
    }

    /// Feed filled by a reader task; the task is aborted when the stream drops.
    pub fn from_task(rx: mpsc::UnboundedReceiver<RoomEvent>, task: tokio::task::JoinHandle<()>) -> Self {
        Self {
            first: None,
            rx,
            source: Source::Task(task),
        }
    }

    /// `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        if let Some(event) = self.first.take() {
            return Some(event);
        }
        self.rx.recv().await
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<RoomEvent> {
        self.first.take().or_else(|| self.rx.try_recv().ok())
    }

    pub fn into_stream(self) -> impl Stream<Item = RoomEvent> + Send {
        futures_util::stream::unfold(self, |mut feed| async move {
            let event = feed.recv().await?;
            Some((event, feed))
        })
    }
}

impl Drop for RoomStream {
    fn drop(&mut self) {
        if let Source::Task(task) = &self.source {
            task.abort();
        }
    }
}
