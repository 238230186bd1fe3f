use std::sync::Arc;

use async_trait::async_trait;
use splashdle_protocol::{RoomEvent, RoomId};

use super::{EventBus, Listener, Registry, Subscription};
use crate::error::BusError;

/// Ephemeral fan-out: publish calls this process's listeners synchronously.
#[derive(Default)]
pub struct LocalBus {
    registry: Arc<Registry>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, room_id: &RoomId, event: &RoomEvent) -> Result<(), BusError> {
        let delivered = self.registry.dispatch(room_id, event);
        tracing::trace!(room_id = %room_id, event_type = event.event_type(), delivered, "published");
        Ok(())
    }

    async fn subscribe(&self, room_id: &RoomId, listener: Listener) -> Subscription {
        self.registry.add(room_id, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tests::recorder;

    #[tokio::test]
    async fn publish_reaches_only_the_same_room() {
        let bus = LocalBus::new();
        let here = RoomId::new("g", "here").unwrap();
        let there = RoomId::new("g", "there").unwrap();
        let (l, seen) = recorder();
        let _sub = bus.subscribe(&here, l).await;

        bus.publish(&here, &RoomEvent::Init(None)).await.unwrap();
        bus.publish(&there, &RoomEvent::Init(None)).await.unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), &[RoomEvent::Init(None)]);
    }
}
