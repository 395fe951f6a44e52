use sentinel_core::{DomainEvent, EventEnvelope, EventPublisher, TenantId};
use tokio::sync::broadcast;
use tracing::trace;

/// Process-wide channel capacity. Sized to absorb a burst across several
/// concurrent connector runs without a slow subscriber forcing a `Lagged`
/// error on the others.
const CHANNEL_CAPACITY: usize = 4096;

/// Fan-out for every `DomainEvent` the engine produces (spec §6). Wraps a
/// single `tokio::sync::broadcast` channel; topics are partitioned by
/// `tenant_id` on the envelope rather than by separate channels, since a
/// consumer that wants only one tenant's events can filter on `subscribe`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn publish_for(&self, tenant_id: &TenantId, event: DomainEvent) {
        self.publish(EventEnvelope {
            tenant_id: tenant_id.clone(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, envelope: EventEnvelope) {
        match self.sender.send(envelope) {
            Ok(subscriber_count) => {
                trace!(subscriber_count, "event dispatched");
            }
            Err(_) => {
                trace!("event dropped, no active subscribers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::TenantId;

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish_for(
            &TenantId::new("tenant-a"),
            DomainEvent::NodeStale {
                node_id: "node-1".into(),
                last_seen: chrono::Utc::now(),
            },
        );
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        bus.publish_for(
            &TenantId::new("tenant-a"),
            DomainEvent::ScanStarted {
                scan_id: "scan-1".into(),
                scan_type: "aws".into(),
                target: "aws-prod".into(),
            },
        );
        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.tenant_id, TenantId::new("tenant-a"));
        assert!(matches!(envelope.event, DomainEvent::ScanStarted { .. }));
    }
}
