use async_trait::async_trait;
use serde::Serialize;

/// Domain events emitted by the engine for listeners outside its scope
/// (WebSocket broadcast, cache invalidation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A room's content history was rewritten to the current shape.
    RoomHistoryMigrated { room_id: String },
    /// An entity became available as the result of an import job.
    EntityCreated {
        entity_id: String,
        entity_type: String,
    },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Default publisher: drops events with a debug log line.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: DomainEvent) {
        tracing::debug!(?event, "event dropped (no publisher configured)");
    }
}
