use bazaar_sdk::objects::{DomainEvent, EventEnvelope, EventError, TargetChannels};
use uuid::Uuid;

/// An event waiting in the broadcast queue.
///
/// Identity, timestamp and target channels are fixed at publish time, so
/// every channel the event fans out to carries the same `event_id` and a
/// config reload cannot redirect an event that is already queued.
#[derive(Debug, Clone)]
pub struct PendingBroadcast {
    pub event_id: Uuid,
    pub occurred_at: i64,
    pub channels: TargetChannels,
    pub event: DomainEvent,
}

impl PendingBroadcast {
    pub fn envelope(&self) -> Result<EventEnvelope, EventError> {
        EventEnvelope::seal(self.event_id, self.occurred_at, &self.event)
    }
}

/// What the caller of `publish` learns about a queued event.
#[derive(Debug, Clone, PartialEq)]
pub struct Queued {
    pub event_id: Uuid,
    pub channels: TargetChannels,
}
