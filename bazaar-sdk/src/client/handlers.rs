//! Event handler registry.
//!
//! Handlers run on the subscription manager's driver task, one event at a
//! time in arrival order. They must not block: update state and return.

use std::collections::HashMap;

use crate::objects::events::{
    DomainEvent, EventEnvelope, FRAUD_ALERT_CREATED, RECOMMENDATION_GENERATED,
    SENTIMENT_ANALYSIS_COMPLETE,
};

type Handler = Box<dyn FnMut(&str, &EventEnvelope) + Send>;

/// Handlers keyed by event name.
#[derive(Default)]
pub struct EventHandlers {
    by_event: HashMap<String, Vec<Handler>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for envelopes whose `event` equals `event_name`.
    ///
    /// The handler receives the wire channel name and the envelope.
    pub fn on<F>(mut self, event_name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&str, &EventEnvelope) + Send + 'static,
    {
        self.by_event
            .entry(event_name.into())
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Register a typed handler for every known [`DomainEvent`].
    ///
    /// Envelopes that fail to decode are logged and skipped.
    pub fn on_domain_event<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str, &DomainEvent) + Send + Clone + 'static,
    {
        for name in [
            RECOMMENDATION_GENERATED,
            FRAUD_ALERT_CREATED,
            SENTIMENT_ANALYSIS_COMPLETE,
        ] {
            let mut handler = handler.clone();
            self = self.on(name, move |channel, envelope| match envelope.decode() {
                Ok(event) => handler(channel, &event),
                Err(e) => tracing::warn!(
                    channel,
                    event_id = %envelope.event_id,
                    error = %e,
                    "dropping undecodable event"
                ),
            });
        }
        self
    }

    /// Run every handler registered for `envelope.event`.
    ///
    /// Returns `false` when nothing is registered for it.
    pub(crate) fn dispatch(&mut self, channel: &str, envelope: &EventEnvelope) -> bool {
        match self.by_event.get_mut(&envelope.event) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(channel, envelope);
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("events", &self.by_event.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn envelope(event: &str) -> EventEnvelope {
        EventEnvelope {
            version: 1,
            event_id: Uuid::now_v7(),
            occurred_at: 0,
            event: event.to_owned(),
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn test_routes_by_event_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handlers = EventHandlers::new().on("a", move |channel, env| {
            sink.lock().unwrap().push((channel.to_owned(), env.event.clone()));
        });

        assert!(handlers.dispatch("private-ai.user.1", &envelope("a")));
        assert!(!handlers.dispatch("private-ai.user.1", &envelope("b")));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("private-ai.user.1".to_owned(), "a".to_owned())]
        );
    }

    #[test]
    fn test_undecodable_known_event_is_skipped() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut handlers = EventHandlers::new().on_domain_event(move |_, _| {
            *counter.lock().unwrap() += 1;
        });

        // Registered, but the payload is missing every required field.
        assert!(handlers.dispatch("private-ai.fraud.admin", &envelope(FRAUD_ALERT_CREATED)));
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
