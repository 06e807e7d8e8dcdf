// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Investigation Events
//
// In-memory fan-out over a tokio broadcast channel. The CLI subscribes to
// stream progress while an investigation runs; slow subscribers lag and
// drop events rather than blocking workers.

use crate::domain::events::{InvestigationEvent, InvestigationObserver};
use crate::domain::investigation::InvestigationId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to investigation events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<InvestigationEvent>>,
}

impl EventBus {
    /// Capacity bounds how many events are buffered per subscriber before
    /// the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: InvestigationEvent) {
        debug!(investigation_id = %event.investigation_id(), "Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to every investigation's events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to one investigation's events
    pub fn subscribe_investigation(&self, investigation_id: InvestigationId) -> InvestigationEventReceiver {
        InvestigationEventReceiver {
            receiver: self.sender.subscribe(),
            investigation_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl InvestigationObserver for EventBus {
    fn on_event(&self, event: InvestigationEvent) {
        self.publish(event);
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all investigation events
pub struct EventReceiver {
    receiver: broadcast::Receiver<InvestigationEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<InvestigationEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<InvestigationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single investigation
pub struct InvestigationEventReceiver {
    receiver: broadcast::Receiver<InvestigationEvent>,
    investigation_id: InvestigationId,
}

impl InvestigationEventReceiver {
    /// Skips events from other investigations.
    pub async fn recv(&mut self) -> Result<InvestigationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.investigation_id() == self.investigation_id {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::investigation::DomainName;
    use chrono::Utc;

    fn started(investigation_id: InvestigationId) -> InvestigationEvent {
        InvestigationEvent::InvestigationStarted {
            investigation_id,
            user_id: "alice".to_string(),
            query: "why is checkout slow?".to_string(),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let investigation_id = InvestigationId::new();

        event_bus.publish(started(investigation_id));

        match receiver.recv().await.unwrap() {
            InvestigationEvent::InvestigationStarted { investigation_id: id, query, .. } => {
                assert_eq!(id, investigation_id);
                assert_eq!(query, "why is checkout slow?");
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_investigation_event_filtering() {
        let event_bus = EventBus::new(10);
        let investigation_id = InvestigationId::new();
        let mut receiver = event_bus.subscribe_investigation(investigation_id);

        event_bus.publish(started(InvestigationId::new()));
        event_bus.on_event(InvestigationEvent::DomainStarted {
            investigation_id,
            domain: DomainName::new("logs"),
            started_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            InvestigationEvent::DomainStarted { investigation_id: id, domain, .. } => {
                assert_eq!(id, investigation_id);
                assert_eq!(domain.as_str(), "logs");
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(started(InvestigationId::new()));

        assert!(receiver1.recv().await.is_ok());
        assert!(receiver2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_lagging_receiver_reports_dropped_events() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();
        for _ in 0..5 {
            event_bus.publish(started(InvestigationId::new()));
        }

        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(3))));
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_ok());
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
