use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::escalation::domain::DebtEscalatedEvent;
use super::notification::domain::{Channel, ScheduleId};
use super::reconciliation::ContractId;

/// In-process domain events, one tagged variant per event type. Emission is
/// fire-and-forget: sinks must not fail and the engine never retries them;
/// durable fan-out to other systems is a sink implementation concern.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    NotificationScheduled {
        schedule_id: ScheduleId,
        contract_id: ContractId,
        step: u32,
        channel: Channel,
        scheduled_at: DateTime<Utc>,
    },
    NotificationSent {
        schedule_id: ScheduleId,
        channel: Channel,
        sent_at: DateTime<Utc>,
    },
    DebtEscalated(DebtEscalatedEvent),
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Sink that drops every event; the default when no downstream cares.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: DomainEvent) {}
}

/// Sink that records events so tests and the demo CLI can assert on them.
#[derive(Default, Clone)]
pub struct CollectingEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl CollectingEventSink {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }
}

impl EventSink for CollectingEventSink {
    fn publish(&self, event: DomainEvent) {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .push(event);
    }
}
