//! Alert and domain-event side channels.
//!
//! Both are fire-and-forget from the caller's point of view: the pipeline
//! logs a failed emission and carries on.

use std::sync::{Arc, Mutex};

use crate::error::TraceError;
use crate::model::{Alert, Payload};
use crate::store::{put_record, LedgerStore};

pub trait AlertSink: Send + Sync {
    fn create_alert(&self, alert: &Alert) -> Result<(), TraceError>;
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event_name: &str, payload: &Payload) -> Result<(), TraceError>;
}

/// Persists alerts as ledger documents under their own id.
pub struct LedgerAlertSink {
    store: Arc<dyn LedgerStore>,
}

impl LedgerAlertSink {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }
}

impl AlertSink for LedgerAlertSink {
    fn create_alert(&self, alert: &Alert) -> Result<(), TraceError> {
        put_record(self.store.as_ref(), alert)
    }
}

/// Keeps alerts in memory, in emission order.
#[derive(Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for MemoryAlertSink {
    fn create_alert(&self, alert: &Alert) -> Result<(), TraceError> {
        self.alerts
            .lock()
            .map_err(|_| TraceError::Store("alert sink lock poisoned".into()))?
            .push(alert.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub name: String,
    pub payload: Payload,
}

/// Records published events in memory.
#[derive(Default)]
pub struct MemoryEventBus {
    events: Mutex<Vec<PublishedEvent>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl EventPublisher for MemoryEventBus {
    fn publish(&self, event_name: &str, payload: &Payload) -> Result<(), TraceError> {
        self.events
            .lock()
            .map_err(|_| TraceError::Store("event bus lock poisoned".into()))?
            .push(PublishedEvent {
                name: event_name.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event_name: &str, _payload: &Payload) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Emit without propagating: a failed sink only costs a log line.
pub(crate) fn emit(sink: &dyn AlertSink, alert: &Alert) {
    if let Err(err) = sink.create_alert(alert) {
        tracing::warn!(alert_id = %alert.id, error = %err, "failed to record alert");
    }
}

pub(crate) fn publish(publisher: &dyn EventPublisher, event_name: &str, payload: &Payload) {
    if let Err(err) = publisher.publish(event_name, payload) {
        tracing::warn!(event = event_name, error = %err, "failed to publish event");
    }
}
