//! Lifecycle events streamed while a batch runs.
//!
//! Each item produces exactly one `start` followed by exactly one terminal
//! event (`complete` or `error`). Events from different items interleave in
//! completion order; the returned result list is what carries submission
//! order.
//!
//! Delivery goes through the [`EventSink`] trait so the caller decides where
//! events end up: an `mpsc` channel feeding a printer thread (the CLI), an
//! in-memory [`EventLog`] (tests), or nothing at all ([`NullSink`]). A sink
//! that fails never stops processing; the runner counts and logs the drop.
//!
//! ## Wire format
//!
//! ```json
//! {"event_type": "complete", "image_id": "…", "result": { … }}
//! ```

use crate::types::CompressionResult;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::mpsc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("event receiver disconnected")]
    Disconnected,
    #[error("event sink failed: {0}")]
    Sink(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Complete,
    Error,
}

impl EventKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EventKind::Start)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    #[serde(rename = "image_id")]
    pub id: String,
    /// Present on terminal events only.
    pub result: Option<CompressionResult>,
}

impl LifecycleEvent {
    pub fn start(id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Start,
            id: id.into(),
            result: None,
        }
    }

    /// `complete` or `error` depending on the result.
    pub fn finished(result: CompressionResult) -> Self {
        Self {
            kind: if result.success {
                EventKind::Complete
            } else {
                EventKind::Error
            },
            id: result.id.clone(),
            result: Some(result),
        }
    }
}

/// Destination for lifecycle events. Called concurrently from every worker.
pub trait EventSink: Sync {
    fn emit(&self, event: LifecycleEvent) -> Result<(), ChannelError>;
}

impl EventSink for mpsc::Sender<LifecycleEvent> {
    fn emit(&self, event: LifecycleEvent) -> Result<(), ChannelError> {
        self.send(event).map_err(|_| ChannelError::Disconnected)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LifecycleEvent) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(LifecycleEvent) -> Result<(), ChannelError> + Sync,
{
    fn emit(&self, event: LifecycleEvent) -> Result<(), ChannelError> {
        (self.0)(event)
    }
}

/// Collects events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events for one item, in arrival order.
    pub fn for_id(&self, id: &str) -> Vec<LifecycleEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.id == id)
            .collect()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: LifecycleEvent) -> Result<(), ChannelError> {
        self.events
            .lock()
            .map_err(|e| ChannelError::Sink(e.to_string()))?
            .push(event);
        Ok(())
    }
}
