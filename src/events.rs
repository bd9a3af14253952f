// Copyright 2026 Tasa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run event bus — typed events from the orchestrator.
//!
//! A `tokio::sync::broadcast` channel carrying [`RateEvent`] values. Any
//! consumer — the SSE endpoint, log sinks, a dashboard — can subscribe
//! independently. When no subscribers exist, events are silently dropped
//! (zero overhead).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event a scraping run emits. Serialized to JSON for SSE streaming.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RateEvent {
    /// A scraping run has started.
    RunStarted {
        run_id: String,
        entity_count: usize,
    },
    /// One adapter settled (any outcome kind).
    AdapterFinished {
        run_id: String,
        entity_id: String,
        outcome: String,
        quotes: usize,
        elapsed_ms: u64,
    },
    /// The run merged and (where possible) persisted a snapshot.
    RunCompleted {
        run_id: String,
        total_records: usize,
        fresh_entities: usize,
        stale_entities: usize,
        failed_entities: usize,
        persisted: bool,
        elapsed_ms: u64,
    },
    /// The run produced no usable data; the store was left untouched.
    RunFailed { run_id: String, elapsed_ms: u64 },
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<RateEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: RateEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<RateEvent> {
        self.sender.subscribe()
    }
}

/// Check whether an event concerns a specific entity.
///
/// Run-level events match every entity so filtered subscribers still see
/// run boundaries.
pub fn event_matches_entity(event: &RateEvent, entity_id: &str) -> bool {
    match event {
        RateEvent::AdapterFinished { entity_id: e, .. } => e == entity_id,
        RateEvent::RunStarted { .. }
        | RateEvent::RunCompleted { .. }
        | RateEvent::RunFailed { .. } => true,
    }
}
