// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::broadcast;

/// One lifecycle event on the process-wide bus.  Payloads are flat string
/// maps so they can be logged, persisted, and rendered without schema
/// knowledge.
#[derive(Debug, Clone, Serialize)]
pub struct AppEvent {
    pub event_type: String,
    pub payload: BTreeMap<String, String>,
}

impl AppEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Broadcast bus for [`AppEvent`]s.  Slow subscribers lag and lose events;
/// the durable record is the notification log, not the bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: AppEvent) {
        // No subscribers is fine; the log still captures the event.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
