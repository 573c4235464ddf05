// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog-change signal emission.
//!
//! Handlers collect affected ids into a [`SignalBatch`] while they mutate,
//! then flush once after the method reply is sent. One mutation batch means
//! one signal per name, and the reply always precedes its signals.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use lumenwire::bus::ServiceBus;

/// Thin emission wrapper over the service bus.
#[derive(Clone)]
pub struct Broadcaster {
    bus: Arc<dyn ServiceBus>,
}

impl Broadcaster {
    pub fn new(bus: Arc<dyn ServiceBus>) -> Self {
        Self { bus }
    }

    /// Emit one signal immediately.
    pub fn emit(&self, name: &'static str, ids: Vec<String>) {
        debug!(signal = name, count = ids.len(), "emitting signal");
        self.bus.signal(name, ids);
    }

    /// Emit a no-arg signal.
    pub fn emit_no_arg(&self, name: &'static str) {
        self.emit(name, Vec::new());
    }
}

/// Per-request collector that coalesces ids under each signal name.
#[derive(Default)]
pub struct SignalBatch {
    pending: BTreeMap<&'static str, Vec<String>>,
}

impl SignalBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, id: impl Into<String>) {
        self.pending.entry(name).or_default().push(id.into());
    }

    /// Queue a no-arg signal (empty id list).
    pub fn add_no_arg(&mut self, name: &'static str) {
        self.pending.entry(name).or_default();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Emit every collected signal, one per name.
    pub fn flush(self, broadcaster: &Broadcaster) {
        for (name, ids) in self.pending {
            broadcaster.emit(name, ids);
        }
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
