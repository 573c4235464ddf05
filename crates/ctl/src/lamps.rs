// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lamp session pool: one serialized connection per lamp.
//!
//! Each discovered lamp gets a worker task that owns its session and drains
//! a FIFO call queue, so at most one call is outstanding per lamp while
//! broadcasts still fan out in parallel across lamps. Link lifecycle:
//! `DISCOVERED → JOINING → CONNECTED → LOST → JOINING → …`; a lost lamp
//! rejoins on the next queued call or on re-announce, whichever comes first,
//! and is dropped from the directory after a grace window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumenwire::bus::{LampBus, LampBusEvent, SessionId};
use lumenwire::response::ResponseCode;

use crate::catalog::LampDirectory;

/// Tuning knobs for the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long a lost lamp may stay lost before leaving the directory.
    pub grace: Duration,
    /// Extra attempts for a call that finds its lamp lost.
    pub call_retries: u32,
    /// Backoff before each retry attempt.
    pub backoff: [Duration; 2],
    /// Consecutive call failures that drop `CONNECTED → LOST`.
    pub max_consecutive_failures: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            call_retries: 2,
            backoff: [Duration::from_millis(100), Duration::from_millis(400)],
            max_consecutive_failures: 3,
        }
    }
}

/// Connection state of one lamp link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Discovered,
    Joining,
    Connected,
    Lost,
}

/// Events the pool surfaces to the service run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    LampDiscovered { lamp_id: String },
    LampStateChanged { lamp_id: String },
    /// Grace window expired; the lamp left the directory.
    LampDropped { lamp_id: String },
}

struct LinkShared {
    link: LinkState,
    session: Option<SessionId>,
    consecutive_failures: u32,
}

struct LampEntry {
    calls: mpsc::UnboundedSender<LampCall>,
    shared: Arc<Mutex<LinkShared>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

struct LampCall {
    method: String,
    args: Value,
    reply: oneshot::Sender<ResponseCode>,
}

pub struct LampPool {
    bus: Arc<dyn LampBus>,
    directory: Arc<LampDirectory>,
    config: PoolConfig,
    entries: Mutex<HashMap<String, LampEntry>>,
    events: mpsc::UnboundedSender<PoolEvent>,
    shutdown: CancellationToken,
}

impl LampPool {
    pub fn new(
        bus: Arc<dyn LampBus>,
        directory: Arc<LampDirectory>,
        config: PoolConfig,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PoolEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let pool =
            Arc::new(Self { bus, directory, config, entries: Mutex::new(HashMap::new()), events, shutdown });
        (pool, events_rx)
    }

    /// Register on the bus and spawn the discovery loop.
    pub fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut rx = self.bus.register()?;
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pool.shutdown.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        pool.handle_event(event);
                    }
                }
            }
        });
        Ok(())
    }

    /// Queue one call to one lamp without waiting for its outcome.
    ///
    /// `Ok` means the call was accepted onto the lamp's FIFO; the returned
    /// receiver resolves once the call (including join retries) has run.
    /// `Err` means the lamp is unknown or its worker is gone and nothing
    /// was queued.
    pub fn enqueue(
        &self,
        lamp_id: &str,
        method: &str,
        args: Value,
    ) -> Result<oneshot::Receiver<ResponseCode>, ResponseCode> {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(lamp_id) else {
            return Err(ResponseCode::ErrLampUnreachable);
        };
        let (reply, reply_rx) = oneshot::channel();
        let call = LampCall { method: method.to_owned(), args, reply };
        if entry.calls.send(call).is_err() {
            return Err(ResponseCode::ErrLampUnreachable);
        }
        Ok(reply_rx)
    }

    /// Queue one call to one lamp and wait for its outcome.
    ///
    /// Unknown lamps fail immediately; a known-but-lost lamp goes through
    /// the join/retry machinery and fails with `LSF_ERR_LAMP_UNREACHABLE`
    /// once retries are exhausted.
    pub async fn submit(&self, lamp_id: &str, method: &str, args: Value) -> ResponseCode {
        match self.enqueue(lamp_id, method, args) {
            Ok(reply_rx) => reply_rx.await.unwrap_or(ResponseCode::ErrLampUnreachable),
            Err(code) => code,
        }
    }

    /// Current link state, if the lamp is known.
    pub fn link_state(&self, lamp_id: &str) -> Option<LinkState> {
        self.entries.lock().get(lamp_id).map(|e| e.shared.lock().link)
    }

    fn handle_event(self: &Arc<Self>, event: LampBusEvent) {
        match event {
            LampBusEvent::LampAnnounced {
                lamp_id,
                name,
                state,
                parameters,
                details,
                faults,
                ..
            } => {
                let is_new = self
                    .directory
                    .upsert_announced(&lamp_id, &name, state, parameters, details, faults);
                if is_new {
                    info!(lamp_id, "lamp discovered");
                    let _ = self.events.send(PoolEvent::LampDiscovered { lamp_id: lamp_id.clone() });
                }
                let mut entries = self.entries.lock();
                match entries.get(&lamp_id) {
                    Some(entry) => entry.wake.notify_one(),
                    None => {
                        let entry = self.spawn_worker(&lamp_id);
                        entries.insert(lamp_id, entry);
                    }
                }
            }
            LampBusEvent::SessionLost { lamp_id, session } => {
                let lost = {
                    let entries = self.entries.lock();
                    entries.get(&lamp_id).is_some_and(|entry| {
                        let mut shared = entry.shared.lock();
                        if shared.session == Some(session) {
                            shared.link = LinkState::Lost;
                            shared.session = None;
                            true
                        } else {
                            false
                        }
                    })
                };
                if lost {
                    debug!(lamp_id, %session, "lamp session lost");
                    self.spawn_grace_timer(lamp_id);
                }
            }
            LampBusEvent::StateChanged { lamp_id, state } => {
                if self.directory.observe_state(&lamp_id, state) {
                    let _ = self.events.send(PoolEvent::LampStateChanged { lamp_id });
                }
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, lamp_id: &str) -> LampEntry {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(LinkShared {
            link: LinkState::Discovered,
            session: None,
            consecutive_failures: 0,
        }));
        let wake = Arc::new(Notify::new());
        let cancel = self.shutdown.child_token();

        let worker = Worker {
            bus: Arc::clone(&self.bus),
            lamp_id: lamp_id.to_owned(),
            shared: Arc::clone(&shared),
            config: self.config.clone(),
        };
        tokio::spawn(worker.run(calls_rx, Arc::clone(&wake), cancel.clone()));

        LampEntry { calls: calls_tx, shared, wake, cancel }
    }

    fn spawn_grace_timer(self: &Arc<Self>, lamp_id: String) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = pool.shutdown.cancelled() => return,
                _ = tokio::time::sleep(pool.config.grace) => {}
            }
            let still_lost = pool
                .entries
                .lock()
                .get(&lamp_id)
                .is_some_and(|entry| entry.shared.lock().link == LinkState::Lost);
            if !still_lost {
                return;
            }
            if let Some(entry) = pool.entries.lock().remove(&lamp_id) {
                entry.cancel.cancel();
            }
            if pool.directory.remove(&lamp_id) {
                warn!(lamp_id, "lamp not recovered within grace window, dropped");
                let _ = pool.events.send(PoolEvent::LampDropped { lamp_id });
            }
        });
    }
}

/// Per-lamp worker: owns the session and drains the call queue.
struct Worker {
    bus: Arc<dyn LampBus>,
    lamp_id: String,
    shared: Arc<Mutex<LinkShared>>,
    config: PoolConfig,
}

impl Worker {
    async fn run(
        self,
        mut calls: mpsc::UnboundedReceiver<LampCall>,
        wake: Arc<Notify>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = wake.notified() => {
                    // Re-announce of a lost lamp: rejoin eagerly.
                    if self.shared.lock().link == LinkState::Lost {
                        let _ = self.ensure_session().await;
                    }
                }
                call = calls.recv() => {
                    let Some(call) = call else { break };
                    let code = self.execute(&call.method, call.args).await;
                    let _ = call.reply.send(code);
                }
            }
        }
        if let Some(session) = self.shared.lock().session.take() {
            self.bus.leave(session);
        }
    }

    /// Run one queued call with join/retry handling.
    async fn execute(&self, method: &str, args: Value) -> ResponseCode {
        let attempts = self.config.call_retries + 1;
        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.config.backoff
                    [usize::min(attempt as usize - 1, self.config.backoff.len() - 1)];
                tokio::time::sleep(backoff).await;
            }

            let Some(session) = self.ensure_session().await else { continue };

            match self.bus.call(session, method, args.clone()).await {
                Ok(reply) => {
                    self.shared.lock().consecutive_failures = 0;
                    return reply
                        .get("code")
                        .and_then(|c| serde_json::from_value(c.clone()).ok())
                        .unwrap_or(ResponseCode::Ok);
                }
                Err(e) => {
                    debug!(lamp_id = %self.lamp_id, attempt, err = %e, "lamp call failed");
                    let mut shared = self.shared.lock();
                    shared.consecutive_failures += 1;
                    if shared.consecutive_failures >= self.config.max_consecutive_failures {
                        shared.link = LinkState::Lost;
                        if let Some(session) = shared.session.take() {
                            drop(shared);
                            self.bus.leave(session);
                        }
                    }
                }
            }
        }
        ResponseCode::ErrLampUnreachable
    }

    async fn ensure_session(&self) -> Option<SessionId> {
        {
            let shared = self.shared.lock();
            if let Some(session) = shared.session {
                return Some(session);
            }
        }
        self.shared.lock().link = LinkState::Joining;
        match self.bus.join(&self.lamp_id).await {
            Ok(session) => {
                let mut shared = self.shared.lock();
                shared.link = LinkState::Connected;
                shared.session = Some(session);
                shared.consecutive_failures = 0;
                debug!(lamp_id = %self.lamp_id, %session, "lamp session joined");
                Some(session)
            }
            Err(e) => {
                debug!(lamp_id = %self.lamp_id, err = %e, "lamp join failed");
                self.shared.lock().link = LinkState::Lost;
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "lamps_tests.rs"]
mod tests;
