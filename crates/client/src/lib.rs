// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lumen: controller client library for lumen lighting networks.
//!
//! Embed a [`ControllerClient`] in an app or gateway: it tracks controller
//! announcements, follows leadership changes, and exposes typed per-domain
//! managers. All replies, signals, and connection changes arrive on one
//! [`ClientEvent`] stream.

pub mod dispatch;
pub mod error;
pub mod event;
pub mod leader;
pub mod managers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumenwire::bus::{ClientBus, ClientBusEvent};
use lumenwire::methods::{GET_CONTROLLER_SERVICE_VERSION, LIGHTING_RESET_CONTROLLER_SERVICE};

use crate::dispatch::{Dispatcher, ReplyShape};
use crate::error::{ClientStatus, ErrorCode};
use crate::event::ClientEvent;
use crate::leader::{AnnounceAction, CurrentLeader, JoinOutcome, LeaderTracker};
use crate::managers::{
    LampGroupManager, LampManager, MasterSceneManager, PresetManager, SceneManager,
};

/// Client handle: owns the run loop, the dispatcher, and the managers.
pub struct ControllerClient {
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<Mutex<LeaderTracker>>,
    lamps: LampManager,
    groups: LampGroupManager,
    presets: PresetManager,
    scenes: SceneManager,
    master_scenes: MasterSceneManager,
    events: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    shutdown: CancellationToken,
}

impl ControllerClient {
    /// Start with the default 10 s call timeout.
    pub fn start(bus: Arc<dyn ClientBus>) -> anyhow::Result<Self> {
        Self::start_with_timeout(bus, Duration::from_secs(10))
    }

    /// Register on the bus and spawn the run loop.
    ///
    /// A registration failure here is irrecoverable; nothing is spawned.
    pub fn start_with_timeout(
        bus: Arc<dyn ClientBus>,
        call_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let bus_rx = bus.register().context("announcement registration failed")?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&bus), events_tx.clone(), call_timeout));
        managers::register_all(&dispatcher, &events_tx);

        let tracker = Arc::new(Mutex::new(LeaderTracker::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(run_loop(
            bus,
            Arc::clone(&dispatcher),
            Arc::clone(&tracker),
            events_tx,
            bus_rx,
            shutdown.clone(),
        ));

        Ok(Self {
            lamps: LampManager::new(Arc::clone(&dispatcher)),
            groups: LampGroupManager::new(Arc::clone(&dispatcher)),
            presets: PresetManager::new(Arc::clone(&dispatcher)),
            scenes: SceneManager::new(Arc::clone(&dispatcher)),
            master_scenes: MasterSceneManager::new(Arc::clone(&dispatcher)),
            dispatcher,
            tracker,
            events: Mutex::new(Some(events_rx)),
            shutdown,
        })
    }

    /// Take the event stream; yields `None` after the first call.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events.lock().take()
    }

    pub fn lamps(&self) -> &LampManager {
        &self.lamps
    }

    pub fn groups(&self) -> &LampGroupManager {
        &self.groups
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    pub fn scenes(&self) -> &SceneManager {
        &self.scenes
    }

    pub fn master_scenes(&self) -> &MasterSceneManager {
        &self.master_scenes
    }

    /// The leader record, when a session is established.
    pub fn connected_leader(&self) -> Option<CurrentLeader> {
        let tracker = self.tracker.lock();
        tracker.session().map(|_| tracker.current().clone())
    }

    pub fn get_controller_service_version(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_CONTROLLER_SERVICE_VERSION, json!({}), ReplyShape::U32)
    }

    pub fn lighting_reset(&self) -> ClientStatus {
        self.dispatcher.dispatch(LIGHTING_RESET_CONTROLLER_SERVICE, json!({}), ReplyShape::U32)
    }

    /// Stop the run loop. Pending waits are abandoned silently.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ControllerClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_loop(
    bus: Arc<dyn ClientBus>,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<Mutex<LeaderTracker>>,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut bus_rx: mpsc::UnboundedReceiver<ClientBusEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = bus_rx.recv() => {
                let Some(event) = event else {
                    warn!("bus event stream closed");
                    let _ = events.send(ClientEvent::Error {
                        codes: vec![ErrorCode::Irrecoverable],
                    });
                    break;
                };
                handle_bus_event(&bus, &dispatcher, &tracker, &events, event);
            }
        }
    }
}

fn handle_bus_event(
    bus: &Arc<dyn ClientBus>,
    dispatcher: &Arc<Dispatcher>,
    tracker: &Arc<Mutex<LeaderTracker>>,
    events: &mpsc::UnboundedSender<ClientEvent>,
    event: ClientBusEvent,
) {
    match event {
        ClientBusEvent::Announcement(ann) => {
            let action = tracker.lock().on_announced(&ann);
            match action {
                AnnounceAction::Drop => {}
                AnnounceAction::NameChanged { device_id, device_name } => {
                    let _ = events.send(ClientEvent::ControllerNameChanged {
                        device_id,
                        device_name,
                    });
                }
                AnnounceAction::Connect { teardown, target } => {
                    if let Some(torn) = teardown {
                        debug!(device_id = %torn.device_id, "tearing down superseded leader");
                        dispatcher.unbind();
                        bus.leave_session(torn.session);
                        let _ = events.send(ClientEvent::Disconnected {
                            device_id: torn.device_id,
                            device_name: torn.device_name,
                        });
                    }
                    info!(
                        device_id = %target.device_id,
                        rank = ann.rank,
                        "joining announced leader"
                    );
                    if let Err(e) =
                        bus.join_session(&target.bus_name, target.port, &target.device_id)
                    {
                        warn!(err = %e, device_id = %target.device_id, "join could not start");
                        let _ = events.send(ClientEvent::ConnectFailed {
                            device_id: target.device_id,
                            device_name: target.device_name,
                        });
                    }
                }
            }
        }
        ClientBusEvent::JoinCompleted { device_id, session } => {
            let outcome = tracker.lock().on_join_completed(&device_id, session);
            match outcome {
                JoinOutcome::Ignored { session } | JoinOutcome::Stale { session } => {
                    if let Some(stale) = session {
                        debug!(device_id, %stale, "discarding superseded session");
                        bus.leave_session(stale);
                    }
                }
                JoinOutcome::Connected { device_id, device_name, session } => {
                    info!(device_id, %session, "connected to controller service");
                    dispatcher.bind(session);
                    let _ = events.send(ClientEvent::Connected { device_id, device_name });
                }
                JoinOutcome::Failed { device_id, device_name } => {
                    warn!(device_id, "session join failed");
                    let _ = events.send(ClientEvent::ConnectFailed { device_id, device_name });
                }
            }
        }
        ClientBusEvent::SessionLost { session } => {
            if let Some((device_id, device_name)) = tracker.lock().on_session_lost(session) {
                info!(device_id, %session, "disconnected from controller service");
                dispatcher.unbind();
                let _ = events.send(ClientEvent::Disconnected { device_id, device_name });
            }
        }
        ClientBusEvent::Signal { session, name, ids } => {
            // Signals from superseded sessions are dropped with them.
            if dispatcher.session() == Some(session) {
                dispatcher.handle_signal(&name, ids);
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
