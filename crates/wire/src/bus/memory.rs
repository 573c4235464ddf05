// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process bus: wires clients, controller services, and simulated lamps
//! through one hub.
//!
//! Used by the test suites and by single-process deployments that run the
//! daemon and an embedded client in the same binary. The hub also exposes
//! fault-injection knobs (held joins, dropped services, unreachable lamps)
//! that the scenario tests drive.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::bus::{
    Announcement, CallFuture, ClientBus, ClientBusEvent, JoinFuture, LampBus, LampBusEvent,
    ServiceBus, ServiceBusEvent, SessionId,
};
use crate::effect::LampProgram;
use crate::methods;
use crate::response::{BusError, ResponseCode};
use crate::state::{LampDetails, LampFaults, LampParameters, LampState};

/// Shared in-process hub. Cheap to clone.
#[derive(Clone)]
pub struct MemoryBus {
    hub: Arc<Hub>,
}

#[derive(Default)]
struct Hub {
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    next_session: u64,
    next_client: u64,
    services: HashMap<String, ServiceSlot>,
    clients: HashMap<u64, mpsc::UnboundedSender<ClientBusEvent>>,
    client_sessions: HashMap<SessionId, ClientSession>,
    held_joins: Vec<HeldJoin>,
    hold_join_devices: BTreeSet<String>,
    lamp_listeners: Vec<mpsc::UnboundedSender<LampBusEvent>>,
    lamps: HashMap<String, Arc<SimLamp>>,
    lamp_sessions: HashMap<SessionId, String>,
}

struct ServiceSlot {
    tx: mpsc::UnboundedSender<ServiceBusEvent>,
    announcement: Announcement,
    sessions: BTreeSet<SessionId>,
}

struct ClientSession {
    client_id: u64,
    device_id: String,
}

struct HeldJoin {
    client_id: u64,
    device_id: String,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self { hub: Arc::new(Hub::default()) }
    }

    /// A client-face handle; each handle is one logical client.
    pub fn client_bus(&self) -> Arc<MemoryClientBus> {
        let id = {
            let mut s = self.hub.state.lock();
            s.next_client += 1;
            s.next_client
        };
        Arc::new(MemoryClientBus { hub: Arc::clone(&self.hub), client_id: id })
    }

    /// A service-face handle; bound to a device id at `serve`.
    pub fn service_bus(&self) -> Arc<MemoryServiceBus> {
        Arc::new(MemoryServiceBus { hub: Arc::clone(&self.hub), device_id: Mutex::new(None) })
    }

    /// The lamp-face handle for a daemon's session pool.
    pub fn lamp_bus(&self) -> Arc<MemoryLampBus> {
        Arc::new(MemoryLampBus { hub: Arc::clone(&self.hub) })
    }

    /// Register a simulated lamp and announce it.
    pub fn add_lamp(&self, spec: SimLampSpec) -> Arc<SimLamp> {
        let lamp = Arc::new(SimLamp {
            lamp_id: spec.lamp_id.clone(),
            inner: Mutex::new(SimLampInner {
                name: spec.name,
                state: spec.state,
                parameters: spec.parameters,
                details: spec.details,
                faults: spec.faults,
                reachable: true,
                fail_next: 0,
                calls: Vec::new(),
            }),
        });
        let mut s = self.hub.state.lock();
        s.lamps.insert(spec.lamp_id.clone(), Arc::clone(&lamp));
        let event = lamp.announce_event();
        s.lamp_listeners.retain(|tx| tx.send(lamp_event_clone(&event)).is_ok());
        lamp
    }

    /// Re-announce a known lamp (wakes a `LOST` pool entry).
    pub fn re_announce_lamp(&self, lamp_id: &str) {
        let mut s = self.hub.state.lock();
        if let Some(lamp) = s.lamps.get(lamp_id).map(Arc::clone) {
            let event = lamp.announce_event();
            s.lamp_listeners.retain(|tx| tx.send(lamp_event_clone(&event)).is_ok());
        }
    }

    /// Kill a lamp's live sessions and optionally make it unreachable.
    pub fn disconnect_lamp(&self, lamp_id: &str, unreachable: bool) {
        let mut s = self.hub.state.lock();
        if let Some(lamp) = s.lamps.get(lamp_id) {
            lamp.inner.lock().reachable = !unreachable;
        }
        let dead: Vec<SessionId> = s
            .lamp_sessions
            .iter()
            .filter(|(_, id)| id.as_str() == lamp_id)
            .map(|(sid, _)| *sid)
            .collect();
        for sid in dead {
            s.lamp_sessions.remove(&sid);
            let event = LampBusEvent::SessionLost { lamp_id: lamp_id.to_owned(), session: sid };
            s.lamp_listeners.retain(|tx| tx.send(lamp_event_clone(&event)).is_ok());
        }
    }

    /// Remove a service, dropping every session it held.
    pub fn drop_service(&self, device_id: &str) {
        let mut s = self.hub.state.lock();
        let Some(slot) = s.services.remove(device_id) else { return };
        drop(slot.tx);
        for sid in slot.sessions {
            if let Some(link) = s.client_sessions.remove(&sid) {
                if let Some(tx) = s.clients.get(&link.client_id) {
                    let _ = tx.send(ClientBusEvent::SessionLost { session: sid });
                }
            }
        }
    }

    /// Park session joins toward `device_id` until released.
    pub fn hold_joins(&self, device_id: &str) {
        self.hub.state.lock().hold_join_devices.insert(device_id.to_owned());
    }

    /// Release parked joins toward `device_id`, completing each one.
    pub fn release_joins(&self, device_id: &str) {
        let mut s = self.hub.state.lock();
        s.hold_join_devices.remove(device_id);
        let (ready, rest): (Vec<HeldJoin>, Vec<HeldJoin>) =
            std::mem::take(&mut s.held_joins).into_iter().partition(|j| j.device_id == device_id);
        s.held_joins = rest;
        for join in ready {
            complete_join(&mut s, join.client_id, &join.device_id);
        }
    }
}

fn lamp_event_clone(event: &LampBusEvent) -> LampBusEvent {
    match event {
        LampBusEvent::LampAnnounced {
            lamp_id,
            bus_name,
            port,
            name,
            state,
            parameters,
            details,
            faults,
        } => LampBusEvent::LampAnnounced {
            lamp_id: lamp_id.clone(),
            bus_name: bus_name.clone(),
            port: *port,
            name: name.clone(),
            state: *state,
            parameters: *parameters,
            details: details.clone(),
            faults: faults.clone(),
        },
        LampBusEvent::SessionLost { lamp_id, session } => {
            LampBusEvent::SessionLost { lamp_id: lamp_id.clone(), session: *session }
        }
        LampBusEvent::StateChanged { lamp_id, state } => {
            LampBusEvent::StateChanged { lamp_id: lamp_id.clone(), state: *state }
        }
    }
}

fn complete_join(s: &mut HubState, client_id: u64, device_id: &str) {
    let session = match s.services.get_mut(device_id) {
        Some(slot) => {
            s.next_session += 1;
            let sid = SessionId(s.next_session);
            slot.sessions.insert(sid);
            let _ = slot.tx.send(ServiceBusEvent::SessionJoined { session: sid });
            s.client_sessions
                .insert(sid, ClientSession { client_id, device_id: device_id.to_owned() });
            Some(sid)
        }
        None => None,
    };
    if let Some(tx) = s.clients.get(&client_id) {
        let _ = tx.send(ClientBusEvent::JoinCompleted { device_id: device_id.to_owned(), session });
    }
}

// -- Client face ---------------------------------------------------------------

pub struct MemoryClientBus {
    hub: Arc<Hub>,
    client_id: u64,
}

impl ClientBus for MemoryClientBus {
    fn register(&self) -> anyhow::Result<mpsc::UnboundedReceiver<ClientBusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut s = self.hub.state.lock();
        // Replay current announcements so late registrants learn the leader.
        for slot in s.services.values() {
            let _ = tx.send(ClientBusEvent::Announcement(slot.announcement.clone()));
        }
        s.clients.insert(self.client_id, tx);
        Ok(rx)
    }

    fn join_session(&self, _bus_name: &str, _port: u16, device_id: &str) -> anyhow::Result<()> {
        let mut s = self.hub.state.lock();
        if s.hold_join_devices.contains(device_id) {
            s.held_joins
                .push(HeldJoin { client_id: self.client_id, device_id: device_id.to_owned() });
            return Ok(());
        }
        complete_join(&mut s, self.client_id, device_id);
        Ok(())
    }

    fn leave_session(&self, session: SessionId) {
        let mut s = self.hub.state.lock();
        let Some(link) = s.client_sessions.remove(&session) else { return };
        if let Some(slot) = s.services.get_mut(&link.device_id) {
            slot.sessions.remove(&session);
            let _ = slot.tx.send(ServiceBusEvent::SessionLost { session });
        }
    }

    fn call(&self, session: SessionId, method: &str, args: Value) -> CallFuture {
        let hub = Arc::clone(&self.hub);
        let method = method.to_owned();
        Box::pin(async move {
            let rx = {
                let s = hub.state.lock();
                let Some(link) = s.client_sessions.get(&session) else {
                    return Err(BusError::NotConnected);
                };
                let Some(slot) = s.services.get(&link.device_id) else {
                    return Err(BusError::NotConnected);
                };
                let (reply_tx, reply_rx) = oneshot::channel();
                let sent = slot.tx.send(ServiceBusEvent::MethodCall {
                    session,
                    method,
                    args,
                    reply: reply_tx,
                });
                if sent.is_err() {
                    return Err(BusError::Closed);
                }
                reply_rx
            };
            rx.await.map_err(|_| BusError::Closed)
        })
    }
}

// -- Service face --------------------------------------------------------------

pub struct MemoryServiceBus {
    hub: Arc<Hub>,
    device_id: Mutex<Option<String>>,
}

impl ServiceBus for MemoryServiceBus {
    fn serve(
        &self,
        announcement: Announcement,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<ServiceBusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.device_id.lock() = Some(announcement.device_id.clone());
        let mut s = self.hub.state.lock();
        s.services.insert(
            announcement.device_id.clone(),
            ServiceSlot { tx, announcement: announcement.clone(), sessions: BTreeSet::new() },
        );
        s.clients.retain(|_, tx| tx.send(ClientBusEvent::Announcement(announcement.clone())).is_ok());
        Ok(rx)
    }

    fn announce(&self, announcement: Announcement) -> anyhow::Result<()> {
        let mut s = self.hub.state.lock();
        if let Some(slot) = s.services.get_mut(&announcement.device_id) {
            slot.announcement = announcement.clone();
        }
        s.clients.retain(|_, tx| tx.send(ClientBusEvent::Announcement(announcement.clone())).is_ok());
        Ok(())
    }

    fn signal(&self, name: &str, ids: Vec<String>) {
        let device_id = self.device_id.lock().clone();
        let Some(device_id) = device_id else { return };
        let s = self.hub.state.lock();
        let Some(slot) = s.services.get(&device_id) else { return };
        for sid in &slot.sessions {
            if let Some(link) = s.client_sessions.get(sid) {
                if let Some(tx) = s.clients.get(&link.client_id) {
                    let _ = tx.send(ClientBusEvent::Signal {
                        session: *sid,
                        name: name.to_owned(),
                        ids: ids.clone(),
                    });
                }
            }
        }
    }
}

// -- Lamp face -----------------------------------------------------------------

pub struct MemoryLampBus {
    hub: Arc<Hub>,
}

impl LampBus for MemoryLampBus {
    fn register(&self) -> anyhow::Result<mpsc::UnboundedReceiver<LampBusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut s = self.hub.state.lock();
        for lamp in s.lamps.values() {
            let _ = tx.send(lamp.announce_event());
        }
        s.lamp_listeners.push(tx);
        Ok(rx)
    }

    fn join(&self, lamp_id: &str) -> JoinFuture {
        let hub = Arc::clone(&self.hub);
        let lamp_id = lamp_id.to_owned();
        Box::pin(async move {
            let mut s = hub.state.lock();
            let Some(lamp) = s.lamps.get(&lamp_id).map(Arc::clone) else {
                return Err(BusError::Refused);
            };
            if !lamp.inner.lock().reachable {
                return Err(BusError::Timeout);
            }
            s.next_session += 1;
            let sid = SessionId(s.next_session);
            s.lamp_sessions.insert(sid, lamp_id);
            Ok(sid)
        })
    }

    fn call(&self, session: SessionId, method: &str, args: Value) -> CallFuture {
        let hub = Arc::clone(&self.hub);
        let method = method.to_owned();
        Box::pin(async move {
            let (lamp, lamp_id) = {
                let s = hub.state.lock();
                let Some(lamp_id) = s.lamp_sessions.get(&session).cloned() else {
                    return Err(BusError::NotConnected);
                };
                let Some(lamp) = s.lamps.get(&lamp_id).map(Arc::clone) else {
                    return Err(BusError::NotConnected);
                };
                (lamp, lamp_id)
            };
            let outcome = lamp.handle_call(&method, args);
            match outcome {
                CallOutcome::Reply(value, state_changed) => {
                    if let Some(state) = state_changed {
                        let mut s = hub.state.lock();
                        let event = LampBusEvent::StateChanged { lamp_id, state };
                        s.lamp_listeners.retain(|tx| tx.send(lamp_event_clone(&event)).is_ok());
                    }
                    Ok(value)
                }
                CallOutcome::Unreachable => Err(BusError::Timeout),
            }
        })
    }

    fn leave(&self, session: SessionId) {
        self.hub.state.lock().lamp_sessions.remove(&session);
    }
}

// -- Simulated lamp ------------------------------------------------------------

/// Construction parameters for a simulated lamp.
#[derive(Debug, Clone, Default)]
pub struct SimLampSpec {
    pub lamp_id: String,
    pub name: String,
    pub state: LampState,
    pub parameters: LampParameters,
    pub details: LampDetails,
    pub faults: LampFaults,
}

impl SimLampSpec {
    pub fn named(lamp_id: &str) -> Self {
        Self { lamp_id: lamp_id.to_owned(), name: lamp_id.to_owned(), ..Default::default() }
    }
}

/// A scriptable lamp: records every call, tracks its own state, and can be
/// made unreachable or primed to fail.
pub struct SimLamp {
    pub lamp_id: String,
    inner: Mutex<SimLampInner>,
}

struct SimLampInner {
    name: String,
    state: LampState,
    parameters: LampParameters,
    details: LampDetails,
    faults: LampFaults,
    reachable: bool,
    fail_next: u32,
    calls: Vec<(String, Value)>,
}

enum CallOutcome {
    Reply(Value, Option<LampState>),
    Unreachable,
}

impl SimLamp {
    fn announce_event(&self) -> LampBusEvent {
        let inner = self.inner.lock();
        LampBusEvent::LampAnnounced {
            lamp_id: self.lamp_id.clone(),
            bus_name: format!(":{}", self.lamp_id),
            port: 42,
            name: inner.name.clone(),
            state: inner.state,
            parameters: inner.parameters,
            details: inner.details.clone(),
            faults: inner.faults.clone(),
        }
    }

    fn handle_call(&self, method: &str, args: Value) -> CallOutcome {
        let mut inner = self.inner.lock();
        if !inner.reachable {
            return CallOutcome::Unreachable;
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return CallOutcome::Unreachable;
        }
        inner.calls.push((method.to_owned(), args.clone()));
        let mut state_changed = None;
        if method == methods::APPLY_PROGRAM {
            if let Ok(program) = serde_json::from_value::<LampProgram>(args) {
                if let Some(last) = program.effects.last() {
                    let to = match last {
                        crate::effect::EffectDescriptor::Transition { to, .. } => *to,
                        crate::effect::EffectDescriptor::Pulse { to, .. } => *to,
                    };
                    inner.state = to;
                    state_changed = Some(to);
                }
            }
        } else if method == methods::LAMP_CLEAR_FAULT {
            if let Some(fault) = args.get("fault").and_then(Value::as_u64) {
                inner.faults.remove(&u32::try_from(fault).unwrap_or(0));
            }
        }
        CallOutcome::Reply(json!({ "code": ResponseCode::Ok }), state_changed)
    }

    /// Make the lamp (un)reachable for joins and calls.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().reachable = reachable;
    }

    /// Fail the next `n` calls with a transport timeout, then recover.
    pub fn fail_next_calls(&self, n: u32) {
        self.inner.lock().fail_next = n;
    }

    /// Every `(method, args)` pair the lamp accepted, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.inner.lock().calls.clone()
    }

    /// Decoded effect programs the lamp accepted, in order.
    pub fn programs(&self) -> Vec<LampProgram> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|(m, _)| m == methods::APPLY_PROGRAM)
            .filter_map(|(_, args)| serde_json::from_value(args.clone()).ok())
            .collect()
    }

    pub fn current_state(&self) -> LampState {
        self.inner.lock().state
    }

    pub fn current_faults(&self) -> LampFaults {
        self.inner.lock().faults.clone()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
