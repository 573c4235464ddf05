// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS realization of the bus contract.
//!
//! Subject scheme (all under a configurable prefix):
//! - `{prefix}.announce.ctl` — controller announcements, periodic JSON.
//! - `{prefix}.announce.lamp` — lamp announcements, periodic JSON.
//! - `{prefix}.ctl.{device_id}.join` — request/reply session join.
//! - `{prefix}.ctl.{device_id}.call` — request/reply method calls.
//! - `{prefix}.ctl.{device_id}.ping` — client session heartbeats.
//! - `{prefix}.ctl.{device_id}.signal.{name}` — signals to joined clients.
//! - `{prefix}.lamp.{lamp_id}.join` / `.call` / `.event.state` — lamp face.
//!
//! NATS has no session concept of its own, so liveness is heartbeats with
//! timeout eviction: clients watch controller announcements, the controller
//! watches client pings and lamp announcements. Method replies travel in an
//! `{ok: ...}` / `{err: CODE}` envelope so transport-level refusals stay
//! distinguishable from domain replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{
    Announcement, CallFuture, ClientBus, ClientBusEvent, JoinFuture, LampBus, LampBusEvent,
    ServiceBus, ServiceBusEvent, SessionId,
};
use crate::response::BusError;
use crate::state::{LampDetails, LampFaults, LampParameters, LampState};

/// Connection settings for the NATS bus.
#[derive(Debug, Clone)]
pub struct NatsBusConfig {
    /// NATS server URL (e.g. "nats://127.0.0.1:4222").
    pub url: String,
    /// Optional auth token.
    pub token: Option<String>,
    /// Subject prefix shared by every participant.
    pub prefix: String,
    /// Method-call reply deadline in milliseconds.
    pub call_timeout_ms: u64,
    /// Heartbeat silence after which a peer counts as gone.
    pub liveness_timeout_ms: u64,
}

impl NatsBusConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            prefix: "lumen".to_owned(),
            call_timeout_ms: 10_000,
            liveness_timeout_ms: 90_000,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}

/// A connected NATS bus; hand out per-face handles from it.
pub struct NatsBus {
    client: async_nats::Client,
    config: NatsBusConfig,
}

impl NatsBus {
    /// Connect to the NATS server.
    pub async fn connect(config: NatsBusConfig) -> anyhow::Result<Self> {
        let mut opts = async_nats::ConnectOptions::new();
        if let Some(ref token) = config.token {
            opts = opts.token(token.clone());
        }
        opts = opts.retry_on_initial_connect();

        info!(url = %config.url, prefix = %config.prefix, "connecting to NATS bus");
        let client = opts.connect(&config.url).await?;
        info!("NATS bus connected");
        Ok(Self { client, config })
    }

    pub fn client_bus(&self) -> NatsClientBus {
        NatsClientBus {
            inner: Arc::new(ClientInner {
                client: self.client.clone(),
                config: self.config.clone(),
                state: Mutex::new(ClientSideState::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn service_bus(&self) -> NatsServiceBus {
        NatsServiceBus {
            inner: Arc::new(ServiceInner {
                client: self.client.clone(),
                config: self.config.clone(),
                next_session: AtomicU64::new(1),
                state: Mutex::new(ServiceSideState::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn lamp_bus(&self) -> NatsLampBus {
        NatsLampBus {
            inner: Arc::new(LampInner {
                client: self.client.clone(),
                config: self.config.clone(),
                next_session: AtomicU64::new(1),
                state: Mutex::new(LampSideState::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

// -- Wire payloads -------------------------------------------------------------

/// Reply envelope distinguishing domain replies from transport refusals.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ok: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    err: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JoinRequest {
    client: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct JoinReply {
    session: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CallRequest {
    session: u64,
    method: String,
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct PingPayload {
    session: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignalPayload {
    #[serde(default)]
    ids: Vec<String>,
}

/// Announcement payload on `{prefix}.announce.lamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LampAnnouncement {
    pub lamp_id: String,
    pub bus_name: String,
    pub port: u16,
    pub name: String,
    pub state: LampState,
    pub parameters: LampParameters,
    pub details: LampDetails,
    #[serde(default)]
    pub faults: LampFaults,
}

#[derive(Debug, Serialize, Deserialize)]
struct LampStateEvent {
    state: LampState,
}

fn decode_envelope(payload: &[u8]) -> Result<Value, BusError> {
    let envelope: Envelope = serde_json::from_slice(payload).map_err(|_| BusError::Refused)?;
    match (envelope.ok, envelope.err) {
        (Some(value), _) => Ok(value),
        (None, Some(code)) if code == "NOT_CONNECTED" => Err(BusError::NotConnected),
        _ => Err(BusError::Refused),
    }
}

async fn request_with_timeout(
    client: &async_nats::Client,
    subject: String,
    payload: Value,
    timeout: Duration,
) -> Result<Value, BusError> {
    let bytes = serde_json::to_vec(&payload).map_err(|_| BusError::Refused)?;
    let request = client.request(subject, bytes.into());
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(msg)) => decode_envelope(&msg.payload),
        Ok(Err(e)) => {
            debug!(err = %e, "NATS request failed");
            Err(BusError::Refused)
        }
        Err(_) => Err(BusError::Timeout),
    }
}

async fn respond(client: &async_nats::Client, reply: Option<async_nats::Subject>, envelope: Envelope) {
    let Some(reply) = reply else { return };
    if let Ok(bytes) = serde_json::to_vec(&envelope) {
        if let Err(e) = client.publish(reply, bytes.into()).await {
            warn!(err = %e, "reply publish failed");
        }
    }
}

// -- Client face ---------------------------------------------------------------

#[derive(Default)]
struct ClientSideState {
    events: Option<mpsc::UnboundedSender<ClientBusEvent>>,
    /// Live sessions with the device that granted them.
    sessions: HashMap<SessionId, SessionWatch>,
    /// Last announce per device id, for heartbeat eviction.
    last_announce: HashMap<String, Instant>,
}

struct SessionWatch {
    device_id: String,
    tasks: CancellationToken,
}

struct ClientInner {
    client: async_nats::Client,
    config: NatsBusConfig,
    state: Mutex<ClientSideState>,
    shutdown: CancellationToken,
}

impl ClientInner {
    fn emit(&self, event: ClientBusEvent) {
        if let Some(tx) = self.state.lock().events.as_ref() {
            let _ = tx.send(event);
        }
    }

    fn drop_session(&self, session: SessionId) -> Option<String> {
        self.state.lock().sessions.remove(&session).map(|watch| {
            watch.tasks.cancel();
            watch.device_id
        })
    }
}

/// Client-face handle; spawned tasks stop when the handle is dropped.
pub struct NatsClientBus {
    inner: Arc<ClientInner>,
}

impl ClientBus for NatsClientBus {
    fn register(&self) -> anyhow::Result<mpsc::UnboundedReceiver<ClientBusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().events = Some(tx);

        // Announcement subscriber.
        let inner = Arc::clone(&self.inner);
        let subject = format!("{}.announce.ctl", inner.config.prefix);
        tokio::spawn(async move {
            let mut sub = match inner.client.subscribe(subject.clone()).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(err = %e, subject, "announce subscribe failed");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let Ok(ann) = serde_json::from_slice::<Announcement>(&msg.payload) else {
                            continue;
                        };
                        inner
                            .state
                            .lock()
                            .last_announce
                            .insert(ann.device_id.clone(), Instant::now());
                        inner.emit(ClientBusEvent::Announcement(ann));
                    }
                }
            }
        });

        // Heartbeat eviction: a joined service that stops announcing is gone.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let liveness = inner.config.liveness_timeout();
            let mut timer = tokio::time::interval(liveness / 4);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                let lost: Vec<SessionId> = {
                    let state = inner.state.lock();
                    state
                        .sessions
                        .iter()
                        .filter(|(_, watch)| {
                            state
                                .last_announce
                                .get(&watch.device_id)
                                .is_none_or(|at| at.elapsed() > liveness)
                        })
                        .map(|(sid, _)| *sid)
                        .collect()
                };
                for session in lost {
                    if inner.drop_session(session).is_some() {
                        debug!(%session, "controller heartbeat lost, dropping session");
                        inner.emit(ClientBusEvent::SessionLost { session });
                    }
                }
            }
        });

        Ok(rx)
    }

    fn join_session(&self, _bus_name: &str, _port: u16, device_id: &str) -> anyhow::Result<()> {
        let inner = Arc::clone(&self.inner);
        let device_id = device_id.to_owned();
        tokio::spawn(async move {
            let subject = format!("{}.ctl.{}.join", inner.config.prefix, device_id);
            let payload = json!(JoinRequest { client: uuid::Uuid::new_v4().to_string() });
            let result =
                request_with_timeout(&inner.client, subject, payload, inner.config.call_timeout())
                    .await
                    .and_then(|value| {
                        serde_json::from_value::<JoinReply>(value).map_err(|_| BusError::Refused)
                    });

            let session = match result {
                Ok(reply) => Some(SessionId(reply.session)),
                Err(e) => {
                    debug!(device_id, err = %e, "session join failed");
                    None
                }
            };

            if let Some(sid) = session {
                let tasks = CancellationToken::new();
                inner.state.lock().sessions.insert(
                    sid,
                    SessionWatch { device_id: device_id.clone(), tasks: tasks.clone() },
                );
                spawn_signal_subscriber(Arc::clone(&inner), sid, device_id.clone(), tasks.clone());
                spawn_session_pinger(Arc::clone(&inner), sid, device_id.clone(), tasks);
            }

            inner.emit(ClientBusEvent::JoinCompleted { device_id, session });
        });
        Ok(())
    }

    fn leave_session(&self, session: SessionId) {
        let _ = self.inner.drop_session(session);
    }

    fn call(&self, session: SessionId, method: &str, args: Value) -> CallFuture {
        let device_id =
            self.inner.state.lock().sessions.get(&session).map(|w| w.device_id.clone());
        let inner = Arc::clone(&self.inner);
        let method = method.to_owned();
        Box::pin(async move {
            let Some(device_id) = device_id else { return Err(BusError::NotConnected) };
            let subject = format!("{}.ctl.{}.call", inner.config.prefix, device_id);
            let payload = json!(CallRequest { session: session.0, method, args });
            request_with_timeout(&inner.client, subject, payload, inner.config.call_timeout()).await
        })
    }
}

impl Drop for NatsClientBus {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

fn spawn_signal_subscriber(
    inner: Arc<ClientInner>,
    session: SessionId,
    device_id: String,
    tasks: CancellationToken,
) {
    tokio::spawn(async move {
        let subject = format!("{}.ctl.{}.signal.>", inner.config.prefix, device_id);
        let mut sub = match inner.client.subscribe(subject.clone()).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(err = %e, subject, "signal subscribe failed");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = tasks.cancelled() => break,
                _ = inner.shutdown.cancelled() => break,
                msg = sub.next() => {
                    let Some(msg) = msg else { break };
                    let name = msg.subject.as_str().rsplit('.').next().unwrap_or_default().to_owned();
                    let payload: SignalPayload = serde_json::from_slice(&msg.payload)
                        .unwrap_or(SignalPayload { ids: Vec::new() });
                    inner.emit(ClientBusEvent::Signal { session, name, ids: payload.ids });
                }
            }
        }
    });
}

fn spawn_session_pinger(
    inner: Arc<ClientInner>,
    session: SessionId,
    device_id: String,
    tasks: CancellationToken,
) {
    tokio::spawn(async move {
        let subject = format!("{}.ctl.{}.ping", inner.config.prefix, device_id);
        let mut timer = tokio::time::interval(inner.config.liveness_timeout() / 3);
        loop {
            tokio::select! {
                _ = tasks.cancelled() => break,
                _ = inner.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            if let Ok(bytes) = serde_json::to_vec(&PingPayload { session: session.0 }) {
                let _ = inner.client.publish(subject.clone(), bytes.into()).await;
            }
        }
    });
}

// -- Service face --------------------------------------------------------------

#[derive(Default)]
struct ServiceSideState {
    device_id: Option<String>,
    events: Option<mpsc::UnboundedSender<ServiceBusEvent>>,
    /// Last ping per live session.
    sessions: HashMap<SessionId, Instant>,
}

struct ServiceInner {
    client: async_nats::Client,
    config: NatsBusConfig,
    next_session: AtomicU64,
    state: Mutex<ServiceSideState>,
    shutdown: CancellationToken,
}

impl ServiceInner {
    fn emit(&self, event: ServiceBusEvent) {
        if let Some(tx) = self.state.lock().events.as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Service-face handle; spawned tasks stop when the handle is dropped.
pub struct NatsServiceBus {
    inner: Arc<ServiceInner>,
}

impl ServiceBus for NatsServiceBus {
    fn serve(
        &self,
        announcement: Announcement,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<ServiceBusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock();
            state.device_id = Some(announcement.device_id.clone());
            state.events = Some(tx);
        }

        // One wildcard subscription covers join, call, and ping; dispatch by
        // subject suffix.
        let inner = Arc::clone(&self.inner);
        let device_id = announcement.device_id.clone();
        tokio::spawn(async move {
            let subject = format!("{}.ctl.{}.>", inner.config.prefix, device_id);
            let mut sub = match inner.client.subscribe(subject.clone()).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(err = %e, subject, "service subscribe failed");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let suffix =
                            msg.subject.as_str().rsplit('.').next().unwrap_or_default().to_owned();
                        match suffix.as_str() {
                            "join" => handle_join(&inner, msg).await,
                            "call" => handle_call(&inner, msg).await,
                            "ping" => handle_ping(&inner, &msg),
                            _ => {}
                        }
                    }
                }
            }
        });

        // Ping eviction: clients that stop pinging lose their session.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let liveness = inner.config.liveness_timeout();
            let mut timer = tokio::time::interval(liveness / 4);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                let dead: Vec<SessionId> = {
                    let state = inner.state.lock();
                    state
                        .sessions
                        .iter()
                        .filter(|(_, at)| at.elapsed() > liveness)
                        .map(|(sid, _)| *sid)
                        .collect()
                };
                for session in dead {
                    inner.state.lock().sessions.remove(&session);
                    debug!(%session, "client ping lost, dropping session");
                    inner.emit(ServiceBusEvent::SessionLost { session });
                }
            }
        });

        self.announce(announcement)?;
        Ok(rx)
    }

    fn announce(&self, announcement: Announcement) -> anyhow::Result<()> {
        let inner = Arc::clone(&self.inner);
        let subject = format!("{}.announce.ctl", inner.config.prefix);
        let bytes = serde_json::to_vec(&announcement)?;
        tokio::spawn(async move {
            if let Err(e) = inner.client.publish(subject, bytes.into()).await {
                warn!(err = %e, "announce publish failed");
            }
        });
        Ok(())
    }

    fn signal(&self, name: &str, ids: Vec<String>) {
        let device_id = self.inner.state.lock().device_id.clone();
        let Some(device_id) = device_id else { return };
        let subject = format!("{}.ctl.{}.signal.{}", self.inner.config.prefix, device_id, name);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Ok(bytes) = serde_json::to_vec(&json!(SignalPayload { ids })) {
                if let Err(e) = inner.client.publish(subject, bytes.into()).await {
                    warn!(err = %e, "signal publish failed");
                }
            }
        });
    }
}

impl Drop for NatsServiceBus {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn handle_join(inner: &Arc<ServiceInner>, msg: async_nats::Message) {
    let session = SessionId(inner.next_session.fetch_add(1, Ordering::Relaxed));
    inner.state.lock().sessions.insert(session, Instant::now());
    inner.emit(ServiceBusEvent::SessionJoined { session });
    let ok = serde_json::to_value(JoinReply { session: session.0 }).ok();
    respond(&inner.client, msg.reply, Envelope { ok, err: None }).await;
}

async fn handle_call(inner: &Arc<ServiceInner>, msg: async_nats::Message) {
    let Ok(request) = serde_json::from_slice::<CallRequest>(&msg.payload) else {
        respond(&inner.client, msg.reply, Envelope { ok: None, err: Some("REFUSED".to_owned()) })
            .await;
        return;
    };
    let session = SessionId(request.session);
    if !inner.state.lock().sessions.contains_key(&session) {
        respond(
            &inner.client,
            msg.reply,
            Envelope { ok: None, err: Some("NOT_CONNECTED".to_owned()) },
        )
        .await;
        return;
    }

    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    inner.emit(ServiceBusEvent::MethodCall {
        session,
        method: request.method,
        args: request.args,
        reply: reply_tx,
    });

    // Await the handler's reply off the subscriber loop.
    let inner = Arc::clone(inner);
    let reply_to = msg.reply;
    let deadline = inner.config.call_timeout();
    tokio::spawn(async move {
        let envelope = match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(value)) => Envelope { ok: Some(value), err: None },
            _ => Envelope { ok: None, err: Some("REFUSED".to_owned()) },
        };
        respond(&inner.client, reply_to, envelope).await;
    });
}

fn handle_ping(inner: &Arc<ServiceInner>, msg: &async_nats::Message) {
    if let Ok(ping) = serde_json::from_slice::<PingPayload>(&msg.payload) {
        let mut state = inner.state.lock();
        if let Some(at) = state.sessions.get_mut(&SessionId(ping.session)) {
            *at = Instant::now();
        }
    }
}

// -- Lamp face -----------------------------------------------------------------

#[derive(Default)]
struct LampSideState {
    events: Option<mpsc::UnboundedSender<LampBusEvent>>,
    /// Live lamp sessions.
    sessions: HashMap<SessionId, String>,
    /// Last announce per lamp id.
    last_announce: HashMap<String, Instant>,
}

struct LampInner {
    client: async_nats::Client,
    config: NatsBusConfig,
    next_session: AtomicU64,
    state: Mutex<LampSideState>,
    shutdown: CancellationToken,
}

impl LampInner {
    fn emit(&self, event: LampBusEvent) {
        if let Some(tx) = self.state.lock().events.as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Lamp-face handle for the daemon's session pool.
pub struct NatsLampBus {
    inner: Arc<LampInner>,
}

impl LampBus for NatsLampBus {
    fn register(&self) -> anyhow::Result<mpsc::UnboundedReceiver<LampBusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().events = Some(tx);

        // Lamp announcements.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let subject = format!("{}.announce.lamp", inner.config.prefix);
            let mut sub = match inner.client.subscribe(subject.clone()).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(err = %e, subject, "lamp announce subscribe failed");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let Ok(ann) = serde_json::from_slice::<LampAnnouncement>(&msg.payload)
                        else {
                            continue;
                        };
                        inner
                            .state
                            .lock()
                            .last_announce
                            .insert(ann.lamp_id.clone(), Instant::now());
                        inner.emit(LampBusEvent::LampAnnounced {
                            lamp_id: ann.lamp_id,
                            bus_name: ann.bus_name,
                            port: ann.port,
                            name: ann.name,
                            state: ann.state,
                            parameters: ann.parameters,
                            details: ann.details,
                            faults: ann.faults,
                        });
                    }
                }
            }
        });

        // Lamp state-change events.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let subject = format!("{}.lamp.*.event.state", inner.config.prefix);
            let mut sub = match inner.client.subscribe(subject.clone()).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(err = %e, subject, "lamp event subscribe failed");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        // Subject: {prefix}.lamp.{lamp_id}.event.state
                        let parts: Vec<&str> = msg.subject.as_str().split('.').collect();
                        let Some(lamp_id) = parts.iter().rev().nth(2).map(|s| (*s).to_owned())
                        else {
                            continue;
                        };
                        let Ok(event) = serde_json::from_slice::<LampStateEvent>(&msg.payload)
                        else {
                            continue;
                        };
                        inner.emit(LampBusEvent::StateChanged { lamp_id, state: event.state });
                    }
                }
            }
        });

        // Announce-heartbeat eviction for lamp sessions.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let liveness = inner.config.liveness_timeout();
            let mut timer = tokio::time::interval(liveness / 4);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                let dead: Vec<(SessionId, String)> = {
                    let state = inner.state.lock();
                    state
                        .sessions
                        .iter()
                        .filter(|(_, lamp_id)| {
                            state
                                .last_announce
                                .get(*lamp_id)
                                .is_none_or(|at| at.elapsed() > liveness)
                        })
                        .map(|(sid, lamp_id)| (*sid, lamp_id.clone()))
                        .collect()
                };
                for (session, lamp_id) in dead {
                    inner.state.lock().sessions.remove(&session);
                    debug!(lamp_id, %session, "lamp heartbeat lost, dropping session");
                    inner.emit(LampBusEvent::SessionLost { lamp_id, session });
                }
            }
        });

        Ok(rx)
    }

    fn join(&self, lamp_id: &str) -> JoinFuture {
        let inner = Arc::clone(&self.inner);
        let lamp_id = lamp_id.to_owned();
        Box::pin(async move {
            let subject = format!("{}.lamp.{}.join", inner.config.prefix, lamp_id);
            let payload = json!(JoinRequest { client: uuid::Uuid::new_v4().to_string() });
            let value =
                request_with_timeout(&inner.client, subject, payload, inner.config.call_timeout())
                    .await?;
            // Lamp-granted session ids are scoped per lamp; map them into our
            // own id space so the pool sees unique handles.
            let _granted: JoinReply =
                serde_json::from_value(value).map_err(|_| BusError::Refused)?;
            let session = SessionId(inner.next_session.fetch_add(1, Ordering::Relaxed));
            inner.state.lock().sessions.insert(session, lamp_id);
            Ok(session)
        })
    }

    fn call(&self, session: SessionId, method: &str, args: Value) -> CallFuture {
        let lamp_id = self.inner.state.lock().sessions.get(&session).cloned();
        let inner = Arc::clone(&self.inner);
        let method = method.to_owned();
        Box::pin(async move {
            let Some(lamp_id) = lamp_id else { return Err(BusError::NotConnected) };
            let subject = format!("{}.lamp.{}.call", inner.config.prefix, lamp_id);
            let payload = json!(CallRequest { session: session.0, method, args });
            request_with_timeout(&inner.client, subject, payload, inner.config.call_timeout()).await
        })
    }

    fn leave(&self, session: SessionId) {
        self.inner.state.lock().sessions.remove(&session);
    }
}

impl Drop for NatsLampBus {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
