// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction: announce, session, method-call, and signal
//! operations over an arbitrary discovery bus.
//!
//! Three faces: [`ClientBus`] for controller clients, [`ServiceBus`] for the
//! controller daemon, and [`LampBus`] for the daemon's lamp side. All faces
//! are object-safe; async operations either complete through the event
//! stream (session joins) or return boxed futures (method calls).

pub mod memory;
pub mod nats;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::response::BusError;
use crate::state::{LampDetails, LampFaults, LampParameters, LampState};

/// A periodic broadcast advertising a controller service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub version: u32,
    pub port: u16,
    pub bus_name: String,
    pub device_id: String,
    pub device_name: String,
    pub rank: u64,
    pub is_leader: bool,
}

/// Opaque session handle; nonzero while live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Boxed reply future for a method call.
pub type CallFuture = Pin<Box<dyn Future<Output = Result<Value, BusError>> + Send>>;

/// Boxed completion future for a lamp session join.
pub type JoinFuture = Pin<Box<dyn Future<Output = Result<SessionId, BusError>> + Send>>;

// -- Client face ---------------------------------------------------------------

/// Events delivered to a registered controller client.
#[derive(Debug)]
pub enum ClientBusEvent {
    /// A controller service announced itself.
    Announcement(Announcement),
    /// An async session join finished; `session` is `None` on failure.
    JoinCompleted { device_id: String, session: Option<SessionId> },
    /// A live session went away.
    SessionLost { session: SessionId },
    /// A signal from the service on `session`. No-arg signals carry an
    /// empty id list.
    Signal { session: SessionId, name: String, ids: Vec<String> },
}

/// Bus face used by controller clients.
pub trait ClientBus: Send + Sync + 'static {
    /// Subscribe to announcements and session events. Failure here is
    /// irrecoverable for the caller.
    fn register(&self) -> anyhow::Result<mpsc::UnboundedReceiver<ClientBusEvent>>;

    /// Initiate an async session join with an announced service; completion
    /// arrives as [`ClientBusEvent::JoinCompleted`]. An immediate error
    /// means the join could not even be started.
    fn join_session(&self, bus_name: &str, port: u16, device_id: &str) -> anyhow::Result<()>;

    /// Tear down a live session. Idempotent.
    fn leave_session(&self, session: SessionId);

    /// Issue a method call on a live session.
    fn call(&self, session: SessionId, method: &str, args: Value) -> CallFuture;
}

// -- Service face --------------------------------------------------------------

/// Events delivered to a serving controller.
#[derive(Debug)]
pub enum ServiceBusEvent {
    /// A client joined a session.
    SessionJoined { session: SessionId },
    /// A client session went away.
    SessionLost { session: SessionId },
    /// An incoming method call. The handler replies through `reply`;
    /// dropping it surfaces as a transport error on the caller side.
    MethodCall { session: SessionId, method: String, args: Value, reply: oneshot::Sender<Value> },
}

/// Bus face used by the controller daemon.
pub trait ServiceBus: Send + Sync + 'static {
    /// Start serving: register on the bus, emit the first announcement, and
    /// return the incoming event stream.
    fn serve(&self, announcement: Announcement) -> anyhow::Result<mpsc::UnboundedReceiver<ServiceBusEvent>>;

    /// Re-announce (periodic heartbeat, or metadata change).
    fn announce(&self, announcement: Announcement) -> anyhow::Result<()>;

    /// Broadcast a signal to every joined client.
    fn signal(&self, name: &str, ids: Vec<String>);
}

// -- Lamp face -----------------------------------------------------------------

/// Events delivered to the daemon's lamp side.
#[derive(Debug)]
pub enum LampBusEvent {
    /// A lamp announced itself (first discovery or re-announce). Carries the
    /// lamp's self-reported snapshot.
    LampAnnounced {
        lamp_id: String,
        bus_name: String,
        port: u16,
        name: String,
        state: LampState,
        parameters: LampParameters,
        details: LampDetails,
        faults: LampFaults,
    },
    /// A lamp session went away.
    SessionLost { lamp_id: String, session: SessionId },
    /// A lamp reported a state change.
    StateChanged { lamp_id: String, state: LampState },
}

/// Bus face used by the lamp session pool.
pub trait LampBus: Send + Sync + 'static {
    /// Subscribe to lamp discovery and session events.
    fn register(&self) -> anyhow::Result<mpsc::UnboundedReceiver<LampBusEvent>>;

    /// Join a session with a lamp.
    fn join(&self, lamp_id: &str) -> JoinFuture;

    /// Issue a method call on a live lamp session.
    fn call(&self, session: SessionId, method: &str, args: Value) -> CallFuture;

    /// Tear down a lamp session. Idempotent.
    fn leave(&self, session: SessionId);
}
