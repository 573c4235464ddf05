// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async method-call dispatch against the current leader session.
//!
//! Calls go out with a method-name context; replies come back through a
//! map of `method name → typed handler`, one handler family per reply
//! shape. A per-call waiter enforces the timeout; waits orphaned by a
//! leader change are abandoned silently, because the disconnect event is
//! the host's signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use lumenwire::bus::{ClientBus, SessionId};
use lumenwire::methods::{
    ReplyCodeId, ReplyCodeIdLanguage, ReplyCodeIdLanguageName, ReplyCodeIdList, ReplyCodeIdName,
    ReplyCodeIdTracking, ReplyU32,
};
use lumenwire::response::BusError;

use crate::error::{ClientStatus, ErrorCode};
use crate::event::ClientEvent;

/// Expected reply layout for one method, declared at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    CodeIdList,
    CodeIdName,
    CodeIdLanguage,
    CodeIdLanguageName,
    CodeId,
    CodeIdTracking,
    U32,
    /// Free-form; the registered handler decodes.
    Raw,
}

enum Handler {
    CodeIdList(Box<dyn Fn(ReplyCodeIdList) + Send + Sync>),
    CodeIdName(Box<dyn Fn(ReplyCodeIdName) + Send + Sync>),
    CodeIdLanguage(Box<dyn Fn(ReplyCodeIdLanguage) + Send + Sync>),
    CodeIdLanguageName(Box<dyn Fn(ReplyCodeIdLanguageName) + Send + Sync>),
    CodeId(Box<dyn Fn(ReplyCodeId) + Send + Sync>),
    CodeIdTracking(Box<dyn Fn(ReplyCodeIdTracking) + Send + Sync>),
    U32(Box<dyn Fn(u32) + Send + Sync>),
    Raw(Box<dyn Fn(Value) + Send + Sync>),
}

impl Handler {
    fn shape(&self) -> ReplyShape {
        match self {
            Self::CodeIdList(_) => ReplyShape::CodeIdList,
            Self::CodeIdName(_) => ReplyShape::CodeIdName,
            Self::CodeIdLanguage(_) => ReplyShape::CodeIdLanguage,
            Self::CodeIdLanguageName(_) => ReplyShape::CodeIdLanguageName,
            Self::CodeId(_) => ReplyShape::CodeId,
            Self::CodeIdTracking(_) => ReplyShape::CodeIdTracking,
            Self::U32(_) => ReplyShape::U32,
            Self::Raw(_) => ReplyShape::Raw,
        }
    }
}

struct BindState {
    session: Option<SessionId>,
    /// Bumped on every bind/unbind; waiters from an older epoch stay silent.
    epoch: u64,
}

pub struct Dispatcher {
    bus: Arc<dyn ClientBus>,
    state: Mutex<BindState>,
    handlers: Mutex<HashMap<&'static str, Handler>>,
    signal_handlers: Mutex<HashMap<&'static str, Box<dyn Fn(Vec<String>) + Send + Sync>>>,
    events: mpsc::UnboundedSender<ClientEvent>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<dyn ClientBus>,
        events: mpsc::UnboundedSender<ClientEvent>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            state: Mutex::new(BindState { session: None, epoch: 0 }),
            handlers: Mutex::new(HashMap::new()),
            signal_handlers: Mutex::new(HashMap::new()),
            events,
            call_timeout,
        }
    }

    /// Bind to a freshly joined leader session.
    pub fn bind(&self, session: SessionId) {
        let mut state = self.state.lock();
        state.session = Some(session);
        state.epoch += 1;
    }

    /// Drop the session binding (leader loss or teardown).
    pub fn unbind(&self) {
        let mut state = self.state.lock();
        state.session = None;
        state.epoch += 1;
    }

    pub fn session(&self) -> Option<SessionId> {
        self.state.lock().session
    }

    /// Issue `method` with `args`, expecting a reply of `shape`.
    pub fn dispatch(self: &Arc<Self>, method: &'static str, args: Value, shape: ReplyShape) -> ClientStatus {
        let (session, epoch) = {
            let state = self.state.lock();
            match state.session {
                Some(session) => (session, state.epoch),
                None => return ClientStatus::NotConnected,
            }
        };

        {
            let handlers = self.handlers.lock();
            match handlers.get(method) {
                Some(handler) if handler.shape() == shape => {}
                Some(handler) => {
                    warn!(method, ?shape, registered = ?handler.shape(), "reply shape mismatch");
                    return ClientStatus::Failure;
                }
                None => {
                    warn!(method, "no reply handler registered");
                    return ClientStatus::Failure;
                }
            }
        }

        debug!(method, %session, "dispatching method call");
        let call = self.bus.call(session, method, args);
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(dispatcher.call_timeout, call).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(BusError::Timeout),
            };
            match outcome {
                Ok(value) => dispatcher.deliver(method, value),
                Err(err) => {
                    let stale = dispatcher.state.lock().epoch != epoch;
                    let session_went_away =
                        matches!(err, BusError::Closed | BusError::NotConnected);
                    if stale || session_went_away {
                        // Abandoned by a leader change: the disconnect event
                        // already told the host everything.
                        debug!(method, %err, "abandoning orphaned call");
                    } else {
                        warn!(method, %err, "method call timed out");
                        let _ = dispatcher.events.send(ClientEvent::Error {
                            codes: vec![ErrorCode::MethodCallTimeout],
                        });
                    }
                }
            }
        });
        ClientStatus::Ok
    }

    fn deliver(&self, method: &str, value: Value) {
        let handlers = self.handlers.lock();
        let Some(handler) = handlers.get(method) else {
            warn!(method, "reply without handler");
            return;
        };
        match handler {
            Handler::CodeIdList(f) => decode(method, value, f),
            Handler::CodeIdName(f) => decode(method, value, f),
            Handler::CodeIdLanguage(f) => decode(method, value, f),
            Handler::CodeIdLanguageName(f) => decode(method, value, f),
            Handler::CodeId(f) => decode(method, value, f),
            Handler::CodeIdTracking(f) => decode(method, value, f),
            Handler::U32(f) => {
                match serde_json::from_value::<ReplyU32>(value) {
                    Ok(reply) => f(reply.value),
                    Err(e) => warn!(method, err = %e, "undecodable u32 reply"),
                }
            }
            Handler::Raw(f) => f(value),
        }
    }

    /// Route an incoming signal to its registered handler.
    pub fn handle_signal(&self, name: &str, ids: Vec<String>) {
        let handlers = self.signal_handlers.lock();
        match handlers.get(name) {
            Some(handler) => handler(ids),
            None => debug!(name, "signal without handler"),
        }
    }

    // -- Handler registration (one family per reply shape) ----------------------

    pub fn on_code_id_list(
        &self,
        method: &'static str,
        f: impl Fn(ReplyCodeIdList) + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(method, Handler::CodeIdList(Box::new(f)));
    }

    pub fn on_code_id_name(
        &self,
        method: &'static str,
        f: impl Fn(ReplyCodeIdName) + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(method, Handler::CodeIdName(Box::new(f)));
    }

    pub fn on_code_id_language(
        &self,
        method: &'static str,
        f: impl Fn(ReplyCodeIdLanguage) + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(method, Handler::CodeIdLanguage(Box::new(f)));
    }

    pub fn on_code_id_language_name(
        &self,
        method: &'static str,
        f: impl Fn(ReplyCodeIdLanguageName) + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(method, Handler::CodeIdLanguageName(Box::new(f)));
    }

    pub fn on_code_id(
        &self,
        method: &'static str,
        f: impl Fn(ReplyCodeId) + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(method, Handler::CodeId(Box::new(f)));
    }

    pub fn on_code_id_tracking(
        &self,
        method: &'static str,
        f: impl Fn(ReplyCodeIdTracking) + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(method, Handler::CodeIdTracking(Box::new(f)));
    }

    pub fn on_u32(&self, method: &'static str, f: impl Fn(u32) + Send + Sync + 'static) {
        self.handlers.lock().insert(method, Handler::U32(Box::new(f)));
    }

    pub fn on_raw(&self, method: &'static str, f: impl Fn(Value) + Send + Sync + 'static) {
        self.handlers.lock().insert(method, Handler::Raw(Box::new(f)));
    }

    pub fn on_signal(
        &self,
        name: &'static str,
        f: impl Fn(Vec<String>) + Send + Sync + 'static,
    ) {
        self.signal_handlers.lock().insert(name, Box::new(f));
    }
}

fn decode<T: serde::de::DeserializeOwned, F: Fn(T)>(method: &str, value: Value, f: &F) {
    match serde_json::from_value::<T>(value) {
        Ok(reply) => f(reply),
        Err(e) => warn!(method, err = %e, "undecodable reply"),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
