// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-domain managers: typed translation layers over the dispatcher.
//!
//! Each manager turns typed arguments into wire payloads and declares the
//! reply shape; decoded replies and signals surface as [`ClientEvent`]s on
//! the host's event stream.

pub mod group;
pub mod lamp;
pub mod master;
pub mod preset;
pub mod scene;

pub use group::LampGroupManager;
pub use lamp::LampManager;
pub use master::MasterSceneManager;
pub use preset::PresetManager;
pub use scene::SceneManager;

use serde_json::Value;
use tokio::sync::mpsc;

use lumenwire::methods::{
    GET_CONTROLLER_SERVICE_VERSION, LIGHTING_RESET_CONTROLLER_SERVICE, SIG_LIGHTING_RESET,
};

use crate::dispatch::Dispatcher;
use crate::event::ClientEvent;

/// Wire one handler per method reply and per signal, across all domains.
pub(crate) fn register_all(
    dispatcher: &Dispatcher,
    events: &mpsc::UnboundedSender<ClientEvent>,
) {
    lamp::register(dispatcher, events);
    group::register(dispatcher, events);
    preset::register(dispatcher, events);
    scene::register(dispatcher, events);
    master::register(dispatcher, events);

    let tx = events.clone();
    dispatcher.on_u32(GET_CONTROLLER_SERVICE_VERSION, move |value| {
        let _ = tx.send(ClientEvent::ServiceVersion(value));
    });
    let tx = events.clone();
    dispatcher.on_u32(LIGHTING_RESET_CONTROLLER_SERVICE, move |value| {
        let _ = tx.send(ClientEvent::LightingResetReply(value));
    });
    let tx = events.clone();
    dispatcher.on_signal(SIG_LIGHTING_RESET, move |_| {
        let _ = tx.send(ClientEvent::LightingResetSignal);
    });
}

/// Serialize a wire argument struct; payload structs cannot fail to encode.
pub(crate) fn args<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
