// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use lumenwire::methods::*;
use lumenwire::state::{LampState, StatePatch};

use crate::dispatch::{Dispatcher, ReplyShape};
use crate::error::ClientStatus;
use crate::event::{ClientEvent, PresetEvent};
use crate::managers::args;

/// Preset catalog operations plus the default lamp state.
pub struct PresetManager {
    dispatcher: Arc<Dispatcher>,
}

impl PresetManager {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn get_all_ids(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_ALL_PRESET_IDS, json!({}), ReplyShape::CodeIdList)
    }

    pub fn get_name(&self, preset_id: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_PRESET_NAME,
            args(GetNameArgs { id: preset_id.to_owned(), language: language.to_owned() }),
            ReplyShape::CodeIdLanguageName,
        )
    }

    pub fn set_name(&self, preset_id: &str, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            SET_PRESET_NAME,
            args(SetNameArgs {
                id: preset_id.to_owned(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdLanguage,
        )
    }

    pub fn create(&self, preset: StatePatch, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            CREATE_PRESET,
            args(CreatePresetArgs {
                preset,
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdTracking,
        )
    }

    pub fn update(&self, preset_id: &str, preset: StatePatch) -> ClientStatus {
        self.dispatcher.dispatch(
            UPDATE_PRESET,
            args(UpdatePresetArgs { id: preset_id.to_owned(), preset }),
            ReplyShape::CodeId,
        )
    }

    pub fn delete(&self, preset_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            DELETE_PRESET,
            args(IdArgs { id: preset_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }

    pub fn get(&self, preset_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_PRESET,
            args(IdArgs { id: preset_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn get_default_state(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_DEFAULT_LAMP_STATE, json!({}), ReplyShape::Raw)
    }

    pub fn set_default_state(&self, state: LampState) -> ClientStatus {
        self.dispatcher.dispatch(
            SET_DEFAULT_LAMP_STATE,
            args(SetDefaultStateArgs { state }),
            ReplyShape::Raw,
        )
    }
}

pub(crate) fn register(d: &Dispatcher, events: &mpsc::UnboundedSender<ClientEvent>) {
    let send = |tx: &mpsc::UnboundedSender<ClientEvent>, event: PresetEvent| {
        let _ = tx.send(ClientEvent::Preset(event));
    };

    let tx = events.clone();
    d.on_code_id_list(GET_ALL_PRESET_IDS, move |r| send(&tx, PresetEvent::AllIds(r)));
    let tx = events.clone();
    d.on_code_id_language_name(GET_PRESET_NAME, move |r| send(&tx, PresetEvent::Name(r)));
    let tx = events.clone();
    d.on_code_id_language(SET_PRESET_NAME, move |r| send(&tx, PresetEvent::NameSet(r)));
    let tx = events.clone();
    d.on_code_id_tracking(CREATE_PRESET, move |r| send(&tx, PresetEvent::Created(r)));
    let tx = events.clone();
    d.on_code_id(UPDATE_PRESET, move |r| send(&tx, PresetEvent::Updated(r)));
    let tx = events.clone();
    d.on_code_id(DELETE_PRESET, move |r| send(&tx, PresetEvent::Deleted(r)));
    let tx = events.clone();
    d.on_raw(GET_PRESET, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, PresetEvent::Got(r));
        }
    });
    let tx = events.clone();
    d.on_raw(GET_DEFAULT_LAMP_STATE, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, PresetEvent::DefaultState(r));
        }
    });
    let tx = events.clone();
    d.on_raw(SET_DEFAULT_LAMP_STATE, move |v| {
        if let Ok(code) = serde_json::from_value(v["code"].clone()) {
            send(
                &tx,
                PresetEvent::DefaultStateSet(ReplyCodeId { code, id: String::new() }),
            );
        }
    });

    let tx = events.clone();
    d.on_signal(SIG_PRESETS_CREATED, move |ids| send(&tx, PresetEvent::CreatedSignal { ids }));
    let tx = events.clone();
    d.on_signal(SIG_PRESETS_UPDATED, move |ids| send(&tx, PresetEvent::UpdatedSignal { ids }));
    let tx = events.clone();
    d.on_signal(SIG_PRESETS_DELETED, move |ids| send(&tx, PresetEvent::DeletedSignal { ids }));
    let tx = events.clone();
    d.on_signal(SIG_PRESETS_NAME_CHANGED, move |ids| {
        send(&tx, PresetEvent::NamesChangedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_DEFAULT_LAMP_STATE_CHANGED, move |_| {
        send(&tx, PresetEvent::DefaultStateChangedSignal);
    });
}
