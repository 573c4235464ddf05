// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use lumenwire::group::LampGroup;
use lumenwire::methods::*;
use lumenwire::state::{LampState, StateField};

use crate::dispatch::{Dispatcher, ReplyShape};
use crate::error::ClientStatus;
use crate::event::{ClientEvent, GroupEvent};
use crate::managers::args;

/// Lamp-group catalog operations and group-wide effects.
pub struct LampGroupManager {
    dispatcher: Arc<Dispatcher>,
}

impl LampGroupManager {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn get_all_ids(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_ALL_LAMP_GROUP_IDS, json!({}), ReplyShape::CodeIdList)
    }

    pub fn get_name(&self, group_id: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_GROUP_NAME,
            args(GetNameArgs { id: group_id.to_owned(), language: language.to_owned() }),
            ReplyShape::CodeIdLanguageName,
        )
    }

    pub fn set_name(&self, group_id: &str, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            SET_LAMP_GROUP_NAME,
            args(SetNameArgs {
                id: group_id.to_owned(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdLanguage,
        )
    }

    pub fn create(&self, group: &LampGroup, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            CREATE_LAMP_GROUP,
            args(CreateLampGroupArgs {
                group: group.clone(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdTracking,
        )
    }

    pub fn update(&self, group_id: &str, group: &LampGroup) -> ClientStatus {
        self.dispatcher.dispatch(
            UPDATE_LAMP_GROUP,
            args(UpdateLampGroupArgs { id: group_id.to_owned(), group: group.clone() }),
            ReplyShape::CodeId,
        )
    }

    pub fn delete(&self, group_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            DELETE_LAMP_GROUP,
            args(IdArgs { id: group_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }

    pub fn get(&self, group_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_GROUP,
            args(IdArgs { id: group_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn transition_state(
        &self,
        group_id: &str,
        state: LampState,
        transition_period: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            TRANSITION_LAMP_GROUP_STATE,
            args(TransitionStateArgs { id: group_id.to_owned(), state, transition_period }),
            ReplyShape::CodeId,
        )
    }

    /// Generic field-oriented mutation; the named wrappers below are sugar.
    pub fn transition_state_field(
        &self,
        group_id: &str,
        field: StateField,
        value: Value,
        transition_period: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            TRANSITION_LAMP_GROUP_STATE_FIELD,
            args(TransitionFieldArgs {
                id: group_id.to_owned(),
                field: field.as_str().to_owned(),
                value,
                transition_period,
            }),
            ReplyShape::CodeIdName,
        )
    }

    pub fn transition_on_off(&self, group_id: &str, on_off: bool) -> ClientStatus {
        self.transition_state_field(group_id, StateField::OnOff, json!(on_off), 0)
    }

    pub fn transition_hue(&self, group_id: &str, hue: u32, period: u32) -> ClientStatus {
        self.transition_state_field(group_id, StateField::Hue, json!(hue), period)
    }

    pub fn transition_saturation(
        &self,
        group_id: &str,
        saturation: u32,
        period: u32,
    ) -> ClientStatus {
        self.transition_state_field(group_id, StateField::Saturation, json!(saturation), period)
    }

    pub fn transition_brightness(
        &self,
        group_id: &str,
        brightness: u32,
        period: u32,
    ) -> ClientStatus {
        self.transition_state_field(group_id, StateField::Brightness, json!(brightness), period)
    }

    pub fn transition_color_temp(
        &self,
        group_id: &str,
        color_temp: u32,
        period: u32,
    ) -> ClientStatus {
        self.transition_state_field(group_id, StateField::ColorTemp, json!(color_temp), period)
    }

    pub fn transition_to_preset(
        &self,
        group_id: &str,
        preset_id: &str,
        transition_period: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            TRANSITION_LAMP_GROUP_STATE_TO_PRESET,
            args(TransitionPresetArgs {
                id: group_id.to_owned(),
                preset_id: preset_id.to_owned(),
                transition_period,
            }),
            ReplyShape::CodeId,
        )
    }

    pub fn pulse_with_state(
        &self,
        group_id: &str,
        from_state: LampState,
        to_state: LampState,
        period: u32,
        duration: u32,
        num_pulses: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            PULSE_LAMP_GROUP_WITH_STATE,
            args(PulseStateArgs {
                id: group_id.to_owned(),
                from_state,
                to_state,
                period,
                duration,
                num_pulses,
            }),
            ReplyShape::CodeId,
        )
    }

    pub fn pulse_with_preset(
        &self,
        group_id: &str,
        from_preset: &str,
        to_preset: &str,
        period: u32,
        duration: u32,
        num_pulses: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            PULSE_LAMP_GROUP_WITH_PRESET,
            args(PulsePresetArgs {
                id: group_id.to_owned(),
                from_preset: from_preset.to_owned(),
                to_preset: to_preset.to_owned(),
                period,
                duration,
                num_pulses,
            }),
            ReplyShape::CodeId,
        )
    }

    pub fn reset_state(&self, group_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            RESET_LAMP_GROUP_STATE,
            args(IdArgs { id: group_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }

    pub fn reset_state_field(&self, group_id: &str, field: StateField) -> ClientStatus {
        self.dispatcher.dispatch(
            RESET_LAMP_GROUP_STATE_FIELD,
            args(ResetFieldArgs { id: group_id.to_owned(), field: field.as_str().to_owned() }),
            ReplyShape::CodeIdName,
        )
    }
}

pub(crate) fn register(d: &Dispatcher, events: &mpsc::UnboundedSender<ClientEvent>) {
    let send = |tx: &mpsc::UnboundedSender<ClientEvent>, event: GroupEvent| {
        let _ = tx.send(ClientEvent::Group(event));
    };

    let tx = events.clone();
    d.on_code_id_list(GET_ALL_LAMP_GROUP_IDS, move |r| send(&tx, GroupEvent::AllIds(r)));
    let tx = events.clone();
    d.on_code_id_language_name(GET_LAMP_GROUP_NAME, move |r| send(&tx, GroupEvent::Name(r)));
    let tx = events.clone();
    d.on_code_id_language(SET_LAMP_GROUP_NAME, move |r| send(&tx, GroupEvent::NameSet(r)));
    let tx = events.clone();
    d.on_code_id_tracking(CREATE_LAMP_GROUP, move |r| send(&tx, GroupEvent::Created(r)));
    let tx = events.clone();
    d.on_code_id(UPDATE_LAMP_GROUP, move |r| send(&tx, GroupEvent::Updated(r)));
    let tx = events.clone();
    d.on_code_id(DELETE_LAMP_GROUP, move |r| send(&tx, GroupEvent::Deleted(r)));
    let tx = events.clone();
    d.on_raw(GET_LAMP_GROUP, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, GroupEvent::Got(r));
        }
    });
    let tx = events.clone();
    d.on_code_id(TRANSITION_LAMP_GROUP_STATE, move |r| {
        send(&tx, GroupEvent::StateTransitioned(r));
    });
    let tx = events.clone();
    d.on_code_id_name(TRANSITION_LAMP_GROUP_STATE_FIELD, move |r| {
        send(&tx, GroupEvent::FieldTransitioned(r));
    });
    let tx = events.clone();
    d.on_code_id(TRANSITION_LAMP_GROUP_STATE_TO_PRESET, move |r| {
        send(&tx, GroupEvent::PresetApplied(r));
    });
    let tx = events.clone();
    d.on_code_id(PULSE_LAMP_GROUP_WITH_STATE, move |r| send(&tx, GroupEvent::Pulsed(r)));
    let tx = events.clone();
    d.on_code_id(PULSE_LAMP_GROUP_WITH_PRESET, move |r| send(&tx, GroupEvent::Pulsed(r)));
    let tx = events.clone();
    d.on_code_id(RESET_LAMP_GROUP_STATE, move |r| send(&tx, GroupEvent::StateReset(r)));
    let tx = events.clone();
    d.on_code_id_name(RESET_LAMP_GROUP_STATE_FIELD, move |r| {
        send(&tx, GroupEvent::FieldReset(r));
    });

    let tx = events.clone();
    d.on_signal(SIG_LAMP_GROUPS_CREATED, move |ids| {
        send(&tx, GroupEvent::CreatedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_LAMP_GROUPS_UPDATED, move |ids| {
        send(&tx, GroupEvent::UpdatedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_LAMP_GROUPS_DELETED, move |ids| {
        send(&tx, GroupEvent::DeletedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_LAMP_GROUPS_NAME_CHANGED, move |ids| {
        send(&tx, GroupEvent::NamesChangedSignal { ids });
    });
}
