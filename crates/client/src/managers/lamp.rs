// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use lumenwire::methods::*;
use lumenwire::state::{LampState, StateField};

use crate::dispatch::{Dispatcher, ReplyShape};
use crate::error::ClientStatus;
use crate::event::{ClientEvent, LampEvent};
use crate::managers::args;

/// Discovered-lamp operations: names, observed state, direct effects.
pub struct LampManager {
    dispatcher: Arc<Dispatcher>,
}

impl LampManager {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn get_all_ids(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_ALL_LAMP_IDS, json!({}), ReplyShape::CodeIdList)
    }

    pub fn get_name(&self, lamp_id: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_NAME,
            args(GetNameArgs { id: lamp_id.to_owned(), language: language.to_owned() }),
            ReplyShape::CodeIdLanguageName,
        )
    }

    pub fn set_name(&self, lamp_id: &str, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            SET_LAMP_NAME,
            args(SetNameArgs {
                id: lamp_id.to_owned(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdLanguage,
        )
    }

    pub fn get_state(&self, lamp_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_STATE,
            args(IdArgs { id: lamp_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn get_parameters(&self, lamp_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_PARAMETERS,
            args(IdArgs { id: lamp_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn get_details(&self, lamp_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_DETAILS,
            args(IdArgs { id: lamp_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn get_faults(&self, lamp_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_LAMP_FAULTS,
            args(IdArgs { id: lamp_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn clear_fault(&self, lamp_id: &str, fault: u32) -> ClientStatus {
        self.dispatcher.dispatch(
            CLEAR_LAMP_FAULT,
            args(ClearLampFaultArgs { id: lamp_id.to_owned(), fault }),
            ReplyShape::CodeId,
        )
    }

    pub fn transition_state(
        &self,
        lamp_id: &str,
        state: LampState,
        transition_period: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            TRANSITION_LAMP_STATE,
            args(TransitionStateArgs { id: lamp_id.to_owned(), state, transition_period }),
            ReplyShape::CodeId,
        )
    }

    /// Generic field-oriented mutation; the named wrappers below are sugar.
    pub fn transition_state_field(
        &self,
        lamp_id: &str,
        field: StateField,
        value: Value,
        transition_period: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            TRANSITION_LAMP_STATE_FIELD,
            args(TransitionFieldArgs {
                id: lamp_id.to_owned(),
                field: field.as_str().to_owned(),
                value,
                transition_period,
            }),
            ReplyShape::CodeIdName,
        )
    }

    pub fn transition_on_off(&self, lamp_id: &str, on_off: bool) -> ClientStatus {
        self.transition_state_field(lamp_id, StateField::OnOff, json!(on_off), 0)
    }

    pub fn transition_hue(&self, lamp_id: &str, hue: u32, period: u32) -> ClientStatus {
        self.transition_state_field(lamp_id, StateField::Hue, json!(hue), period)
    }

    pub fn transition_saturation(&self, lamp_id: &str, saturation: u32, period: u32) -> ClientStatus {
        self.transition_state_field(lamp_id, StateField::Saturation, json!(saturation), period)
    }

    pub fn transition_brightness(&self, lamp_id: &str, brightness: u32, period: u32) -> ClientStatus {
        self.transition_state_field(lamp_id, StateField::Brightness, json!(brightness), period)
    }

    pub fn transition_color_temp(&self, lamp_id: &str, color_temp: u32, period: u32) -> ClientStatus {
        self.transition_state_field(lamp_id, StateField::ColorTemp, json!(color_temp), period)
    }

    pub fn transition_to_preset(
        &self,
        lamp_id: &str,
        preset_id: &str,
        transition_period: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            TRANSITION_LAMP_STATE_TO_PRESET,
            args(TransitionPresetArgs {
                id: lamp_id.to_owned(),
                preset_id: preset_id.to_owned(),
                transition_period,
            }),
            ReplyShape::CodeId,
        )
    }

    pub fn pulse_with_state(
        &self,
        lamp_id: &str,
        from_state: LampState,
        to_state: LampState,
        period: u32,
        duration: u32,
        num_pulses: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            PULSE_LAMP_WITH_STATE,
            args(PulseStateArgs {
                id: lamp_id.to_owned(),
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
        lamp_id: &str,
        from_preset: &str,
        to_preset: &str,
        period: u32,
        duration: u32,
        num_pulses: u32,
    ) -> ClientStatus {
        self.dispatcher.dispatch(
            PULSE_LAMP_WITH_PRESET,
            args(PulsePresetArgs {
                id: lamp_id.to_owned(),
                from_preset: from_preset.to_owned(),
                to_preset: to_preset.to_owned(),
                period,
                duration,
                num_pulses,
            }),
            ReplyShape::CodeId,
        )
    }

    pub fn reset_state(&self, lamp_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            RESET_LAMP_STATE,
            args(IdArgs { id: lamp_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }

    pub fn reset_state_field(&self, lamp_id: &str, field: StateField) -> ClientStatus {
        self.dispatcher.dispatch(
            RESET_LAMP_STATE_FIELD,
            args(ResetFieldArgs { id: lamp_id.to_owned(), field: field.as_str().to_owned() }),
            ReplyShape::CodeIdName,
        )
    }
}

pub(crate) fn register(d: &Dispatcher, events: &mpsc::UnboundedSender<ClientEvent>) {
    let send = |tx: &mpsc::UnboundedSender<ClientEvent>, event: LampEvent| {
        let _ = tx.send(ClientEvent::Lamp(event));
    };

    let tx = events.clone();
    d.on_code_id_list(GET_ALL_LAMP_IDS, move |r| send(&tx, LampEvent::AllIds(r)));
    let tx = events.clone();
    d.on_code_id_language_name(GET_LAMP_NAME, move |r| send(&tx, LampEvent::Name(r)));
    let tx = events.clone();
    d.on_code_id_language(SET_LAMP_NAME, move |r| send(&tx, LampEvent::NameSet(r)));
    let tx = events.clone();
    d.on_raw(GET_LAMP_STATE, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, LampEvent::State(r));
        }
    });
    let tx = events.clone();
    d.on_raw(GET_LAMP_PARAMETERS, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, LampEvent::Parameters(r));
        }
    });
    let tx = events.clone();
    d.on_raw(GET_LAMP_DETAILS, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, LampEvent::Details(r));
        }
    });
    let tx = events.clone();
    d.on_raw(GET_LAMP_FAULTS, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, LampEvent::Faults(r));
        }
    });
    let tx = events.clone();
    d.on_code_id(CLEAR_LAMP_FAULT, move |r| send(&tx, LampEvent::FaultCleared(r)));
    let tx = events.clone();
    d.on_code_id(TRANSITION_LAMP_STATE, move |r| send(&tx, LampEvent::StateTransitioned(r)));
    let tx = events.clone();
    d.on_code_id_name(TRANSITION_LAMP_STATE_FIELD, move |r| {
        send(&tx, LampEvent::FieldTransitioned(r));
    });
    let tx = events.clone();
    d.on_code_id(TRANSITION_LAMP_STATE_TO_PRESET, move |r| {
        send(&tx, LampEvent::PresetApplied(r));
    });
    let tx = events.clone();
    d.on_code_id(PULSE_LAMP_WITH_STATE, move |r| send(&tx, LampEvent::Pulsed(r)));
    let tx = events.clone();
    d.on_code_id(PULSE_LAMP_WITH_PRESET, move |r| send(&tx, LampEvent::Pulsed(r)));
    let tx = events.clone();
    d.on_code_id(RESET_LAMP_STATE, move |r| send(&tx, LampEvent::StateReset(r)));
    let tx = events.clone();
    d.on_code_id_name(RESET_LAMP_STATE_FIELD, move |r| send(&tx, LampEvent::FieldReset(r)));

    let tx = events.clone();
    d.on_signal(SIG_LAMPS_NAME_CHANGED, move |ids| {
        send(&tx, LampEvent::NamesChangedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_LAMP_STATE_CHANGED, move |ids| {
        send(&tx, LampEvent::StateChangedSignal { ids });
    });
}
