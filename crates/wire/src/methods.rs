// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method and signal names plus their JSON payload shapes.
//!
//! Both tiers route by these strings, so they live here rather than in
//! either tier. Argument and reply payloads are plain serde structs carried
//! as JSON objects on the bus.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::group::LampGroup;
use crate::response::ResponseCode;
use crate::scene::{MasterScene, Scene};
use crate::state::{LampDetails, LampParameters, LampState, StatePatch};

// -- Method names --------------------------------------------------------------

pub const GET_CONTROLLER_SERVICE_VERSION: &str = "GetControllerServiceVersion";
pub const LIGHTING_RESET_CONTROLLER_SERVICE: &str = "LightingResetControllerService";

pub const GET_ALL_LAMP_IDS: &str = "GetAllLampIDs";
pub const GET_LAMP_NAME: &str = "GetLampName";
pub const SET_LAMP_NAME: &str = "SetLampName";
pub const GET_LAMP_STATE: &str = "GetLampState";
pub const GET_LAMP_PARAMETERS: &str = "GetLampParameters";
pub const GET_LAMP_DETAILS: &str = "GetLampDetails";
pub const GET_LAMP_FAULTS: &str = "GetLampFaults";
pub const CLEAR_LAMP_FAULT: &str = "ClearLampFault";
pub const TRANSITION_LAMP_STATE: &str = "TransitionLampState";
pub const TRANSITION_LAMP_STATE_FIELD: &str = "TransitionLampStateField";
pub const TRANSITION_LAMP_STATE_TO_PRESET: &str = "TransitionLampStateToPreset";
pub const PULSE_LAMP_WITH_STATE: &str = "PulseLampWithState";
pub const PULSE_LAMP_WITH_PRESET: &str = "PulseLampWithPreset";
pub const RESET_LAMP_STATE: &str = "ResetLampState";
pub const RESET_LAMP_STATE_FIELD: &str = "ResetLampStateField";

pub const GET_ALL_LAMP_GROUP_IDS: &str = "GetAllLampGroupIDs";
pub const GET_LAMP_GROUP_NAME: &str = "GetLampGroupName";
pub const SET_LAMP_GROUP_NAME: &str = "SetLampGroupName";
pub const CREATE_LAMP_GROUP: &str = "CreateLampGroup";
pub const UPDATE_LAMP_GROUP: &str = "UpdateLampGroup";
pub const DELETE_LAMP_GROUP: &str = "DeleteLampGroup";
pub const GET_LAMP_GROUP: &str = "GetLampGroup";
pub const TRANSITION_LAMP_GROUP_STATE: &str = "TransitionLampGroupState";
pub const TRANSITION_LAMP_GROUP_STATE_FIELD: &str = "TransitionLampGroupStateField";
pub const TRANSITION_LAMP_GROUP_STATE_TO_PRESET: &str = "TransitionLampGroupStateToPreset";
pub const PULSE_LAMP_GROUP_WITH_STATE: &str = "PulseLampGroupWithState";
pub const PULSE_LAMP_GROUP_WITH_PRESET: &str = "PulseLampGroupWithPreset";
pub const RESET_LAMP_GROUP_STATE: &str = "ResetLampGroupState";
pub const RESET_LAMP_GROUP_STATE_FIELD: &str = "ResetLampGroupStateField";

pub const GET_ALL_PRESET_IDS: &str = "GetAllPresetIDs";
pub const GET_PRESET_NAME: &str = "GetPresetName";
pub const SET_PRESET_NAME: &str = "SetPresetName";
pub const CREATE_PRESET: &str = "CreatePreset";
pub const UPDATE_PRESET: &str = "UpdatePreset";
pub const DELETE_PRESET: &str = "DeletePreset";
pub const GET_PRESET: &str = "GetPreset";
pub const GET_DEFAULT_LAMP_STATE: &str = "GetDefaultLampState";
pub const SET_DEFAULT_LAMP_STATE: &str = "SetDefaultLampState";

pub const GET_ALL_SCENE_IDS: &str = "GetAllSceneIDs";
pub const GET_SCENE_NAME: &str = "GetSceneName";
pub const SET_SCENE_NAME: &str = "SetSceneName";
pub const CREATE_SCENE: &str = "CreateScene";
pub const UPDATE_SCENE: &str = "UpdateScene";
pub const DELETE_SCENE: &str = "DeleteScene";
pub const GET_SCENE: &str = "GetScene";
pub const APPLY_SCENE: &str = "ApplyScene";

pub const GET_ALL_MASTER_SCENE_IDS: &str = "GetAllMasterSceneIDs";
pub const GET_MASTER_SCENE_NAME: &str = "GetMasterSceneName";
pub const SET_MASTER_SCENE_NAME: &str = "SetMasterSceneName";
pub const CREATE_MASTER_SCENE: &str = "CreateMasterScene";
pub const UPDATE_MASTER_SCENE: &str = "UpdateMasterScene";
pub const DELETE_MASTER_SCENE: &str = "DeleteMasterScene";
pub const GET_MASTER_SCENE: &str = "GetMasterScene";
pub const APPLY_MASTER_SCENE: &str = "ApplyMasterScene";

/// Method on the lamp face: submit a batched effect program.
pub const APPLY_PROGRAM: &str = "ApplyProgram";
/// Method on the lamp face: clear one fault code.
pub const LAMP_CLEAR_FAULT: &str = "ClearFault";

// -- Signal names --------------------------------------------------------------

pub const SIG_LAMPS_NAME_CHANGED: &str = "LampsNameChanged";
pub const SIG_LAMP_STATE_CHANGED: &str = "LampStateChanged";
pub const SIG_LAMP_GROUPS_NAME_CHANGED: &str = "LampGroupsNameChanged";
pub const SIG_LAMP_GROUPS_CREATED: &str = "LampGroupsCreated";
pub const SIG_LAMP_GROUPS_UPDATED: &str = "LampGroupsUpdated";
pub const SIG_LAMP_GROUPS_DELETED: &str = "LampGroupsDeleted";
pub const SIG_PRESETS_NAME_CHANGED: &str = "PresetsNameChanged";
pub const SIG_PRESETS_CREATED: &str = "PresetsCreated";
pub const SIG_PRESETS_UPDATED: &str = "PresetsUpdated";
pub const SIG_PRESETS_DELETED: &str = "PresetsDeleted";
pub const SIG_SCENES_NAME_CHANGED: &str = "ScenesNameChanged";
pub const SIG_SCENES_CREATED: &str = "ScenesCreated";
pub const SIG_SCENES_UPDATED: &str = "ScenesUpdated";
pub const SIG_SCENES_DELETED: &str = "ScenesDeleted";
pub const SIG_SCENES_APPLIED: &str = "ScenesApplied";
pub const SIG_MASTER_SCENES_NAME_CHANGED: &str = "MasterScenesNameChanged";
pub const SIG_MASTER_SCENES_CREATED: &str = "MasterScenesCreated";
pub const SIG_MASTER_SCENES_UPDATED: &str = "MasterScenesUpdated";
pub const SIG_MASTER_SCENES_DELETED: &str = "MasterScenesDeleted";
pub const SIG_MASTER_SCENES_APPLIED: &str = "MasterScenesApplied";
pub const SIG_DEFAULT_LAMP_STATE_CHANGED: &str = "DefaultLampStateChanged";
pub const SIG_LIGHTING_RESET: &str = "ControllerServiceLightingReset";

// -- Common argument shapes ----------------------------------------------------

/// Argument for calls addressing one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdArgs {
    pub id: String,
}

/// Argument for `Get*Name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNameArgs {
    pub id: String,
    pub language: String,
}

/// Argument for `Set*Name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetNameArgs {
    pub id: String,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLampGroupArgs {
    pub group: LampGroup,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLampGroupArgs {
    pub id: String,
    pub group: LampGroup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePresetArgs {
    pub preset: StatePatch,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePresetArgs {
    pub id: String,
    pub preset: StatePatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSceneArgs {
    pub scene: Scene,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSceneArgs {
    pub id: String,
    pub scene: Scene,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMasterSceneArgs {
    pub master: MasterScene,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMasterSceneArgs {
    pub id: String,
    pub master: MasterScene,
}

/// Argument for `TransitionLampState` / `TransitionLampGroupState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionStateArgs {
    pub id: String,
    pub state: LampState,
    pub transition_period: u32,
}

/// Argument for the generic field-oriented mutation; `field` is one of the
/// [`crate::state::StateField`] names, `value` a bool for `OnOff` and a u32
/// otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionFieldArgs {
    pub id: String,
    pub field: String,
    pub value: serde_json::Value,
    pub transition_period: u32,
}

/// Argument for `TransitionLampStateToPreset` and the group variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionPresetArgs {
    pub id: String,
    pub preset_id: String,
    pub transition_period: u32,
}

/// Argument for `PulseLampWithState` / `PulseLampGroupWithState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseStateArgs {
    pub id: String,
    pub from_state: LampState,
    pub to_state: LampState,
    pub period: u32,
    pub duration: u32,
    pub num_pulses: u32,
}

/// Argument for `PulseLampWithPreset` / `PulseLampGroupWithPreset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulsePresetArgs {
    pub id: String,
    pub from_preset: String,
    pub to_preset: String,
    pub period: u32,
    pub duration: u32,
    pub num_pulses: u32,
}

/// Argument for `ResetLampStateField` and the group variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetFieldArgs {
    pub id: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDefaultStateArgs {
    pub state: LampState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearLampFaultArgs {
    pub id: String,
    pub fault: u32,
}

// -- Reply shapes --------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCodeIdList {
    pub code: ResponseCode,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCodeIdName {
    pub code: ResponseCode,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCodeIdLanguageName {
    pub code: ResponseCode,
    pub id: String,
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCodeId {
    pub code: ResponseCode,
    pub id: String,
}

/// Reply for `Set*Name`: `(code, id, language)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCodeIdLanguage {
    pub code: ResponseCode,
    pub id: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCodeIdTracking {
    pub code: ResponseCode,
    pub id: String,
    pub tracking_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyU32 {
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLampGroupReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<LampGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPresetReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<StatePatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSceneReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Scene>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMasterSceneReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterScene>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLampStateReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<LampState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLampParametersReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<LampParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLampDetailsReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<LampDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLampFaultsReply {
    pub code: ResponseCode,
    pub id: String,
    #[serde(default)]
    pub faults: BTreeSet<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDefaultStateReply {
    pub code: ResponseCode,
    pub state: LampState,
}
