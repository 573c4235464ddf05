// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single event stream a host application consumes.
//!
//! Method replies and catalog-change signals are folded into per-domain
//! enums; connection lifecycle and transport errors arrive at the top
//! level. Reply payloads reuse the wire reply structs directly.

use lumenwire::methods::{
    GetDefaultStateReply, GetLampDetailsReply, GetLampFaultsReply, GetLampGroupReply,
    GetLampParametersReply, GetLampStateReply, GetMasterSceneReply, GetPresetReply, GetSceneReply,
    ReplyCodeId, ReplyCodeIdLanguage, ReplyCodeIdLanguageName, ReplyCodeIdList, ReplyCodeIdName,
    ReplyCodeIdTracking,
};

use crate::error::ErrorCode;

/// Everything the client reports to its host.
#[derive(Debug)]
pub enum ClientEvent {
    /// A session with the elected leader is live.
    Connected { device_id: String, device_name: String },
    /// Joining the elected leader failed; the tracker keeps listening.
    ConnectFailed { device_id: String, device_name: String },
    /// The leader session went away.
    Disconnected { device_id: String, device_name: String },
    /// The connected leader renamed itself.
    ControllerNameChanged { device_id: String, device_name: String },
    /// Transport-level errors (timeouts, registration failures).
    Error { codes: Vec<ErrorCode> },

    ServiceVersion(u32),
    LightingResetReply(u32),
    LightingResetSignal,

    Lamp(LampEvent),
    Group(GroupEvent),
    Preset(PresetEvent),
    Scene(SceneEvent),
    Master(MasterEvent),
}

#[derive(Debug)]
pub enum LampEvent {
    AllIds(ReplyCodeIdList),
    Name(ReplyCodeIdLanguageName),
    NameSet(ReplyCodeIdLanguage),
    State(GetLampStateReply),
    Parameters(GetLampParametersReply),
    Details(GetLampDetailsReply),
    Faults(GetLampFaultsReply),
    FaultCleared(ReplyCodeId),
    StateTransitioned(ReplyCodeId),
    FieldTransitioned(ReplyCodeIdName),
    PresetApplied(ReplyCodeId),
    Pulsed(ReplyCodeId),
    StateReset(ReplyCodeId),
    FieldReset(ReplyCodeIdName),
    NamesChangedSignal { ids: Vec<String> },
    StateChangedSignal { ids: Vec<String> },
}

#[derive(Debug)]
pub enum GroupEvent {
    AllIds(ReplyCodeIdList),
    Name(ReplyCodeIdLanguageName),
    NameSet(ReplyCodeIdLanguage),
    Created(ReplyCodeIdTracking),
    Updated(ReplyCodeId),
    Deleted(ReplyCodeId),
    Got(GetLampGroupReply),
    StateTransitioned(ReplyCodeId),
    FieldTransitioned(ReplyCodeIdName),
    PresetApplied(ReplyCodeId),
    Pulsed(ReplyCodeId),
    StateReset(ReplyCodeId),
    FieldReset(ReplyCodeIdName),
    CreatedSignal { ids: Vec<String> },
    UpdatedSignal { ids: Vec<String> },
    DeletedSignal { ids: Vec<String> },
    NamesChangedSignal { ids: Vec<String> },
}

#[derive(Debug)]
pub enum PresetEvent {
    AllIds(ReplyCodeIdList),
    Name(ReplyCodeIdLanguageName),
    NameSet(ReplyCodeIdLanguage),
    Created(ReplyCodeIdTracking),
    Updated(ReplyCodeId),
    Deleted(ReplyCodeId),
    Got(GetPresetReply),
    DefaultState(GetDefaultStateReply),
    DefaultStateSet(ReplyCodeId),
    CreatedSignal { ids: Vec<String> },
    UpdatedSignal { ids: Vec<String> },
    DeletedSignal { ids: Vec<String> },
    NamesChangedSignal { ids: Vec<String> },
    DefaultStateChangedSignal,
}

#[derive(Debug)]
pub enum SceneEvent {
    AllIds(ReplyCodeIdList),
    Name(ReplyCodeIdLanguageName),
    NameSet(ReplyCodeIdLanguage),
    Created(ReplyCodeIdTracking),
    Updated(ReplyCodeId),
    Deleted(ReplyCodeId),
    Got(GetSceneReply),
    Applied(ReplyCodeId),
    CreatedSignal { ids: Vec<String> },
    UpdatedSignal { ids: Vec<String> },
    DeletedSignal { ids: Vec<String> },
    NamesChangedSignal { ids: Vec<String> },
    AppliedSignal { ids: Vec<String> },
}

#[derive(Debug)]
pub enum MasterEvent {
    AllIds(ReplyCodeIdList),
    Name(ReplyCodeIdLanguageName),
    NameSet(ReplyCodeIdLanguage),
    Created(ReplyCodeIdTracking),
    Updated(ReplyCodeId),
    Deleted(ReplyCodeId),
    Got(GetMasterSceneReply),
    Applied(ReplyCodeId),
    CreatedSignal { ids: Vec<String> },
    UpdatedSignal { ids: Vec<String> },
    DeletedSignal { ids: Vec<String> },
    NamesChangedSignal { ids: Vec<String> },
    AppliedSignal { ids: Vec<String> },
}
