// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The controller service: catalog owner, method router, and scene
//! executor.
//!
//! The run loop drains bus and pool events; every incoming method call is
//! handled on its own task so a slow lamp never stalls the transport.
//! Handlers reply first, then flush change signals, so a caller always sees
//! its own reply before the matching signal.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumenwire::bus::{Announcement, LampBus, ServiceBus, ServiceBusEvent, SessionId};
use lumenwire::effect::{EffectDescriptor, LampProgram};
use lumenwire::group::{LampGroup, ALL_LAMPS};
use lumenwire::methods::*;
use lumenwire::response::ResponseCode;
use lumenwire::scene::{MasterScene, Scene};
use lumenwire::state::{LampState, StateField, StatePatch};

use crate::catalog::{DefaultState, LampDirectory, Store};
use crate::deps::{
    expand_targets, group_delete_blocked, preset_delete_blocked, scene_delete_blocked,
    is_group_cyclic,
};
use crate::exec::{compile_scene, CompileInputs};
use crate::lamps::{LampPool, PoolConfig, PoolEvent};
use crate::signals::{Broadcaster, SignalBatch};

/// Version reported by `GetControllerServiceVersion`.
pub const CONTROLLER_SERVICE_VERSION: u32 = 2;

/// Startup parameters for [`ControllerService::start`].
pub struct ServiceConfig {
    pub announcement: Announcement,
    pub announce_interval: Duration,
    pub pool: PoolConfig,
}

pub struct ControllerService {
    bus: Arc<dyn ServiceBus>,
    broadcaster: Broadcaster,
    pool: Arc<LampPool>,
    lamps: Arc<LampDirectory>,
    groups: Store<LampGroup>,
    presets: Store<StatePatch>,
    scenes: Store<Scene>,
    master_scenes: Store<MasterScene>,
    default_state: DefaultState,
    announcement: Mutex<Announcement>,
    next_tracking: AtomicU32,
    shutdown: CancellationToken,
}

impl ControllerService {
    /// Wire the service to its buses and spawn the run loop.
    pub fn start(
        bus: Arc<dyn ServiceBus>,
        lamp_bus: Arc<dyn LampBus>,
        config: ServiceConfig,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Arc<Self>> {
        let lamps = Arc::new(LampDirectory::new());
        let (pool, pool_events) =
            LampPool::new(lamp_bus, Arc::clone(&lamps), config.pool, shutdown.clone());
        pool.start()?;

        let events = bus.serve(config.announcement.clone())?;
        info!(
            device_id = %config.announcement.device_id,
            rank = config.announcement.rank,
            "controller service announced"
        );

        let service = Arc::new(Self {
            broadcaster: Broadcaster::new(Arc::clone(&bus)),
            bus,
            pool,
            lamps,
            groups: Store::new("lamp group"),
            presets: Store::new("preset"),
            scenes: Store::new("scene"),
            master_scenes: Store::new("master scene"),
            default_state: DefaultState::default(),
            announcement: Mutex::new(config.announcement),
            next_tracking: AtomicU32::new(1),
            shutdown,
        });

        tokio::spawn(Arc::clone(&service).run(events, pool_events, config.announce_interval));
        Ok(service)
    }

    async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ServiceBusEvent>,
        mut pool_events: mpsc::UnboundedReceiver<PoolEvent>,
        announce_interval: Duration,
    ) {
        let mut announce = tokio::time::interval(announce_interval);
        announce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = announce.tick() => {
                    let current = self.announcement.lock().clone();
                    if let Err(e) = self.bus.announce(current) {
                        warn!(err = %e, "periodic announce failed");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        ServiceBusEvent::MethodCall { session, method, args, reply } => {
                            let service = Arc::clone(&self);
                            tokio::spawn(async move {
                                service.handle_method(session, &method, args, reply).await;
                            });
                        }
                        ServiceBusEvent::SessionJoined { session } => {
                            debug!(%session, "client joined");
                        }
                        ServiceBusEvent::SessionLost { session } => {
                            debug!(%session, "client session lost");
                        }
                    }
                }
                event = pool_events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        PoolEvent::LampStateChanged { lamp_id } => {
                            self.broadcaster.emit(SIG_LAMP_STATE_CHANGED, vec![lamp_id]);
                        }
                        PoolEvent::LampDiscovered { lamp_id } => {
                            debug!(lamp_id, "lamp joined the directory");
                        }
                        PoolEvent::LampDropped { lamp_id } => {
                            debug!(lamp_id, "lamp left the directory");
                        }
                    }
                }
            }
        }
    }

    async fn handle_method(
        &self,
        session: SessionId,
        method: &str,
        args: Value,
        reply: oneshot::Sender<Value>,
    ) {
        debug!(%session, method, "method call");
        let mut batch = SignalBatch::new();
        let response = self.route(method, args, &mut batch).await;
        // Reply strictly before the mutation's signals.
        let _ = reply.send(response);
        batch.flush(&self.broadcaster);
    }

    async fn route(&self, method: &str, args: Value, batch: &mut SignalBatch) -> Value {
        match method {
            GET_CONTROLLER_SERVICE_VERSION => reply(ReplyU32 { value: CONTROLLER_SERVICE_VERSION }),
            LIGHTING_RESET_CONTROLLER_SERVICE => self.lighting_reset(batch).await,

            GET_ALL_LAMP_IDS => {
                reply(ReplyCodeIdList { code: ResponseCode::Ok, ids: self.lamps.ids() })
            }
            GET_LAMP_NAME => self.get_lamp_name(args),
            SET_LAMP_NAME => self.set_lamp_name(args, batch),
            GET_LAMP_STATE => self.get_lamp_state(args),
            GET_LAMP_PARAMETERS => self.get_lamp_parameters(args),
            GET_LAMP_DETAILS => self.get_lamp_details(args),
            GET_LAMP_FAULTS => self.get_lamp_faults(args),
            CLEAR_LAMP_FAULT => self.clear_lamp_fault(args).await,
            TRANSITION_LAMP_STATE => self.transition_lamp_state(args).await,
            TRANSITION_LAMP_STATE_FIELD => self.transition_lamp_field(args).await,
            TRANSITION_LAMP_STATE_TO_PRESET => self.transition_lamp_to_preset(args).await,
            PULSE_LAMP_WITH_STATE => self.pulse_lamp_with_state(args).await,
            PULSE_LAMP_WITH_PRESET => self.pulse_lamp_with_preset(args).await,
            RESET_LAMP_STATE => self.reset_lamp_state(args).await,
            RESET_LAMP_STATE_FIELD => self.reset_lamp_field(args).await,

            GET_ALL_LAMP_GROUP_IDS => {
                reply(ReplyCodeIdList { code: ResponseCode::Ok, ids: self.groups.get_all_ids() })
            }
            GET_LAMP_GROUP_NAME => get_name(&self.groups, args),
            SET_LAMP_GROUP_NAME => {
                set_name(&self.groups, args, batch, SIG_LAMP_GROUPS_NAME_CHANGED)
            }
            CREATE_LAMP_GROUP => self.create_group(args, batch),
            UPDATE_LAMP_GROUP => self.update_group(args, batch),
            DELETE_LAMP_GROUP => self.delete_group(args, batch),
            GET_LAMP_GROUP => self.get_group(args),
            TRANSITION_LAMP_GROUP_STATE => self.transition_group_state(args).await,
            TRANSITION_LAMP_GROUP_STATE_FIELD => self.transition_group_field(args).await,
            TRANSITION_LAMP_GROUP_STATE_TO_PRESET => self.transition_group_to_preset(args).await,
            PULSE_LAMP_GROUP_WITH_STATE => self.pulse_group_with_state(args).await,
            PULSE_LAMP_GROUP_WITH_PRESET => self.pulse_group_with_preset(args).await,
            RESET_LAMP_GROUP_STATE => self.reset_group_state(args).await,
            RESET_LAMP_GROUP_STATE_FIELD => self.reset_group_field(args).await,

            GET_ALL_PRESET_IDS => {
                reply(ReplyCodeIdList { code: ResponseCode::Ok, ids: self.presets.get_all_ids() })
            }
            GET_PRESET_NAME => get_name(&self.presets, args),
            SET_PRESET_NAME => set_name(&self.presets, args, batch, SIG_PRESETS_NAME_CHANGED),
            CREATE_PRESET => self.create_preset(args, batch),
            UPDATE_PRESET => self.update_preset(args, batch),
            DELETE_PRESET => self.delete_preset(args, batch),
            GET_PRESET => self.get_preset(args),
            GET_DEFAULT_LAMP_STATE => reply(GetDefaultStateReply {
                code: ResponseCode::Ok,
                state: self.default_state.get(),
            }),
            SET_DEFAULT_LAMP_STATE => self.set_default_state(args, batch),

            GET_ALL_SCENE_IDS => {
                reply(ReplyCodeIdList { code: ResponseCode::Ok, ids: self.scenes.get_all_ids() })
            }
            GET_SCENE_NAME => get_name(&self.scenes, args),
            SET_SCENE_NAME => set_name(&self.scenes, args, batch, SIG_SCENES_NAME_CHANGED),
            CREATE_SCENE => self.create_scene(args, batch),
            UPDATE_SCENE => self.update_scene(args, batch),
            DELETE_SCENE => self.delete_scene(args, batch),
            GET_SCENE => self.get_scene(args),
            APPLY_SCENE => self.apply_scene(args, batch),

            GET_ALL_MASTER_SCENE_IDS => reply(ReplyCodeIdList {
                code: ResponseCode::Ok,
                ids: self.master_scenes.get_all_ids(),
            }),
            GET_MASTER_SCENE_NAME => get_name(&self.master_scenes, args),
            SET_MASTER_SCENE_NAME => {
                set_name(&self.master_scenes, args, batch, SIG_MASTER_SCENES_NAME_CHANGED)
            }
            CREATE_MASTER_SCENE => self.create_master_scene(args, batch),
            UPDATE_MASTER_SCENE => self.update_master_scene(args, batch),
            DELETE_MASTER_SCENE => self.delete_master_scene(args, batch),
            GET_MASTER_SCENE => self.get_master_scene(args),
            APPLY_MASTER_SCENE => self.apply_master_scene(args, batch),

            _ => {
                warn!(method, "unknown method rejected");
                json!({ "code": ResponseCode::ErrRejected })
            }
        }
    }

    // -- Controller service face -----------------------------------------------

    async fn lighting_reset(&self, batch: &mut SignalBatch) -> Value {
        let default = self.default_state.get();
        let lamps = self.lamps.ids();
        let submissions = lamps.iter().map(|lamp_id| {
            self.submit_effects(
                lamp_id.clone(),
                vec![EffectDescriptor::Transition { to: default, transition_period: 0 }],
            )
        });
        join_all(submissions).await;
        batch.add_no_arg(SIG_LIGHTING_RESET);
        reply(ReplyU32 { value: 0 })
    }

    // -- Lamp face --------------------------------------------------------------

    fn get_lamp_name(&self, args: Value) -> Value {
        let Ok(args) = parse::<GetNameArgs>(args) else { return invalid() };
        match self.lamps.get_name(&args.id, &args.language) {
            Ok(name) => reply(ReplyCodeIdLanguageName {
                code: ResponseCode::Ok,
                id: args.id,
                language: args.language,
                name,
            }),
            Err(code) => reply(ReplyCodeIdLanguageName {
                code,
                id: args.id,
                language: args.language,
                name: String::new(),
            }),
        }
    }

    fn set_lamp_name(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<SetNameArgs>(args) else { return invalid() };
        let code = match self.lamps.set_name(&args.id, &args.name, &args.language) {
            Ok(()) => {
                batch.add(SIG_LAMPS_NAME_CHANGED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeIdLanguage { code, id: args.id, language: args.language })
    }

    fn get_lamp_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.lamps.get(&args.id) {
            Ok(record) => reply(GetLampStateReply {
                code: ResponseCode::Ok,
                id: args.id,
                state: Some(record.state),
            }),
            Err(code) => reply(GetLampStateReply { code, id: args.id, state: None }),
        }
    }

    fn get_lamp_parameters(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.lamps.get(&args.id) {
            Ok(record) => reply(GetLampParametersReply {
                code: ResponseCode::Ok,
                id: args.id,
                parameters: Some(record.parameters),
            }),
            Err(code) => reply(GetLampParametersReply { code, id: args.id, parameters: None }),
        }
    }

    fn get_lamp_details(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.lamps.get(&args.id) {
            Ok(record) => reply(GetLampDetailsReply {
                code: ResponseCode::Ok,
                id: args.id,
                details: Some(record.details),
            }),
            Err(code) => reply(GetLampDetailsReply { code, id: args.id, details: None }),
        }
    }

    fn get_lamp_faults(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.lamps.get(&args.id) {
            Ok(record) => reply(GetLampFaultsReply {
                code: ResponseCode::Ok,
                id: args.id,
                faults: record.faults,
            }),
            Err(code) => {
                reply(GetLampFaultsReply { code, id: args.id, faults: Default::default() })
            }
        }
    }

    async fn clear_lamp_fault(&self, args: Value) -> Value {
        let Ok(args) = parse::<ClearLampFaultArgs>(args) else { return invalid() };
        if !self.lamps.contains(&args.id) {
            return json!({ "code": ResponseCode::ErrNotFound, "id": args.id, "fault": args.fault });
        }
        let code =
            self.pool.submit(&args.id, LAMP_CLEAR_FAULT, json!({ "fault": args.fault })).await;
        if code.is_ok() {
            let _ = self.lamps.clear_fault(&args.id, args.fault);
        }
        json!({ "code": code, "id": args.id, "fault": args.fault })
    }

    async fn transition_lamp_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<TransitionStateArgs>(args) else { return invalid() };
        let code = self
            .lamp_op(&args.id, |_| {
                vec![EffectDescriptor::Transition {
                    to: args.state,
                    transition_period: args.transition_period,
                }]
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn transition_lamp_field(&self, args: Value) -> Value {
        let Ok(args) = parse::<TransitionFieldArgs>(args) else { return invalid() };
        let Some(field) = StateField::parse(&args.field) else {
            return reply(ReplyCodeIdName {
                code: ResponseCode::ErrInvalid,
                id: args.id,
                name: args.field,
            });
        };
        let mut bad_value = false;
        let code = self
            .lamp_op(&args.id, |current| {
                let mut target = current;
                if field.assign(&mut target, &args.value) {
                    vec![EffectDescriptor::Transition {
                        to: target,
                        transition_period: args.transition_period,
                    }]
                } else {
                    bad_value = true;
                    Vec::new()
                }
            })
            .await;
        let code = if bad_value { ResponseCode::ErrInvalid } else { code };
        reply(ReplyCodeIdName { code, id: args.id, name: args.field })
    }

    async fn transition_lamp_to_preset(&self, args: Value) -> Value {
        let Ok(args) = parse::<TransitionPresetArgs>(args) else { return invalid() };
        let patch = match self.presets.get(&args.preset_id) {
            Ok(patch) => patch,
            Err(code) => return reply(ReplyCodeId { code, id: args.id }),
        };
        let code = self
            .lamp_op(&args.id, |current| {
                vec![EffectDescriptor::Transition {
                    to: patch.resolve(current),
                    transition_period: args.transition_period,
                }]
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn pulse_lamp_with_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<PulseStateArgs>(args) else { return invalid() };
        if bad_pulse(args.period, args.duration, args.num_pulses) {
            return reply(ReplyCodeId { code: ResponseCode::ErrInvalid, id: args.id });
        }
        let code = self
            .lamp_op(&args.id, |_| {
                vec![EffectDescriptor::Pulse {
                    from: args.from_state,
                    to: args.to_state,
                    period: args.period,
                    duration: args.duration,
                    num_pulses: args.num_pulses,
                }]
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn pulse_lamp_with_preset(&self, args: Value) -> Value {
        let Ok(args) = parse::<PulsePresetArgs>(args) else { return invalid() };
        if bad_pulse(args.period, args.duration, args.num_pulses) {
            return reply(ReplyCodeId { code: ResponseCode::ErrInvalid, id: args.id });
        }
        let (from, to) =
            match (self.presets.get(&args.from_preset), self.presets.get(&args.to_preset)) {
                (Ok(from), Ok(to)) => (from, to),
                _ => return reply(ReplyCodeId { code: ResponseCode::ErrNotFound, id: args.id }),
            };
        let code = self
            .lamp_op(&args.id, |current| {
                vec![EffectDescriptor::Pulse {
                    from: from.resolve(current),
                    to: to.resolve(current),
                    period: args.period,
                    duration: args.duration,
                    num_pulses: args.num_pulses,
                }]
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn reset_lamp_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        let default = self.default_state.get();
        let code = self
            .lamp_op(&args.id, |_| {
                vec![EffectDescriptor::Transition { to: default, transition_period: 0 }]
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn reset_lamp_field(&self, args: Value) -> Value {
        let Ok(args) = parse::<ResetFieldArgs>(args) else { return invalid() };
        let Some(field) = StateField::parse(&args.field) else {
            return reply(ReplyCodeIdName {
                code: ResponseCode::ErrInvalid,
                id: args.id,
                name: args.field,
            });
        };
        let value = self.default_state.field_value(field);
        let code = self
            .lamp_op(&args.id, |current| {
                let mut target = current;
                field.assign(&mut target, &value);
                vec![EffectDescriptor::Transition { to: target, transition_period: 0 }]
            })
            .await;
        reply(ReplyCodeIdName { code, id: args.id, name: args.field })
    }

    // -- Lamp group face --------------------------------------------------------

    fn create_group(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<CreateLampGroupArgs>(args) else { return invalid() };
        if let Err(code) = self.check_sub_groups(&args.group) {
            return reply(ReplyCodeIdTracking { code, id: String::new(), tracking_id: 0 });
        }
        match self.groups.create(args.group, &args.name, &args.language) {
            Ok(id) => {
                batch.add(SIG_LAMP_GROUPS_CREATED, id.clone());
                reply(ReplyCodeIdTracking {
                    code: ResponseCode::Ok,
                    id,
                    tracking_id: self.next_tracking.fetch_add(1, Ordering::Relaxed),
                })
            }
            Err(code) => reply(ReplyCodeIdTracking { code, id: String::new(), tracking_id: 0 }),
        }
    }

    fn update_group(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<UpdateLampGroupArgs>(args) else { return invalid() };
        if let Err(code) = self.check_sub_groups(&args.group) {
            return reply(ReplyCodeId { code, id: args.id });
        }
        let groups = self.groups.snapshot();
        if is_group_cyclic(&groups, &args.id, &args.group) {
            return reply(ReplyCodeId { code: ResponseCode::ErrDependencyCycle, id: args.id });
        }
        let code = match self.groups.update(&args.id, args.group) {
            Ok(()) => {
                batch.add(SIG_LAMP_GROUPS_UPDATED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn delete_group(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        if !self.groups.contains(&args.id) {
            return reply(ReplyCodeId { code: ResponseCode::ErrNotFound, id: args.id });
        }
        let groups = self.groups.snapshot();
        let scenes = self.scenes.snapshot();
        if group_delete_blocked(&groups, &scenes, &args.id) {
            return reply(ReplyCodeId { code: ResponseCode::ErrDependency, id: args.id });
        }
        let code = match self.groups.delete(&args.id) {
            Ok(_) => {
                batch.add(SIG_LAMP_GROUPS_DELETED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn get_group(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.groups.get(&args.id) {
            Ok(group) => {
                reply(GetLampGroupReply { code: ResponseCode::Ok, id: args.id, group: Some(group) })
            }
            Err(code) => reply(GetLampGroupReply { code, id: args.id, group: None }),
        }
    }

    async fn transition_group_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<TransitionStateArgs>(args) else { return invalid() };
        let code = self
            .group_op(&args.id, |_, _| {
                Some(EffectDescriptor::Transition {
                    to: args.state,
                    transition_period: args.transition_period,
                })
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn transition_group_field(&self, args: Value) -> Value {
        let Ok(args) = parse::<TransitionFieldArgs>(args) else { return invalid() };
        let Some(field) = StateField::parse(&args.field) else {
            return reply(ReplyCodeIdName {
                code: ResponseCode::ErrInvalid,
                id: args.id,
                name: args.field,
            });
        };
        let code = self
            .group_op(&args.id, |_, current| {
                let mut target = current;
                if field.assign(&mut target, &args.value) {
                    Some(EffectDescriptor::Transition {
                        to: target,
                        transition_period: args.transition_period,
                    })
                } else {
                    None
                }
            })
            .await;
        reply(ReplyCodeIdName { code, id: args.id, name: args.field })
    }

    async fn transition_group_to_preset(&self, args: Value) -> Value {
        let Ok(args) = parse::<TransitionPresetArgs>(args) else { return invalid() };
        let patch = match self.presets.get(&args.preset_id) {
            Ok(patch) => patch,
            Err(code) => return reply(ReplyCodeId { code, id: args.id }),
        };
        let code = self
            .group_op(&args.id, |_, current| {
                Some(EffectDescriptor::Transition {
                    to: patch.resolve(current),
                    transition_period: args.transition_period,
                })
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn pulse_group_with_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<PulseStateArgs>(args) else { return invalid() };
        if bad_pulse(args.period, args.duration, args.num_pulses) {
            return reply(ReplyCodeId { code: ResponseCode::ErrInvalid, id: args.id });
        }
        let code = self
            .group_op(&args.id, |_, _| {
                Some(EffectDescriptor::Pulse {
                    from: args.from_state,
                    to: args.to_state,
                    period: args.period,
                    duration: args.duration,
                    num_pulses: args.num_pulses,
                })
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn pulse_group_with_preset(&self, args: Value) -> Value {
        let Ok(args) = parse::<PulsePresetArgs>(args) else { return invalid() };
        if bad_pulse(args.period, args.duration, args.num_pulses) {
            return reply(ReplyCodeId { code: ResponseCode::ErrInvalid, id: args.id });
        }
        let (from, to) =
            match (self.presets.get(&args.from_preset), self.presets.get(&args.to_preset)) {
                (Ok(from), Ok(to)) => (from, to),
                _ => return reply(ReplyCodeId { code: ResponseCode::ErrNotFound, id: args.id }),
            };
        let code = self
            .group_op(&args.id, |_, current| {
                Some(EffectDescriptor::Pulse {
                    from: from.resolve(current),
                    to: to.resolve(current),
                    period: args.period,
                    duration: args.duration,
                    num_pulses: args.num_pulses,
                })
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn reset_group_state(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        let default = self.default_state.get();
        let code = self
            .group_op(&args.id, |_, _| {
                Some(EffectDescriptor::Transition { to: default, transition_period: 0 })
            })
            .await;
        reply(ReplyCodeId { code, id: args.id })
    }

    async fn reset_group_field(&self, args: Value) -> Value {
        let Ok(args) = parse::<ResetFieldArgs>(args) else { return invalid() };
        let Some(field) = StateField::parse(&args.field) else {
            return reply(ReplyCodeIdName {
                code: ResponseCode::ErrInvalid,
                id: args.id,
                name: args.field,
            });
        };
        let value = self.default_state.field_value(field);
        let code = self
            .group_op(&args.id, |_, current| {
                let mut target = current;
                field.assign(&mut target, &value);
                Some(EffectDescriptor::Transition { to: target, transition_period: 0 })
            })
            .await;
        reply(ReplyCodeIdName { code, id: args.id, name: args.field })
    }

    // -- Preset face ------------------------------------------------------------

    fn create_preset(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<CreatePresetArgs>(args) else { return invalid() };
        match self.presets.create(args.preset, &args.name, &args.language) {
            Ok(id) => {
                batch.add(SIG_PRESETS_CREATED, id.clone());
                reply(ReplyCodeIdTracking {
                    code: ResponseCode::Ok,
                    id,
                    tracking_id: self.next_tracking.fetch_add(1, Ordering::Relaxed),
                })
            }
            Err(code) => reply(ReplyCodeIdTracking { code, id: String::new(), tracking_id: 0 }),
        }
    }

    fn update_preset(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<UpdatePresetArgs>(args) else { return invalid() };
        let code = match self.presets.update(&args.id, args.preset) {
            Ok(()) => {
                batch.add(SIG_PRESETS_UPDATED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn delete_preset(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        if !self.presets.contains(&args.id) {
            return reply(ReplyCodeId { code: ResponseCode::ErrNotFound, id: args.id });
        }
        let scenes = self.scenes.snapshot();
        if preset_delete_blocked(&scenes, &args.id) {
            return reply(ReplyCodeId { code: ResponseCode::ErrDependency, id: args.id });
        }
        let code = match self.presets.delete(&args.id) {
            Ok(_) => {
                batch.add(SIG_PRESETS_DELETED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn get_preset(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.presets.get(&args.id) {
            Ok(preset) => {
                reply(GetPresetReply { code: ResponseCode::Ok, id: args.id, preset: Some(preset) })
            }
            Err(code) => reply(GetPresetReply { code, id: args.id, preset: None }),
        }
    }

    fn set_default_state(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<SetDefaultStateArgs>(args) else { return invalid() };
        self.default_state.set(args.state);
        batch.add_no_arg(SIG_DEFAULT_LAMP_STATE_CHANGED);
        json!({ "code": ResponseCode::Ok })
    }

    // -- Scene face -------------------------------------------------------------

    fn create_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<CreateSceneArgs>(args) else { return invalid() };
        if let Err(code) = self.check_scene_refs(&args.scene) {
            return reply(ReplyCodeIdTracking { code, id: String::new(), tracking_id: 0 });
        }
        match self.scenes.create(args.scene, &args.name, &args.language) {
            Ok(id) => {
                batch.add(SIG_SCENES_CREATED, id.clone());
                reply(ReplyCodeIdTracking {
                    code: ResponseCode::Ok,
                    id,
                    tracking_id: self.next_tracking.fetch_add(1, Ordering::Relaxed),
                })
            }
            Err(code) => reply(ReplyCodeIdTracking { code, id: String::new(), tracking_id: 0 }),
        }
    }

    fn update_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<UpdateSceneArgs>(args) else { return invalid() };
        if let Err(code) = self.check_scene_refs(&args.scene) {
            return reply(ReplyCodeId { code, id: args.id });
        }
        let code = match self.scenes.update(&args.id, args.scene) {
            Ok(()) => {
                batch.add(SIG_SCENES_UPDATED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn delete_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        if !self.scenes.contains(&args.id) {
            return reply(ReplyCodeId { code: ResponseCode::ErrNotFound, id: args.id });
        }
        let masters = self.master_scenes.snapshot();
        if scene_delete_blocked(&masters, &args.id) {
            return reply(ReplyCodeId { code: ResponseCode::ErrDependency, id: args.id });
        }
        let code = match self.scenes.delete(&args.id) {
            Ok(_) => {
                batch.add(SIG_SCENES_DELETED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn get_scene(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.scenes.get(&args.id) {
            Ok(scene) => {
                reply(GetSceneReply { code: ResponseCode::Ok, id: args.id, scene: Some(scene) })
            }
            Err(code) => reply(GetSceneReply { code, id: args.id, scene: None }),
        }
    }

    fn apply_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        let (code, component_errors) = self.apply_scene_by_id(&args.id, epoch_ms());
        if code.is_ok() {
            batch.add(SIG_SCENES_APPLIED, args.id.clone());
        }
        json!({ "code": code, "id": args.id, "component_errors": component_errors })
    }

    /// Compile one scene against a shared anchor instant and hand its
    /// per-lamp programs to the pool.
    ///
    /// The scene counts as applied once every submission is accepted onto
    /// its lamp's queue, not once the effects complete; a watcher task logs
    /// failures that surface after acceptance. Only when every targeted
    /// lamp refuses the submission does the reply carry
    /// `LSF_ERR_LAMP_UNREACHABLE`.
    fn apply_scene_by_id(&self, scene_id: &str, t0_ms: u64) -> (ResponseCode, Vec<ResponseCode>) {
        let scene = match self.scenes.get(scene_id) {
            Ok(scene) => scene,
            Err(code) => return (code, Vec::new()),
        };

        // Snapshot one store at a time, then compile without locks.
        let groups = self.groups.snapshot();
        let presets = self.presets.snapshot();
        let lamp_states = self.lamps.state_snapshot();
        let inputs = CompileInputs {
            groups: &groups,
            presets: &presets,
            lamp_states: &lamp_states,
            default_state: self.default_state.get(),
        };
        let plan = compile_scene(&scene, &inputs, t0_ms);

        for code in &plan.component_errors {
            warn!(scene_id, %code, "scene component skipped");
        }

        let mut accepted = 0usize;
        let mut refused = 0usize;
        for (lamp_id, program) in plan.programs {
            match self.enqueue_program(&lamp_id, &program) {
                Ok(outcome) => {
                    accepted += 1;
                    let scene = scene_id.to_owned();
                    tokio::spawn(async move {
                        let code = outcome.await.unwrap_or(ResponseCode::ErrLampUnreachable);
                        if !code.is_ok() {
                            warn!(
                                scene_id = %scene,
                                %lamp_id,
                                %code,
                                "scene effect failed after acceptance"
                            );
                        }
                    });
                }
                Err(code) => {
                    refused += 1;
                    debug!(scene_id, %lamp_id, %code, "per-lamp submission refused");
                }
            }
        }

        if accepted == 0 && refused > 0 {
            return (ResponseCode::ErrLampUnreachable, plan.component_errors);
        }
        (ResponseCode::Ok, plan.component_errors)
    }

    // -- Master scene face ------------------------------------------------------

    fn create_master_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<CreateMasterSceneArgs>(args) else { return invalid() };
        if args.master.scenes.iter().any(|s| !self.scenes.contains(s)) {
            return reply(ReplyCodeIdTracking {
                code: ResponseCode::ErrNotFound,
                id: String::new(),
                tracking_id: 0,
            });
        }
        match self.master_scenes.create(args.master, &args.name, &args.language) {
            Ok(id) => {
                batch.add(SIG_MASTER_SCENES_CREATED, id.clone());
                reply(ReplyCodeIdTracking {
                    code: ResponseCode::Ok,
                    id,
                    tracking_id: self.next_tracking.fetch_add(1, Ordering::Relaxed),
                })
            }
            Err(code) => reply(ReplyCodeIdTracking { code, id: String::new(), tracking_id: 0 }),
        }
    }

    fn update_master_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<UpdateMasterSceneArgs>(args) else { return invalid() };
        if args.master.scenes.iter().any(|s| !self.scenes.contains(s)) {
            return reply(ReplyCodeId { code: ResponseCode::ErrNotFound, id: args.id });
        }
        let code = match self.master_scenes.update(&args.id, args.master) {
            Ok(()) => {
                batch.add(SIG_MASTER_SCENES_UPDATED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn delete_master_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        let code = match self.master_scenes.delete(&args.id) {
            Ok(_) => {
                batch.add(SIG_MASTER_SCENES_DELETED, args.id.clone());
                ResponseCode::Ok
            }
            Err(code) => code,
        };
        reply(ReplyCodeId { code, id: args.id })
    }

    fn get_master_scene(&self, args: Value) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        match self.master_scenes.get(&args.id) {
            Ok(master) => reply(GetMasterSceneReply {
                code: ResponseCode::Ok,
                id: args.id,
                master: Some(master),
            }),
            Err(code) => reply(GetMasterSceneReply { code, id: args.id, master: None }),
        }
    }

    fn apply_master_scene(&self, args: Value, batch: &mut SignalBatch) -> Value {
        let Ok(args) = parse::<IdArgs>(args) else { return invalid() };
        let master = match self.master_scenes.get(&args.id) {
            Ok(master) => master,
            Err(code) => return json!({ "code": code, "id": args.id }),
        };

        // One shared anchor for every contained scene.
        let t0 = epoch_ms();
        let mut applied = Vec::new();
        let mut scene_errors = Vec::new();
        for scene_id in &master.scenes {
            let (code, _) = self.apply_scene_by_id(scene_id, t0);
            if code.is_ok() {
                applied.push(scene_id.clone());
            } else {
                warn!(master_id = args.id, scene_id, %code, "contained scene failed");
                scene_errors.push(code);
            }
        }

        for scene_id in applied {
            batch.add(SIG_SCENES_APPLIED, scene_id);
        }
        batch.add(SIG_MASTER_SCENES_APPLIED, args.id.clone());
        json!({ "code": ResponseCode::Ok, "id": args.id, "scene_errors": scene_errors })
    }

    // -- Shared helpers ---------------------------------------------------------

    /// Submit effects to one lamp if it is known.
    async fn lamp_op(
        &self,
        lamp_id: &str,
        make: impl FnOnce(LampState) -> Vec<EffectDescriptor>,
    ) -> ResponseCode {
        let current = match self.lamps.get(lamp_id) {
            Ok(record) => record.state,
            Err(code) => return code,
        };
        let effects = make(current);
        if effects.is_empty() {
            return ResponseCode::ErrInvalid;
        }
        self.submit_effects(lamp_id.to_owned(), effects).await
    }

    /// Expand a group and fan one effect out to every member, serial per
    /// lamp, parallel across lamps.
    async fn group_op(
        &self,
        group_id: &str,
        make: impl Fn(&str, LampState) -> Option<EffectDescriptor>,
    ) -> ResponseCode {
        if group_id != ALL_LAMPS && !self.groups.contains(group_id) {
            return ResponseCode::ErrNotFound;
        }
        let groups = self.groups.snapshot();
        let known = self.lamps.id_set();
        let targets = expand_targets(
            &groups,
            &known,
            &BTreeSet::new(),
            &[group_id.to_owned()].into_iter().collect(),
        );
        if targets.is_empty() {
            return ResponseCode::Ok;
        }

        let states = self.lamps.state_snapshot();
        let default = self.default_state.get();
        let mut submissions = Vec::new();
        for lamp_id in targets {
            let current = states.get(&lamp_id).copied().unwrap_or(default);
            let Some(effect) = make(&lamp_id, current) else {
                return ResponseCode::ErrInvalid;
            };
            submissions.push(self.submit_effects(lamp_id, vec![effect]));
        }
        let codes = join_all(submissions).await;
        if codes.iter().all(|code| !code.is_ok()) {
            ResponseCode::ErrLampUnreachable
        } else {
            ResponseCode::Ok
        }
    }

    async fn submit_effects(
        &self,
        lamp_id: String,
        effects: Vec<EffectDescriptor>,
    ) -> ResponseCode {
        let program = LampProgram { start_at_ms: epoch_ms(), effects };
        self.submit_program(lamp_id, program).await
    }

    async fn submit_program(&self, lamp_id: String, program: LampProgram) -> ResponseCode {
        let args = serde_json::to_value(&program).unwrap_or(Value::Null);
        self.pool.submit(&lamp_id, APPLY_PROGRAM, args).await
    }

    /// Hand a program to the pool, acknowledging acceptance only.
    fn enqueue_program(
        &self,
        lamp_id: &str,
        program: &LampProgram,
    ) -> Result<oneshot::Receiver<ResponseCode>, ResponseCode> {
        let args = serde_json::to_value(program).unwrap_or(Value::Null);
        self.pool.enqueue(lamp_id, APPLY_PROGRAM, args)
    }

    /// Sub-groups must exist; the implicit group is not nestable.
    fn check_sub_groups(&self, group: &LampGroup) -> Result<(), ResponseCode> {
        for sub in &group.sub_groups {
            if sub == ALL_LAMPS {
                return Err(ResponseCode::ErrInvalid);
            }
            if !self.groups.contains(sub) {
                return Err(ResponseCode::ErrNotFound);
            }
        }
        Ok(())
    }

    /// Structural validation plus reference existence for scenes.
    fn check_scene_refs(&self, scene: &Scene) -> Result<(), ResponseCode> {
        scene.validate()?;
        for group_id in scene.referenced_groups() {
            if group_id != ALL_LAMPS && !self.groups.contains(&group_id) {
                return Err(ResponseCode::ErrNotFound);
            }
        }
        for preset_id in scene.referenced_presets() {
            if !self.presets.contains(&preset_id) {
                return Err(ResponseCode::ErrNotFound);
            }
        }
        Ok(())
    }
}

/// `Get*Name` over any catalog store.
fn get_name<T: Clone>(store: &Store<T>, args: Value) -> Value {
    let Ok(args) = parse::<GetNameArgs>(args) else { return invalid() };
    match store.get_name(&args.id, &args.language) {
        Ok(name) => reply(ReplyCodeIdLanguageName {
            code: ResponseCode::Ok,
            id: args.id,
            language: args.language,
            name,
        }),
        Err(code) => reply(ReplyCodeIdLanguageName {
            code,
            id: args.id,
            language: args.language,
            name: String::new(),
        }),
    }
}

/// `Set*Name` over any catalog store, queueing the name-changed signal.
fn set_name<T: Clone>(
    store: &Store<T>,
    args: Value,
    batch: &mut SignalBatch,
    signal: &'static str,
) -> Value {
    let Ok(args) = parse::<SetNameArgs>(args) else { return invalid() };
    let code = match store.set_name(&args.id, &args.name, &args.language) {
        Ok(()) => {
            batch.add(signal, args.id.clone());
            ResponseCode::Ok
        }
        Err(code) => code,
    };
    reply(ReplyCodeIdLanguage { code, id: args.id, language: args.language })
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ()> {
    serde_json::from_value(args).map_err(|_| ())
}

fn reply<T: serde::Serialize>(payload: T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

fn invalid() -> Value {
    json!({ "code": ResponseCode::ErrInvalid, "id": "" })
}

fn bad_pulse(period: u32, duration: u32, num_pulses: u32) -> bool {
    period == 0 || num_pulses == 0 || duration > period
}

/// Current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
