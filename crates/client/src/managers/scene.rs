// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use lumenwire::methods::*;
use lumenwire::scene::Scene;

use crate::dispatch::{Dispatcher, ReplyShape};
use crate::error::ClientStatus;
use crate::event::{ClientEvent, SceneEvent};
use crate::managers::args;

/// Scene catalog operations and application.
pub struct SceneManager {
    dispatcher: Arc<Dispatcher>,
}

impl SceneManager {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn get_all_ids(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_ALL_SCENE_IDS, json!({}), ReplyShape::CodeIdList)
    }

    pub fn get_name(&self, scene_id: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_SCENE_NAME,
            args(GetNameArgs { id: scene_id.to_owned(), language: language.to_owned() }),
            ReplyShape::CodeIdLanguageName,
        )
    }

    pub fn set_name(&self, scene_id: &str, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            SET_SCENE_NAME,
            args(SetNameArgs {
                id: scene_id.to_owned(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdLanguage,
        )
    }

    pub fn create(&self, scene: &Scene, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            CREATE_SCENE,
            args(CreateSceneArgs {
                scene: scene.clone(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdTracking,
        )
    }

    pub fn update(&self, scene_id: &str, scene: &Scene) -> ClientStatus {
        self.dispatcher.dispatch(
            UPDATE_SCENE,
            args(UpdateSceneArgs { id: scene_id.to_owned(), scene: scene.clone() }),
            ReplyShape::CodeId,
        )
    }

    pub fn delete(&self, scene_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            DELETE_SCENE,
            args(IdArgs { id: scene_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }

    pub fn get(&self, scene_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(GET_SCENE, args(IdArgs { id: scene_id.to_owned() }), ReplyShape::Raw)
    }

    pub fn apply(&self, scene_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            APPLY_SCENE,
            args(IdArgs { id: scene_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }
}

pub(crate) fn register(d: &Dispatcher, events: &mpsc::UnboundedSender<ClientEvent>) {
    let send = |tx: &mpsc::UnboundedSender<ClientEvent>, event: SceneEvent| {
        let _ = tx.send(ClientEvent::Scene(event));
    };

    let tx = events.clone();
    d.on_code_id_list(GET_ALL_SCENE_IDS, move |r| send(&tx, SceneEvent::AllIds(r)));
    let tx = events.clone();
    d.on_code_id_language_name(GET_SCENE_NAME, move |r| send(&tx, SceneEvent::Name(r)));
    let tx = events.clone();
    d.on_code_id_language(SET_SCENE_NAME, move |r| send(&tx, SceneEvent::NameSet(r)));
    let tx = events.clone();
    d.on_code_id_tracking(CREATE_SCENE, move |r| send(&tx, SceneEvent::Created(r)));
    let tx = events.clone();
    d.on_code_id(UPDATE_SCENE, move |r| send(&tx, SceneEvent::Updated(r)));
    let tx = events.clone();
    d.on_code_id(DELETE_SCENE, move |r| send(&tx, SceneEvent::Deleted(r)));
    let tx = events.clone();
    d.on_raw(GET_SCENE, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, SceneEvent::Got(r));
        }
    });
    let tx = events.clone();
    d.on_code_id(APPLY_SCENE, move |r| send(&tx, SceneEvent::Applied(r)));

    let tx = events.clone();
    d.on_signal(SIG_SCENES_CREATED, move |ids| send(&tx, SceneEvent::CreatedSignal { ids }));
    let tx = events.clone();
    d.on_signal(SIG_SCENES_UPDATED, move |ids| send(&tx, SceneEvent::UpdatedSignal { ids }));
    let tx = events.clone();
    d.on_signal(SIG_SCENES_DELETED, move |ids| send(&tx, SceneEvent::DeletedSignal { ids }));
    let tx = events.clone();
    d.on_signal(SIG_SCENES_NAME_CHANGED, move |ids| {
        send(&tx, SceneEvent::NamesChangedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_SCENES_APPLIED, move |ids| send(&tx, SceneEvent::AppliedSignal { ids }));
}
