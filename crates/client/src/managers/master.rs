// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use lumenwire::methods::*;
use lumenwire::scene::MasterScene;

use crate::dispatch::{Dispatcher, ReplyShape};
use crate::error::ClientStatus;
use crate::event::{ClientEvent, MasterEvent};
use crate::managers::args;

/// Master-scene catalog operations and application.
pub struct MasterSceneManager {
    dispatcher: Arc<Dispatcher>,
}

impl MasterSceneManager {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn get_all_ids(&self) -> ClientStatus {
        self.dispatcher.dispatch(GET_ALL_MASTER_SCENE_IDS, json!({}), ReplyShape::CodeIdList)
    }

    pub fn get_name(&self, master_id: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_MASTER_SCENE_NAME,
            args(GetNameArgs { id: master_id.to_owned(), language: language.to_owned() }),
            ReplyShape::CodeIdLanguageName,
        )
    }

    pub fn set_name(&self, master_id: &str, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            SET_MASTER_SCENE_NAME,
            args(SetNameArgs {
                id: master_id.to_owned(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdLanguage,
        )
    }

    pub fn create(&self, master: &MasterScene, name: &str, language: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            CREATE_MASTER_SCENE,
            args(CreateMasterSceneArgs {
                master: master.clone(),
                name: name.to_owned(),
                language: language.to_owned(),
            }),
            ReplyShape::CodeIdTracking,
        )
    }

    pub fn update(&self, master_id: &str, master: &MasterScene) -> ClientStatus {
        self.dispatcher.dispatch(
            UPDATE_MASTER_SCENE,
            args(UpdateMasterSceneArgs { id: master_id.to_owned(), master: master.clone() }),
            ReplyShape::CodeId,
        )
    }

    pub fn delete(&self, master_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            DELETE_MASTER_SCENE,
            args(IdArgs { id: master_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }

    pub fn get(&self, master_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            GET_MASTER_SCENE,
            args(IdArgs { id: master_id.to_owned() }),
            ReplyShape::Raw,
        )
    }

    pub fn apply(&self, master_id: &str) -> ClientStatus {
        self.dispatcher.dispatch(
            APPLY_MASTER_SCENE,
            args(IdArgs { id: master_id.to_owned() }),
            ReplyShape::CodeId,
        )
    }
}

pub(crate) fn register(d: &Dispatcher, events: &mpsc::UnboundedSender<ClientEvent>) {
    let send = |tx: &mpsc::UnboundedSender<ClientEvent>, event: MasterEvent| {
        let _ = tx.send(ClientEvent::Master(event));
    };

    let tx = events.clone();
    d.on_code_id_list(GET_ALL_MASTER_SCENE_IDS, move |r| send(&tx, MasterEvent::AllIds(r)));
    let tx = events.clone();
    d.on_code_id_language_name(GET_MASTER_SCENE_NAME, move |r| send(&tx, MasterEvent::Name(r)));
    let tx = events.clone();
    d.on_code_id_language(SET_MASTER_SCENE_NAME, move |r| send(&tx, MasterEvent::NameSet(r)));
    let tx = events.clone();
    d.on_code_id_tracking(CREATE_MASTER_SCENE, move |r| send(&tx, MasterEvent::Created(r)));
    let tx = events.clone();
    d.on_code_id(UPDATE_MASTER_SCENE, move |r| send(&tx, MasterEvent::Updated(r)));
    let tx = events.clone();
    d.on_code_id(DELETE_MASTER_SCENE, move |r| send(&tx, MasterEvent::Deleted(r)));
    let tx = events.clone();
    d.on_raw(GET_MASTER_SCENE, move |v| {
        if let Ok(r) = serde_json::from_value(v) {
            send(&tx, MasterEvent::Got(r));
        }
    });
    let tx = events.clone();
    d.on_code_id(APPLY_MASTER_SCENE, move |r| send(&tx, MasterEvent::Applied(r)));

    let tx = events.clone();
    d.on_signal(SIG_MASTER_SCENES_CREATED, move |ids| {
        send(&tx, MasterEvent::CreatedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_MASTER_SCENES_UPDATED, move |ids| {
        send(&tx, MasterEvent::UpdatedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_MASTER_SCENES_DELETED, move |ids| {
        send(&tx, MasterEvent::DeletedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_MASTER_SCENES_NAME_CHANGED, move |ids| {
        send(&tx, MasterEvent::NamesChangedSignal { ids });
    });
    let tx = events.clone();
    d.on_signal(SIG_MASTER_SCENES_APPLIED, move |ids| {
        send(&tx, MasterEvent::AppliedSignal { ids });
    });
}
