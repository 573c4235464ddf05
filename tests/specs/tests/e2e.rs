// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: real controller services and clients over the
//! in-memory bus, exercising election, catalog, dependencies, and scene
//! execution together.

use std::time::Duration;

use lumen::error::ClientStatus;
use lumen::event::{ClientEvent, GroupEvent, MasterEvent, PresetEvent, SceneEvent};
use lumen::ControllerClient;
use lumen_specs::{
    wait_connected, wait_disconnected, wait_for, wait_programs, Network,
};
use lumenwire::effect::EffectDescriptor;
use lumenwire::group::LampGroup;
use lumenwire::response::ResponseCode;
use lumenwire::scene::{MasterScene, Scene, TransitionToPreset};
use lumenwire::state::{LampState, StatePatch};
use tokio::sync::mpsc;

type Events = mpsc::UnboundedReceiver<ClientEvent>;

async fn create_group(
    client: &ControllerClient,
    rx: &mut Events,
    group: &LampGroup,
    name: &str,
) -> anyhow::Result<(ResponseCode, String)> {
    assert_eq!(client.groups().create(group, name, "en"), ClientStatus::Ok);
    wait_for(rx, |event| match event {
        ClientEvent::Group(GroupEvent::Created(r)) => Some((r.code, r.id)),
        _ => None,
    })
    .await
}

async fn create_preset(
    client: &ControllerClient,
    rx: &mut Events,
    preset: StatePatch,
    name: &str,
) -> anyhow::Result<(ResponseCode, String)> {
    assert_eq!(client.presets().create(preset, name, "en"), ClientStatus::Ok);
    wait_for(rx, |event| match event {
        ClientEvent::Preset(PresetEvent::Created(r)) => Some((r.code, r.id)),
        _ => None,
    })
    .await
}

async fn create_scene(
    client: &ControllerClient,
    rx: &mut Events,
    scene: &Scene,
    name: &str,
) -> anyhow::Result<(ResponseCode, String)> {
    assert_eq!(client.scenes().create(scene, name, "en"), ClientStatus::Ok);
    wait_for(rx, |event| match event {
        ClientEvent::Scene(SceneEvent::Created(r)) => Some((r.code, r.id)),
        _ => None,
    })
    .await
}

/// Poll `GetAllLampIDs` until every wanted lamp is listed.
async fn wait_lamps_listed(
    client: &ControllerClient,
    rx: &mut Events,
    wanted: &[&str],
) -> anyhow::Result<()> {
    for _ in 0..100 {
        assert_eq!(client.lamps().get_all_ids(), ClientStatus::Ok);
        let ids = wait_for(rx, |event| match event {
            ClientEvent::Lamp(lumen::event::LampEvent::AllIds(r)) => Some(r.ids),
            _ => None,
        })
        .await?;
        if wanted.iter().all(|w| ids.iter().any(|id| id == w)) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("lamps {wanted:?} never showed up")
}

// -- Leader election -----------------------------------------------------------

#[tokio::test]
async fn leader_failover() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;

    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;

    net.start_controller("b", 2)?;
    wait_disconnected(&mut rx, "a").await?;
    wait_connected(&mut rx, "b").await?;

    client.stop();
    Ok(())
}

#[tokio::test]
async fn stale_leader_completion_suppressed() -> anyhow::Result<()> {
    let net = Network::new();
    net.bus.hold_joins("a");
    net.start_controller("a", 1)?;

    let (client, mut rx) = net.start_client()?;
    net.start_controller("b", 2)?;
    wait_connected(&mut rx, "b").await?;

    net.bus.release_joins("a");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err(), "stale completion leaked");
    assert_eq!(
        client.connected_leader().map(|leader| leader.device_id),
        Some("b".to_owned())
    );

    client.stop();
    Ok(())
}

#[tokio::test]
async fn dead_leader_requires_reissue() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;

    net.kill_controller("a");
    wait_disconnected(&mut rx, "a").await?;

    // State-dependent requests must be re-issued after reconnect.
    assert_eq!(client.presets().get_all_ids(), ClientStatus::NotConnected);

    net.start_controller("a", 1)?;
    wait_connected(&mut rx, "a").await?;
    assert_eq!(client.presets().get_all_ids(), ClientStatus::Ok);
    let ids = wait_for(&mut rx, |event| match event {
        ClientEvent::Preset(PresetEvent::AllIds(r)) => Some(r.ids),
        _ => None,
    })
    .await?;
    assert!(ids.is_empty());

    client.stop();
    Ok(())
}

// -- Scene execution -----------------------------------------------------------

#[tokio::test]
async fn group_preset_scene_reaches_both_lamps() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let l1 = net.add_lamp("l1");
    let l2 = net.add_lamp("l2");

    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;
    wait_lamps_listed(&client, &mut rx, &["l1", "l2"]).await?;

    let (code, g1) = create_group(
        &client,
        &mut rx,
        &LampGroup::new(["l1".to_owned(), "l2".to_owned()], []),
        "pair",
    )
    .await?;
    assert_eq!(code, ResponseCode::Ok);

    let (code, p1) = create_preset(
        &client,
        &mut rx,
        StatePatch { on_off: Some(true), brightness: Some(255), ..Default::default() },
        "bright",
    )
    .await?;
    assert_eq!(code, ResponseCode::Ok);

    let scene = Scene {
        transition_to_preset: vec![TransitionToPreset {
            lamps: Default::default(),
            groups: [g1.clone()].into_iter().collect(),
            preset_id: p1.clone(),
            transition_period: 1000,
        }],
        ..Default::default()
    };
    let (code, s1) = create_scene(&client, &mut rx, &scene, "evening").await?;
    assert_eq!(code, ResponseCode::Ok);

    assert_eq!(client.scenes().apply(&s1), ClientStatus::Ok);
    let (code, applied_id) = wait_for(&mut rx, |event| match event {
        ClientEvent::Scene(SceneEvent::Applied(r)) => Some((r.code, r.id)),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::Ok);
    assert_eq!(applied_id, s1);

    // The applied signal follows the reply.
    let ids = wait_for(&mut rx, |event| match event {
        ClientEvent::Scene(SceneEvent::AppliedSignal { ids }) => Some(ids),
        _ => None,
    })
    .await?;
    assert_eq!(ids, vec![s1.clone()]);

    for lamp in [&l1, &l2] {
        wait_programs(lamp, 1).await?;
        let programs = lamp.programs();
        assert_eq!(
            programs[0].effects,
            vec![EffectDescriptor::Transition {
                to: LampState { on_off: true, brightness: 255, ..Default::default() },
                transition_period: 1000,
            }],
            "lamp {}",
            lamp.lamp_id
        );
    }

    client.stop();
    Ok(())
}

#[tokio::test]
async fn master_scene_applies_each_contained_scene() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let l1 = net.add_lamp("l1");

    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;
    wait_lamps_listed(&client, &mut rx, &["l1"]).await?;

    let mut scene_ids = Vec::new();
    for brightness in [10u32, 20] {
        let scene = Scene {
            transition_to_state: vec![lumenwire::scene::TransitionToState {
                lamps: ["l1".to_owned()].into_iter().collect(),
                groups: Default::default(),
                state: LampState { on_off: true, brightness, ..Default::default() },
                transition_period: 1,
            }],
            ..Default::default()
        };
        let (code, id) = create_scene(&client, &mut rx, &scene, "part").await?;
        assert_eq!(code, ResponseCode::Ok);
        scene_ids.push(id);
    }

    assert_eq!(
        client.master_scenes().create(&MasterScene::new(scene_ids.clone()), "show", "en"),
        ClientStatus::Ok
    );
    let (code, master_id) = wait_for(&mut rx, |event| match event {
        ClientEvent::Master(MasterEvent::Created(r)) => Some((r.code, r.id)),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::Ok);

    assert_eq!(client.master_scenes().apply(&master_id), ClientStatus::Ok);
    wait_for(&mut rx, |event| match event {
        ClientEvent::Master(MasterEvent::AppliedSignal { ids }) => Some(ids),
        _ => None,
    })
    .await?;

    // One program per contained scene, both anchored to the same instant.
    wait_programs(&l1, 2).await?;
    let programs = l1.programs();
    assert_eq!(programs[0].start_at_ms, programs[1].start_at_ms);

    client.stop();
    Ok(())
}

// -- Dependencies and boundaries ----------------------------------------------

#[tokio::test]
async fn dependency_refusal_then_ordered_delete() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;

    let (_, p1) = create_preset(
        &client,
        &mut rx,
        StatePatch { on_off: Some(true), ..Default::default() },
        "p1",
    )
    .await?;
    let scene = Scene {
        transition_to_preset: vec![TransitionToPreset {
            lamps: ["l1".to_owned()].into_iter().collect(),
            groups: Default::default(),
            preset_id: p1.clone(),
            transition_period: 100,
        }],
        ..Default::default()
    };
    let (_, s1) = create_scene(&client, &mut rx, &scene, "s1").await?;

    assert_eq!(client.presets().delete(&p1), ClientStatus::Ok);
    let code = wait_for(&mut rx, |event| match event {
        ClientEvent::Preset(PresetEvent::Deleted(r)) => Some(r.code),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::ErrDependency);

    // Scene first, then the preset; both succeed.
    assert_eq!(client.scenes().delete(&s1), ClientStatus::Ok);
    let code = wait_for(&mut rx, |event| match event {
        ClientEvent::Scene(SceneEvent::Deleted(r)) => Some(r.code),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::Ok);

    assert_eq!(client.presets().delete(&p1), ClientStatus::Ok);
    let code = wait_for(&mut rx, |event| match event {
        ClientEvent::Preset(PresetEvent::Deleted(r)) => Some(r.code),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::Ok);

    client.stop();
    Ok(())
}

#[tokio::test]
async fn nested_cycle_rejected() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;

    let (_, g3) = create_group(&client, &mut rx, &LampGroup::default(), "g3").await?;
    let (_, g2) =
        create_group(&client, &mut rx, &LampGroup::new([], [g3.clone()]), "g2").await?;
    let (_, g1) =
        create_group(&client, &mut rx, &LampGroup::new([], [g2.clone()]), "g1").await?;

    assert_eq!(
        client.groups().update(&g3, &LampGroup::new([], [g1.clone()])),
        ClientStatus::Ok
    );
    let code = wait_for(&mut rx, |event| match event {
        ClientEvent::Group(GroupEvent::Updated(r)) => Some(r.code),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::ErrDependencyCycle);

    client.stop();
    Ok(())
}

#[tokio::test]
async fn capacity_cap_and_recovery() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;

    let mut last = String::new();
    for i in 0..lumenwire::MAX_ENTITIES {
        let (code, id) =
            create_preset(&client, &mut rx, StatePatch::default(), &format!("p{i}")).await?;
        assert_eq!(code, ResponseCode::Ok, "creating p{i}");
        last = id;
    }

    let (code, _) = create_preset(&client, &mut rx, StatePatch::default(), "overflow").await?;
    assert_eq!(code, ResponseCode::ErrCapacity);

    assert_eq!(client.presets().delete(&last), ClientStatus::Ok);
    let code = wait_for(&mut rx, |event| match event {
        ClientEvent::Preset(PresetEvent::Deleted(r)) => Some(r.code),
        _ => None,
    })
    .await?;
    assert_eq!(code, ResponseCode::Ok);

    let (code, _) = create_preset(&client, &mut rx, StatePatch::default(), "fits").await?;
    assert_eq!(code, ResponseCode::Ok);

    client.stop();
    Ok(())
}

// -- Round trips ---------------------------------------------------------------

#[tokio::test]
async fn create_get_and_name_round_trips() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;

    let group = LampGroup::new(["l1".to_owned(), "l9".to_owned()], []);
    let (_, id) = create_group(&client, &mut rx, &group, "Porch").await?;

    assert_eq!(client.groups().get(&id), ClientStatus::Ok);
    let got = wait_for(&mut rx, |event| match event {
        ClientEvent::Group(GroupEvent::Got(r)) => Some(r.group),
        _ => None,
    })
    .await?;
    assert_eq!(got, Some(group));

    assert_eq!(client.groups().set_name(&id, "Veranda", "de"), ClientStatus::Ok);
    let (code, language) = wait_for(&mut rx, |event| match event {
        ClientEvent::Group(GroupEvent::NameSet(r)) => Some((r.code, r.language)),
        _ => None,
    })
    .await?;
    assert_eq!((code, language.as_str()), (ResponseCode::Ok, "de"));

    assert_eq!(client.groups().get_name(&id, "de"), ClientStatus::Ok);
    let name = wait_for(&mut rx, |event| match event {
        ClientEvent::Group(GroupEvent::Name(r)) => Some(r.name),
        _ => None,
    })
    .await?;
    assert_eq!(name, "Veranda");

    client.stop();
    Ok(())
}

#[tokio::test]
async fn version_and_lighting_reset() -> anyhow::Result<()> {
    let net = Network::new();
    net.start_controller("a", 1)?;
    let lamp = net.add_lamp("l1");
    let (client, mut rx) = net.start_client()?;
    wait_connected(&mut rx, "a").await?;
    wait_lamps_listed(&client, &mut rx, &["l1"]).await?;

    assert_eq!(client.get_controller_service_version(), ClientStatus::Ok);
    let version = wait_for(&mut rx, |event| match event {
        ClientEvent::ServiceVersion(v) => Some(v),
        _ => None,
    })
    .await?;
    assert!(version >= 1);

    assert_eq!(client.lighting_reset(), ClientStatus::Ok);
    wait_for(&mut rx, |event| match event {
        ClientEvent::LightingResetSignal => Some(()),
        _ => None,
    })
    .await?;
    wait_programs(&lamp, 1).await?;

    client.stop();
    Ok(())
}
