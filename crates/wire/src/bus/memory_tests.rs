// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::effect::EffectDescriptor;

fn announcement(device_id: &str, rank: u64) -> Announcement {
    Announcement {
        version: 1,
        port: 99,
        bus_name: format!(":{device_id}"),
        device_id: device_id.to_owned(),
        device_name: format!("ctl-{device_id}"),
        rank,
        is_leader: true,
    }
}

#[tokio::test]
async fn announcements_reach_existing_and_late_clients() -> anyhow::Result<()> {
    let bus = MemoryBus::new();

    let client_a = bus.client_bus();
    let mut rx_a = client_a.register()?;

    let service = bus.service_bus();
    let _events = service.serve(announcement("dev-1", 7))?;

    match rx_a.recv().await {
        Some(ClientBusEvent::Announcement(a)) => assert_eq!(a.device_id, "dev-1"),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }

    // Late registrant sees the replayed announcement.
    let client_b = bus.client_bus();
    let mut rx_b = client_b.register()?;
    match rx_b.recv().await {
        Some(ClientBusEvent::Announcement(a)) => assert_eq!(a.rank, 7),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn join_call_signal_round_trip() -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let client = bus.client_bus();
    let mut client_rx = client.register()?;
    let service = bus.service_bus();
    let mut service_rx = service.serve(announcement("dev-1", 1))?;

    // Drop the replayed announcement.
    let _ = client_rx.recv().await;

    client.join_session(":dev-1", 99, "dev-1")?;
    let session = match client_rx.recv().await {
        Some(ClientBusEvent::JoinCompleted { session: Some(s), .. }) => s,
        other => anyhow::bail!("join did not complete: {other:?}"),
    };
    match service_rx.recv().await {
        Some(ServiceBusEvent::SessionJoined { session: s }) => assert_eq!(s, session),
        other => anyhow::bail!("service missed the join: {other:?}"),
    }

    // Service answers one call.
    let call = client.call(session, "Echo", json!({"x": 1}));
    let service_task = tokio::spawn(async move {
        if let Some(ServiceBusEvent::MethodCall { method, args, reply, .. }) =
            service_rx.recv().await
        {
            assert_eq!(method, "Echo");
            let _ = reply.send(json!({"echo": args}));
        }
        service_rx
    });
    let reply = call.await.map_err(anyhow::Error::from)?;
    assert_eq!(reply["echo"]["x"], 1);
    let _service_rx = service_task.await?;

    // Signals only reach joined clients.
    service.signal("ScenesApplied", vec!["s1".to_owned()]);
    match client_rx.recv().await {
        Some(ClientBusEvent::Signal { name, ids, .. }) => {
            assert_eq!(name, "ScenesApplied");
            assert_eq!(ids, vec!["s1".to_owned()]);
        }
        other => anyhow::bail!("missing signal: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn join_to_unknown_service_fails() -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let client = bus.client_bus();
    let mut rx = client.register()?;
    client.join_session(":nope", 1, "nope")?;
    match rx.recv().await {
        Some(ClientBusEvent::JoinCompleted { session: None, device_id }) => {
            assert_eq!(device_id, "nope");
        }
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn held_joins_complete_on_release() -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let client = bus.client_bus();
    let mut rx = client.register()?;
    let service = bus.service_bus();
    let _events = service.serve(announcement("dev-1", 1))?;
    let _ = rx.recv().await; // announcement

    bus.hold_joins("dev-1");
    client.join_session(":dev-1", 99, "dev-1")?;
    assert!(rx.try_recv().is_err(), "join should be parked");

    bus.release_joins("dev-1");
    match rx.recv().await {
        Some(ClientBusEvent::JoinCompleted { session: Some(_), .. }) => {}
        other => anyhow::bail!("parked join never completed: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn dropped_service_loses_sessions() -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let client = bus.client_bus();
    let mut rx = client.register()?;
    let service = bus.service_bus();
    let _events = service.serve(announcement("dev-1", 1))?;
    let _ = rx.recv().await;

    client.join_session(":dev-1", 99, "dev-1")?;
    let session = match rx.recv().await {
        Some(ClientBusEvent::JoinCompleted { session: Some(s), .. }) => s,
        other => anyhow::bail!("join failed: {other:?}"),
    };

    bus.drop_service("dev-1");
    match rx.recv().await {
        Some(ClientBusEvent::SessionLost { session: lost }) => assert_eq!(lost, session),
        other => anyhow::bail!("missing session loss: {other:?}"),
    }

    let err = client.call(session, "Echo", json!({})).await;
    assert!(matches!(err, Err(BusError::NotConnected)));
    Ok(())
}

#[tokio::test]
async fn lamp_program_updates_state_and_emits_change() -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let lamp_bus = bus.lamp_bus();
    let mut rx = lamp_bus.register()?;

    let lamp = bus.add_lamp(SimLampSpec::named("lamp-1"));
    match rx.recv().await {
        Some(LampBusEvent::LampAnnounced { lamp_id, .. }) => assert_eq!(lamp_id, "lamp-1"),
        other => anyhow::bail!("missing announce: {other:?}"),
    }

    let session = lamp_bus.join("lamp-1").await.map_err(anyhow::Error::from)?;
    let to = LampState { on_off: true, brightness: 200, ..Default::default() };
    let program = LampProgram {
        start_at_ms: 1_000,
        effects: vec![EffectDescriptor::Transition { to, transition_period: 50 }],
    };
    let reply = lamp_bus
        .call(session, methods::APPLY_PROGRAM, serde_json::to_value(&program)?)
        .await
        .map_err(anyhow::Error::from)?;
    assert_eq!(reply["code"], "LSF_OK");
    assert_eq!(lamp.current_state(), to);
    assert_eq!(lamp.programs().len(), 1);

    match rx.recv().await {
        Some(LampBusEvent::StateChanged { lamp_id, state }) => {
            assert_eq!(lamp_id, "lamp-1");
            assert_eq!(state, to);
        }
        other => anyhow::bail!("missing state change: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn unreachable_lamp_times_out() -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let lamp_bus = bus.lamp_bus();
    let _rx = lamp_bus.register()?;
    let lamp = bus.add_lamp(SimLampSpec::named("lamp-1"));

    let session = lamp_bus.join("lamp-1").await.map_err(anyhow::Error::from)?;
    lamp.set_reachable(false);
    let err = lamp_bus.call(session, methods::APPLY_PROGRAM, json!({})).await;
    assert!(matches!(err, Err(BusError::Timeout)));

    assert!(matches!(lamp_bus.join("lamp-1").await, Err(BusError::Timeout)));
    Ok(())
}
