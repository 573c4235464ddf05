// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use lumenwire::bus::memory::MemoryBus;
use lumenwire::bus::{Announcement, ClientBus as _, ClientBusEvent, ServiceBus, ServiceBusEvent};
use lumenwire::response::ResponseCode;

use super::*;

struct Fixture {
    dispatcher: Arc<Dispatcher>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    service_rx: mpsc::UnboundedReceiver<ServiceBusEvent>,
    bus: MemoryBus,
}

async fn fixture(timeout: Duration) -> anyhow::Result<Fixture> {
    let bus = MemoryBus::new();
    let service = bus.service_bus();
    let mut service_rx = service.serve(Announcement {
        version: 1,
        port: 1,
        bus_name: ":dev".to_owned(),
        device_id: "dev".to_owned(),
        device_name: "dev".to_owned(),
        rank: 1,
        is_leader: true,
    })?;

    let client = bus.client_bus();
    let mut client_rx = client.register()?;
    let _ = client_rx.recv().await; // announcement
    client.join_session(":dev", 1, "dev")?;
    let session = match client_rx.recv().await {
        Some(ClientBusEvent::JoinCompleted { session: Some(s), .. }) => s,
        other => anyhow::bail!("join failed: {other:?}"),
    };
    let _ = service_rx.recv().await; // SessionJoined

    let (events_tx, events) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(Dispatcher::new(client, events_tx, timeout));
    dispatcher.bind(session);
    Ok(Fixture { dispatcher, events, service_rx, bus })
}

#[tokio::test]
async fn typed_reply_routes_to_the_registered_handler() -> anyhow::Result<()> {
    let mut fx = fixture(Duration::from_secs(5)).await?;
    let (got_tx, mut got_rx) = mpsc::unbounded_channel();
    fx.dispatcher.on_code_id_list("GetAllPresetIDs", move |reply| {
        let _ = got_tx.send(reply);
    });

    let status = fx.dispatcher.dispatch("GetAllPresetIDs", json!({}), ReplyShape::CodeIdList);
    assert_eq!(status, ClientStatus::Ok);

    match fx.service_rx.recv().await {
        Some(ServiceBusEvent::MethodCall { method, reply, .. }) => {
            assert_eq!(method, "GetAllPresetIDs");
            let _ = reply.send(json!({ "code": "LSF_OK", "ids": ["p1", "p2"] }));
        }
        other => anyhow::bail!("no call: {other:?}"),
    }

    let reply = got_rx.recv().await.ok_or_else(|| anyhow::anyhow!("handler never ran"))?;
    assert_eq!(reply.code, ResponseCode::Ok);
    assert_eq!(reply.ids, vec!["p1".to_owned(), "p2".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn dispatch_without_session_is_not_connected() -> anyhow::Result<()> {
    let fx = fixture(Duration::from_secs(5)).await?;
    fx.dispatcher.on_code_id("DeleteScene", |_| {});
    fx.dispatcher.unbind();
    let status = fx.dispatcher.dispatch("DeleteScene", json!({}), ReplyShape::CodeId);
    assert_eq!(status, ClientStatus::NotConnected);
    Ok(())
}

#[tokio::test]
async fn unregistered_or_mismatched_method_fails() -> anyhow::Result<()> {
    let fx = fixture(Duration::from_secs(5)).await?;
    let status = fx.dispatcher.dispatch("Nope", json!({}), ReplyShape::CodeId);
    assert_eq!(status, ClientStatus::Failure);

    fx.dispatcher.on_code_id("DeleteScene", |_| {});
    let status = fx.dispatcher.dispatch("DeleteScene", json!({}), ReplyShape::U32);
    assert_eq!(status, ClientStatus::Failure);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timeout_reaches_the_error_event() -> anyhow::Result<()> {
    let mut fx = fixture(Duration::from_millis(100)).await?;
    fx.dispatcher.on_code_id("SlowCall", |_| {});
    let status = fx.dispatcher.dispatch("SlowCall", json!({}), ReplyShape::CodeId);
    assert_eq!(status, ClientStatus::Ok);

    // Swallow the call but never reply; keep the oneshot alive so the
    // waiter times out instead of seeing a drop.
    let held = match fx.service_rx.recv().await {
        Some(ServiceBusEvent::MethodCall { reply, .. }) => reply,
        other => anyhow::bail!("no call: {other:?}"),
    };

    match fx.events.recv().await {
        Some(ClientEvent::Error { codes }) => {
            assert_eq!(codes, vec![ErrorCode::MethodCallTimeout]);
        }
        other => anyhow::bail!("expected timeout error: {other:?}"),
    }
    drop(held);
    Ok(())
}

#[tokio::test]
async fn orphaned_wait_stays_silent_on_session_loss() -> anyhow::Result<()> {
    let mut fx = fixture(Duration::from_secs(5)).await?;
    fx.dispatcher.on_code_id("DoomedCall", |_| {});
    let status = fx.dispatcher.dispatch("DoomedCall", json!({}), ReplyShape::CodeId);
    assert_eq!(status, ClientStatus::Ok);

    // The leader dies: the pending reply sender drops, and the binding
    // moves on. No timeout error may surface.
    let pending = match fx.service_rx.recv().await {
        Some(ServiceBusEvent::MethodCall { reply, .. }) => reply,
        other => anyhow::bail!("no call: {other:?}"),
    };
    fx.dispatcher.unbind();
    fx.bus.drop_service("dev");
    drop(pending);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.events.try_recv().is_err(), "no spurious error after disconnect");
    Ok(())
}

#[tokio::test]
async fn signals_route_by_name() -> anyhow::Result<()> {
    let fx = fixture(Duration::from_secs(5)).await?;
    let (sig_tx, mut sig_rx) = mpsc::unbounded_channel();
    fx.dispatcher.on_signal("ScenesApplied", move |ids| {
        let _ = sig_tx.send(ids);
    });

    fx.dispatcher.handle_signal("ScenesApplied", vec!["s1".to_owned()]);
    fx.dispatcher.handle_signal("UnknownSignal", vec![]);

    let ids = sig_rx.recv().await.ok_or_else(|| anyhow::anyhow!("signal handler never ran"))?;
    assert_eq!(ids, vec!["s1".to_owned()]);
    Ok(())
}
