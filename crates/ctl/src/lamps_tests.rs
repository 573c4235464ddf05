// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use lumenwire::bus::memory::{MemoryBus, SimLampSpec};
use lumenwire::effect::{EffectDescriptor, LampProgram};
use lumenwire::methods;
use lumenwire::state::LampState;

use super::*;

struct Fixture {
    bus: MemoryBus,
    pool: Arc<LampPool>,
    events: mpsc::UnboundedReceiver<PoolEvent>,
    directory: Arc<LampDirectory>,
    shutdown: CancellationToken,
}

fn fixture(config: PoolConfig) -> anyhow::Result<Fixture> {
    let bus = MemoryBus::new();
    let directory = Arc::new(LampDirectory::new());
    let shutdown = CancellationToken::new();
    let (pool, events) =
        LampPool::new(bus.lamp_bus(), Arc::clone(&directory), config, shutdown.clone());
    pool.start()?;
    Ok(Fixture { bus, pool, events, directory, shutdown })
}

fn program(brightness: u32) -> serde_json::Value {
    let program = LampProgram {
        start_at_ms: 0,
        effects: vec![EffectDescriptor::Transition {
            to: LampState { on_off: true, brightness, ..Default::default() },
            transition_period: 10,
        }],
    };
    serde_json::to_value(&program).unwrap_or(json!({}))
}

#[tokio::test]
async fn discovery_populates_directory_and_emits() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    fx.bus.add_lamp(SimLampSpec::named("l1"));

    match fx.events.recv().await {
        Some(PoolEvent::LampDiscovered { lamp_id }) => assert_eq!(lamp_id, "l1"),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
    assert!(fx.directory.contains("l1"));
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Discovered));

    // Re-announce of a known lamp stays quiet.
    fx.bus.re_announce_lamp("l1");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fx.events.try_recv().is_err());

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn first_call_joins_then_executes() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    let code = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(100)).await;
    assert_eq!(code, ResponseCode::Ok);
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Connected));
    assert_eq!(lamp.programs().len(), 1);

    // The lamp's own state report flows back into the directory.
    match fx.events.recv().await {
        Some(PoolEvent::LampStateChanged { lamp_id }) => assert_eq!(lamp_id, "l1"),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
    assert_eq!(fx.directory.get("l1").map(|r| r.state.brightness), Ok(100));

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn calls_stay_fifo_per_lamp() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    let (a, b) = tokio::join!(
        fx.pool.submit("l1", methods::APPLY_PROGRAM, program(1)),
        fx.pool.submit("l1", methods::LAMP_CLEAR_FAULT, json!({ "fault": 1 })),
    );
    assert_eq!((a, b), (ResponseCode::Ok, ResponseCode::Ok));

    let methods_seen: Vec<String> = lamp.calls().into_iter().map(|(m, _)| m).collect();
    assert_eq!(methods_seen, vec![methods::APPLY_PROGRAM, methods::LAMP_CLEAR_FAULT]);

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn unknown_lamp_is_unreachable() -> anyhow::Result<()> {
    let fx = fixture(PoolConfig::default())?;
    let code = fx.pool.submit("ghost", methods::APPLY_PROGRAM, program(1)).await;
    assert_eq!(code, ResponseCode::ErrLampUnreachable);
    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn enqueue_accepts_before_the_call_runs() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    // Unknown lamps are refused at acceptance time.
    assert_eq!(
        fx.pool.enqueue("ghost", methods::APPLY_PROGRAM, program(1)).err(),
        Some(ResponseCode::ErrLampUnreachable)
    );

    // A known-but-unreachable lamp still accepts: the retry chain runs
    // behind the acknowledgment, not in front of it.
    lamp.set_reachable(false);
    let Ok(outcome) = fx.pool.enqueue("l1", methods::APPLY_PROGRAM, program(1)) else {
        anyhow::bail!("enqueue to a known lamp was refused");
    };
    let code = outcome.await.unwrap_or(ResponseCode::ErrLampUnreachable);
    assert_eq!(code, ResponseCode::ErrLampUnreachable);
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Lost));

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_backoff() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    // Two transport failures, then the third attempt lands.
    lamp.fail_next_calls(2);
    let started = tokio::time::Instant::now();
    let code = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(5)).await;
    assert_eq!(code, ResponseCode::Ok);
    // Both backoffs (100 ms + 400 ms) were taken.
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Connected));

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_failures_exhaust_retries_and_drop_link() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    lamp.fail_next_calls(3);
    let code = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(5)).await;
    assert_eq!(code, ResponseCode::ErrLampUnreachable);
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Lost));

    // The failure budget is spent; the next call rejoins and succeeds.
    let code = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(6)).await;
    assert_eq!(code, ResponseCode::Ok);
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Connected));

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reannounce_wakes_a_lost_lamp() -> anyhow::Result<()> {
    let mut fx = fixture(PoolConfig::default())?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    let code = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(1)).await;
    assert_eq!(code, ResponseCode::Ok);
    let _ = fx.events.recv().await; // state change

    fx.bus.disconnect_lamp("l1", true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Lost));

    lamp.set_reachable(true);
    fx.bus.re_announce_lamp("l1");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Connected));

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lost_lamp_leaves_directory_after_grace() -> anyhow::Result<()> {
    let config = PoolConfig { grace: Duration::from_millis(250), ..Default::default() };
    let mut fx = fixture(config)?;
    fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    // Establish, then sever without recovery.
    let _ = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(1)).await;
    let _ = fx.events.recv().await; // state change
    fx.bus.disconnect_lamp("l1", true);

    tokio::time::sleep(Duration::from_millis(300)).await;
    match fx.events.recv().await {
        Some(PoolEvent::LampDropped { lamp_id }) => assert_eq!(lamp_id, "l1"),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
    assert!(!fx.directory.contains("l1"));
    assert_eq!(fx.pool.link_state("l1"), None);

    fx.shutdown.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn recovered_lamp_survives_grace() -> anyhow::Result<()> {
    let config = PoolConfig { grace: Duration::from_millis(250), ..Default::default() };
    let mut fx = fixture(config)?;
    let lamp = fx.bus.add_lamp(SimLampSpec::named("l1"));
    let _ = fx.events.recv().await;

    let _ = fx.pool.submit("l1", methods::APPLY_PROGRAM, program(1)).await;
    let _ = fx.events.recv().await;
    fx.bus.disconnect_lamp("l1", true);
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Recovery inside the window: the grace timer must no-op.
    lamp.set_reachable(true);
    fx.bus.re_announce_lamp("l1");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(fx.directory.contains("l1"));
    assert_eq!(fx.pool.link_state("l1"), Some(LinkState::Connected));

    fx.shutdown.cancel();
    Ok(())
}
