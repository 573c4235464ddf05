// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenarios.
//!
//! Runs real controller services and clients over the in-memory bus, with
//! scriptable lamps, leadership handover, and deadline-based event helpers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lumen::event::ClientEvent;
use lumen::ControllerClient;
use lumend::lamps::PoolConfig;
use lumend::service::{ControllerService, ServiceConfig, CONTROLLER_SERVICE_VERSION};
use lumenwire::bus::memory::{MemoryBus, SimLamp, SimLampSpec};
use lumenwire::bus::Announcement;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One in-process lighting network.
pub struct Network {
    pub bus: MemoryBus,
    pub shutdown: CancellationToken,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self { bus: MemoryBus::new(), shutdown: CancellationToken::new() }
    }

    /// Boot a controller service claiming leadership at `rank`.
    pub fn start_controller(
        &self,
        device_id: &str,
        rank: u64,
    ) -> anyhow::Result<Arc<ControllerService>> {
        let announcement = Announcement {
            version: CONTROLLER_SERVICE_VERSION,
            port: 7,
            bus_name: format!(":{device_id}"),
            device_id: device_id.to_owned(),
            device_name: format!("ctl-{device_id}"),
            rank,
            is_leader: true,
        };
        ControllerService::start(
            self.bus.service_bus(),
            self.bus.lamp_bus(),
            ServiceConfig {
                announcement,
                announce_interval: Duration::from_secs(3600),
                pool: PoolConfig::default(),
            },
            self.shutdown.child_token(),
        )
    }

    /// Boot a client and hand back its event stream.
    pub fn start_client(
        &self,
    ) -> anyhow::Result<(ControllerClient, mpsc::UnboundedReceiver<ClientEvent>)> {
        let client = ControllerClient::start(self.bus.client_bus())?;
        let events =
            client.events().ok_or_else(|| anyhow::anyhow!("event stream already taken"))?;
        Ok((client, events))
    }

    pub fn add_lamp(&self, lamp_id: &str) -> Arc<SimLamp> {
        self.bus.add_lamp(SimLampSpec::named(lamp_id))
    }

    /// Kill a controller, dropping every client session it held.
    pub fn kill_controller(&self, device_id: &str) {
        self.bus.drop_service(device_id);
    }
}

/// Wait for the first event the filter accepts, failing at the deadline.
pub async fn wait_for<T>(
    rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    mut filter: impl FnMut(ClientEvent) -> Option<T>,
) -> anyhow::Result<T> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            anyhow::bail!("deadline waiting for event");
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(event)) => {
                if let Some(out) = filter(event) {
                    return Ok(out);
                }
            }
            Ok(None) => anyhow::bail!("event stream closed"),
            Err(_) => anyhow::bail!("deadline waiting for event"),
        }
    }
}

/// Wait for a `Connected` event from `device_id`.
pub async fn wait_connected(
    rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    device_id: &str,
) -> anyhow::Result<()> {
    let want = device_id.to_owned();
    wait_for(rx, move |event| match event {
        ClientEvent::Connected { device_id, .. } if device_id == want => Some(()),
        _ => None,
    })
    .await
}

/// Wait for a `Disconnected` event from `device_id`.
pub async fn wait_disconnected(
    rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    device_id: &str,
) -> anyhow::Result<()> {
    let want = device_id.to_owned();
    wait_for(rx, move |event| match event {
        ClientEvent::Disconnected { device_id, .. } if device_id == want => Some(()),
        _ => None,
    })
    .await
}

/// Poll until a lamp has accepted `count` effect programs.
pub async fn wait_programs(lamp: &SimLamp, count: usize) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if lamp.programs().len() >= count {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!(
                "lamp {} accepted {} programs, wanted {count}",
                lamp.lamp_id,
                lamp.programs().len()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
