// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lumend: the controller service daemon for lumen lighting networks.

pub mod catalog;
pub mod config;
pub mod deps;
pub mod exec;
pub mod lamps;
pub mod service;
pub mod signals;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use lumenwire::bus::nats::{NatsBus, NatsBusConfig};
use lumenwire::bus::Announcement;

use crate::config::CtlConfig;
use crate::lamps::PoolConfig;
use crate::service::{ControllerService, ServiceConfig, CONTROLLER_SERVICE_VERSION};

/// Run the controller daemon until shutdown.
pub async fn run(config: CtlConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let mut bus_config = NatsBusConfig::new(config.nats_url.clone());
    bus_config.token = config.nats_token.clone();
    bus_config.prefix = config.prefix.clone();
    let bus = NatsBus::connect(bus_config).await?;

    let rank = config.rank.filter(|r| *r != 0).unwrap_or_else(nonzero_rank);
    let device_id =
        config.device_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let announcement = Announcement {
        version: CONTROLLER_SERVICE_VERSION,
        port: 0,
        bus_name: format!(":{device_id}"),
        device_id: device_id.clone(),
        device_name: config.device_name.clone(),
        rank,
        is_leader: config.leader,
    };

    let service_config = ServiceConfig {
        announcement,
        announce_interval: config.announce_interval(),
        pool: PoolConfig { grace: config.lamp_grace(), ..Default::default() },
    };
    let _service = ControllerService::start(
        Arc::new(bus.service_bus()),
        Arc::new(bus.lamp_bus()),
        service_config,
        shutdown.clone(),
    )?;

    info!(device_id, rank, "lumend running");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.cancel();
    Ok(())
}

/// Election rank: nonzero 64-bit random draw at service start.
fn nonzero_rank() -> u64 {
    loop {
        let rank: u64 = rand::random();
        if rank != 0 {
            return rank;
        }
    }
}
