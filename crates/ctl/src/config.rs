// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the lumend controller daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "lumend", about = "Lighting controller service daemon")]
pub struct CtlConfig {
    /// Human-readable device name carried in announcements.
    #[arg(long, default_value = "lumend", env = "LUMEND_DEVICE_NAME")]
    pub device_name: String,

    /// Stable device id. Generated fresh at startup when unset.
    #[arg(long, env = "LUMEND_DEVICE_ID")]
    pub device_id: Option<String>,

    /// NATS server URL.
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "LUMEND_NATS_URL")]
    pub nats_url: String,

    /// NATS auth token.
    #[arg(long, env = "LUMEND_NATS_TOKEN")]
    pub nats_token: Option<String>,

    /// Subject prefix on the bus.
    #[arg(long, default_value = "lumen", env = "LUMEND_PREFIX")]
    pub prefix: String,

    /// Announce interval in milliseconds.
    #[arg(long, default_value_t = 30000, env = "LUMEND_ANNOUNCE_MS")]
    pub announce_ms: u64,

    /// Grace window before a lost lamp is dropped from the directory, ms.
    #[arg(long, default_value_t = 60000, env = "LUMEND_LAMP_GRACE_MS")]
    pub lamp_grace_ms: u64,

    /// Election rank override. A nonzero random value is drawn when unset;
    /// set explicitly only in tests.
    #[arg(long, env = "LUMEND_RANK")]
    pub rank: Option<u64>,

    /// Whether to claim leadership in announcements.
    #[arg(long, default_value_t = true, env = "LUMEND_LEADER")]
    pub leader: bool,
}

impl CtlConfig {
    pub fn announce_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.announce_ms)
    }

    pub fn lamp_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lamp_grace_ms)
    }
}
