// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-lamp effect descriptors: the leaf contract between the controller and
//! lamp firmware.
//!
//! The scene executor lowers every component kind to these two shapes and
//! submits one [`LampProgram`] per lamp per scene. The firmware effect engine
//! interprets them; the controller never tracks effect completion.

use serde::{Deserialize, Serialize};

use crate::state::LampState;

/// One time-anchored effect addressed to a single lamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectDescriptor {
    /// Linearly interpolate to `to` over `transition_period` ms.
    Transition { to: LampState, transition_period: u32 },
    /// `num_pulses` pulses of `period` ms, `duration` ms at `to`, resting at
    /// `from`. Strobes arrive as pulses with `duration = period / 2`; cycles
    /// as pulses whose final state persistence is firmware-defined.
    Pulse { from: LampState, to: LampState, period: u32, duration: u32, num_pulses: u32 },
}

/// A batched, time-anchored submission for one lamp.
///
/// Effects are listed in scene component order; later effects supersede
/// earlier ones for overlapping state fields. `start_at_ms` is the shared
/// scene anchor (epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LampProgram {
    pub start_at_ms: u64,
    pub effects: Vec<EffectDescriptor>,
}
