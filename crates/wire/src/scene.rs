// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenes: declarative programs of effect components over lamps and groups.
//!
//! A scene holds eight parallel component lists, one per effect kind. Every
//! component carries its own `(lamps, groups)` target set, so a single scene
//! can fan heterogeneous effects out simultaneously. Cycle components share
//! the pulse wire shape; whether the final state persists after the last
//! cycle is decided by the lamp-side effect engine.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::response::ResponseCode;
use crate::state::LampState;

/// Atomically retarget the component's lamps to `state` over
/// `transition_period` ms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionToState {
    pub lamps: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub state: LampState,
    pub transition_period: u32,
}

/// Like [`TransitionToState`], with the target resolved from a preset at
/// execution time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionToPreset {
    pub lamps: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub preset_id: String,
    pub transition_period: u32,
}

/// `num_pulses` pulses of `period` ms each, `duration` ms "on" at `to_state`
/// starting from `from_state`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PulseWithState {
    pub lamps: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub from_state: LampState,
    pub to_state: LampState,
    pub period: u32,
    pub duration: u32,
    pub num_pulses: u32,
}

/// Pulse with both endpoint states resolved from presets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PulseWithPreset {
    pub lamps: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub from_preset: String,
    pub to_preset: String,
    pub period: u32,
    pub duration: u32,
    pub num_pulses: u32,
}

/// `num_strobes` alternations between the endpoint states; 50% duty cycle
/// implied by `period`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrobeWithState {
    pub lamps: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub from_state: LampState,
    pub to_state: LampState,
    pub period: u32,
    pub num_strobes: u32,
}

/// Strobe with both endpoint states resolved from presets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrobeWithPreset {
    pub lamps: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub from_preset: String,
    pub to_preset: String,
    pub period: u32,
    pub num_strobes: u32,
}

/// Cycle components are pulses on the wire.
pub type CycleWithState = PulseWithState;
/// Cycle components are pulses on the wire.
pub type CycleWithPreset = PulseWithPreset;

/// A user-created scene: eight homogeneous effect-component lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transition_to_state: Vec<TransitionToState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transition_to_preset: Vec<TransitionToPreset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulse_with_state: Vec<PulseWithState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulse_with_preset: Vec<PulseWithPreset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strobe_with_state: Vec<StrobeWithState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strobe_with_preset: Vec<StrobeWithPreset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle_with_state: Vec<CycleWithState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle_with_preset: Vec<CycleWithPreset>,
}

/// Borrowed, tagged view of one scene component, in execution order.
#[derive(Debug, Clone, Copy)]
pub enum SceneComponent<'a> {
    TransitionToState(&'a TransitionToState),
    TransitionToPreset(&'a TransitionToPreset),
    PulseWithState(&'a PulseWithState),
    PulseWithPreset(&'a PulseWithPreset),
    StrobeWithState(&'a StrobeWithState),
    StrobeWithPreset(&'a StrobeWithPreset),
    CycleWithState(&'a CycleWithState),
    CycleWithPreset(&'a CycleWithPreset),
}

impl SceneComponent<'_> {
    /// The component's `(lamps, groups)` target set.
    pub fn targets(&self) -> (&BTreeSet<String>, &BTreeSet<String>) {
        match self {
            Self::TransitionToState(c) => (&c.lamps, &c.groups),
            Self::TransitionToPreset(c) => (&c.lamps, &c.groups),
            Self::PulseWithState(c) | Self::CycleWithState(c) => (&c.lamps, &c.groups),
            Self::PulseWithPreset(c) | Self::CycleWithPreset(c) => (&c.lamps, &c.groups),
            Self::StrobeWithState(c) => (&c.lamps, &c.groups),
            Self::StrobeWithPreset(c) => (&c.lamps, &c.groups),
        }
    }
}

impl Scene {
    /// Iterate components in the order the executor dispatches them:
    /// transition, pulse, strobe, cycle, state-addressed before
    /// preset-addressed within each kind.
    pub fn components(&self) -> impl Iterator<Item = SceneComponent<'_>> {
        let transitions = self
            .transition_to_state
            .iter()
            .map(SceneComponent::TransitionToState)
            .chain(self.transition_to_preset.iter().map(SceneComponent::TransitionToPreset));
        let pulses = self
            .pulse_with_state
            .iter()
            .map(SceneComponent::PulseWithState)
            .chain(self.pulse_with_preset.iter().map(SceneComponent::PulseWithPreset));
        let strobes = self
            .strobe_with_state
            .iter()
            .map(SceneComponent::StrobeWithState)
            .chain(self.strobe_with_preset.iter().map(SceneComponent::StrobeWithPreset));
        let cycles = self
            .cycle_with_state
            .iter()
            .map(SceneComponent::CycleWithState)
            .chain(self.cycle_with_preset.iter().map(SceneComponent::CycleWithPreset));
        transitions.chain(pulses).chain(strobes).chain(cycles)
    }

    /// Every group id referenced by any component.
    pub fn referenced_groups(&self) -> BTreeSet<String> {
        self.components().flat_map(|c| c.targets().1.iter().cloned().collect::<Vec<_>>()).collect()
    }

    /// Every preset id referenced by any preset-addressed component.
    pub fn referenced_presets(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for c in &self.transition_to_preset {
            out.insert(c.preset_id.clone());
        }
        for c in self.pulse_with_preset.iter().chain(self.cycle_with_preset.iter()) {
            out.insert(c.from_preset.clone());
            out.insert(c.to_preset.clone());
        }
        for c in &self.strobe_with_preset {
            out.insert(c.from_preset.clone());
            out.insert(c.to_preset.clone());
        }
        out
    }

    /// Whether any component references `group_id`.
    pub fn is_dependent_on_group(&self, group_id: &str) -> bool {
        self.components().any(|c| c.targets().1.contains(group_id))
    }

    /// Whether any component references `preset_id`.
    pub fn is_dependent_on_preset(&self, preset_id: &str) -> bool {
        self.referenced_presets().contains(preset_id)
    }

    /// Structural validation: timing parameters only.
    ///
    /// Reference existence is checked against the catalog by the controller;
    /// empty `(lamps, groups)` target sets are permitted and no-op at apply.
    pub fn validate(&self) -> Result<(), ResponseCode> {
        for c in self.pulse_with_state.iter().chain(self.cycle_with_state.iter()) {
            validate_pulse_timing(c.period, c.duration, c.num_pulses)?;
        }
        for c in self.pulse_with_preset.iter().chain(self.cycle_with_preset.iter()) {
            validate_pulse_timing(c.period, c.duration, c.num_pulses)?;
        }
        for c in &self.strobe_with_state {
            validate_pulse_timing(c.period, c.period / 2, c.num_strobes)?;
        }
        for c in &self.strobe_with_preset {
            validate_pulse_timing(c.period, c.period / 2, c.num_strobes)?;
        }
        Ok(())
    }
}

fn validate_pulse_timing(period: u32, duration: u32, pulses: u32) -> Result<(), ResponseCode> {
    if period == 0 || pulses == 0 || duration > period {
        return Err(ResponseCode::ErrInvalid);
    }
    Ok(())
}

/// A user-created ordered list of scenes applied concurrently with a shared
/// start instant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MasterScene {
    pub scenes: Vec<String>,
}

impl MasterScene {
    pub fn new(scenes: impl IntoIterator<Item = String>) -> Self {
        Self { scenes: scenes.into_iter().collect() }
    }

    /// Whether this master scene contains `scene_id`.
    pub fn is_dependent_on_scene(&self, scene_id: &str) -> bool {
        self.scenes.iter().any(|s| s == scene_id)
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
