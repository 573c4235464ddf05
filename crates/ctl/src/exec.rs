// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene compiler: lowers a scene into per-lamp, time-anchored effect
//! programs.
//!
//! Compilation is pure over catalog snapshots; the service executes the
//! resulting plan through the lamp session pool. Within one plan a lamp's
//! effects keep scene component order, and the lamp-side engine lets later
//! effects supersede earlier ones for overlapping state fields.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use lumenwire::effect::{EffectDescriptor, LampProgram};
use lumenwire::group::LampGroup;
use lumenwire::response::ResponseCode;
use lumenwire::scene::{Scene, SceneComponent};
use lumenwire::state::{LampState, StatePatch};

use crate::deps::expand_targets;

/// A compiled scene: one batched program per targeted lamp.
#[derive(Debug, Clone, Default)]
pub struct ScenePlan {
    /// `(lamp_id, program)` in first-touch order.
    pub programs: Vec<(String, LampProgram)>,
    /// One code per component skipped at compile time (dangling preset).
    pub component_errors: Vec<ResponseCode>,
}

/// Catalog snapshots the compiler works from.
pub struct CompileInputs<'a> {
    pub groups: &'a IndexMap<String, LampGroup>,
    pub presets: &'a IndexMap<String, StatePatch>,
    /// Last-observed state per known lamp; also defines the `ALL_LAMPS` set.
    pub lamp_states: &'a IndexMap<String, LampState>,
    /// Base for resolving presets on lamps with no observed state.
    pub default_state: LampState,
}

impl CompileInputs<'_> {
    fn base_state(&self, lamp_id: &str) -> LampState {
        self.lamp_states.get(lamp_id).copied().unwrap_or(self.default_state)
    }
}

/// Compile `scene` against the snapshots, anchoring every program at
/// `t0_ms`.
///
/// A component whose preset was deleted after validation is skipped and
/// recorded; sibling components still compile. Components with empty target
/// sets are no-ops.
pub fn compile_scene(scene: &Scene, inputs: &CompileInputs<'_>, t0_ms: u64) -> ScenePlan {
    let known: BTreeSet<String> = inputs.lamp_states.keys().cloned().collect();
    let mut per_lamp: IndexMap<String, Vec<EffectDescriptor>> = IndexMap::new();
    let mut component_errors = Vec::new();

    for component in scene.components() {
        let (lamps, groups) = component.targets();
        let targets = expand_targets(inputs.groups, &known, lamps, groups);
        if targets.is_empty() {
            continue;
        }
        if let Err(code) = lower_component(&component, inputs, &targets, &mut per_lamp) {
            component_errors.push(code);
        }
    }

    let programs = per_lamp
        .into_iter()
        .map(|(lamp_id, effects)| (lamp_id, LampProgram { start_at_ms: t0_ms, effects }))
        .collect();
    ScenePlan { programs, component_errors }
}

fn lower_component(
    component: &SceneComponent<'_>,
    inputs: &CompileInputs<'_>,
    targets: &BTreeSet<String>,
    per_lamp: &mut IndexMap<String, Vec<EffectDescriptor>>,
) -> Result<(), ResponseCode> {
    match component {
        SceneComponent::TransitionToState(c) => {
            for lamp in targets {
                per_lamp.entry(lamp.clone()).or_default().push(EffectDescriptor::Transition {
                    to: c.state,
                    transition_period: c.transition_period,
                });
            }
        }
        SceneComponent::TransitionToPreset(c) => {
            let patch = resolve(inputs, &c.preset_id)?;
            for lamp in targets {
                per_lamp.entry(lamp.clone()).or_default().push(EffectDescriptor::Transition {
                    to: patch.resolve(inputs.base_state(lamp)),
                    transition_period: c.transition_period,
                });
            }
        }
        SceneComponent::PulseWithState(c) | SceneComponent::CycleWithState(c) => {
            for lamp in targets {
                per_lamp.entry(lamp.clone()).or_default().push(EffectDescriptor::Pulse {
                    from: c.from_state,
                    to: c.to_state,
                    period: c.period,
                    duration: c.duration,
                    num_pulses: c.num_pulses,
                });
            }
        }
        SceneComponent::PulseWithPreset(c) | SceneComponent::CycleWithPreset(c) => {
            let from = resolve(inputs, &c.from_preset)?;
            let to = resolve(inputs, &c.to_preset)?;
            for lamp in targets {
                let base = inputs.base_state(lamp);
                per_lamp.entry(lamp.clone()).or_default().push(EffectDescriptor::Pulse {
                    from: from.resolve(base),
                    to: to.resolve(base),
                    period: c.period,
                    duration: c.duration,
                    num_pulses: c.num_pulses,
                });
            }
        }
        SceneComponent::StrobeWithState(c) => {
            for lamp in targets {
                per_lamp.entry(lamp.clone()).or_default().push(EffectDescriptor::Pulse {
                    from: c.from_state,
                    to: c.to_state,
                    period: c.period,
                    duration: c.period / 2,
                    num_pulses: c.num_strobes,
                });
            }
        }
        SceneComponent::StrobeWithPreset(c) => {
            let from = resolve(inputs, &c.from_preset)?;
            let to = resolve(inputs, &c.to_preset)?;
            for lamp in targets {
                let base = inputs.base_state(lamp);
                per_lamp.entry(lamp.clone()).or_default().push(EffectDescriptor::Pulse {
                    from: from.resolve(base),
                    to: to.resolve(base),
                    period: c.period,
                    duration: c.period / 2,
                    num_pulses: c.num_strobes,
                });
            }
        }
    }
    Ok(())
}

fn resolve(inputs: &CompileInputs<'_>, preset_id: &str) -> Result<StatePatch, ResponseCode> {
    inputs.presets.get(preset_id).copied().ok_or(ResponseCode::ErrDependency)
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
