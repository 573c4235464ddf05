// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency resolver: cycle detection, delete guards, and target
//! expansion.
//!
//! Every function here is pure over catalog snapshots. Callers take one
//! store lock at a time to build the snapshot, release it, then query.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use lumenwire::group::{LampGroup, ALL_LAMPS};
use lumenwire::scene::{MasterScene, Scene};

/// Whether installing `candidate` under `candidate_id` would close a cycle
/// in the sub-group graph (including direct self-reference).
pub fn is_group_cyclic(
    groups: &IndexMap<String, LampGroup>,
    candidate_id: &str,
    candidate: &LampGroup,
) -> bool {
    let lookup = |id: &str| -> Option<&LampGroup> {
        if id == candidate_id {
            Some(candidate)
        } else {
            groups.get(id)
        }
    };

    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<String> = candidate.sub_groups.iter().cloned().collect();
    while let Some(id) = stack.pop() {
        if id == candidate_id {
            return true;
        }
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(group) = lookup(&id) {
            stack.extend(group.sub_groups.iter().cloned());
        }
    }
    false
}

/// Expand a component's `(lamps, groups)` target set to a flat lamp set.
///
/// Transitive closure over sub-groups unioned with direct lamps; duplicates
/// collapse. [`ALL_LAMPS`] expands to every known lamp. Group ids deleted
/// since validation expand to nothing.
pub fn expand_targets(
    groups: &IndexMap<String, LampGroup>,
    known_lamps: &BTreeSet<String>,
    lamps: &BTreeSet<String>,
    group_ids: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut out: BTreeSet<String> = lamps.iter().cloned().collect();
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<String> = group_ids.iter().cloned().collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if id == ALL_LAMPS {
            out.extend(known_lamps.iter().cloned());
            continue;
        }
        if let Some(group) = groups.get(&id) {
            out.extend(group.lamps.iter().cloned());
            stack.extend(group.sub_groups.iter().cloned());
        }
    }
    out
}

/// Everything a scene reaches: groups (with transitive sub-groups), presets,
/// and the flattened lamp set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneRefs {
    pub groups: BTreeSet<String>,
    pub presets: BTreeSet<String>,
    pub lamps: BTreeSet<String>,
}

pub fn transitive_refs(
    scene: &Scene,
    groups: &IndexMap<String, LampGroup>,
    known_lamps: &BTreeSet<String>,
) -> SceneRefs {
    let direct_groups = scene.referenced_groups();

    let mut reached = BTreeSet::new();
    let mut stack: Vec<String> = direct_groups.iter().cloned().collect();
    while let Some(id) = stack.pop() {
        if !reached.insert(id.clone()) {
            continue;
        }
        if let Some(group) = groups.get(&id) {
            stack.extend(group.sub_groups.iter().cloned());
        }
    }

    let mut lamps = BTreeSet::new();
    for component in scene.components() {
        let (l, g) = component.targets();
        lamps.extend(expand_targets(groups, known_lamps, l, g));
    }

    SceneRefs { groups: reached, presets: scene.referenced_presets(), lamps }
}

/// Shallow delete guard for a lamp group: refused while another group nests
/// it or any scene targets it.
pub fn group_delete_blocked(
    groups: &IndexMap<String, LampGroup>,
    scenes: &IndexMap<String, Scene>,
    target: &str,
) -> bool {
    groups.iter().any(|(id, g)| id != target && g.references_group(target))
        || scenes.values().any(|s| s.is_dependent_on_group(target))
}

/// Shallow delete guard for a preset: refused while any scene references it.
pub fn preset_delete_blocked(scenes: &IndexMap<String, Scene>, target: &str) -> bool {
    scenes.values().any(|s| s.is_dependent_on_preset(target))
}

/// Shallow delete guard for a scene: refused while any master scene
/// contains it.
pub fn scene_delete_blocked(masters: &IndexMap<String, MasterScene>, target: &str) -> bool {
    masters.values().any(|m| m.is_dependent_on_scene(target))
}

#[cfg(test)]
#[path = "deps_tests.rs"]
mod tests;
