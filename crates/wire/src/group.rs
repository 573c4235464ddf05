// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lamp groups: user-created sets of lamps and nested sub-groups.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Id of the implicit group containing every known lamp.
pub const ALL_LAMPS: &str = "ALL_LAMPS";

/// A user-created lamp group.
///
/// `sub_groups` must form a DAG across the catalog; the controller validates
/// this on every create and update. Expansion to lamps is the transitive
/// closure over `sub_groups` unioned with `lamps`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LampGroup {
    pub lamps: BTreeSet<String>,
    pub sub_groups: BTreeSet<String>,
}

impl LampGroup {
    pub fn new(
        lamps: impl IntoIterator<Item = String>,
        sub_groups: impl IntoIterator<Item = String>,
    ) -> Self {
        Self { lamps: lamps.into_iter().collect(), sub_groups: sub_groups.into_iter().collect() }
    }

    /// Whether this group references `group_id` as a direct sub-group.
    pub fn references_group(&self, group_id: &str) -> bool {
        self.sub_groups.contains(group_id)
    }
}
