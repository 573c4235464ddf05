// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog stores: the authoritative in-memory state of the controller.
//!
//! One [`Store`] per user-created entity type, each behind its own mutex.
//! Discovered lamps live in the separate [`LampDirectory`] since they are
//! admission-free and carry device state rather than user data. Locking
//! discipline: never take two store locks at once; snapshot under the lock,
//! release, then act.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use lumenwire::response::ResponseCode;
use lumenwire::state::{LampDetails, LampFaults, LampParameters, LampState, StateField};
use lumenwire::{DEFAULT_LANGUAGE, MAX_ENTITIES, MAX_ID_BYTES, MAX_NAME_BYTES};

/// Multilingual names: at most one per language tag.
pub type Names = BTreeMap<String, String>;

/// Validate a user-visible entity name.
pub fn validate_name(name: &str) -> Result<(), ResponseCode> {
    if name.is_empty() || name.len() > MAX_NAME_BYTES {
        return Err(ResponseCode::ErrInvalid);
    }
    Ok(())
}

/// Validate a BCP-47-shaped language tag. `"en"` is always supported.
pub fn validate_language(language: &str) -> Result<(), ResponseCode> {
    let shaped = !language.is_empty()
        && language.len() <= 35
        && language.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if shaped {
        Ok(())
    } else {
        Err(ResponseCode::ErrInvalid)
    }
}

/// One user-created entity with its names.
#[derive(Debug, Clone)]
struct Entry<T> {
    names: Names,
    data: T,
}

#[derive(Debug)]
struct StoreInner<T> {
    entries: IndexMap<String, Entry<T>>,
    generation: u32,
}

/// Insertion-ordered store for one entity type, capped at
/// [`MAX_ENTITIES`]. Every mutation bumps the generation counter; the
/// counter never travels on the wire, it only gates signal batching.
pub struct Store<T> {
    kind: &'static str,
    inner: Mutex<StoreInner<T>>,
}

impl<T: Clone> Store<T> {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, inner: Mutex::new(StoreInner { entries: IndexMap::new(), generation: 0 }) }
    }

    pub fn get_all_ids(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Result<T, ResponseCode> {
        self.inner.lock().entries.get(id).map(|e| e.data.clone()).ok_or(ResponseCode::ErrNotFound)
    }

    pub fn get_name(&self, id: &str, language: &str) -> Result<String, ResponseCode> {
        validate_language(language)?;
        let inner = self.inner.lock();
        let entry = inner.entries.get(id).ok_or(ResponseCode::ErrNotFound)?;
        entry.names.get(language).cloned().ok_or(ResponseCode::ErrNotFound)
    }

    pub fn set_name(&self, id: &str, name: &str, language: &str) -> Result<(), ResponseCode> {
        validate_name(name)?;
        validate_language(language)?;
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(id).ok_or(ResponseCode::ErrNotFound)?;
        entry.names.insert(language.to_owned(), name.to_owned());
        inner.generation = inner.generation.wrapping_add(1);
        Ok(())
    }

    /// Admit a new entity, allocating a fresh id.
    pub fn create(&self, data: T, name: &str, language: &str) -> Result<String, ResponseCode> {
        validate_name(name)?;
        validate_language(language)?;
        let mut inner = self.inner.lock();
        if inner.entries.len() >= MAX_ENTITIES {
            return Err(ResponseCode::ErrCapacity);
        }
        let id = new_entity_id();
        let mut names = Names::new();
        names.insert(language.to_owned(), name.to_owned());
        inner.entries.insert(id.clone(), Entry { names, data });
        inner.generation = inner.generation.wrapping_add(1);
        debug!(kind = self.kind, id, "entity created");
        Ok(id)
    }

    pub fn update(&self, id: &str, data: T) -> Result<(), ResponseCode> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(id).ok_or(ResponseCode::ErrNotFound)?;
        entry.data = data;
        inner.generation = inner.generation.wrapping_add(1);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<T, ResponseCode> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.shift_remove(id).ok_or(ResponseCode::ErrNotFound)?;
        inner.generation = inner.generation.wrapping_add(1);
        debug!(kind = self.kind, id, "entity deleted");
        Ok(entry.data)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.generation = inner.generation.wrapping_add(1);
    }

    /// Clone of all entity data, in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, T> {
        self.inner.lock().entries.iter().map(|(id, e)| (id.clone(), e.data.clone())).collect()
    }

    #[cfg(test)]
    pub fn generation(&self) -> u32 {
        self.inner.lock().generation
    }
}

/// Allocate a globally-unique entity id.
fn new_entity_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    debug_assert!(id.len() <= MAX_ID_BYTES);
    id
}

// -- Lamp directory ------------------------------------------------------------

/// Last-observed record for one discovered lamp.
#[derive(Debug, Clone, Default)]
pub struct LampRecord {
    pub names: Names,
    pub state: LampState,
    pub parameters: LampParameters,
    pub details: LampDetails,
    pub faults: LampFaults,
}

/// Discovered lamps. Lamp device state is owned by firmware; this holds the
/// controller's last-observed copy plus user-assigned names.
pub struct LampDirectory {
    inner: Mutex<IndexMap<String, LampRecord>>,
}

impl Default for LampDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl LampDirectory {
    pub fn new() -> Self {
        Self { inner: Mutex::new(IndexMap::new()) }
    }

    /// Record an announced lamp. Returns `true` when the lamp is new.
    ///
    /// Re-announces refresh observed device state but keep user-assigned
    /// names.
    pub fn upsert_announced(
        &self,
        lamp_id: &str,
        name: &str,
        state: LampState,
        parameters: LampParameters,
        details: LampDetails,
        faults: LampFaults,
    ) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(lamp_id) {
            Some(record) => {
                record.state = state;
                record.parameters = parameters;
                record.faults = faults;
                false
            }
            None => {
                let mut names = Names::new();
                names.insert(DEFAULT_LANGUAGE.to_owned(), name.to_owned());
                inner.insert(
                    lamp_id.to_owned(),
                    LampRecord { names, state, parameters, details, faults },
                );
                true
            }
        }
    }

    pub fn remove(&self, lamp_id: &str) -> bool {
        self.inner.lock().shift_remove(lamp_id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn id_set(&self) -> BTreeSet<String> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn get(&self, lamp_id: &str) -> Result<LampRecord, ResponseCode> {
        self.inner.lock().get(lamp_id).cloned().ok_or(ResponseCode::ErrNotFound)
    }

    pub fn contains(&self, lamp_id: &str) -> bool {
        self.inner.lock().contains_key(lamp_id)
    }

    pub fn get_name(&self, lamp_id: &str, language: &str) -> Result<String, ResponseCode> {
        validate_language(language)?;
        let inner = self.inner.lock();
        let record = inner.get(lamp_id).ok_or(ResponseCode::ErrNotFound)?;
        record.names.get(language).cloned().ok_or(ResponseCode::ErrNotFound)
    }

    pub fn set_name(&self, lamp_id: &str, name: &str, language: &str) -> Result<(), ResponseCode> {
        validate_name(name)?;
        validate_language(language)?;
        let mut inner = self.inner.lock();
        let record = inner.get_mut(lamp_id).ok_or(ResponseCode::ErrNotFound)?;
        record.names.insert(language.to_owned(), name.to_owned());
        Ok(())
    }

    /// Update last-observed state. Returns `false` for unknown lamps.
    pub fn observe_state(&self, lamp_id: &str, state: LampState) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(lamp_id) {
            Some(record) => {
                record.state = state;
                true
            }
            None => false,
        }
    }

    pub fn clear_fault(&self, lamp_id: &str, fault: u32) -> Result<(), ResponseCode> {
        let mut inner = self.inner.lock();
        let record = inner.get_mut(lamp_id).ok_or(ResponseCode::ErrNotFound)?;
        record.faults.remove(&fault);
        Ok(())
    }

    /// Snapshot of all last-observed lamp states.
    pub fn state_snapshot(&self) -> IndexMap<String, LampState> {
        self.inner.lock().iter().map(|(id, r)| (id.clone(), r.state)).collect()
    }
}

// -- Default lamp state --------------------------------------------------------

/// The boot/reset state every lamp returns to, mutable via
/// `SetDefaultLampState`.
pub struct DefaultState {
    inner: Mutex<LampState>,
}

impl Default for DefaultState {
    fn default() -> Self {
        Self { inner: Mutex::new(LampState { on_off: true, ..Default::default() }) }
    }
}

impl DefaultState {
    pub fn get(&self) -> LampState {
        *self.inner.lock()
    }

    pub fn set(&self, state: LampState) {
        *self.inner.lock() = state;
    }

    /// Reset one field of a target state back to the default's value.
    pub fn field_value(&self, field: StateField) -> Value {
        let state = self.get();
        match field {
            StateField::OnOff => Value::Bool(state.on_off),
            StateField::Hue => Value::from(state.hue),
            StateField::Saturation => Value::from(state.saturation),
            StateField::Brightness => Value::from(state.brightness),
            StateField::ColorTemp => Value::from(state.color_temp),
        }
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
