// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lumenwire::group::LampGroup;
use yare::parameterized;

use super::*;

fn store() -> Store<LampGroup> {
    Store::new("lamp group")
}

#[test]
fn create_get_round_trip() -> Result<(), ResponseCode> {
    let store = store();
    let group = LampGroup::new(["l1".to_owned()], []);
    let id = store.create(group.clone(), "Kitchen", "en")?;

    assert_eq!(store.get(&id)?, group);
    assert_eq!(store.get_name(&id, "en")?, "Kitchen");
    assert_eq!(store.get_all_ids(), vec![id]);
    Ok(())
}

#[test]
fn ids_are_unique_and_bounded() -> Result<(), ResponseCode> {
    let store = store();
    let a = store.create(LampGroup::default(), "a", "en")?;
    let b = store.create(LampGroup::default(), "b", "en")?;
    assert_ne!(a, b);
    assert!(a.len() <= lumenwire::MAX_ID_BYTES);
    Ok(())
}

#[test]
fn set_name_per_language() -> Result<(), ResponseCode> {
    let store = store();
    let id = store.create(LampGroup::default(), "Kitchen", "en")?;
    store.set_name(&id, "Cuisine", "fr")?;
    store.set_name(&id, "Koek", "fr")?;

    assert_eq!(store.get_name(&id, "en")?, "Kitchen");
    // Second write for the same language replaces, never duplicates.
    assert_eq!(store.get_name(&id, "fr")?, "Koek");
    assert_eq!(store.get_name(&id, "de"), Err(ResponseCode::ErrNotFound));
    Ok(())
}

#[parameterized(
    empty = { "" },
    spaced = { "en US" },
    long = { "this-language-tag-is-way-over-the-thirty-five-byte-bcp47-limit" },
)]
fn bad_language_rejected(language: &str) {
    let store = store();
    assert_eq!(
        store.create(LampGroup::default(), "x", language),
        Err(ResponseCode::ErrInvalid)
    );
}

#[test]
fn bad_names_rejected() -> Result<(), ResponseCode> {
    let store = store();
    assert_eq!(store.create(LampGroup::default(), "", "en"), Err(ResponseCode::ErrInvalid));
    let long = "x".repeat(lumenwire::MAX_NAME_BYTES + 1);
    let id = store.create(LampGroup::default(), "ok", "en")?;
    assert_eq!(store.set_name(&id, &long, "en"), Err(ResponseCode::ErrInvalid));
    Ok(())
}

#[test]
fn capacity_cap_and_recovery() -> Result<(), ResponseCode> {
    let store = store();
    let mut last = String::new();
    for i in 0..lumenwire::MAX_ENTITIES {
        last = store.create(LampGroup::default(), &format!("g{i}"), "en")?;
    }
    assert_eq!(
        store.create(LampGroup::default(), "overflow", "en"),
        Err(ResponseCode::ErrCapacity)
    );

    store.delete(&last)?;
    store.create(LampGroup::default(), "fits-again", "en")?;
    Ok(())
}

#[test]
fn update_and_delete_missing() {
    let store = store();
    assert_eq!(store.update("nope", LampGroup::default()), Err(ResponseCode::ErrNotFound));
    assert!(store.delete("nope").is_err());
}

#[test]
fn every_mutation_bumps_generation() -> Result<(), ResponseCode> {
    let store = store();
    let g0 = store.generation();
    let id = store.create(LampGroup::default(), "a", "en")?;
    let g1 = store.generation();
    store.update(&id, LampGroup::new(["l1".to_owned()], []))?;
    let g2 = store.generation();
    store.set_name(&id, "b", "en")?;
    let g3 = store.generation();
    store.delete(&id)?;
    let g4 = store.generation();

    assert!(g0 < g1 && g1 < g2 && g2 < g3 && g3 < g4);

    // Reads leave the generation alone.
    let _ = store.get_all_ids();
    assert_eq!(store.generation(), g4);
    Ok(())
}

#[test]
fn reset_clears_everything() -> Result<(), ResponseCode> {
    let store = store();
    store.create(LampGroup::default(), "a", "en")?;
    store.reset();
    assert!(store.is_empty());
    Ok(())
}

// -- Lamp directory ------------------------------------------------------------

#[test]
fn directory_upsert_keeps_user_names() -> Result<(), ResponseCode> {
    let dir = LampDirectory::new();
    let announced = LampState { on_off: true, ..Default::default() };
    assert!(dir.upsert_announced(
        "l1",
        "bulb",
        announced,
        LampParameters::default(),
        LampDetails::default(),
        LampFaults::new(),
    ));

    dir.set_name("l1", "Porch", "en")?;
    let newer = LampState { brightness: 9, ..Default::default() };
    assert!(!dir.upsert_announced(
        "l1",
        "bulb",
        newer,
        LampParameters::default(),
        LampDetails::default(),
        LampFaults::new(),
    ));

    assert_eq!(dir.get_name("l1", "en")?, "Porch");
    assert_eq!(dir.get("l1")?.state, newer);
    Ok(())
}

#[test]
fn directory_state_and_faults() -> Result<(), ResponseCode> {
    let dir = LampDirectory::new();
    dir.upsert_announced(
        "l1",
        "bulb",
        LampState::default(),
        LampParameters::default(),
        LampDetails::default(),
        [3, 7].into_iter().collect(),
    );

    let observed = LampState { hue: 11, ..Default::default() };
    assert!(dir.observe_state("l1", observed));
    assert!(!dir.observe_state("ghost", observed));
    assert_eq!(dir.get("l1")?.state, observed);

    dir.clear_fault("l1", 3)?;
    assert_eq!(dir.get("l1")?.faults, [7].into_iter().collect());

    assert!(dir.remove("l1"));
    assert!(!dir.contains("l1"));
    Ok(())
}

#[test]
fn default_state_field_values() {
    let default = DefaultState::default();
    default.set(LampState { on_off: false, brightness: 17, ..Default::default() });
    assert_eq!(default.field_value(StateField::OnOff), Value::Bool(false));
    assert_eq!(default.field_value(StateField::Brightness), Value::from(17u32));
}
