// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;
use yare::parameterized;

use super::*;

#[test]
fn patch_resolve_overrides_only_set_fields() {
    let base = LampState { on_off: false, hue: 10, saturation: 20, color_temp: 30, brightness: 40 };
    let patch = StatePatch { on_off: Some(true), brightness: Some(255), ..Default::default() };

    let resolved = patch.resolve(base);
    assert!(resolved.on_off);
    assert_eq!(resolved.brightness, 255);
    assert_eq!(resolved.hue, 10);
    assert_eq!(resolved.saturation, 20);
    assert_eq!(resolved.color_temp, 30);
}

#[test]
fn full_patch_resolves_to_the_source_state() {
    let state = LampState { on_off: true, hue: 1, saturation: 2, color_temp: 3, brightness: 4 };
    assert_eq!(StatePatch::full(state).resolve(LampState::default()), state);
}

#[test]
fn empty_patch_is_identity() {
    let base = LampState { on_off: true, hue: 7, ..Default::default() };
    let patch = StatePatch::default();
    assert!(patch.is_empty());
    assert_eq!(patch.resolve(base), base);
}

#[parameterized(
    on_off = { StateField::OnOff, "OnOff" },
    hue = { StateField::Hue, "Hue" },
    saturation = { StateField::Saturation, "Saturation" },
    brightness = { StateField::Brightness, "Brightness" },
    color_temp = { StateField::ColorTemp, "ColorTemp" },
)]
fn field_name_round_trip(field: StateField, name: &str) {
    assert_eq!(field.as_str(), name);
    assert_eq!(StateField::parse(name), Some(field));
}

#[test]
fn unknown_field_name_rejected() {
    assert_eq!(StateField::parse("Chroma"), None);
    assert_eq!(StateField::parse("onoff"), None);
}

#[test]
fn assign_enforces_value_types() {
    let mut state = LampState::default();

    assert!(StateField::OnOff.assign(&mut state, &json!(true)));
    assert!(state.on_off);
    assert!(!StateField::OnOff.assign(&mut state, &json!(42)));

    assert!(StateField::Hue.assign(&mut state, &json!(1234)));
    assert_eq!(state.hue, 1234);
    assert!(!StateField::Hue.assign(&mut state, &json!(true)));
    assert!(!StateField::Hue.assign(&mut state, &json!(u64::from(u32::MAX) + 1)));
}

#[test]
fn clear_removes_single_field_from_patch() {
    let mut patch = StatePatch::full(LampState { brightness: 9, ..Default::default() });
    StateField::Brightness.clear(&mut patch);
    assert_eq!(patch.brightness, None);
    assert!(patch.on_off.is_some());
}

#[test]
fn state_json_round_trip() -> anyhow::Result<()> {
    let state = LampState { on_off: true, hue: 5, saturation: 6, color_temp: 7, brightness: 8 };
    let value = serde_json::to_value(state)?;
    assert_eq!(serde_json::from_value::<LampState>(value)?, state);
    Ok(())
}
