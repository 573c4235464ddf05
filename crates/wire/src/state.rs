// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lamp state, partial state templates, and per-lamp metadata.
//!
//! Color channels are domain-normalized fixed point: the full `u32` range
//! maps onto the channel's physical range, so `u32::MAX` is 100% brightness,
//! 360° hue, and so on. The controller never interprets these values; it
//! only relays them between clients and lamp firmware.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Full lamp state: the five channels every lamp carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LampState {
    pub on_off: bool,
    pub hue: u32,
    pub saturation: u32,
    pub color_temp: u32,
    pub brightness: u32,
}

/// Partial lamp state: a template where `None` means "do not override".
///
/// Presets are stored as patches so a preset can retarget a subset of
/// channels and leave the rest at whatever the lamp currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_off: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u32>,
}

impl StatePatch {
    /// A patch that overrides every channel.
    pub fn full(state: LampState) -> Self {
        Self {
            on_off: Some(state.on_off),
            hue: Some(state.hue),
            saturation: Some(state.saturation),
            color_temp: Some(state.color_temp),
            brightness: Some(state.brightness),
        }
    }

    /// Apply the patch on top of `base`, returning the resolved state.
    pub fn resolve(&self, base: LampState) -> LampState {
        LampState {
            on_off: self.on_off.unwrap_or(base.on_off),
            hue: self.hue.unwrap_or(base.hue),
            saturation: self.saturation.unwrap_or(base.saturation),
            color_temp: self.color_temp.unwrap_or(base.color_temp),
            brightness: self.brightness.unwrap_or(base.brightness),
        }
    }

    /// Whether the patch overrides nothing.
    pub fn is_empty(&self) -> bool {
        self.on_off.is_none()
            && self.hue.is_none()
            && self.saturation.is_none()
            && self.color_temp.is_none()
            && self.brightness.is_none()
    }
}

/// A single named state channel, as addressed by field-oriented mutations.
///
/// The wire carries the field name as a string; `as_str`/`parse` round-trip
/// the canonical spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    OnOff,
    Hue,
    Saturation,
    Brightness,
    ColorTemp,
}

impl StateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnOff => "OnOff",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::Brightness => "Brightness",
            Self::ColorTemp => "ColorTemp",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "OnOff" => Some(Self::OnOff),
            "Hue" => Some(Self::Hue),
            "Saturation" => Some(Self::Saturation),
            "Brightness" => Some(Self::Brightness),
            "ColorTemp" => Some(Self::ColorTemp),
            _ => None,
        }
    }

    /// Set this field on `state` from a wire value.
    ///
    /// Returns `false` when the value has the wrong JSON type for the field
    /// (`OnOff` is a bool, everything else a u32).
    pub fn assign(&self, state: &mut LampState, value: &serde_json::Value) -> bool {
        match self {
            Self::OnOff => match value.as_bool() {
                Some(b) => {
                    state.on_off = b;
                    true
                }
                None => false,
            },
            _ => {
                let Some(v) = value.as_u64().and_then(|v| u32::try_from(v).ok()) else {
                    return false;
                };
                match self {
                    Self::Hue => state.hue = v,
                    Self::Saturation => state.saturation = v,
                    Self::Brightness => state.brightness = v,
                    Self::ColorTemp => state.color_temp = v,
                    Self::OnOff => return false,
                }
                true
            }
        }
    }

    /// Clear this field in a patch (field-oriented reset).
    pub fn clear(&self, patch: &mut StatePatch) {
        match self {
            Self::OnOff => patch.on_off = None,
            Self::Hue => patch.hue = None,
            Self::Saturation => patch.saturation = None,
            Self::Brightness => patch.brightness = None,
            Self::ColorTemp => patch.color_temp = None,
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live operating parameters reported by a lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LampParameters {
    pub energy_mw: u32,
    pub brightness_lm: u32,
}

/// Immutable hardware metadata reported once at discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LampDetails {
    pub make: String,
    pub model: String,
    pub device_type: String,
    pub base_type: u32,
    pub beam_angle: u32,
    pub dimmable: bool,
    pub color: bool,
    pub variable_color_temp: bool,
    pub has_effects: bool,
    pub voltage: u32,
    pub wattage: u32,
    pub wattage_equivalent: u32,
    pub max_output: u32,
    pub min_temperature: u32,
    pub max_temperature: u32,
    pub cri: u32,
    pub lifespan: u32,
}

/// Opaque firmware fault codes currently raised by a lamp.
pub type LampFaults = BTreeSet<u32>;

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
