// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A numeric compositing slot. A light's visible colour is the ordered blend of all of its layers.
pub type Layer = u8;

/// The base layer. Never auto-cleaned, and its colour persists when effects end.
pub const BASE_LAYER: Layer = 0;

/// First layer of the high priority "flash" tier.
pub const FLASH_LAYER_START: Layer = 100;

/// Layers at or above this value are reserved for blackout and system use.
pub const BLACKOUT_LAYER_START: Layer = 200;

/// The strobe layer.
pub const STROBE_LAYER: Layer = 255;

/// The final, blended colour for every light, keyed by light id.
pub type LightFrame = BTreeMap<String, Rgbio>;

/// Blend mode for combining a layer with the layers beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Replace - the layer takes over, scaled by its opacity
    #[default]
    Replace,
    /// Add - channels are summed and clamped
    Add,
    /// Multiply - channels are multiplied together (good for dimming)
    Multiply,
    /// Overlay - multiply in the darks, screen in the lights
    Overlay,
}

/// A light tracked by the external inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedLight {
    pub id: String,
    /// Spatial ordinal used by sweeps, pairs and quarters.
    pub position: usize,
}

impl TrackedLight {
    pub fn new(id: impl Into<String>, position: usize) -> TrackedLight {
        TrackedLight {
            id: id.into(),
            position,
        }
    }
}

/// Error returned when a colour string cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ColorError {
    #[error("unknown color name: {0}")]
    UnknownName(String),
    #[error("invalid hex color: {0}")]
    InvalidHex(String),
}

/// One layer's contribution to a light: red/green/blue/intensity, optional
/// pan/tilt and the opacity and blend mode used when compositing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgbio {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub intensity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tilt: Option<u16>,
    pub opacity: f64,
    pub blend_mode: BlendMode,
}

impl Default for Rgbio {
    fn default() -> Self {
        Self::transparent()
    }
}

impl Rgbio {
    /// An opaque, replacing colour at full intensity.
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            intensity: 255,
            pan: None,
            tilt: None,
            opacity: 1.0,
            blend_mode: BlendMode::Replace,
        }
    }

    /// Opaque black.
    pub fn black() -> Self {
        Self {
            intensity: 0,
            ..Self::new(0, 0, 0)
        }
    }

    /// Black with zero opacity. This is what a layer with no state contributes.
    pub fn transparent() -> Self {
        Self {
            opacity: 0.0,
            ..Self::black()
        }
    }

    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_position(mut self, pan: u16, tilt: u16) -> Self {
        self.pan = Some(pan);
        self.tilt = Some(tilt);
        self
    }

    /// Returns this colour with its colour channels zeroed. Pan and tilt are kept so
    /// moving heads don't snap position.
    pub fn blacked_out(&self) -> Self {
        Self {
            red: 0,
            green: 0,
            blue: 0,
            intensity: 0,
            ..*self
        }
    }

    /// Whether every colour channel is zero.
    pub fn is_dark(&self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0
    }

    /// Interpolate between two layer states. Channels are rounded and floored at zero.
    /// The blend mode snaps to the target's.
    pub fn lerp(&self, other: &Rgbio, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let lerp_u8 = |a: u8, b: u8| -> u8 {
            (a as f64 + (b as f64 - a as f64) * t)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        let lerp_u16 = |a: Option<u16>, b: Option<u16>| -> Option<u16> {
            match (a, b) {
                (Some(a), Some(b)) => {
                    Some((a as f64 + (b as f64 - a as f64) * t).round().max(0.0) as u16)
                }
                (None, Some(b)) => Some(b),
                (a, None) => a,
            }
        };

        Self {
            red: lerp_u8(self.red, other.red),
            green: lerp_u8(self.green, other.green),
            blue: lerp_u8(self.blue, other.blue),
            intensity: lerp_u8(self.intensity, other.intensity),
            pan: lerp_u16(self.pan, other.pan),
            tilt: lerp_u16(self.tilt, other.tilt),
            opacity: (self.opacity + (other.opacity - self.opacity) * t).clamp(0.0, 1.0),
            blend_mode: other.blend_mode,
        }
    }

    /// Look up one of the named stage colours.
    pub fn from_name(name: &str) -> Result<Self, ColorError> {
        let (r, g, b) = match name.to_lowercase().as_str() {
            "red" => (255, 0, 0),
            "green" => (0, 255, 0),
            "blue" => (0, 0, 255),
            "yellow" => (255, 255, 0),
            "orange" => (255, 127, 0),
            "amber" => (255, 191, 0),
            "purple" => (128, 0, 128),
            "magenta" => (255, 0, 255),
            "cyan" => (0, 255, 255),
            "teal" => (0, 128, 128),
            "white" => (255, 255, 255),
            "black" => return Ok(Self::black()),
            _ => return Err(ColorError::UnknownName(name.to_string())),
        };
        Ok(Self::new(r, g, b))
    }

    /// Parse a `#rrggbb` hex string.
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.trim_start_matches('#');
        if digits.len() != 6 {
            return Err(ColorError::InvalidHex(hex.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ColorError::InvalidHex(hex.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl FromStr for Rgbio {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('#') {
            Self::from_hex(s)
        } else {
            Self::from_name(s)
        }
    }
}

impl fmt::Display for Rgbio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x} i={}",
            self.red, self.green, self.blue, self.intensity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_hex_colors() {
        assert_eq!(Rgbio::from_name("Green").unwrap(), Rgbio::new(0, 255, 0));
        assert_eq!("#ff8000".parse::<Rgbio>().unwrap(), Rgbio::new(255, 128, 0));
        assert!(Rgbio::from_name("chartreuse").is_err());
        assert!(Rgbio::from_hex("#12345").is_err());
    }

    #[test]
    fn test_lerp_rounds_and_snaps_blend_mode() {
        let start = Rgbio::black();
        let end = Rgbio::new(255, 100, 0).with_blend_mode(BlendMode::Add);

        let mid = start.lerp(&end, 0.5);
        assert_eq!(mid.red, 128);
        assert_eq!(mid.green, 50);
        assert_eq!(mid.blend_mode, BlendMode::Add);

        assert_eq!(start.lerp(&end, 2.0), end);
    }

    #[test]
    fn test_blacked_out_keeps_position() {
        let color = Rgbio::new(10, 20, 30).with_position(1000, 2000);
        let dark = color.blacked_out();
        assert!(dark.is_dark());
        assert_eq!(dark.pan, Some(1000));
        assert_eq!(dark.tilt, Some(2000));
    }
}
