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

use super::types::{BlendMode, Rgbio};

#[inline]
fn to_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Mix `blended` over `base` by `opacity`.
#[inline]
fn mix(base: u8, blended: f64, opacity: f64) -> u8 {
    to_channel(base as f64 + (blended - base as f64) * opacity)
}

fn blend_channel(mode: BlendMode, current: u8, next: u8, opacity: f64) -> u8 {
    let c = current as f64;
    let n = next as f64;
    match mode {
        // Replace scales toward the new colour. It never combines with what is below.
        BlendMode::Replace => to_channel(n * opacity),
        BlendMode::Add => to_channel(c + n * opacity),
        BlendMode::Multiply => mix(current, c * n / 255.0, opacity),
        BlendMode::Overlay => {
            let overlay = if c < 128.0 {
                2.0 * c * n / 255.0
            } else {
                255.0 - 2.0 * (255.0 - c) * (255.0 - n) / 255.0
            };
            mix(current, overlay, opacity)
        }
    }
}

/// Fold one layer (`next`) onto the accumulated colour of the layers below it (`current`).
///
/// The result is a final colour: its opacity is 1.0 and its blend mode is replace.
pub fn blend_with_opacity(current: &Rgbio, next: &Rgbio) -> Rgbio {
    let opacity = next.opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return Rgbio {
            opacity: 1.0,
            blend_mode: BlendMode::Replace,
            ..*current
        };
    }

    let mode = next.blend_mode;
    Rgbio {
        red: blend_channel(mode, current.red, next.red, opacity),
        green: blend_channel(mode, current.green, next.green, opacity),
        blue: blend_channel(mode, current.blue, next.blue, opacity),
        intensity: blend_channel(mode, current.intensity, next.intensity, opacity),
        pan: next.pan.or(current.pan),
        tilt: next.tilt.or(current.tilt),
        opacity: 1.0,
        blend_mode: BlendMode::Replace,
    }
}

/// Blend a light's layers, given in ascending layer order, into its final colour.
pub fn blend_layers<'a>(layers: impl IntoIterator<Item = &'a Rgbio>) -> Rgbio {
    layers
        .into_iter()
        .fold(Rgbio::black(), |current, next| blend_with_opacity(&current, next))
}
