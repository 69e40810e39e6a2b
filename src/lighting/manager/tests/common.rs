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
use std::time::Duration;

use crate::lighting::effect::{Effect, EffectTransition};
use crate::lighting::manager::{EffectKeying, EffectManager};
use crate::lighting::layers::LayerManager;
use crate::lighting::types::{Layer, LightFrame, Rgbio, TrackedLight};

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub fn lights(count: usize) -> Vec<TrackedLight> {
    (0..count)
        .map(|i| TrackedLight::new(format!("light-{}", i), i))
        .collect()
}

pub fn red() -> Rgbio {
    Rgbio::new(255, 0, 0)
}

pub fn green() -> Rgbio {
    Rgbio::new(0, 255, 0)
}

pub fn blue() -> Rgbio {
    Rgbio::new(0, 0, 255)
}

/// A single step effect.
pub fn solid(
    name: &str,
    lights: &[TrackedLight],
    layer: Layer,
    color: Rgbio,
    duration: Duration,
) -> Effect {
    Effect::new(name, "").with_transition(EffectTransition::new(lights, layer, color, duration))
}

pub fn manager(keying: EffectKeying, lights: &[TrackedLight]) -> EffectManager {
    let mut manager = EffectManager::new(keying, LayerManager::default());
    for light in lights {
        manager.register_light(&light.id);
    }
    manager
}

pub fn rgb(frame: &LightFrame, light: &TrackedLight) -> (u8, u8, u8) {
    let color = frame[&light.id];
    (color.red, color.green, color.blue)
}
