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
use super::common::*;
use crate::lighting::layers::LayerKey;
use crate::lighting::manager::EffectKeying;

#[test]
fn test_keying_decides_slot_count() {
    let lights = lights(2);

    let mut per_layer = manager(EffectKeying::PerLayer, &lights);
    per_layer.add_effect("both", solid("both", &lights, 2, red(), ms(1000)), ms(0), false);
    assert_eq!(per_layer.layers().active_count(), 1);

    let mut per_light = manager(EffectKeying::PerLight, &lights);
    per_light.add_effect("both", solid("both", &lights, 2, red(), ms(1000)), ms(0), false);
    assert_eq!(per_light.layers().active_count(), 2);

    let key = LayerKey::light(2, "light-0");
    let active = per_light.layers().get_active_effect(&key).unwrap();
    assert_eq!(active.transitions[0].lights.len(), 1);
    assert_eq!(active.transitions[0].lights[0].id, "light-0");
}

#[test]
fn test_per_light_effects_share_a_layer() {
    let lights = lights(2);

    let mut per_light = manager(EffectKeying::PerLight, &lights);
    per_light.add_effect("x", solid("x", &lights[..1], 2, red(), ms(1000)), ms(0), false);
    per_light.add_effect("y", solid("y", &lights[1..], 2, blue(), ms(1000)), ms(0), false);
    assert!(per_light.layers().is_effect_active("x"));
    assert!(per_light.layers().is_effect_active("y"));

    let mut per_layer = manager(EffectKeying::PerLayer, &lights);
    per_layer.add_effect("x", solid("x", &lights[..1], 2, red(), ms(1000)), ms(0), false);
    per_layer.add_effect("y", solid("y", &lights[1..], 2, blue(), ms(1000)), ms(0), false);
    assert!(!per_layer.layers().is_effect_active("x"));
    assert!(per_layer.layers().is_effect_active("y"));
}

#[test]
fn test_overlapping_effect_evicts_only_shared_lights() {
    let lights = lights(3);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("x", solid("x", &lights[..2], 2, red(), ms(1000)), ms(0), false);
    manager.add_effect("z", solid("z", &lights[1..], 2, blue(), ms(1000)), ms(0), false);

    let owner = |light: &str| {
        manager
            .layers()
            .get_active_effect(&LayerKey::light(2, light))
            .map(|active| active.name.clone())
    };
    assert_eq!(owner("light-0").as_deref(), Some("x"));
    assert_eq!(owner("light-1").as_deref(), Some("z"));
    assert_eq!(owner("light-2").as_deref(), Some("z"));
}
