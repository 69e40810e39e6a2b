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
use tokio::sync::oneshot;

use super::common::*;
use crate::lighting::effect::Effect;
use crate::lighting::manager::EffectKeying;

#[test]
fn test_repeated_add_queues_without_touching_transitions() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("pulse", solid("pulse", &lights, 1, red(), ms(1000)), ms(0), false);
    assert_eq!(manager.controller().set_transition_calls(), 1);

    for _ in 0..5 {
        manager.add_effect("pulse", solid("pulse", &lights, 1, red(), ms(1000)), ms(0), false);
    }
    assert_eq!(manager.controller().set_transition_calls(), 1);
    assert_eq!(manager.layers().get_queued_effects().count(), 1);

    // The running pass finishes and the queued one takes over.
    manager.tick(ms(1000));
    assert_eq!(manager.controller().set_transition_calls(), 2);
    assert_eq!(manager.layers().get_queued_effects().count(), 0);
    assert!(manager.layers().is_effect_active("pulse"));
}

#[test]
fn test_replacing_effect_continues_from_current_color() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("a", solid("a", &lights, 0, blue(), ms(0)), ms(0), false);
    let frame = manager.tick(ms(10));
    assert_eq!(rgb(&frame, &lights[0]), (0, 0, 255));

    manager.add_effect("b", solid("b", &lights, 0, red(), ms(1000)), ms(0), false);
    let frame = manager.tick(ms(500));
    assert_eq!(rgb(&frame, &lights[0]), (128, 0, 128));

    let frame = manager.tick(ms(500));
    assert_eq!(rgb(&frame, &lights[0]), (255, 0, 0));
}

#[test]
fn test_empty_effect_is_ignored() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("empty", Effect::new("empty", ""), ms(0), false);
    manager.set_effect("empty", Effect::new("empty", ""), ms(0), false);
    assert_eq!(manager.layers().active_count(), 0);
    assert_eq!(manager.controller().set_transition_calls(), 0);
}

#[test]
fn test_deferred_effects_run_in_offset_order() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("late", solid("late", &lights, 0, red(), ms(0)), ms(500), false);
    manager.add_effect("early", solid("early", &lights, 0, green(), ms(0)), ms(200), false);
    assert_eq!(manager.pending_count(), 2);

    let frame = manager.tick(ms(199));
    assert_eq!(rgb(&frame, &lights[0]), (0, 0, 0));

    let frame = manager.tick(ms(1));
    assert_eq!(rgb(&frame, &lights[0]), (0, 255, 0));
    assert_eq!(manager.pending_count(), 1);

    let frame = manager.tick(ms(300));
    assert_eq!(rgb(&frame, &lights[0]), (255, 0, 0));
    assert_eq!(manager.pending_count(), 0);
}

#[test]
fn test_notify_fires_once_applied() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    let (tx, mut rx) = oneshot::channel();
    manager.set_effect_notify(
        "later",
        solid("later", &lights, 0, red(), ms(0)),
        ms(100),
        false,
        Some(tx),
    );
    assert!(rx.try_recv().is_err());

    manager.tick(ms(100));
    assert!(rx.try_recv().is_ok());

    let (tx, mut rx) = oneshot::channel();
    manager.add_effect_notify("now", solid("now", &lights, 0, blue(), ms(0)), ms(0), false, Some(tx));
    assert!(rx.try_recv().is_ok());
}

#[test]
fn test_set_effect_clears_everything_else() {
    let lights = lights(1);
    let light = &lights[0].id;
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("a", solid("a", &lights, 3, red(), ms(1000)), ms(0), false);
    manager.add_effect("b", solid("b", &lights, 0, blue(), ms(1000)), ms(0), false);
    manager.set_effect("c", solid("c", &lights, 1, green(), ms(1000)), ms(0), false);

    assert_eq!(manager.layers().active_count(), 1);
    assert!(manager.layers().is_effect_active("c"));
    assert!(!manager.controller().has_state(light, 3));
    // The base layer keeps its colour.
    assert!(manager.controller().has_state(light, 0));
}

#[test]
fn test_set_effect_queues_behind_itself_on_base_layer() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.set_effect("loop", solid("loop", &lights, 0, red(), ms(1000)), ms(0), false);
    manager.set_effect("loop", solid("loop", &lights, 0, red(), ms(1000)), ms(0), false);
    assert_eq!(manager.controller().set_transition_calls(), 1);
    assert_eq!(manager.layers().get_queued_effects().count(), 1);

    manager.set_effect("other", solid("other", &lights, 0, blue(), ms(1000)), ms(0), false);
    assert_eq!(manager.layers().get_queued_effects().count(), 0);
    assert!(!manager.layers().is_effect_active("loop"));
    assert!(manager.layers().is_effect_active("other"));
}

#[test]
fn test_unblocked_name_skips_running_effects() {
    let lights = lights(1);
    let mut manager = manager(EffectKeying::PerLight, &lights);

    for _ in 0..2 {
        manager.add_effect_unblocked_name("a", solid("a", &lights, 2, red(), ms(1000)), ms(0), false);
    }
    assert_eq!(manager.layers().get_queued_effects().count(), 0);
    assert_eq!(manager.controller().set_transition_calls(), 1);

    manager.set_effect_unblocked_name("a", solid("a", &lights, 2, blue(), ms(1000)), ms(0), false);
    assert_eq!(manager.controller().set_transition_calls(), 1);
}

#[test]
fn test_remove_effect_only_removes_named_owner() {
    let lights = lights(1);
    let light = &lights[0].id;
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("a", solid("a", &lights, 4, red(), ms(1000)), ms(0), false);
    manager.remove_effect("b", 4);
    assert!(manager.layers().is_effect_active("a"));

    manager.remove_effect("a", 4);
    assert!(!manager.layers().is_effect_active("a"));
    assert!(!manager.controller().has_state(light, 4));
}

#[test]
fn test_remove_all_keeps_base_color() {
    let lights = lights(1);
    let light = &lights[0].id;
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("base", solid("base", &lights, 0, blue(), ms(1000)), ms(0), false);
    manager.add_effect("top", solid("top", &lights, 6, red(), ms(1000)), ms(0), false);
    manager.tick(ms(10));

    manager.remove_all_effects();
    assert_eq!(manager.layers().active_count(), 0);
    assert!(manager.controller().has_state(light, 0));
    assert!(!manager.controller().has_state(light, 6));
}

#[test]
fn test_finished_layer_is_cleaned_up_after_grace() {
    let lights = lights(1);
    let light = &lights[0].id;
    let mut manager = manager(EffectKeying::PerLight, &lights);

    manager.add_effect("flash", solid("flash", &lights, 7, red(), ms(0)), ms(0), false);
    assert!(!manager.layers().is_effect_active("flash"));

    let frame = manager.tick(ms(1000));
    assert!(manager.controller().has_state(light, 7));
    assert_eq!(rgb(&frame, &lights[0]), (255, 0, 0));

    let frame = manager.tick(ms(1500));
    assert!(!manager.controller().has_state(light, 7));
    assert_eq!(rgb(&frame, &lights[0]), (0, 0, 0));
}
