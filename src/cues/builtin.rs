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

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::types::{Cue, CueData, CueGroup, CueStyle, CueType};
use crate::lighting::easing::Easing;
use crate::lighting::effect::{Effect, EffectTransition, WaitCondition};
use crate::lighting::inventory::{LightInventory, LightTarget, LocationGroup};
use crate::lighting::types::{Layer, Rgbio, TrackedLight, BASE_LAYER, FLASH_LAYER_START, STROBE_LAYER};
use crate::sequencer::LightingController;

/// Every strobe runs under this name so one cue can stop any of them.
pub const STROBE_EFFECT: &str = "strobe";

/// Which lights a cue drives.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub groups: Vec<LocationGroup>,
    pub target: LightTarget,
}

impl Selection {
    pub fn new(groups: &[LocationGroup], target: LightTarget) -> Selection {
        Selection {
            groups: groups.to_vec(),
            target,
        }
    }

    fn resolve(&self, lights: &dyn LightInventory) -> Vec<TrackedLight> {
        lights.get_lights(&self.groups, self.target)
    }
}

impl Default for Selection {
    fn default() -> Self {
        Selection::new(&[LocationGroup::Front, LocationGroup::Back], LightTarget::All)
    }
}

/// A static colour.
#[derive(Debug, Clone, PartialEq)]
pub struct Wash {
    pub color: Rgbio,
    pub selection: Selection,
    pub layer: Layer,
    pub fade: Duration,
    pub easing: Easing,
    /// Clear every other effect first.
    pub replace_all: bool,
}

/// A colour chasing across the lights in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    pub color: Rgbio,
    pub selection: Selection,
    pub layer: Layer,
    /// Time per light. Defaults to half a beat.
    pub step: Option<Duration>,
}

/// A flash on every beat.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub color: Rgbio,
    pub selection: Selection,
    pub layer: Layer,
    pub attack: Duration,
    /// Defaults to half a beat.
    pub decay: Option<Duration>,
}

/// Steps through colours, moving on after `count` of `on`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub colors: Vec<Rgbio>,
    pub selection: Selection,
    pub layer: Layer,
    pub fade: Duration,
    pub easing: Easing,
    pub on: WaitCondition,
    pub count: u32,
}

/// A single flash that fades away.
#[derive(Debug, Clone, PartialEq)]
pub struct Flare {
    pub color: Rgbio,
    pub selection: Selection,
    pub layer: Layer,
    pub attack: Duration,
    pub decay: Duration,
}

/// On/off flicker locked to the tempo.
#[derive(Debug, Clone, PartialEq)]
pub struct Strobe {
    pub color: Rgbio,
    pub selection: Selection,
    /// Flashes per beat.
    pub divisions: u32,
}

/// The built-in behaviours a cue can be configured with.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinCue {
    Wash(Wash),
    Sweep(Sweep),
    Pulse(Pulse),
    Cycle(Cycle),
    Flare(Flare),
    Strobe(Strobe),
    StrobeOff,
    Blackout { fade: Duration },
}

impl BuiltinCue {
    /// The effect this behaviour runs for the given lights, if it runs one at all.
    pub fn effect(&self, name: &str, data: &CueData, lights: &[TrackedLight]) -> Option<Effect> {
        if lights.is_empty() {
            return None;
        }

        let beat = data.beat_duration();
        let effect = Effect::new(name, self.kind());
        let effect = match self {
            BuiltinCue::Wash(wash) => effect.with_transition(
                EffectTransition::new(lights, wash.layer, wash.color, wash.fade).easing(wash.easing),
            ),
            BuiltinCue::Sweep(sweep) => {
                let step = sweep.step.unwrap_or(beat / 2);
                let last = lights.len() - 1;
                lights
                    .iter()
                    .enumerate()
                    .fold(effect, |effect, (index, light)| {
                        let light = std::slice::from_ref(light);
                        effect
                            .with_transition(
                                EffectTransition::new(light, sweep.layer, sweep.color, step)
                                    .wait_for_delay(step * index as u32),
                            )
                            .with_transition(
                                EffectTransition::new(light, sweep.layer, Rgbio::transparent(), step)
                                    .wait_until_delay(step * (last - index) as u32),
                            )
                    })
            }
            BuiltinCue::Pulse(pulse) => effect
                .with_transition(
                    EffectTransition::new(lights, pulse.layer, pulse.color, pulse.attack)
                        .wait_for(WaitCondition::Beat, 1),
                )
                .with_transition(
                    EffectTransition::new(
                        lights,
                        pulse.layer,
                        Rgbio::transparent(),
                        pulse.decay.unwrap_or(beat / 2),
                    )
                    .easing(Easing::OutQuad),
                ),
            BuiltinCue::Cycle(cycle) => cycle.colors.iter().fold(effect, |effect, color| {
                effect.with_transition(
                    EffectTransition::new(lights, cycle.layer, *color, cycle.fade)
                        .easing(cycle.easing)
                        .wait_until(cycle.on, cycle.count),
                )
            }),
            BuiltinCue::Flare(flare) => effect
                .with_transition(EffectTransition::new(
                    lights,
                    flare.layer,
                    flare.color,
                    flare.attack,
                ))
                .with_transition(
                    EffectTransition::new(lights, flare.layer, Rgbio::transparent(), flare.decay)
                        .easing(Easing::OutCubic),
                ),
            BuiltinCue::Strobe(strobe) => {
                let half_period = beat / (strobe.divisions.max(1) * 2);
                effect
                    .with_transition(
                        EffectTransition::new(lights, STROBE_LAYER, strobe.color, Duration::ZERO)
                            .wait_until_delay(half_period),
                    )
                    .with_transition(
                        EffectTransition::new(
                            lights,
                            STROBE_LAYER,
                            Rgbio::transparent(),
                            Duration::ZERO,
                        )
                        .wait_until_delay(half_period),
                    )
            }
            BuiltinCue::StrobeOff | BuiltinCue::Blackout { .. } => return None,
        };
        Some(effect)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BuiltinCue::Wash(_) => "wash",
            BuiltinCue::Sweep(_) => "sweep",
            BuiltinCue::Pulse(_) => "pulse",
            BuiltinCue::Cycle(_) => "cycle",
            BuiltinCue::Flare(_) => "flare",
            BuiltinCue::Strobe(_) => "strobe",
            BuiltinCue::StrobeOff => "strobe_off",
            BuiltinCue::Blackout { .. } => "blackout",
        }
    }

    fn selection(&self) -> Option<&Selection> {
        match self {
            BuiltinCue::Wash(Wash { selection, .. })
            | BuiltinCue::Sweep(Sweep { selection, .. })
            | BuiltinCue::Pulse(Pulse { selection, .. })
            | BuiltinCue::Cycle(Cycle { selection, .. })
            | BuiltinCue::Flare(Flare { selection, .. })
            | BuiltinCue::Strobe(Strobe { selection, .. }) => Some(selection),
            BuiltinCue::StrobeOff | BuiltinCue::Blackout { .. } => None,
        }
    }
}

/// A cue backed by a built-in behaviour.
#[derive(Debug, Clone)]
pub struct BuiltinCueImpl {
    cue_type: CueType,
    style: CueStyle,
    description: String,
    behavior: BuiltinCue,
}

impl BuiltinCueImpl {
    pub fn new(cue_type: CueType, behavior: BuiltinCue) -> BuiltinCueImpl {
        BuiltinCueImpl {
            cue_type,
            style: CueStyle::Primary,
            description: format!("{} {}", cue_type, behavior.kind()),
            behavior,
        }
    }

    pub fn with_style(mut self, style: CueStyle) -> BuiltinCueImpl {
        self.style = style;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> BuiltinCueImpl {
        self.description = description.into();
        self
    }

    pub fn behavior(&self) -> &BuiltinCue {
        &self.behavior
    }

    fn effect_name(&self) -> &str {
        match self.behavior {
            BuiltinCue::Strobe(_) | BuiltinCue::StrobeOff => STROBE_EFFECT,
            _ => self.cue_type.as_str(),
        }
    }
}

impl Cue for BuiltinCueImpl {
    fn cue_type(&self) -> CueType {
        self.cue_type
    }

    fn style(&self) -> CueStyle {
        self.style
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&self, data: &CueData, controller: &dyn LightingController, lights: &dyn LightInventory) {
        let name = self.effect_name();
        match &self.behavior {
            BuiltinCue::StrobeOff => {
                controller.remove_effect(STROBE_EFFECT, STROBE_LAYER);
                return;
            }
            BuiltinCue::Blackout { fade } => {
                controller.blackout(*fade);
                return;
            }
            _ => {}
        }

        let selected = self
            .behavior
            .selection()
            .map(|selection| selection.resolve(lights))
            .unwrap_or_default();
        let Some(effect) = self.behavior.effect(name, data, &selected) else {
            warn!(cue = %self.cue_type, "No lights selected for cue");
            return;
        };
        debug!(
            cue = %self.cue_type,
            effect = name,
            lights = selected.len(),
            "Running cue"
        );

        match &self.behavior {
            BuiltinCue::Wash(wash) if wash.replace_all => {
                controller.set_effect(name, effect, Duration::ZERO, false)
            }
            BuiltinCue::Wash(wash) => {
                controller.add_effect(name, effect, Duration::ZERO, wash.layer != BASE_LAYER)
            }
            BuiltinCue::Cycle(_) => controller.set_effect(name, effect, Duration::ZERO, true),
            BuiltinCue::Flare(_) => controller.add_effect(name, effect, Duration::ZERO, false),
            BuiltinCue::Sweep(_) | BuiltinCue::Pulse(_) | BuiltinCue::Strobe(_) => {
                controller.add_effect(name, effect, Duration::ZERO, true)
            }
            BuiltinCue::StrobeOff | BuiltinCue::Blackout { .. } => {}
        }
    }
}

fn wash(color: Rgbio, layer: Layer, fade_ms: u64) -> BuiltinCue {
    BuiltinCue::Wash(Wash {
        color,
        selection: Selection::default(),
        layer,
        fade: Duration::from_millis(fade_ms),
        easing: Easing::InOutSine,
        replace_all: layer == BASE_LAYER,
    })
}

fn flare(attack_ms: u64, decay_ms: u64) -> BuiltinCue {
    BuiltinCue::Flare(Flare {
        color: Rgbio::new(255, 255, 255),
        selection: Selection::default(),
        layer: FLASH_LAYER_START,
        attack: Duration::from_millis(attack_ms),
        decay: Duration::from_millis(decay_ms),
    })
}

fn strobe(divisions: u32) -> BuiltinCue {
    BuiltinCue::Strobe(Strobe {
        color: Rgbio::new(255, 255, 255),
        selection: Selection::new(&[LocationGroup::Strobe], LightTarget::All),
        divisions,
    })
}

fn cycle(colors: &[Rgbio], on: WaitCondition, count: u32) -> BuiltinCue {
    BuiltinCue::Cycle(Cycle {
        colors: colors.to_vec(),
        selection: Selection::default(),
        layer: BASE_LAYER,
        fade: Duration::from_millis(400),
        easing: Easing::InOutSine,
        on,
        count,
    })
}

/// The behaviours that ship with the binary. Cue types left out resolve to nothing.
pub fn stock_group() -> CueGroup {
    let amber = Rgbio::new(255, 191, 0);
    let warm = Rgbio::new(255, 127, 0);
    let cool = Rgbio::new(0, 255, 255);
    let blue = Rgbio::new(0, 0, 255);
    let purple = Rgbio::new(128, 0, 128);
    let red = Rgbio::new(255, 0, 0);

    let cues = [
        BuiltinCueImpl::new(CueType::Default, wash(amber.with_intensity(200), BASE_LAYER, 1000)),
        BuiltinCueImpl::new(CueType::Intro, wash(blue.with_intensity(96), BASE_LAYER, 2000)),
        BuiltinCueImpl::new(CueType::Menu, wash(purple.with_intensity(128), BASE_LAYER, 1000)),
        BuiltinCueImpl::new(CueType::Score, wash(amber, BASE_LAYER, 500)),
        BuiltinCueImpl::new(CueType::Verse, wash(blue, BASE_LAYER, 1000)),
        BuiltinCueImpl::new(
            CueType::Chorus,
            cycle(&[red, warm, amber], WaitCondition::Measure, 1),
        ),
        BuiltinCueImpl::new(
            CueType::Harmony,
            cycle(&[blue, cool, purple], WaitCondition::Beat, 2),
        ),
        BuiltinCueImpl::new(CueType::CoolManual, wash(cool, BASE_LAYER, 500)),
        BuiltinCueImpl::new(
            CueType::CoolAutomatic,
            cycle(&[cool, blue], WaitCondition::Measure, 2),
        ),
        BuiltinCueImpl::new(CueType::WarmManual, wash(warm, BASE_LAYER, 500)),
        BuiltinCueImpl::new(
            CueType::WarmAutomatic,
            cycle(&[warm, red], WaitCondition::Measure, 2),
        ),
        BuiltinCueImpl::new(
            CueType::Sweep,
            BuiltinCue::Sweep(Sweep {
                color: cool,
                selection: Selection::new(&[LocationGroup::Front], LightTarget::Linear),
                layer: 10,
                step: None,
            }),
        ),
        BuiltinCueImpl::new(
            CueType::Frenzy,
            BuiltinCue::Pulse(Pulse {
                color: red,
                selection: Selection::default(),
                layer: 10,
                attack: Duration::from_millis(30),
                decay: None,
            }),
        ),
        BuiltinCueImpl::new(CueType::Stomp, flare(0, 600)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(CueType::FlareFast, flare(0, 300)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(CueType::FlareSlow, flare(200, 1500)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(
            CueType::BlackoutFast,
            BuiltinCue::Blackout {
                fade: Duration::from_millis(200),
            },
        ),
        BuiltinCueImpl::new(
            CueType::BlackoutSlow,
            BuiltinCue::Blackout {
                fade: Duration::from_millis(2000),
            },
        ),
        BuiltinCueImpl::new(CueType::BigRockEnding, strobe(4)),
        BuiltinCueImpl::new(CueType::StrobeSlow, strobe(1)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(CueType::StrobeMedium, strobe(2)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(CueType::StrobeFast, strobe(4)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(CueType::StrobeFastest, strobe(8)).with_style(CueStyle::Secondary),
        BuiltinCueImpl::new(CueType::StrobeOff, BuiltinCue::StrobeOff)
            .with_style(CueStyle::Secondary),
    ];

    cues.into_iter().fold(
        CueGroup::new("stock").with_description("Built-in behaviours"),
        |group, cue| group.with_cue(Arc::new(cue)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::inventory::StaticLightInventory;
    use crate::lighting::layers::LayerKey;
    use crate::lighting::manager::EffectManager;
    use crate::output::LogSink;
    use crate::sequencer::Sequencer;

    fn rig() -> (Sequencer, StaticLightInventory) {
        let inventory = StaticLightInventory::new(
            [
                ("front-1", LocationGroup::Front),
                ("front-2", LocationGroup::Front),
                ("front-3", LocationGroup::Front),
                ("back-1", LocationGroup::Back),
                ("strobe-1", LocationGroup::Strobe),
            ],
            Some(1),
        );
        let sequencer = Sequencer::new(EffectManager::default(), Arc::new(LogSink));
        for light in inventory.all_lights() {
            sequencer.register_light(&light.id);
        }
        (sequencer, inventory)
    }

    fn lights(count: usize) -> Vec<TrackedLight> {
        (0..count)
            .map(|i| TrackedLight::new(format!("l{}", i), i))
            .collect()
    }

    #[test]
    fn test_sweep_staggers_lights() {
        let sweep = BuiltinCue::Sweep(Sweep {
            color: Rgbio::new(0, 255, 255),
            selection: Selection::default(),
            layer: 10,
            step: Some(Duration::from_millis(100)),
        });
        let effect = sweep.effect("sweep", &CueData::default(), &lights(3)).unwrap();

        assert_eq!(effect.transitions.len(), 6);
        let delays: Vec<Duration> = effect
            .transitions
            .iter()
            .step_by(2)
            .map(|transition| transition.wait_for_time)
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200)
            ]
        );
        assert_eq!(effect.transitions[5].wait_until_time, Duration::ZERO);
        assert_eq!(effect.transitions[1].wait_until_time, Duration::from_millis(200));
    }

    #[test]
    fn test_strobe_period_follows_tempo() {
        let data = CueData {
            bpm: 60.0,
            ..Default::default()
        };
        let effect = strobe(4).effect(STROBE_EFFECT, &data, &lights(1)).unwrap();
        assert_eq!(effect.transitions[0].layer, STROBE_LAYER);
        assert_eq!(effect.transitions[0].wait_until_time, Duration::from_millis(125));
        assert!(BuiltinCue::StrobeOff.effect(STROBE_EFFECT, &data, &lights(1)).is_none());
        assert!(strobe(4).effect(STROBE_EFFECT, &data, &[]).is_none());
    }

    #[test]
    fn test_stock_group_drives_sequencer() {
        let (sequencer, inventory) = rig();
        let group = stock_group();
        let data = CueData::default();

        group
            .get(CueType::Verse)
            .unwrap()
            .execute(&data, &sequencer, &inventory);
        sequencer.tick(Duration::from_millis(1000));
        let frame = sequencer.last_frame();
        assert_eq!(frame["front-1"].blue, 255);
        assert_eq!(frame["back-1"].blue, 255);
        assert!(frame["strobe-1"].is_dark());

        group
            .get(CueType::StrobeFast)
            .unwrap()
            .execute(&data, &sequencer, &inventory);
        let strobe_key = LayerKey::light(STROBE_LAYER, "strobe-1");
        let strobing = || {
            sequencer.with_manager(|manager| {
                manager.layers().get_active_effect(&strobe_key).is_some()
            })
        };
        assert!(strobing());

        group
            .get(CueType::StrobeOff)
            .unwrap()
            .execute(&data, &sequencer, &inventory);
        assert!(!strobing());

        group
            .get(CueType::BlackoutFast)
            .unwrap()
            .execute(&data, &sequencer, &inventory);
        assert!(sequencer.is_blackout_active());
        assert!(group.get(CueType::Dischord).is_none());
    }
}
