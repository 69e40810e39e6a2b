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

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;
use super::parse_duration;
use crate::cues::builtin::{Cycle, Flare, Pulse, Selection, Strobe, Sweep, Wash};
use crate::cues::{stock_group, BuiltinCue, BuiltinCueImpl, CueGroup, CueRegistry, CueStyle, CueType};
use crate::lighting::easing::Easing;
use crate::lighting::effect::WaitCondition;
use crate::lighting::inventory::{LightTarget, LocationGroup};
use crate::lighting::types::{Layer, Rgbio, BASE_LAYER, FLASH_LAYER_START};

const STOCK_GROUP: &str = "stock";

/// A YAML representation of the cue registry configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Cues {
    /// The fallback group. Defaults to the built-in stock group.
    default_group: Option<String>,

    /// Groups to enable. All registered groups when unset.
    enabled_groups: Option<Vec<String>>,

    /// Groups to activate. All registered groups when unset.
    active_groups: Option<Vec<String>>,

    /// Pick randomly among active groups that implement a cue.
    #[serde(default)]
    randomize: bool,

    /// How long a random pick stays pinned at most.
    consistency_window: Option<String>,

    /// Groups defined in the config, in priority order.
    #[serde(default)]
    groups: Vec<Group>,
}

/// A YAML representation of a cue group.
#[derive(Deserialize, Clone, Debug)]
pub struct Group {
    name: String,
    description: Option<String>,
    cues: Vec<CueDefinition>,
}

/// A YAML representation of one cue implementation.
#[derive(Deserialize, Clone, Debug)]
pub struct CueDefinition {
    cue: CueType,
    style: Option<CueStyle>,
    description: Option<String>,
    effect: EffectDefinition,
}

/// Lights a behaviour drives. Front and back, every light, when unset.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SelectionDefinition {
    groups: Option<Vec<LocationGroup>>,
    target: Option<LightTarget>,
}

impl SelectionDefinition {
    fn to_selection(&self, default_groups: &[LocationGroup], default_target: LightTarget) -> Selection {
        Selection::new(
            self.groups.as_deref().unwrap_or(default_groups),
            self.target.unwrap_or(default_target),
        )
    }
}

/// A YAML representation of a built-in behaviour.
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectDefinition {
    Wash {
        color: String,
        #[serde(flatten)]
        selection: SelectionDefinition,
        layer: Option<Layer>,
        fade: Option<String>,
        easing: Option<Easing>,
        replace_all: Option<bool>,
    },
    Sweep {
        color: String,
        #[serde(flatten)]
        selection: SelectionDefinition,
        layer: Option<Layer>,
        step: Option<String>,
    },
    Pulse {
        color: String,
        #[serde(flatten)]
        selection: SelectionDefinition,
        layer: Option<Layer>,
        attack: Option<String>,
        decay: Option<String>,
    },
    Cycle {
        colors: Vec<String>,
        #[serde(flatten)]
        selection: SelectionDefinition,
        layer: Option<Layer>,
        fade: Option<String>,
        easing: Option<Easing>,
        on: Option<WaitCondition>,
        count: Option<u32>,
    },
    Flare {
        color: Option<String>,
        #[serde(flatten)]
        selection: SelectionDefinition,
        layer: Option<Layer>,
        attack: Option<String>,
        decay: Option<String>,
    },
    Strobe {
        color: Option<String>,
        #[serde(flatten)]
        selection: SelectionDefinition,
        divisions: Option<u32>,
    },
    StrobeOff,
    Blackout {
        fade: Option<String>,
    },
}

const FRONT_AND_BACK: [LocationGroup; 2] = [LocationGroup::Front, LocationGroup::Back];

fn duration_or(value: &Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    value.as_deref().map_or(Ok(default), parse_duration)
}

fn optional_duration(value: &Option<String>) -> Result<Option<Duration>, ConfigError> {
    value.as_deref().map(parse_duration).transpose()
}

fn color_or_white(value: &Option<String>) -> Result<Rgbio, ConfigError> {
    match value {
        Some(color) => Ok(Rgbio::from_str(color)?),
        None => Ok(Rgbio::new(255, 255, 255)),
    }
}

impl EffectDefinition {
    /// Converts the definition into a built-in behaviour, filling in defaults.
    pub fn to_builtin(&self) -> Result<BuiltinCue, ConfigError> {
        Ok(match self {
            EffectDefinition::Wash {
                color,
                selection,
                layer,
                fade,
                easing,
                replace_all,
            } => {
                let layer = layer.unwrap_or(BASE_LAYER);
                BuiltinCue::Wash(Wash {
                    color: Rgbio::from_str(color)?,
                    selection: selection.to_selection(&FRONT_AND_BACK, LightTarget::All),
                    layer,
                    fade: duration_or(fade, Duration::ZERO)?,
                    easing: easing.unwrap_or_default(),
                    replace_all: replace_all.unwrap_or(layer == BASE_LAYER),
                })
            }
            EffectDefinition::Sweep {
                color,
                selection,
                layer,
                step,
            } => BuiltinCue::Sweep(Sweep {
                color: Rgbio::from_str(color)?,
                selection: selection.to_selection(&[LocationGroup::Front], LightTarget::Linear),
                layer: layer.unwrap_or(10),
                step: optional_duration(step)?,
            }),
            EffectDefinition::Pulse {
                color,
                selection,
                layer,
                attack,
                decay,
            } => BuiltinCue::Pulse(Pulse {
                color: Rgbio::from_str(color)?,
                selection: selection.to_selection(&FRONT_AND_BACK, LightTarget::All),
                layer: layer.unwrap_or(10),
                attack: duration_or(attack, Duration::from_millis(30))?,
                decay: optional_duration(decay)?,
            }),
            EffectDefinition::Cycle {
                colors,
                selection,
                layer,
                fade,
                easing,
                on,
                count,
            } => {
                if colors.is_empty() {
                    return Err(ConfigError::Invalid(
                        "a cycle needs at least one colour".to_string(),
                    ));
                }
                BuiltinCue::Cycle(Cycle {
                    colors: colors
                        .iter()
                        .map(|color| Rgbio::from_str(color))
                        .collect::<Result<Vec<Rgbio>, _>>()?,
                    selection: selection.to_selection(&FRONT_AND_BACK, LightTarget::All),
                    layer: layer.unwrap_or(BASE_LAYER),
                    fade: duration_or(fade, Duration::from_millis(400))?,
                    easing: easing.unwrap_or(Easing::InOutSine),
                    on: on.unwrap_or(WaitCondition::Measure),
                    count: count.unwrap_or(1).max(1),
                })
            }
            EffectDefinition::Flare {
                color,
                selection,
                layer,
                attack,
                decay,
            } => BuiltinCue::Flare(Flare {
                color: color_or_white(color)?,
                selection: selection.to_selection(&FRONT_AND_BACK, LightTarget::All),
                layer: layer.unwrap_or(FLASH_LAYER_START),
                attack: duration_or(attack, Duration::ZERO)?,
                decay: duration_or(decay, Duration::from_millis(600))?,
            }),
            EffectDefinition::Strobe {
                color,
                selection,
                divisions,
            } => BuiltinCue::Strobe(Strobe {
                color: color_or_white(color)?,
                selection: selection.to_selection(&[LocationGroup::Strobe], LightTarget::All),
                divisions: divisions.unwrap_or(4).max(1),
            }),
            EffectDefinition::StrobeOff => BuiltinCue::StrobeOff,
            EffectDefinition::Blackout { fade } => BuiltinCue::Blackout {
                fade: duration_or(fade, Duration::from_millis(500))?,
            },
        })
    }
}

impl CueDefinition {
    pub fn cue(&self) -> CueType {
        self.cue
    }

    pub fn effect(&self) -> &EffectDefinition {
        &self.effect
    }
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cues(&self) -> &[CueDefinition] {
        &self.cues
    }

    /// Converts the group into its runtime form.
    pub fn to_cue_group(&self) -> Result<CueGroup, ConfigError> {
        let mut group = CueGroup::new(&self.name);
        if let Some(description) = &self.description {
            group = group.with_description(description);
        }

        for definition in &self.cues {
            if group.defines(definition.cue) {
                return Err(ConfigError::Invalid(format!(
                    "cue {} is defined twice in group {}",
                    definition.cue, self.name
                )));
            }

            let mut cue = BuiltinCueImpl::new(definition.cue, definition.effect.to_builtin()?)
                .with_style(definition.style.unwrap_or_default());
            if let Some(description) = &definition.description {
                cue = cue.with_description(description);
            }
            group.insert(Arc::new(cue));
        }
        Ok(group)
    }
}

impl Cues {
    pub fn default_group(&self) -> &str {
        self.default_group.as_deref().unwrap_or(STOCK_GROUP)
    }

    pub fn randomize(&self) -> bool {
        self.randomize
    }

    pub fn consistency_window(&self) -> Result<Option<Duration>, ConfigError> {
        optional_duration(&self.consistency_window)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Builds the registry: configured groups in order, then the stock group, then the
    /// group state preferences.
    pub fn registry(&self, seed: Option<u64>) -> Result<CueRegistry, ConfigError> {
        let mut registry = match seed {
            Some(seed) => CueRegistry::new().with_seed(seed),
            None => CueRegistry::new(),
        };

        for group in &self.groups {
            registry.register_group(group.to_cue_group()?)?;
        }
        if registry.group(STOCK_GROUP).is_none() {
            registry.register_group(stock_group())?;
        }

        registry.set_default_group(self.default_group())?;
        if let Some(enabled) = &self.enabled_groups {
            registry.set_enabled_groups(enabled)?;
        }
        if let Some(active) = &self.active_groups {
            registry.set_active_groups(active)?;
        }
        registry.set_randomize(self.randomize);
        registry.set_consistency_window(self.consistency_window()?);

        Ok(registry)
    }
}
