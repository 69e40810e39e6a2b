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

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::easing::Easing;
use super::types::{Layer, Rgbio, TrackedLight};

/// Note colours that can gate a transition (drum pads, guitar frets and the like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerColor {
    Red,
    Green,
    Blue,
    Yellow,
    Orange,
}

/// Something a transition step can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// Proceed immediately.
    #[default]
    None,
    /// Wait for the step's configured time.
    Delay,
    Beat,
    HalfBeat,
    Measure,
    Keyframe,
    Color(TriggerColor),
}

impl WaitCondition {
    /// Whether this condition is satisfied by an external event rather than by time.
    pub fn is_event(&self) -> bool {
        !matches!(self, WaitCondition::None | WaitCondition::Delay)
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::None => write!(f, "none"),
            WaitCondition::Delay => write!(f, "delay"),
            WaitCondition::Beat => write!(f, "beat"),
            WaitCondition::HalfBeat => write!(f, "half-beat"),
            WaitCondition::Measure => write!(f, "measure"),
            WaitCondition::Keyframe => write!(f, "keyframe"),
            WaitCondition::Color(color) => write!(f, "{}", format!("{:?}", color).to_lowercase()),
        }
    }
}

/// The colour change performed by one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub color: Rgbio,
    pub easing: Easing,
    pub duration: Duration,
}

/// One timed colour change on one or more lights of a single layer.
///
/// `wait_for_*` gates when the transform begins. `wait_until_*` gates when the
/// step counts as done and the effect moves on to the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectTransition {
    pub lights: Vec<TrackedLight>,
    pub layer: Layer,
    pub wait_for_condition: WaitCondition,
    pub wait_for_time: Duration,
    pub wait_for_condition_count: u32,
    pub transform: Transform,
    pub wait_until_condition: WaitCondition,
    pub wait_until_time: Duration,
    pub wait_until_condition_count: u32,
}

impl EffectTransition {
    /// A step that immediately transitions `lights` on `layer` to `color` over `duration`.
    pub fn new(lights: &[TrackedLight], layer: Layer, color: Rgbio, duration: Duration) -> Self {
        Self {
            lights: lights.to_vec(),
            layer,
            wait_for_condition: WaitCondition::None,
            wait_for_time: Duration::ZERO,
            wait_for_condition_count: 1,
            transform: Transform {
                color,
                easing: Easing::Linear,
                duration,
            },
            wait_until_condition: WaitCondition::None,
            wait_until_time: Duration::ZERO,
            wait_until_condition_count: 1,
        }
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.transform.easing = easing;
        self
    }

    /// Gate the start of the transform on `count` occurrences of `condition`.
    pub fn wait_for(mut self, condition: WaitCondition, count: u32) -> Self {
        self.wait_for_condition = condition;
        self.wait_for_condition_count = count.max(1);
        self
    }

    /// Delay the start of the transform by `time`.
    pub fn wait_for_delay(mut self, time: Duration) -> Self {
        self.wait_for_condition = WaitCondition::Delay;
        self.wait_for_time = time;
        self
    }

    /// Hold the finished step until `count` occurrences of `condition`.
    pub fn wait_until(mut self, condition: WaitCondition, count: u32) -> Self {
        self.wait_until_condition = condition;
        self.wait_until_condition_count = count.max(1);
        self
    }

    /// Hold the finished step for `time`.
    pub fn wait_until_delay(mut self, time: Duration) -> Self {
        self.wait_until_condition = WaitCondition::Delay;
        self.wait_until_time = time;
        self
    }

    /// A copy of this step that targets a single light.
    pub fn for_light(&self, light: &TrackedLight) -> Self {
        Self {
            lights: vec![light.clone()],
            ..self.clone()
        }
    }
}

/// A static, reusable description of transitions. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub id: String,
    pub description: String,
    pub transitions: Vec<EffectTransition>,
}

impl Effect {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            transitions: Vec::new(),
        }
    }

    pub fn with_transition(mut self, transition: EffectTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Every layer touched by this effect, ascending.
    pub fn layers(&self) -> BTreeSet<Layer> {
        self.transitions.iter().map(|t| t.layer).collect()
    }
}
