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

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info};

use super::blend::blend_layers;
use super::easing::Easing;
use super::types::{Layer, LightFrame, Rgbio, BASE_LAYER};

/// A request to move one (light, layer) to a new colour.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub start: Option<Rgbio>,
    pub initial_override: Option<Rgbio>,
    pub end: Rgbio,
    pub duration: Duration,
    pub easing: Easing,
}

impl Transition {
    /// Transition to `end` over `duration`, starting from wherever the layer currently is.
    pub fn to(end: Rgbio, duration: Duration) -> Transition {
        Transition {
            start: None,
            initial_override: None,
            end,
            duration,
            easing: Easing::Linear,
        }
    }

    pub fn from(mut self, start: Rgbio) -> Transition {
        self.start = Some(start);
        self
    }

    /// Used as the start state when no explicit start is given, ahead of the layer's
    /// last interpolated value.
    pub fn with_initial(mut self, initial: Option<Rgbio>) -> Transition {
        self.initial_override = initial;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Transition {
        self.easing = easing;
        self
    }
}

/// Interpolation state for one (light, layer).
#[derive(Debug, Clone)]
struct LayerState {
    start: Rgbio,
    end: Rgbio,
    current: Rgbio,
    started_at: Duration,
    duration: Duration,
    easing: Easing,
    complete: bool,
}

impl LayerState {
    fn settled(color: Rgbio, now: Duration) -> LayerState {
        LayerState {
            start: color,
            end: color,
            current: color,
            started_at: now,
            duration: Duration::ZERO,
            easing: Easing::Linear,
            complete: true,
        }
    }

    fn advance(&mut self, now: Duration) {
        if self.complete {
            return;
        }

        let elapsed = now.saturating_sub(self.started_at);
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
        };

        if progress >= 1.0 {
            // Settle so a later retrigger starts from the end state.
            self.start = self.end;
            self.current = self.end;
            self.complete = true;
        } else {
            self.current = self.start.lerp(&self.end, self.easing.apply(progress));
        }
    }
}

/// Owns per (light, layer) interpolation and blends every light's layers into its
/// final colour once per tick.
///
/// State lives in one flat store keyed by (light, layer), so a light's layers are a
/// contiguous, ascending range.
pub struct LightTransitionController {
    states: BTreeMap<(String, Layer), LayerState>,
    known_lights: BTreeSet<String>,
    elapsed: Duration,
    last_frame: LightFrame,
    #[cfg(test)]
    set_transition_calls: usize,
}

impl Default for LightTransitionController {
    fn default() -> Self {
        Self::new()
    }
}

impl LightTransitionController {
    pub fn new() -> LightTransitionController {
        LightTransitionController {
            states: BTreeMap::new(),
            known_lights: BTreeSet::new(),
            elapsed: Duration::ZERO,
            last_frame: LightFrame::new(),
            #[cfg(test)]
            set_transition_calls: 0,
        }
    }

    /// The controller's accumulated clock.
    pub fn now(&self) -> Duration {
        self.elapsed
    }

    /// Make sure the light shows up in published frames even without any state.
    pub fn register_light(&mut self, light_id: &str) {
        self.known_lights.insert(light_id.to_string());
    }

    /// Register or overwrite the transition for (light, layer).
    pub fn set_transition(&mut self, light_id: &str, layer: Layer, transition: Transition) {
        #[cfg(test)]
        {
            self.set_transition_calls += 1;
        }

        let key = (light_id.to_string(), layer);
        let start = transition
            .start
            .or(transition.initial_override)
            .or_else(|| self.states.get(&key).map(|state| state.current))
            .unwrap_or_else(Rgbio::transparent);

        self.known_lights.insert(light_id.to_string());
        let mut state = LayerState {
            start,
            end: transition.end,
            current: start,
            started_at: self.elapsed,
            duration: transition.duration,
            easing: transition.easing,
            complete: false,
        };
        // Zero length transitions land immediately.
        state.advance(self.elapsed);
        self.states.insert(key, state);
    }

    /// Stop animating and drop colour state for every light on `layer`.
    pub fn remove_transitions_by_layer(&mut self, layer: Layer) {
        let before = self.states.len();
        self.states.retain(|(_, l), _| *l != layer);
        let removed = before - self.states.len();
        if removed > 0 {
            debug!(layer, removed, "Removed layer transitions");
        }
    }

    /// Stop animating and drop colour state for one (light, layer).
    pub fn remove_light_layer(&mut self, light_id: &str, layer: Layer) {
        self.states.remove(&(light_id.to_string(), layer));
    }

    /// The last interpolated colour for (light, layer), or transparent.
    pub fn get_light_state(&self, light_id: &str, layer: Layer) -> Rgbio {
        self.states
            .get(&(light_id.to_string(), layer))
            .map(|state| state.current)
            .unwrap_or_else(Rgbio::transparent)
    }

    /// Whether (light, layer) has any state at all.
    pub fn has_state(&self, light_id: &str, layer: Layer) -> bool {
        self.states.contains_key(&(light_id.to_string(), layer))
    }

    /// Whether (light, layer) is still moving.
    pub fn is_transitioning(&self, light_id: &str, layer: Layer) -> bool {
        self.states
            .get(&(light_id.to_string(), layer))
            .is_some_and(|state| !state.complete)
    }

    /// Every layer that currently holds state, ascending.
    pub fn layers(&self) -> BTreeSet<Layer> {
        self.states.keys().map(|(_, layer)| *layer).collect()
    }

    /// Every light with state on `layer`.
    pub fn lights_on_layer(&self, layer: Layer) -> Vec<String> {
        self.states
            .keys()
            .filter(|(_, l)| *l == layer)
            .map(|(light, _)| light.clone())
            .collect()
    }

    /// Every light the controller knows about.
    pub fn known_lights(&self) -> impl Iterator<Item = &String> {
        self.known_lights.iter()
    }

    /// Advance the internal clock.
    pub(crate) fn advance_clock(&mut self, delta: Duration) {
        self.elapsed += delta;
    }

    /// Interpolate every active transition against the internal clock.
    pub(crate) fn interpolate(&mut self) {
        let now = self.elapsed;
        for state in self.states.values_mut() {
            state.advance(now);
        }
    }

    /// Blend a light's layers, lowest first, into its final colour.
    pub fn calculate_final_color_for_light(&self, light_id: &str) -> Rgbio {
        let range = (light_id.to_string(), Layer::MIN)..=(light_id.to_string(), Layer::MAX);
        blend_layers(self.states.range(range).map(|(_, state)| &state.current))
    }

    /// Compose and remember the final colour of every known light.
    pub(crate) fn compose_frame(&mut self) -> LightFrame {
        let frame: LightFrame = self
            .known_lights
            .iter()
            .map(|light| (light.clone(), self.calculate_final_color_for_light(light)))
            .collect();
        self.last_frame = frame.clone();
        frame
    }

    /// Advance the clock by `delta`, interpolate every transition and compose the frame.
    pub fn update_transitions(&mut self, delta: Duration) -> LightFrame {
        self.advance_clock(delta);
        self.interpolate();
        self.compose_frame()
    }

    /// The most recently composed frame.
    pub fn last_frame(&self) -> &LightFrame {
        &self.last_frame
    }

    /// The most recently composed colour for a light.
    pub fn final_color(&self, light_id: &str) -> Option<Rgbio> {
        self.last_frame.get(light_id).copied()
    }

    /// Force every tracked layer to black now, bypassing interpolation.
    pub fn immediate_blackout(&mut self) -> LightFrame {
        info!(lights = self.known_lights.len(), "Immediate blackout");
        let now = self.elapsed;
        for state in self.states.values_mut() {
            *state = LayerState::settled(state.current.blacked_out(), now);
        }
        self.compose_frame()
    }

    /// Drop every layer and leave each known light black on the base layer.
    pub fn reset_light_states(&mut self) -> LightFrame {
        let now = self.elapsed;
        let mut positions: BTreeMap<String, Rgbio> = BTreeMap::new();
        for light in &self.known_lights {
            let final_color = self.calculate_final_color_for_light(light);
            positions.insert(light.clone(), final_color.blacked_out());
        }

        self.states.clear();
        for (light, color) in positions {
            self.states
                .insert((light, BASE_LAYER), LayerState::settled(color, now));
        }
        self.compose_frame()
    }

    #[cfg(test)]
    pub(crate) fn set_transition_calls(&self) -> usize {
        self.set_transition_calls
    }
}
