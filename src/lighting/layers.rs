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

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::effect::{Effect, EffectTransition};
use super::transition::LightTransitionController;
use super::types::{Layer, Rgbio, BASE_LAYER, BLACKOUT_LAYER_START, FLASH_LAYER_START};

/// The default time an unowned layer keeps its colour before it is cleaned up.
pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_millis(2000);

/// The default grace period for the flash tier.
pub const DEFAULT_FLASH_IDLE_GRACE: Duration = Duration::from_millis(2000);

/// What an effect slot is keyed by: a layer, and in the per-light model a light.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey {
    pub layer: Layer,
    pub light: Option<String>,
}

impl LayerKey {
    pub fn layer(layer: Layer) -> LayerKey {
        LayerKey { layer, light: None }
    }

    pub fn light(layer: Layer, light: &str) -> LayerKey {
        LayerKey {
            layer,
            light: Some(light.to_string()),
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.light {
            Some(light) => write!(f, "{}/{}", self.layer, light),
            None => write!(f, "{}", self.layer),
        }
    }
}

/// Where an active effect is in its current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    /// The current step has not been looked at yet.
    Idle,
    /// Waiting on the step's start gate.
    WaitingFor,
    /// The step's colour transform is running.
    Transitioning,
    /// The transform finished and the step is waiting on its end gate.
    WaitingUntil,
}

/// An effect running on a layer key.
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub name: String,
    pub effect: Arc<Effect>,
    /// The steps this key runs, possibly narrowed to one light each.
    pub transitions: Vec<EffectTransition>,
    pub layer: Layer,
    pub light: Option<String>,
    pub current_transition: usize,
    pub phase: EffectPhase,
    pub transition_started_at: Duration,
    pub wait_end_time: Option<Duration>,
    /// Events seen so far for the gate currently being waited on.
    pub condition_hits: u32,
    /// Colours captured when the effect started, keyed by light.
    pub initial_states: HashMap<String, Rgbio>,
    /// Colours captured when the effect last finished a pass, keyed by light.
    pub last_end_states: HashMap<String, Rgbio>,
    pub is_persistent: bool,
}

impl ActiveEffect {
    pub fn new(
        name: &str,
        effect: Arc<Effect>,
        transitions: Vec<EffectTransition>,
        key: &LayerKey,
        is_persistent: bool,
    ) -> ActiveEffect {
        ActiveEffect {
            name: name.to_string(),
            effect,
            transitions,
            layer: key.layer,
            light: key.light.clone(),
            current_transition: 0,
            phase: EffectPhase::Idle,
            transition_started_at: Duration::ZERO,
            wait_end_time: None,
            condition_hits: 0,
            initial_states: HashMap::new(),
            last_end_states: HashMap::new(),
            is_persistent,
        }
    }

    /// The step currently being run.
    pub fn current(&self) -> Option<&EffectTransition> {
        self.transitions.get(self.current_transition)
    }

    /// Every light any of this effect's steps touch.
    pub fn lights(&self) -> Vec<String> {
        let mut lights: Vec<String> = Vec::new();
        for transition in &self.transitions {
            for light in &transition.lights {
                if !lights.contains(&light.id) {
                    lights.push(light.id.clone());
                }
            }
        }
        lights
    }
}

/// An effect waiting for the current occupant of its key to finish.
#[derive(Debug, Clone)]
pub struct QueuedEffect {
    pub name: String,
    pub effect: Arc<Effect>,
    pub is_persistent: bool,
    pub light: Option<String>,
}

/// The authoritative record of what runs and what waits on every layer key, plus
/// idle layer cleanup so nothing can leave a stuck colour behind.
pub struct LayerManager {
    active: BTreeMap<LayerKey, ActiveEffect>,
    queued: BTreeMap<LayerKey, QueuedEffect>,
    last_used: BTreeMap<Layer, Duration>,
    /// Colour snapshots keyed by (light, layer).
    snapshots: HashMap<(String, Layer), Rgbio>,
    idle_grace: Duration,
    flash_idle_grace: Duration,
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_GRACE, DEFAULT_FLASH_IDLE_GRACE)
    }
}

impl LayerManager {
    pub fn new(idle_grace: Duration, flash_idle_grace: Duration) -> LayerManager {
        LayerManager {
            active: BTreeMap::new(),
            queued: BTreeMap::new(),
            last_used: BTreeMap::new(),
            snapshots: HashMap::new(),
            idle_grace,
            flash_idle_grace,
        }
    }

    // ===== Active effects =====

    /// Track an effect as running on `key`. If it has no captured starting colours yet,
    /// they are taken from the controller.
    pub fn add_active_effect(
        &mut self,
        key: LayerKey,
        mut effect: ActiveEffect,
        controller: &LightTransitionController,
    ) {
        if effect.initial_states.is_empty() {
            for light in effect.lights() {
                let state = self
                    .snapshots
                    .get(&(light.clone(), key.layer))
                    .copied()
                    .unwrap_or_else(|| controller.get_light_state(&light, key.layer));
                effect.initial_states.insert(light, state);
            }
        }
        self.active.insert(key, effect);
    }

    pub fn remove_active_effect(&mut self, key: &LayerKey) -> Option<ActiveEffect> {
        self.active.remove(key)
    }

    pub fn get_active_effect(&self, key: &LayerKey) -> Option<&ActiveEffect> {
        self.active.get(key)
    }

    pub fn get_active_effect_mut(&mut self, key: &LayerKey) -> Option<&mut ActiveEffect> {
        self.active.get_mut(key)
    }

    pub fn get_active_effects(&self) -> impl Iterator<Item = (&LayerKey, &ActiveEffect)> {
        self.active.iter()
    }

    /// Keys of every active effect, ascending by layer.
    pub fn active_keys(&self) -> Vec<LayerKey> {
        self.active.keys().cloned().collect()
    }

    /// Keys of every active effect on `layer`.
    pub fn active_keys_on_layer(&self, layer: Layer) -> Vec<LayerKey> {
        self.active
            .keys()
            .filter(|key| key.layer == layer)
            .cloned()
            .collect()
    }

    /// Whether an effect with this name is running on any key.
    pub fn is_effect_active(&self, name: &str) -> bool {
        self.active.values().any(|effect| effect.name == name)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    // ===== Queue =====

    /// Queue an effect on `key`. There is only one slot per key; a newer request replaces
    /// whatever was waiting.
    pub fn add_queued_effect(&mut self, key: LayerKey, effect: QueuedEffect) {
        if let Some(previous) = self.queued.insert(key.clone(), effect) {
            debug!(key = %key, replaced = previous.name, "Replaced queued effect");
        }
    }

    pub fn remove_queued_effect(&mut self, key: &LayerKey) -> Option<QueuedEffect> {
        self.queued.remove(key)
    }

    pub fn get_queued_effect(&self, key: &LayerKey) -> Option<&QueuedEffect> {
        self.queued.get(key)
    }

    pub fn get_queued_effects(&self) -> impl Iterator<Item = (&LayerKey, &QueuedEffect)> {
        self.queued.iter()
    }

    pub fn clear_queue(&mut self) {
        self.queued.clear();
    }

    // ===== Idle cleanup =====

    pub fn set_layer_last_used(&mut self, layer: Layer, timestamp: Duration) {
        self.last_used.insert(layer, timestamp);
    }

    pub fn layer_last_used(&self, layer: Layer) -> Option<Duration> {
        self.last_used.get(&layer).copied()
    }

    fn grace_for(&self, layer: Layer) -> Duration {
        if (FLASH_LAYER_START..BLACKOUT_LAYER_START).contains(&layer) {
            self.flash_idle_grace
        } else {
            self.idle_grace
        }
    }

    fn layer_is_owned(&self, layer: Layer) -> bool {
        self.active.keys().any(|key| key.layer == layer)
            || self.queued.keys().any(|key| key.layer == layer)
    }

    /// Remove the colour of every layer other than the base layer that has no active or
    /// queued effect, is not mid-fade and hasn't been used within its grace period.
    /// Returns the layers that were cleaned up.
    pub fn cleanup_unused_layers(
        &mut self,
        now: Duration,
        controller: &mut LightTransitionController,
    ) -> Vec<Layer> {
        let mut candidates = controller.layers();
        candidates.extend(self.last_used.keys().copied());

        let mut removed = Vec::new();
        for layer in candidates {
            if layer == BASE_LAYER || self.layer_is_owned(layer) {
                continue;
            }
            // Blackout fades run without an owning effect.
            if controller
                .lights_on_layer(layer)
                .iter()
                .any(|light| controller.is_transitioning(light, layer))
            {
                continue;
            }

            let last_used = self.last_used.get(&layer).copied().unwrap_or(Duration::ZERO);
            if now.saturating_sub(last_used) <= self.grace_for(layer) {
                continue;
            }

            controller.remove_transitions_by_layer(layer);
            self.last_used.remove(&layer);
            self.clear_layer_states(layer);
            removed.push(layer);
        }

        if !removed.is_empty() {
            debug!(layers = ?removed, "Cleaned up idle layers");
        }
        removed
    }

    // ===== Colour snapshots =====

    /// Snapshot the colour the given lights currently show on `layer`.
    pub fn capture_initial_states(
        &mut self,
        layer: Layer,
        lights: &[String],
        controller: &LightTransitionController,
    ) {
        for light in lights {
            self.snapshots.insert(
                (light.clone(), layer),
                controller.get_light_state(light, layer),
            );
        }
    }

    /// Snapshot the colour an active effect leaves behind, so the next effect on the
    /// same key can carry on from it.
    pub fn capture_final_states(&mut self, key: &LayerKey, controller: &LightTransitionController) {
        let Some(effect) = self.active.get_mut(key) else {
            return;
        };

        let mut captured = Vec::new();
        for light in effect.lights() {
            let state = controller.get_light_state(&light, key.layer);
            effect.last_end_states.insert(light.clone(), state);
            captured.push((light, state));
        }
        for (light, state) in captured {
            self.snapshots.insert((light, key.layer), state);
        }
    }

    /// The snapshot for (light, layer), if one was captured.
    pub fn get_light_state(&self, light: &str, layer: Layer) -> Option<Rgbio> {
        self.snapshots.get(&(light.to_string(), layer)).copied()
    }

    /// Forget every snapshot on `layer`.
    pub fn clear_layer_states(&mut self, layer: Layer) {
        self.snapshots.retain(|(_, l), _| *l != layer);
    }

    /// Layers below this threshold fade on a soft blackout; layers at or above it are
    /// reserved for system use and left alone.
    pub fn get_blackout_layers_under(&self) -> Layer {
        BLACKOUT_LAYER_START
    }
}
