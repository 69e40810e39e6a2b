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
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use self::schedule::{DeferredCommand, DeferredKind, Schedule};
use super::effect::{Effect, EffectTransition, TriggerColor, WaitCondition};
use super::layers::{ActiveEffect, EffectPhase, LayerKey, LayerManager, QueuedEffect};
use super::transition::{LightTransitionController, Transition};
use super::types::{Layer, LightFrame, Rgbio, TrackedLight, BASE_LAYER};

mod schedule;

/// Name used for the effects `set_state` synthesizes.
pub const SET_STATE_EFFECT: &str = "set-state";

/// How effect slots are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKeying {
    /// One effect per layer.
    PerLayer,
    /// One effect per (layer, light). Steps are narrowed to a single light each.
    #[default]
    PerLight,
}

/// What the step state machine wants to do next.
enum StepAction {
    /// Phase changed, look again.
    Continue,
    /// Start the current step's colour transform.
    Begin,
    /// The current step is done.
    Finish,
    /// The effect ran out of steps.
    Complete,
    /// Nothing to do until time passes or an event arrives.
    Stall,
}

fn gate_open(condition: WaitCondition, count: u32, active: &ActiveEffect, now: Duration) -> bool {
    match condition {
        WaitCondition::None => true,
        WaitCondition::Delay => active.wait_end_time.is_none_or(|end| now >= end),
        _ => active.condition_hits >= count,
    }
}

fn step_action(active: &mut ActiveEffect, now: Duration) -> StepAction {
    let Some(step) = active.transitions.get(active.current_transition) else {
        return StepAction::Complete;
    };

    match active.phase {
        EffectPhase::Idle => {
            active.condition_hits = 0;
            match step.wait_for_condition {
                WaitCondition::None => StepAction::Begin,
                WaitCondition::Delay => {
                    active.wait_end_time = Some(now + step.wait_for_time);
                    active.phase = EffectPhase::WaitingFor;
                    StepAction::Continue
                }
                _ => {
                    active.wait_end_time = None;
                    active.phase = EffectPhase::WaitingFor;
                    StepAction::Stall
                }
            }
        }
        EffectPhase::WaitingFor => {
            if gate_open(
                step.wait_for_condition,
                step.wait_for_condition_count,
                active,
                now,
            ) {
                StepAction::Begin
            } else {
                StepAction::Stall
            }
        }
        EffectPhase::Transitioning => {
            let transform_end = active.transition_started_at + step.transform.duration;
            if now < transform_end {
                return StepAction::Stall;
            }

            active.condition_hits = 0;
            match step.wait_until_condition {
                WaitCondition::None => StepAction::Finish,
                WaitCondition::Delay => {
                    active.wait_end_time = Some(transform_end + step.wait_until_time);
                    active.phase = EffectPhase::WaitingUntil;
                    StepAction::Continue
                }
                _ => {
                    active.wait_end_time = None;
                    active.phase = EffectPhase::WaitingUntil;
                    StepAction::Stall
                }
            }
        }
        EffectPhase::WaitingUntil => {
            if gate_open(
                step.wait_until_condition,
                step.wait_until_condition_count,
                active,
                now,
            ) {
                StepAction::Finish
            } else {
                StepAction::Stall
            }
        }
    }
}

/// A fade to black in progress.
#[derive(Debug, Clone)]
struct Blackout {
    layers: BTreeSet<Layer>,
    started_at: Duration,
    duration: Duration,
}

/// The mutator surface cue implementations drive. Translates effects into layer
/// bookkeeping and colour transitions, and runs every active effect's steps.
pub struct EffectManager {
    controller: LightTransitionController,
    layers: LayerManager,
    keying: EffectKeying,
    schedule: Schedule,
    blackout: Option<Blackout>,
    last_base_set_effect: Option<String>,
}

impl Default for EffectManager {
    fn default() -> Self {
        Self::new(EffectKeying::default(), LayerManager::default())
    }
}

impl EffectManager {
    pub fn new(keying: EffectKeying, layers: LayerManager) -> EffectManager {
        EffectManager {
            controller: LightTransitionController::new(),
            layers,
            keying,
            schedule: Schedule::default(),
            blackout: None,
            last_base_set_effect: None,
        }
    }

    pub fn controller(&self) -> &LightTransitionController {
        &self.controller
    }

    pub fn layers(&self) -> &LayerManager {
        &self.layers
    }

    /// The engine clock.
    pub fn now(&self) -> Duration {
        self.controller.now()
    }

    pub fn register_light(&mut self, light_id: &str) {
        self.controller.register_light(light_id);
    }

    /// Number of deferred calls waiting for their offset to elapse.
    pub fn pending_count(&self) -> usize {
        self.schedule.len()
    }

    // ===== Public entry points =====

    /// Run an effect alongside whatever else is running. Per key: an idle key starts the
    /// effect, the same effect already running queues it, and a different effect is
    /// evicted and replaced.
    pub fn add_effect(&mut self, name: &str, effect: Effect, offset: Duration, is_persistent: bool) {
        self.add_effect_notify(name, effect, offset, is_persistent, None);
    }

    /// Like `add_effect`, firing `notify` once the effect has actually been applied.
    pub fn add_effect_notify(
        &mut self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
        notify: Option<oneshot::Sender<()>>,
    ) {
        if effect.is_empty() {
            warn!(effect = name, "Effect has no transitions, ignoring");
            return;
        }
        if !offset.is_zero() {
            self.defer(DeferredKind::Add, name, effect, offset, is_persistent, notify);
            return;
        }

        self.add_effect_now(name, Arc::new(effect), is_persistent);
        notify_done(notify);
    }

    /// Clear every other effect and queue, then run this one. A repeated call with the
    /// name of the last base layer `set_effect` that is still running queues instead, so
    /// effects that re-set themselves don't interrupt themselves.
    pub fn set_effect(&mut self, name: &str, effect: Effect, offset: Duration, is_persistent: bool) {
        self.set_effect_notify(name, effect, offset, is_persistent, None);
    }

    /// Like `set_effect`, firing `notify` once the effect has actually been applied.
    pub fn set_effect_notify(
        &mut self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
        notify: Option<oneshot::Sender<()>>,
    ) {
        if effect.is_empty() {
            warn!(effect = name, "Effect has no transitions, ignoring");
            return;
        }
        if !offset.is_zero() {
            self.defer(DeferredKind::Set, name, effect, offset, is_persistent, notify);
            return;
        }

        self.set_effect_now(name, Arc::new(effect), is_persistent);
        notify_done(notify);
    }

    /// `add_effect`, unless an effect with this name is already running anywhere.
    pub fn add_effect_unblocked_name(
        &mut self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    ) {
        if self.layers.is_effect_active(name) {
            debug!(effect = name, "Effect already running, skipping");
            return;
        }
        self.add_effect(name, effect, offset, is_persistent);
    }

    /// `set_effect`, unless an effect with this name is already running anywhere.
    pub fn set_effect_unblocked_name(
        &mut self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    ) {
        if self.layers.is_effect_active(name) {
            debug!(effect = name, "Effect already running, skipping");
            return;
        }
        self.set_effect(name, effect, offset, is_persistent);
    }

    /// Remove the named effect from `layer` if it owns it.
    pub fn remove_effect(&mut self, name: &str, layer: Layer) {
        let keys: Vec<LayerKey> = self
            .layers
            .active_keys_on_layer(layer)
            .into_iter()
            .filter(|key| {
                self.layers
                    .get_active_effect(key)
                    .is_some_and(|active| active.name == name)
            })
            .collect();

        for key in keys {
            self.remove_effect_by_key(&key, true);
        }
    }

    /// Stop everything. The queue goes first so nothing auto-starts mid teardown. The base
    /// layer keeps its colour; every other layer loses it.
    pub fn remove_all_effects(&mut self) {
        self.layers.clear_queue();
        for key in self.layers.active_keys() {
            let remove_transitions = key.layer != BASE_LAYER;
            self.remove_effect_by_key(&key, remove_transitions);
        }
        self.last_base_set_effect = None;
    }

    /// Move `lights` to `color` on the base layer over `duration`, bypassing the cue system.
    pub fn set_state(&mut self, lights: &[TrackedLight], color: Rgbio, duration: Duration) {
        if lights.is_empty() {
            return;
        }
        self.cancel_blackout();

        let effect = Arc::new(
            Effect::new(SET_STATE_EFFECT, "direct light state").with_transition(
                EffectTransition::new(lights, BASE_LAYER, color, duration),
            ),
        );
        for (key, transitions) in self.partition(&effect) {
            if self.layers.get_active_effect(&key).is_some() {
                self.evict(&key);
            }
            self.start_effect(key, SET_STATE_EFFECT, effect.clone(), transitions, false);
        }
    }

    // ===== Blackout =====

    /// Retire every effect below the blackout threshold and fade their layers to black.
    pub fn blackout(&mut self, duration: Duration) {
        let threshold = self.layers.get_blackout_layers_under();
        let now = self.now();

        let below: Vec<LayerKey> = self
            .layers
            .active_keys()
            .into_iter()
            .filter(|key| key.layer < threshold)
            .collect();
        for key in below {
            self.layers.remove_queued_effect(&key);
            self.layers.capture_final_states(&key, &self.controller);
            self.layers.remove_active_effect(&key);
            self.layers.set_layer_last_used(key.layer, now);
        }
        let queued_below: Vec<LayerKey> = self
            .layers
            .get_queued_effects()
            .filter(|(key, _)| key.layer < threshold)
            .map(|(key, _)| key.clone())
            .collect();
        for key in queued_below {
            self.layers.remove_queued_effect(&key);
        }

        let mut faded = BTreeSet::new();
        for layer in self.controller.layers() {
            if layer >= threshold {
                continue;
            }
            for light in self.controller.lights_on_layer(layer) {
                let current = self.controller.get_light_state(&light, layer);
                self.controller
                    .set_transition(&light, layer, Transition::to(current.blacked_out(), duration));
            }
            faded.insert(layer);
        }
        self.last_base_set_effect = None;

        info!(
            duration_ms = duration.as_millis() as u64,
            layers = faded.len(),
            "Blackout started"
        );
        self.blackout = Some(Blackout {
            layers: faded,
            started_at: now,
            duration,
        });
    }

    /// Forget any blackout in progress.
    pub fn cancel_blackout(&mut self) {
        if self.blackout.take().is_some() {
            info!("Blackout cancelled");
        }
    }

    pub fn is_blackout_active(&self) -> bool {
        self.blackout.is_some()
    }

    /// Emergency stop: drop every effect and force every light to black right now.
    pub fn immediate_blackout(&mut self) -> LightFrame {
        self.layers.clear_queue();
        for key in self.layers.active_keys() {
            self.layers.remove_active_effect(&key);
        }
        self.blackout = None;
        self.last_base_set_effect = None;
        self.controller.immediate_blackout()
    }

    /// Drop every effect and every layer, leaving each light black on the base layer.
    pub fn reset(&mut self) -> LightFrame {
        self.layers.clear_queue();
        for key in self.layers.active_keys() {
            self.layers.remove_active_effect(&key);
            self.layers.clear_layer_states(key.layer);
        }
        self.blackout = None;
        self.last_base_set_effect = None;
        self.controller.reset_light_states()
    }

    /// A manual effect touching a layer below the threshold takes that layer out of the
    /// blackout.
    fn cancel_blackout_for(&mut self, layers: &BTreeSet<Layer>) {
        let threshold = self.layers.get_blackout_layers_under();
        let Some(blackout) = self.blackout.as_mut() else {
            return;
        };

        let touched: Vec<Layer> = layers
            .iter()
            .copied()
            .filter(|layer| *layer < threshold)
            .collect();
        if touched.is_empty() {
            return;
        }

        for layer in &touched {
            blackout.layers.remove(layer);
        }
        debug!(layers = ?touched, "Effect overrides blackout");
        if blackout.layers.is_empty() {
            self.cancel_blackout();
        }
    }

    // ===== Musical events =====

    pub fn on_beat(&mut self) {
        self.signal(WaitCondition::Beat);
    }

    pub fn on_half_beat(&mut self) {
        self.signal(WaitCondition::HalfBeat);
    }

    pub fn on_measure(&mut self) {
        self.signal(WaitCondition::Measure);
    }

    pub fn on_keyframe(&mut self) {
        self.signal(WaitCondition::Keyframe);
    }

    pub fn on_color(&mut self, color: TriggerColor) {
        self.signal(WaitCondition::Color(color));
    }

    /// Count an event against every effect gated on it, then let those effects move on.
    fn signal(&mut self, condition: WaitCondition) {
        for key in self.layers.active_keys() {
            let Some(active) = self.layers.get_active_effect_mut(&key) else {
                continue;
            };
            let Some(step) = active.current() else {
                continue;
            };
            let waiting_on = match active.phase {
                EffectPhase::WaitingFor => step.wait_for_condition,
                EffectPhase::WaitingUntil => step.wait_until_condition,
                _ => continue,
            };
            if waiting_on != condition {
                continue;
            }

            active.condition_hits += 1;
            self.advance_effect(&key);
        }
    }

    // ===== Tick =====

    /// Advance the engine by `delta` and compose the frame. Due deferred calls run before
    /// any effect steps; idle layers are cleaned up last.
    pub fn tick(&mut self, delta: Duration) -> LightFrame {
        self.controller.advance_clock(delta);
        // Effects read layer colours when they hand over, so those must be current first.
        self.controller.interpolate();
        let now = self.now();

        while let Some(command) = self.schedule.pop_due(now) {
            self.run_deferred(command);
        }

        for key in self.layers.active_keys() {
            self.advance_effect(&key);
        }

        if self
            .blackout
            .as_ref()
            .is_some_and(|blackout| now >= blackout.started_at + blackout.duration)
        {
            debug!("Blackout finished");
            self.blackout = None;
        }

        self.layers
            .cleanup_unused_layers(now, &mut self.controller);
        self.controller.compose_frame()
    }

    // ===== Internals =====

    fn defer(
        &mut self,
        kind: DeferredKind,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
        notify: Option<oneshot::Sender<()>>,
    ) {
        let due = self.now() + offset;
        debug!(
            effect = name,
            offset_ms = offset.as_millis() as u64,
            "Deferring effect"
        );
        self.schedule.push(
            due,
            DeferredCommand {
                kind,
                name: name.to_string(),
                effect,
                is_persistent,
                notify,
            },
        );
    }

    fn run_deferred(&mut self, command: DeferredCommand) {
        let effect = Arc::new(command.effect);
        match command.kind {
            DeferredKind::Add => self.add_effect_now(&command.name, effect, command.is_persistent),
            DeferredKind::Set => self.set_effect_now(&command.name, effect, command.is_persistent),
        }
        notify_done(command.notify);
    }

    fn add_effect_now(&mut self, name: &str, effect: Arc<Effect>, is_persistent: bool) {
        self.cancel_blackout_for(&effect.layers());

        for (key, transitions) in self.partition(&effect) {
            let running = self
                .layers
                .get_active_effect(&key)
                .map(|active| active.name == name);
            match running {
                None => self.start_effect(key, name, effect.clone(), transitions, is_persistent),
                Some(true) => {
                    debug!(effect = name, key = %key, "Effect already running, queuing");
                    self.layers.add_queued_effect(
                        key.clone(),
                        QueuedEffect {
                            name: name.to_string(),
                            effect: effect.clone(),
                            is_persistent,
                            light: key.light.clone(),
                        },
                    );
                }
                Some(false) => {
                    self.evict(&key);
                    self.start_effect(key, name, effect.clone(), transitions, is_persistent);
                }
            }
        }
    }

    fn set_effect_now(&mut self, name: &str, effect: Arc<Effect>, is_persistent: bool) {
        let targets_base = effect.layers().contains(&BASE_LAYER);
        let retick = targets_base
            && self.last_base_set_effect.as_deref() == Some(name)
            && self.layers.is_effect_active(name);

        if retick {
            debug!(effect = name, "Effect re-set itself, queuing");
        } else {
            self.layers.clear_queue();
            for key in self.layers.active_keys() {
                let remove_transitions = key.layer != BASE_LAYER;
                self.remove_effect_by_key(&key, remove_transitions);
            }
        }

        self.add_effect_now(name, effect, is_persistent);
        if targets_base {
            self.last_base_set_effect = Some(name.to_string());
        }
    }

    /// Split an effect's steps into the keys they run on.
    fn partition(&self, effect: &Effect) -> BTreeMap<LayerKey, Vec<EffectTransition>> {
        let mut groups: BTreeMap<LayerKey, Vec<EffectTransition>> = BTreeMap::new();
        for transition in &effect.transitions {
            match self.keying {
                EffectKeying::PerLayer => groups
                    .entry(LayerKey::layer(transition.layer))
                    .or_default()
                    .push(transition.clone()),
                EffectKeying::PerLight => {
                    for light in &transition.lights {
                        groups
                            .entry(LayerKey::light(transition.layer, &light.id))
                            .or_default()
                            .push(transition.for_light(light));
                    }
                }
            }
        }
        groups
    }

    /// Start tracking an effect on `key` and run its first steps.
    fn start_effect(
        &mut self,
        key: LayerKey,
        name: &str,
        effect: Arc<Effect>,
        transitions: Vec<EffectTransition>,
        is_persistent: bool,
    ) {
        if transitions.is_empty() {
            return;
        }

        let now = self.now();
        let active = ActiveEffect::new(name, effect, transitions, &key, is_persistent);
        self.layers
            .add_active_effect(key.clone(), active, &self.controller);
        self.layers.set_layer_last_used(key.layer, now);
        debug!(effect = name, key = %key, "Started effect");

        self.advance_effect(&key);
    }

    /// Throw out whatever runs on `key` so something else can take over. The colour stays
    /// for the newcomer to continue from.
    fn evict(&mut self, key: &LayerKey) {
        self.layers.capture_final_states(key, &self.controller);
        if let Some(evicted) = self.layers.remove_active_effect(key) {
            debug!(effect = evicted.name, key = %key, "Evicted effect");
        }
        self.layers.remove_queued_effect(key);
    }

    /// Remove every effect on `layer`. The colour state is only dropped when asked, when no
    /// queued successor takes over and when the layer isn't the base layer.
    pub fn remove_effect_by_layer(&mut self, layer: Layer, remove_transitions: bool) {
        for key in self.layers.active_keys_on_layer(layer) {
            self.remove_effect_by_key(&key, remove_transitions);
        }
    }

    fn remove_effect_by_key(&mut self, key: &LayerKey, remove_transitions: bool) {
        self.layers.capture_final_states(key, &self.controller);
        let Some(removed) = self.layers.remove_active_effect(key) else {
            return;
        };
        self.layers.set_layer_last_used(key.layer, self.now());
        debug!(effect = removed.name, key = %key, "Removed effect");

        if self.start_next_effect_in_queue(key) {
            return;
        }

        if remove_transitions && key.layer != BASE_LAYER {
            for light in removed.lights() {
                self.controller.remove_light_layer(&light, key.layer);
            }
            if self.controller.lights_on_layer(key.layer).is_empty() {
                self.layers.clear_layer_states(key.layer);
            }
        }
    }

    /// Promote the queued effect on `key`, if there is one. The key must already be free.
    fn start_next_effect_in_queue(&mut self, key: &LayerKey) -> bool {
        let Some(queued) = self.layers.remove_queued_effect(key) else {
            return false;
        };

        let transitions = self.partition(&queued.effect).remove(key).unwrap_or_default();
        if transitions.is_empty() {
            return false;
        }

        self.start_effect(
            key.clone(),
            &queued.name,
            queued.effect,
            transitions,
            queued.is_persistent,
        );
        true
    }

    /// Run the step state machine for `key` as far as it can go right now.
    fn advance_effect(&mut self, key: &LayerKey) {
        let now = self.now();
        let mut budget = self
            .layers
            .get_active_effect(key)
            .map_or(0, |active| active.transitions.len() * 6 + 2);

        while budget > 0 {
            budget -= 1;
            let Some(active) = self.layers.get_active_effect_mut(key) else {
                return;
            };

            match step_action(active, now) {
                StepAction::Continue => {}
                StepAction::Stall => return,
                StepAction::Begin => self.begin_transform(key, now),
                StepAction::Finish => {
                    active.current_transition += 1;
                    active.phase = EffectPhase::Idle;
                    active.wait_end_time = None;
                }
                StepAction::Complete => {
                    self.complete_effect(key, now);
                    return;
                }
            }
        }
    }

    fn begin_transform(&mut self, key: &LayerKey, now: Duration) {
        let Some(active) = self.layers.get_active_effect_mut(key) else {
            return;
        };
        let Some(step) = active.current().cloned() else {
            return;
        };
        active.phase = EffectPhase::Transitioning;
        active.transition_started_at = now;
        let layer = active.layer;
        let initial_states = active.initial_states.clone();

        for light in &step.lights {
            // Only fall back to the snapshot when the controller lost the layer's colour.
            let initial = if self.controller.has_state(&light.id, layer) {
                None
            } else {
                initial_states.get(&light.id).copied()
            };
            self.controller.set_transition(
                &light.id,
                layer,
                Transition::to(step.transform.color, step.transform.duration)
                    .easing(step.transform.easing)
                    .with_initial(initial),
            );
        }
    }

    /// The last step finished: hand over to a queued successor, loop a persistent effect,
    /// or retire.
    fn complete_effect(&mut self, key: &LayerKey, now: Duration) {
        self.layers.capture_final_states(key, &self.controller);

        if self.layers.get_queued_effect(key).is_some() {
            if let Some(finished) = self.layers.remove_active_effect(key) {
                debug!(effect = finished.name, key = %key, "Effect finished, starting queued");
            }
            self.start_next_effect_in_queue(key);
            return;
        }

        let Some(active) = self.layers.get_active_effect_mut(key) else {
            return;
        };
        if active.is_persistent {
            active.current_transition = 0;
            active.phase = EffectPhase::Idle;
            active.wait_end_time = None;
            return;
        }

        if let Some(finished) = self.layers.remove_active_effect(key) {
            debug!(effect = finished.name, key = %key, "Effect finished");
        }
        self.layers.set_layer_last_used(key.layer, now);
    }
}

fn notify_done(notify: Option<oneshot::Sender<()>>) {
    if let Some(notify) = notify {
        // The caller may have stopped waiting.
        let _ = notify.send(());
    }
}

#[cfg(test)]
mod tests;
