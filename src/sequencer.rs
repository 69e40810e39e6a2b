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
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::lighting::effect::{Effect, TriggerColor};
use crate::lighting::manager::EffectManager;
use crate::lighting::types::{Layer, LightFrame, Rgbio, TrackedLight};
use crate::output::OutputSink;

/// The narrow surface cue implementations drive.
pub trait LightingController: Send + Sync {
    fn add_effect(&self, name: &str, effect: Effect, offset: Duration, is_persistent: bool);

    fn set_effect(&self, name: &str, effect: Effect, offset: Duration, is_persistent: bool);

    fn add_effect_unblocked_name(
        &self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    );

    fn set_effect_unblocked_name(
        &self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    );

    fn remove_effect(&self, name: &str, layer: Layer);

    fn remove_all_effects(&self);

    fn set_state(&self, lights: &[TrackedLight], color: Rgbio, duration: Duration);

    fn blackout(&self, duration: Duration);

    fn cancel_blackout(&self);

    fn on_beat(&self);

    fn on_half_beat(&self);

    fn on_measure(&self);

    fn on_keyframe(&self);

    fn on_color(&self, color: TriggerColor);
}

/// Clears the tick flag however the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shares one effect manager between the clock thread and cue handlers, and publishes
/// every composed frame.
#[derive(Clone)]
pub struct Sequencer {
    manager: Arc<Mutex<EffectManager>>,
    ticking: Arc<AtomicBool>,
    sink: Arc<dyn OutputSink>,
}

impl Sequencer {
    pub fn new(manager: EffectManager, sink: Arc<dyn OutputSink>) -> Sequencer {
        Sequencer {
            manager: Arc::new(Mutex::new(manager)),
            ticking: Arc::new(AtomicBool::new(false)),
            sink,
        }
    }

    pub fn register_light(&self, light_id: &str) {
        self.manager.lock().register_light(light_id);
    }

    /// Advance the engine by `delta` and publish the frame. A tick that overlaps one still
    /// in progress is skipped, not queued. Returns whether the tick ran.
    pub fn tick(&self, delta: Duration) -> bool {
        if self.ticking.swap(true, Ordering::Acquire) {
            debug!("Tick already in progress, skipping");
            return false;
        }
        let _guard = TickGuard(&self.ticking);

        let frame = self.manager.lock().tick(delta);
        self.sink.publish(&frame);
        true
    }

    /// Like `set_effect`, but returns a future that resolves once the effect has been
    /// applied. The effect is posted before this returns; awaiting only waits for it.
    pub fn set_effect_and_wait(
        &self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    ) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        self.manager
            .lock()
            .set_effect_notify(name, effect, offset, is_persistent, Some(tx));
        async move {
            // A dropped sender means the effect was discarded, which also ends the wait.
            let _ = rx.await;
        }
    }

    /// Force everything dark right now and publish the result.
    pub fn immediate_blackout(&self) {
        let frame = self.manager.lock().immediate_blackout();
        self.sink.publish(&frame);
    }

    /// Drop every effect and layer and publish the resulting black frame.
    pub fn reset(&self) {
        let frame = self.manager.lock().reset();
        self.sink.publish(&frame);
    }

    pub fn is_blackout_active(&self) -> bool {
        self.manager.lock().is_blackout_active()
    }

    /// The last frame the engine composed.
    pub fn last_frame(&self) -> LightFrame {
        self.manager.lock().controller().last_frame().clone()
    }

    /// Run `f` against the effect manager while holding its lock.
    pub fn with_manager<T>(&self, f: impl FnOnce(&mut EffectManager) -> T) -> T {
        f(&mut self.manager.lock())
    }
}

impl LightingController for Sequencer {
    fn add_effect(&self, name: &str, effect: Effect, offset: Duration, is_persistent: bool) {
        self.manager
            .lock()
            .add_effect(name, effect, offset, is_persistent);
    }

    fn set_effect(&self, name: &str, effect: Effect, offset: Duration, is_persistent: bool) {
        self.manager
            .lock()
            .set_effect(name, effect, offset, is_persistent);
    }

    fn add_effect_unblocked_name(
        &self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    ) {
        self.manager
            .lock()
            .add_effect_unblocked_name(name, effect, offset, is_persistent);
    }

    fn set_effect_unblocked_name(
        &self,
        name: &str,
        effect: Effect,
        offset: Duration,
        is_persistent: bool,
    ) {
        self.manager
            .lock()
            .set_effect_unblocked_name(name, effect, offset, is_persistent);
    }

    fn remove_effect(&self, name: &str, layer: Layer) {
        self.manager.lock().remove_effect(name, layer);
    }

    fn remove_all_effects(&self) {
        self.manager.lock().remove_all_effects();
    }

    fn set_state(&self, lights: &[TrackedLight], color: Rgbio, duration: Duration) {
        self.manager.lock().set_state(lights, color, duration);
    }

    fn blackout(&self, duration: Duration) {
        self.manager.lock().blackout(duration);
    }

    fn cancel_blackout(&self) {
        self.manager.lock().cancel_blackout();
    }

    fn on_beat(&self) {
        self.manager.lock().on_beat();
    }

    fn on_half_beat(&self) {
        self.manager.lock().on_half_beat();
    }

    fn on_measure(&self) {
        self.manager.lock().on_measure();
    }

    fn on_keyframe(&self) {
        self.manager.lock().on_keyframe();
    }

    fn on_color(&self, color: TriggerColor) {
        self.manager.lock().on_color(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::effect::EffectTransition;
    use crate::output::ChannelSink;

    fn sequencer() -> (Sequencer, crossbeam_channel::Receiver<LightFrame>, Vec<TrackedLight>) {
        let (sink, receiver) = ChannelSink::new();
        let sequencer = Sequencer::new(EffectManager::default(), Arc::new(sink));
        let lights = vec![TrackedLight::new("front-1", 0)];
        sequencer.register_light("front-1");
        (sequencer, receiver, lights)
    }

    fn red(lights: &[TrackedLight]) -> Effect {
        Effect::new("red", "").with_transition(EffectTransition::new(
            lights,
            0,
            Rgbio::new(255, 0, 0),
            Duration::ZERO,
        ))
    }

    #[test]
    fn test_tick_publishes_frame() {
        let (sequencer, receiver, lights) = sequencer();
        sequencer.add_effect("red", red(&lights), Duration::ZERO, false);

        assert!(sequencer.tick(Duration::from_millis(23)));
        let frame = receiver.try_recv().unwrap();
        assert_eq!(frame["front-1"].red, 255);
        assert_eq!(sequencer.last_frame(), frame);
    }

    #[test]
    fn test_overlapping_tick_is_skipped() {
        let (sequencer, receiver, _) = sequencer();
        sequencer.ticking.store(true, Ordering::Release);

        assert!(!sequencer.tick(Duration::from_millis(23)));
        assert!(receiver.try_recv().is_err());
        assert_eq!(sequencer.with_manager(|manager| manager.now()), Duration::ZERO);

        sequencer.ticking.store(false, Ordering::Release);
        assert!(sequencer.tick(Duration::from_millis(23)));
    }

    #[tokio::test]
    async fn test_set_effect_and_wait_resolves_after_offset() {
        let (sequencer, receiver, lights) = sequencer();

        let applied =
            sequencer.set_effect_and_wait("red", red(&lights), Duration::from_millis(100), false);
        assert!(sequencer.tick(Duration::from_millis(100)));
        applied.await;

        assert_eq!(receiver.try_recv().unwrap()["front-1"].red, 255);
    }

    #[test]
    fn test_immediate_blackout_publishes() {
        let (sequencer, receiver, lights) = sequencer();
        sequencer.add_effect("red", red(&lights), Duration::ZERO, false);
        sequencer.tick(Duration::from_millis(23));
        let _ = receiver.try_recv();

        sequencer.immediate_blackout();
        assert!(receiver.try_recv().unwrap()["front-1"].is_dark());
    }
}
