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
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::sequencer::Sequencer;

/// The default tick rate.
pub const DEFAULT_TICK_HZ: f64 = 44.0;

/// Represents the current cancel state.
#[derive(Debug, PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// Shared between the clock thread and whoever wants it to stop.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<Mutex<CancelState>>,
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock() == CancelState::Cancelled
    }

    /// Blocks until cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.cancelled.lock();
        self.condvar
            .wait_while(&mut cancelled, |cancelled| *cancelled == CancelState::Untouched);
    }

    pub fn cancel(&self) {
        let mut cancel_state = self.cancelled.lock();
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}

/// Drives a sequencer from a dedicated thread at a fixed rate. Each tick gets the real
/// time elapsed since the previous one. Stops when dropped.
pub struct Clock {
    cancel_handle: CancelHandle,
    join: Option<JoinHandle<()>>,
}

impl Clock {
    pub fn start(sequencer: Sequencer, tick_hz: f64) -> Clock {
        let cancel_handle = CancelHandle::new();
        let tick_hz = if tick_hz.is_finite() && tick_hz > 0.0 {
            tick_hz
        } else {
            DEFAULT_TICK_HZ
        };

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let tick_duration = Duration::from_secs(1).div_f64(tick_hz);
                let mut last_tick = Instant::now();
                let mut next_tick = last_tick + tick_duration;
                let mut skipped: u64 = 0;
                info!(tick_hz, "Clock started");

                loop {
                    spin_sleep::sleep(next_tick.saturating_duration_since(Instant::now()));
                    if cancel_handle.is_cancelled() {
                        break;
                    }

                    let now = Instant::now();
                    if !sequencer.tick(now - last_tick) {
                        skipped += 1;
                    }
                    last_tick = now;

                    next_tick += tick_duration;
                    // Fell too far behind; don't try to catch up with a burst of ticks.
                    if next_tick < now {
                        next_tick = now + tick_duration;
                    }
                }

                debug!(skipped, "Clock stopped");
            })
        };

        Clock {
            cancel_handle,
            join: Some(join),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Stop ticking and wait for the clock thread to exit.
    pub fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("Clock thread panicked");
            }
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}
