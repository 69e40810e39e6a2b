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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::error::CueRegistryError;
use super::types::{Cue, CueGroup, CueType};

/// Which groups implement a cue type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CueAvailability {
    /// Active groups, in registration order. The default group is included when it
    /// implements the cue.
    pub active: Vec<String>,
    /// Every registered group, in registration order.
    pub all: Vec<String>,
}

/// A random pick that stays in place until it decays.
#[derive(Debug, Clone)]
struct Pin {
    cue_type: CueType,
    group: String,
    calls: u32,
    pinned_at: Instant,
}

/// Resolves cue types to implementations through named groups, with enable/active state
/// and a default group as the fallback of last resort.
pub struct CueRegistry {
    /// Registration order is resolution priority.
    groups: Vec<CueGroup>,
    enabled: HashSet<String>,
    active: HashSet<String>,
    default_group: Option<String>,
    randomize: bool,
    consistency_window: Option<Duration>,
    pin: Option<Pin>,
    rng: StdRng,
}

impl Default for CueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CueRegistry {
    pub fn new() -> CueRegistry {
        CueRegistry {
            groups: Vec::new(),
            enabled: HashSet::new(),
            active: HashSet::new(),
            default_group: None,
            randomize: false,
            consistency_window: None,
            pin: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeds the random group selection so picks are reproducible.
    pub fn with_seed(mut self, seed: u64) -> CueRegistry {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Turns sticky random selection on or off. Any current pick is dropped.
    pub fn set_randomize(&mut self, randomize: bool) {
        self.randomize = randomize;
        self.pin = None;
    }

    /// Random picks also expire once they are older than this.
    pub fn set_consistency_window(&mut self, window: Option<Duration>) {
        self.consistency_window = window;
    }

    /// Adds a group, enabled and active.
    pub fn register_group(&mut self, group: CueGroup) -> Result<(), CueRegistryError> {
        if self.group(&group.name).is_some() {
            return Err(CueRegistryError::DuplicateGroup(group.name));
        }

        info!(
            group = group.name,
            cues = group.cue_types().len(),
            "Registered cue group"
        );
        self.enabled.insert(group.name.clone());
        self.active.insert(group.name.clone());
        self.groups.push(group);
        Ok(())
    }

    pub fn set_default_group(&mut self, name: &str) -> Result<(), CueRegistryError> {
        self.check_known(name)?;
        self.enabled.insert(name.to_string());
        self.active.insert(name.to_string());
        self.default_group = Some(name.to_string());
        self.pin = None;
        debug!(group = name, "Default cue group set");
        Ok(())
    }

    pub fn default_group(&self) -> Option<&str> {
        self.default_group.as_deref()
    }

    pub fn group(&self, name: &str) -> Option<&CueGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// Every registered group, in registration order.
    pub fn groups(&self) -> &[CueGroup] {
        &self.groups
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    fn is_default(&self, name: &str) -> bool {
        self.default_group.as_deref() == Some(name)
    }

    fn check_known(&self, name: &str) -> Result<(), CueRegistryError> {
        match self.group(name) {
            Some(_) => Ok(()),
            None => Err(CueRegistryError::UnknownGroup(name.to_string())),
        }
    }

    // ===== Group state =====

    /// Returns whether the group's state changed.
    pub fn enable_group(&mut self, name: &str) -> Result<bool, CueRegistryError> {
        self.check_known(name)?;
        Ok(self.enabled.insert(name.to_string()))
    }

    /// Disabling also deactivates. The default group can't be disabled.
    pub fn disable_group(&mut self, name: &str) -> Result<bool, CueRegistryError> {
        self.check_known(name)?;
        if self.is_default(name) {
            warn!(group = name, "The default cue group can't be disabled");
            return Ok(false);
        }

        self.active.remove(name);
        self.drop_pin_for(name);
        Ok(self.enabled.remove(name))
    }

    /// Activating a disabled group enables it as well.
    pub fn activate_group(&mut self, name: &str) -> Result<bool, CueRegistryError> {
        self.check_known(name)?;
        self.enabled.insert(name.to_string());
        Ok(self.active.insert(name.to_string()))
    }

    /// The default group can't be deactivated.
    pub fn deactivate_group(&mut self, name: &str) -> Result<bool, CueRegistryError> {
        self.check_known(name)?;
        if self.is_default(name) {
            warn!(group = name, "The default cue group can't be deactivated");
            return Ok(false);
        }

        self.drop_pin_for(name);
        Ok(self.active.remove(name))
    }

    /// Replaces the enabled set. Groups that are no longer enabled are deactivated too.
    pub fn set_enabled_groups<S: AsRef<str>>(
        &mut self,
        names: &[S],
    ) -> Result<(), CueRegistryError> {
        for name in names {
            self.check_known(name.as_ref())?;
        }

        self.enabled = names.iter().map(|name| name.as_ref().to_string()).collect();
        self.enabled.extend(self.default_group.clone());
        let enabled = &self.enabled;
        self.active.retain(|name| enabled.contains(name));
        self.pin = None;
        Ok(())
    }

    /// Replaces the active set, enabling every named group.
    pub fn set_active_groups<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), CueRegistryError> {
        for name in names {
            self.check_known(name.as_ref())?;
        }

        self.active = names.iter().map(|name| name.as_ref().to_string()).collect();
        self.active.extend(self.default_group.clone());
        self.enabled.extend(self.active.iter().cloned());
        self.pin = None;
        Ok(())
    }

    fn drop_pin_for(&mut self, name: &str) {
        if self.pin.as_ref().is_some_and(|pin| pin.group == name) {
            self.pin = None;
        }
    }

    // ===== Resolution =====

    /// Active groups other than the default that implement `cue_type`, in registration
    /// order.
    fn candidates(&self, cue_type: CueType) -> Vec<&CueGroup> {
        self.groups
            .iter()
            .filter(|group| {
                !self.is_default(&group.name)
                    && self.active.contains(&group.name)
                    && group.defines(cue_type)
            })
            .collect()
    }

    /// Finds the implementation to run for `cue_type`. Active groups win over the default
    /// group. A cue nobody implements resolves to `None`.
    pub fn get_cue_implementation(
        &mut self,
        cue_type: CueType,
    ) -> Result<Option<Arc<dyn Cue>>, CueRegistryError> {
        self.get_cue_implementation_at(cue_type, Instant::now())
    }

    pub(crate) fn get_cue_implementation_at(
        &mut self,
        cue_type: CueType,
        now: Instant,
    ) -> Result<Option<Arc<dyn Cue>>, CueRegistryError> {
        let found = if self.randomize {
            self.pick_sticky(cue_type, now)
        } else {
            self.candidates(cue_type)
                .first()
                .and_then(|group| group.get(cue_type).cloned())
        };
        if let Some(cue) = found {
            return Ok(Some(cue));
        }

        let default_name = self
            .default_group
            .as_deref()
            .ok_or(CueRegistryError::NoDefaultGroup)?;
        let cue = self
            .group(default_name)
            .and_then(|group| group.get(cue_type).cloned());
        if cue.is_none() {
            info!(cue = %cue_type, "No implementation for cue");
        }
        Ok(cue)
    }

    /// Groups a randomised pick draws from: every active group implementing `cue_type`,
    /// the default included.
    fn random_pool(&self, cue_type: CueType) -> Vec<&CueGroup> {
        self.groups
            .iter()
            .filter(|group| {
                (self.is_default(&group.name) || self.active.contains(&group.name))
                    && group.defines(cue_type)
            })
            .collect()
    }

    fn pin_is_live(&self, pin: &Pin, cue_type: CueType, now: Instant) -> bool {
        if pin.cue_type != cue_type {
            return false;
        }
        let Some(group) = self.group(&pin.group) else {
            return false;
        };
        if !self.is_default(&pin.group) && !self.active.contains(&pin.group) {
            return false;
        }
        let Some(cue) = group.get(cue_type) else {
            return false;
        };
        if pin.calls >= cue.style().call_limit() {
            return false;
        }
        self.consistency_window
            .is_none_or(|window| now.saturating_duration_since(pin.pinned_at) < window)
    }

    fn pick_sticky(&mut self, cue_type: CueType, now: Instant) -> Option<Arc<dyn Cue>> {
        if let Some(pin) = self.pin.take() {
            if self.pin_is_live(&pin, cue_type, now) {
                let cue = self
                    .group(&pin.group)
                    .and_then(|group| group.get(cue_type).cloned());
                self.pin = Some(Pin {
                    calls: pin.calls + 1,
                    ..pin
                });
                return cue;
            }
        }

        let names: Vec<String> = self
            .random_pool(cue_type)
            .iter()
            .map(|group| group.name.clone())
            .collect();
        let picked = names.choose(&mut self.rng)?.clone();
        debug!(cue = %cue_type, group = picked, "Picked cue group");

        let cue = self
            .group(&picked)
            .and_then(|group| group.get(cue_type).cloned());
        self.pin = Some(Pin {
            cue_type,
            group: picked,
            calls: 1,
            pinned_at: now,
        });
        cue
    }

    /// Which groups implement `cue_type`. Diagnostic only.
    pub fn get_cue_availability(&self, cue_type: CueType) -> CueAvailability {
        let defining = self.groups.iter().filter(|group| group.defines(cue_type));
        CueAvailability {
            active: defining
                .clone()
                .filter(|group| self.active.contains(&group.name))
                .map(|group| group.name.clone())
                .collect(),
            all: defining.map(|group| group.name.clone()).collect(),
        }
    }
}
