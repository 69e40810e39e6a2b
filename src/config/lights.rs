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

use serde::Deserialize;

use super::error::ConfigError;
use crate::lighting::inventory::{LocationGroup, StaticLightInventory};

/// A YAML representation of one light in the rig.
#[derive(Deserialize, Clone, Debug)]
pub struct Light {
    /// The light's ID, used everywhere the engine refers to it.
    id: String,

    /// Where the light hangs.
    group: LocationGroup,
}

impl Light {
    pub fn new(id: &str, group: LocationGroup) -> Light {
        Light {
            id: id.to_string(),
            group,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> LocationGroup {
        self.group
    }
}

/// Builds the inventory for the given lights. Listing order is position order.
pub(super) fn inventory(lights: &[Light], seed: Option<u64>) -> Result<StaticLightInventory, ConfigError> {
    let mut seen = HashSet::new();
    for light in lights {
        if !seen.insert(light.id.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate light ID {}", light.id)));
        }
    }

    Ok(StaticLightInventory::new(
        lights.iter().map(|light| (light.id.clone(), light.group)),
        seed,
    ))
}
