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

use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;

use super::types::TrackedLight;

/// Where a light hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationGroup {
    Front,
    Back,
    Strobe,
}

impl fmt::Display for LocationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationGroup::Front => write!(f, "front"),
            LocationGroup::Back => write!(f, "back"),
            LocationGroup::Strobe => write!(f, "strobe"),
        }
    }
}

/// Which of the selected lights to use, relative to their position order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightTarget {
    #[default]
    All,
    Even,
    Odd,
    HalfOne,
    HalfTwo,
    ThirdOne,
    ThirdTwo,
    ThirdThree,
    QuarterOne,
    QuarterTwo,
    QuarterThree,
    QuarterFour,
    /// Every light, in position order.
    Linear,
    /// Every light, in reverse position order.
    InverseLinear,
    /// This many distinct lights, picked at random.
    Random(usize),
}

impl LightTarget {
    /// Apply the selector to lights already sorted by position.
    pub fn select(&self, lights: &[TrackedLight], rng: &mut StdRng) -> Vec<TrackedLight> {
        match self {
            LightTarget::All | LightTarget::Linear => lights.to_vec(),
            LightTarget::InverseLinear => lights.iter().rev().cloned().collect(),
            LightTarget::Even => lights.iter().step_by(2).cloned().collect(),
            LightTarget::Odd => lights.iter().skip(1).step_by(2).cloned().collect(),
            LightTarget::HalfOne => chunk(lights, 2, 0),
            LightTarget::HalfTwo => chunk(lights, 2, 1),
            LightTarget::ThirdOne => chunk(lights, 3, 0),
            LightTarget::ThirdTwo => chunk(lights, 3, 1),
            LightTarget::ThirdThree => chunk(lights, 3, 2),
            LightTarget::QuarterOne => chunk(lights, 4, 0),
            LightTarget::QuarterTwo => chunk(lights, 4, 1),
            LightTarget::QuarterThree => chunk(lights, 4, 2),
            LightTarget::QuarterFour => chunk(lights, 4, 3),
            LightTarget::Random(count) => lights
                .choose_multiple(rng, (*count).min(lights.len()))
                .cloned()
                .collect(),
        }
    }
}

/// The `index`th of `parts` contiguous slices. Earlier slices take the remainder.
fn chunk(lights: &[TrackedLight], parts: usize, index: usize) -> Vec<TrackedLight> {
    let size = lights.len().div_ceil(parts);
    let start = (index * size).min(lights.len());
    let end = ((index + 1) * size).min(lights.len());
    lights[start..end].to_vec()
}

/// Resolves location groups and selectors into concrete lights.
pub trait LightInventory: Send + Sync {
    /// The lights in any of `groups` that `target` selects. Empty when nothing matches.
    fn get_lights(&self, groups: &[LocationGroup], target: LightTarget) -> Vec<TrackedLight>;

    /// Every known light.
    fn all_lights(&self) -> Vec<TrackedLight>;
}

/// An inventory with a fixed set of lights.
pub struct StaticLightInventory {
    lights: Vec<(LocationGroup, TrackedLight)>,
    rng: Mutex<StdRng>,
}

impl StaticLightInventory {
    /// Creates an inventory from (id, group) pairs. Positions follow the listing order.
    pub fn new<I, S>(lights: I, seed: Option<u64>) -> StaticLightInventory
    where
        I: IntoIterator<Item = (S, LocationGroup)>,
        S: Into<String>,
    {
        let lights = lights
            .into_iter()
            .enumerate()
            .map(|(position, (id, group))| (group, TrackedLight::new(id, position)))
            .collect();
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        StaticLightInventory {
            lights,
            rng: Mutex::new(rng),
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

impl LightInventory for StaticLightInventory {
    fn get_lights(&self, groups: &[LocationGroup], target: LightTarget) -> Vec<TrackedLight> {
        let mut selected: Vec<TrackedLight> = self
            .lights
            .iter()
            .filter(|(group, _)| groups.contains(group))
            .map(|(_, light)| light.clone())
            .collect();
        selected.sort_by_key(|light| light.position);

        target.select(&selected, &mut self.rng.lock())
    }

    fn all_lights(&self) -> Vec<TrackedLight> {
        self.lights.iter().map(|(_, light)| light.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> StaticLightInventory {
        StaticLightInventory::new(
            [
                ("f0", LocationGroup::Front),
                ("f1", LocationGroup::Front),
                ("b0", LocationGroup::Back),
                ("f2", LocationGroup::Front),
                ("s0", LocationGroup::Strobe),
                ("f3", LocationGroup::Front),
                ("f4", LocationGroup::Front),
            ],
            Some(7),
        )
    }

    fn ids(lights: &[TrackedLight]) -> Vec<&str> {
        lights.iter().map(|light| light.id.as_str()).collect()
    }

    #[test]
    fn test_groups_filter_and_order() {
        let inventory = inventory();
        let front = inventory.get_lights(&[LocationGroup::Front], LightTarget::All);
        assert_eq!(ids(&front), vec!["f0", "f1", "f2", "f3", "f4"]);

        let both = inventory.get_lights(
            &[LocationGroup::Back, LocationGroup::Strobe],
            LightTarget::Linear,
        );
        assert_eq!(ids(&both), vec!["b0", "s0"]);
        assert!(inventory.get_lights(&[], LightTarget::All).is_empty());
    }

    #[test]
    fn test_selectors() {
        let inventory = inventory();
        let front = |target| inventory.get_lights(&[LocationGroup::Front], target);

        assert_eq!(ids(&front(LightTarget::Even)), vec!["f0", "f2", "f4"]);
        assert_eq!(ids(&front(LightTarget::Odd)), vec!["f1", "f3"]);
        assert_eq!(ids(&front(LightTarget::HalfOne)), vec!["f0", "f1", "f2"]);
        assert_eq!(ids(&front(LightTarget::HalfTwo)), vec!["f3", "f4"]);
        assert_eq!(ids(&front(LightTarget::ThirdOne)), vec!["f0", "f1"]);
        assert_eq!(ids(&front(LightTarget::ThirdThree)), vec!["f4"]);
        assert_eq!(ids(&front(LightTarget::QuarterFour)), Vec::<&str>::new());
        assert_eq!(
            ids(&front(LightTarget::InverseLinear)),
            vec!["f4", "f3", "f2", "f1", "f0"]
        );
    }

    #[test]
    fn test_random_is_distinct_and_bounded() {
        let inventory = inventory();
        let picked = inventory.get_lights(&[LocationGroup::Front], LightTarget::Random(3));
        assert_eq!(picked.len(), 3);
        let mut unique = ids(&picked);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        let all = inventory.get_lights(&[LocationGroup::Front], LightTarget::Random(10));
        assert_eq!(all.len(), 5);
    }
}
