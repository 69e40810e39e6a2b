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

pub mod blend;
pub mod easing;
pub mod effect;
pub mod inventory;
pub mod layers;
pub mod manager;
pub mod transition;
pub mod types;

pub use effect::{Effect, EffectTransition, TriggerColor, WaitCondition};
pub use inventory::{LightInventory, LightTarget, LocationGroup, StaticLightInventory};
pub use manager::{EffectKeying, EffectManager};
pub use transition::{LightTransitionController, Transition};
pub use types::{BlendMode, Layer, LightFrame, Rgbio, TrackedLight};
