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
//! Symbolic cues and the registry that resolves them to lighting behaviour.

pub mod builtin;
pub mod error;
pub mod registry;
pub mod types;

pub use builtin::{stock_group, BuiltinCue, BuiltinCueImpl};
pub use error::CueRegistryError;
pub use registry::{CueAvailability, CueRegistry};
pub use types::{clamp_bpm, Cue, CueData, CueGroup, CueStyle, CueType, VenueSize};
