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

use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;
use super::parse_duration;
use crate::cues::types::DEFAULT_BPM;
use crate::cues::{clamp_bpm, CueType, VenueSize};

const DEFAULT_BEATS_PER_MEASURE: u32 = 4;

/// A YAML representation of a scripted show for the `run` command.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Show {
    bpm: Option<f64>,
    beats_per_measure: Option<u32>,
    venue_size: Option<VenueSize>,

    /// How long to run. Until interrupted when unset.
    duration: Option<String>,

    #[serde(default)]
    script: Vec<ScriptEntry>,
}

/// A cue fired at a point in the show.
#[derive(Deserialize, Clone, Debug)]
pub struct ScriptEntry {
    at: String,
    cue: CueType,
    section: Option<String>,
}

/// A script entry with its time resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptedCue {
    pub at: Duration,
    pub cue: CueType,
    pub section: Option<String>,
}

impl Show {
    /// The show tempo, clamped by `clamp_bpm`.
    pub fn bpm(&self) -> f64 {
        clamp_bpm(self.bpm.unwrap_or(DEFAULT_BPM))
    }

    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
            .unwrap_or(DEFAULT_BEATS_PER_MEASURE)
            .max(1)
    }

    pub fn venue_size(&self) -> VenueSize {
        self.venue_size.unwrap_or_default()
    }

    pub fn duration(&self) -> Result<Option<Duration>, ConfigError> {
        self.duration.as_deref().map(parse_duration).transpose()
    }

    /// The script in firing order.
    pub fn script(&self) -> Result<Vec<ScriptedCue>, ConfigError> {
        let mut script = self
            .script
            .iter()
            .map(|entry| {
                Ok(ScriptedCue {
                    at: parse_duration(&entry.at)?,
                    cue: entry.cue,
                    section: entry.section.clone(),
                })
            })
            .collect::<Result<Vec<ScriptedCue>, ConfigError>>()?;
        script.sort_by_key(|entry| entry.at);
        Ok(script)
    }
}
