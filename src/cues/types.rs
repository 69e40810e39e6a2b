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

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::error::CueRegistryError;
use crate::lighting::inventory::LightInventory;
use crate::sequencer::LightingController;

/// A symbolic lighting event fired by the music or game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum CueType {
    Default,
    Chorus,
    Verse,
    Stomp,
    Dischord,
    Intro,
    Menu,
    Score,
    Sweep,
    Frenzy,
    Harmony,
    Searchlights,
    Silhouettes,
    SilhouettesSpotlight,
    CoolManual,
    CoolAutomatic,
    WarmManual,
    WarmAutomatic,
    FlareFast,
    FlareSlow,
    BlackoutFast,
    BlackoutSlow,
    BlackoutSpotlight,
    BigRockEnding,
    StrobeSlow,
    StrobeMedium,
    StrobeFast,
    StrobeFastest,
    StrobeOff,
}

impl CueType {
    pub const ALL: [CueType; 29] = [
        CueType::Default,
        CueType::Chorus,
        CueType::Verse,
        CueType::Stomp,
        CueType::Dischord,
        CueType::Intro,
        CueType::Menu,
        CueType::Score,
        CueType::Sweep,
        CueType::Frenzy,
        CueType::Harmony,
        CueType::Searchlights,
        CueType::Silhouettes,
        CueType::SilhouettesSpotlight,
        CueType::CoolManual,
        CueType::CoolAutomatic,
        CueType::WarmManual,
        CueType::WarmAutomatic,
        CueType::FlareFast,
        CueType::FlareSlow,
        CueType::BlackoutFast,
        CueType::BlackoutSlow,
        CueType::BlackoutSpotlight,
        CueType::BigRockEnding,
        CueType::StrobeSlow,
        CueType::StrobeMedium,
        CueType::StrobeFast,
        CueType::StrobeFastest,
        CueType::StrobeOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CueType::Default => "default",
            CueType::Chorus => "chorus",
            CueType::Verse => "verse",
            CueType::Stomp => "stomp",
            CueType::Dischord => "dischord",
            CueType::Intro => "intro",
            CueType::Menu => "menu",
            CueType::Score => "score",
            CueType::Sweep => "sweep",
            CueType::Frenzy => "frenzy",
            CueType::Harmony => "harmony",
            CueType::Searchlights => "searchlights",
            CueType::Silhouettes => "silhouettes",
            CueType::SilhouettesSpotlight => "silhouettes_spotlight",
            CueType::CoolManual => "cool_manual",
            CueType::CoolAutomatic => "cool_automatic",
            CueType::WarmManual => "warm_manual",
            CueType::WarmAutomatic => "warm_automatic",
            CueType::FlareFast => "flare_fast",
            CueType::FlareSlow => "flare_slow",
            CueType::BlackoutFast => "blackout_fast",
            CueType::BlackoutSlow => "blackout_slow",
            CueType::BlackoutSpotlight => "blackout_spotlight",
            CueType::BigRockEnding => "big_rock_ending",
            CueType::StrobeSlow => "strobe_slow",
            CueType::StrobeMedium => "strobe_medium",
            CueType::StrobeFast => "strobe_fast",
            CueType::StrobeFastest => "strobe_fastest",
            CueType::StrobeOff => "strobe_off",
        }
    }
}

impl fmt::Display for CueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CueType {
    type Err = CueRegistryError;

    /// Accepts snake, kebab and space separated names in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        CueType::ALL
            .iter()
            .find(|cue_type| cue_type.as_str() == normalized)
            .copied()
            .ok_or_else(|| CueRegistryError::UnknownCueType(s.to_string()))
    }
}

impl TryFrom<String> for CueType {
    type Error = CueRegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How prominent a cue is. Decides how long a random group pick stays pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueStyle {
    #[default]
    Primary,
    Secondary,
}

impl CueStyle {
    /// Calls to a pinned cue before the group is picked again.
    pub fn call_limit(&self) -> u32 {
        match self {
            CueStyle::Primary => 100,
            CueStyle::Secondary => 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueSize {
    #[default]
    NoVenue,
    Small,
    Large,
}

/// Tempo used when none is known or the given one is unusable.
pub const DEFAULT_BPM: f64 = 120.0;

/// Tempos are held to this range so beat lengths stay representable.
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 1000.0;

/// Clamp a tempo into `MIN_BPM..=MAX_BPM`. Anything that is not a positive number becomes
/// `DEFAULT_BPM`.
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() && bpm > 0.0 {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}

/// Context handed to a cue when it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CueData {
    pub bpm: f64,
    pub venue_size: VenueSize,
    pub song_section: Option<String>,
    pub previous_cue: Option<CueType>,
    /// How many times this cue has run in a row.
    pub execution_count: u32,
}

impl Default for CueData {
    fn default() -> Self {
        CueData {
            bpm: DEFAULT_BPM,
            venue_size: VenueSize::default(),
            song_section: None,
            previous_cue: None,
            execution_count: 0,
        }
    }
}

impl CueData {
    /// Length of one beat at the current tempo, clamped by `clamp_bpm`.
    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / clamp_bpm(self.bpm))
    }
}

/// A concrete lighting behaviour for one cue type.
pub trait Cue: fmt::Debug + Send + Sync {
    fn cue_type(&self) -> CueType;

    fn style(&self) -> CueStyle {
        CueStyle::Primary
    }

    fn description(&self) -> &str;

    /// Look up lights and drive the controller. Failures are visual only, so there is
    /// nothing to return.
    fn execute(&self, data: &CueData, controller: &dyn LightingController, lights: &dyn LightInventory);
}

/// A named, swappable bundle of cue implementations.
#[derive(Debug, Clone)]
pub struct CueGroup {
    pub name: String,
    pub description: Option<String>,
    cues: HashMap<CueType, Arc<dyn Cue>>,
}

impl CueGroup {
    pub fn new(name: impl Into<String>) -> CueGroup {
        CueGroup {
            name: name.into(),
            description: None,
            cues: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> CueGroup {
        self.description = Some(description.into());
        self
    }

    /// Add a cue, replacing any existing implementation of the same cue type.
    pub fn with_cue(mut self, cue: Arc<dyn Cue>) -> CueGroup {
        self.insert(cue);
        self
    }

    pub fn insert(&mut self, cue: Arc<dyn Cue>) {
        self.cues.insert(cue.cue_type(), cue);
    }

    pub fn get(&self, cue_type: CueType) -> Option<&Arc<dyn Cue>> {
        self.cues.get(&cue_type)
    }

    pub fn defines(&self, cue_type: CueType) -> bool {
        self.cues.contains_key(&cue_type)
    }

    /// The cue types this group implements, sorted.
    pub fn cue_types(&self) -> Vec<CueType> {
        let mut types: Vec<CueType> = self.cues.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_type_names_round_trip() {
        for cue_type in CueType::ALL {
            assert_eq!(cue_type.as_str().parse::<CueType>().unwrap(), cue_type);
        }
        assert_eq!("Big Rock Ending".parse::<CueType>().unwrap(), CueType::BigRockEnding);
        assert_eq!("strobe-off".parse::<CueType>().unwrap(), CueType::StrobeOff);
        assert!("nope".parse::<CueType>().is_err());
    }

    #[test]
    fn test_beat_duration() {
        let data = CueData {
            bpm: 60.0,
            ..Default::default()
        };
        assert_eq!(data.beat_duration(), Duration::from_secs(1));

        let broken = CueData {
            bpm: 0.0,
            ..Default::default()
        };
        assert_eq!(broken.beat_duration(), Duration::from_millis(500));

        let crawling = CueData {
            bpm: 1e-300,
            ..Default::default()
        };
        assert_eq!(crawling.beat_duration(), Duration::from_secs(60));

        let racing = CueData {
            bpm: 1e300,
            ..Default::default()
        };
        assert!((racing.beat_duration().as_secs_f64() - 0.06).abs() < 1e-6);

        for unusable in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -90.0] {
            let data = CueData {
                bpm: unusable,
                ..Default::default()
            };
            assert_eq!(data.beat_duration(), Duration::from_millis(500));
        }
        assert_eq!(CueStyle::Secondary.call_limit(), 50);
    }
}
