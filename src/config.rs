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

use std::path::Path;
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::info;

use crate::cues::CueRegistry;
use crate::lighting::inventory::StaticLightInventory;
use crate::lighting::layers::{LayerManager, DEFAULT_FLASH_IDLE_GRACE, DEFAULT_IDLE_GRACE};
use crate::lighting::manager::{EffectKeying, EffectManager};

pub use self::error::ConfigError;

pub mod cues;
pub mod error;
pub mod lights;
pub mod show;

const DEFAULT_TICK_HZ: f64 = crate::clock::DEFAULT_TICK_HZ;

/// Parses a human duration such as `250ms` or `2s`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    Ok(DurationString::from_string(value.to_string())
        .map_err(|e| ConfigError::Duration {
            value: value.to_string(),
            reason: e.to_string(),
        })?
        .into())
}

/// A YAML representation of the whole lumacue configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Lumacue {
    /// Engine ticks per second.
    tick_rate: Option<f64>,

    /// How effect slots are keyed.
    keying: Option<EffectKeying>,

    /// How long a vacated layer keeps its colour.
    idle_grace: Option<String>,

    /// How long a vacated flash layer keeps its colour.
    flash_idle_grace: Option<String>,

    /// Seeds random light and cue group selection.
    seed: Option<u64>,

    lights: Vec<lights::Light>,

    #[serde(default)]
    cues: cues::Cues,

    #[serde(default)]
    show: show::Show,
}

impl Lumacue {
    /// Deserializes a file from the path into a configuration struct.
    pub fn deserialize(path: &Path) -> Result<Lumacue, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Lumacue>()?)
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .unwrap_or(DEFAULT_TICK_HZ)
    }

    pub fn keying(&self) -> EffectKeying {
        self.keying.unwrap_or_default()
    }

    pub fn idle_grace(&self) -> Result<Duration, ConfigError> {
        self.idle_grace
            .as_deref()
            .map_or(Ok(DEFAULT_IDLE_GRACE), parse_duration)
    }

    pub fn flash_idle_grace(&self) -> Result<Duration, ConfigError> {
        self.flash_idle_grace
            .as_deref()
            .map_or(Ok(DEFAULT_FLASH_IDLE_GRACE), parse_duration)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn lights(&self) -> &[lights::Light] {
        &self.lights
    }

    pub fn cues(&self) -> &cues::Cues {
        &self.cues
    }

    pub fn show(&self) -> &show::Show {
        &self.show
    }

    pub fn inventory(&self) -> Result<StaticLightInventory, ConfigError> {
        lights::inventory(&self.lights, self.seed)
    }

    /// Builds an effect manager with every configured light registered.
    pub fn effect_manager(&self) -> Result<EffectManager, ConfigError> {
        let mut manager = EffectManager::new(
            self.keying(),
            LayerManager::new(self.idle_grace()?, self.flash_idle_grace()?),
        );
        for light in &self.lights {
            manager.register_light(light.id());
        }
        Ok(manager)
    }

    pub fn cue_registry(&self) -> Result<CueRegistry, ConfigError> {
        self.cues.registry(self.seed)
    }

    /// Builds everything once so mistakes surface before a show starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let inventory = self.inventory()?;
        if inventory.is_empty() {
            return Err(ConfigError::Invalid("no lights configured".to_string()));
        }
        self.effect_manager()?;
        let registry = self.cue_registry()?;
        self.show.duration()?;
        self.show.script()?;

        info!(
            lights = inventory.len(),
            groups = registry.groups().len(),
            "Configuration is valid"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use config::{Config, File, FileFormat};

    use super::*;
    use crate::cues::{BuiltinCue, CueType};
    use crate::lighting::inventory::{LightInventory, LightTarget, LocationGroup};

    const FULL: &str = r##"
tick_rate: 60
keying: per_layer
idle_grace: 3s
flash_idle_grace: 500ms
seed: 9
lights:
  - id: front-1
    group: front
  - id: front-2
    group: front
  - id: strobe-1
    group: strobe
cues:
  default_group: stock
  active_groups: [club]
  randomize: true
  consistency_window: 5m
  groups:
    - name: club
      description: Club night
      cues:
        - cue: chorus
          description: Red pulse
          effect:
            kind: pulse
            color: red
            groups: [front]
            target: odd
        - cue: big rock ending
          style: secondary
          effect:
            kind: strobe
            divisions: 8
        - cue: verse
          effect:
            kind: cycle
            colors: [blue, "#00ffff"]
            on:
              color: blue
            count: 2
show:
  bpm: 140
  duration: 30s
  script:
    - at: 8s
      cue: chorus
    - at: 0s
      cue: verse
      section: verse 1
"##;

    fn parse(yaml: &str) -> Lumacue {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<Lumacue>()
            .unwrap()
    }

    #[test]
    fn test_full_config() {
        let config = parse(FULL);
        assert_eq!(config.tick_rate(), 60.0);
        assert_eq!(config.keying(), EffectKeying::PerLayer);
        assert_eq!(config.idle_grace().unwrap(), Duration::from_secs(3));
        assert_eq!(config.flash_idle_grace().unwrap(), Duration::from_millis(500));
        assert!(config.validate().is_ok());

        let inventory = config.inventory().unwrap();
        let front = inventory.get_lights(&[LocationGroup::Front], LightTarget::All);
        assert_eq!(front.len(), 2);
        assert_eq!(front[1].position, 1);

        let cues = config.cues();
        assert!(cues.randomize());
        assert_eq!(
            cues.consistency_window().unwrap(),
            Some(Duration::from_secs(300))
        );

        let registry = config.cue_registry().unwrap();
        assert_eq!(registry.default_group(), Some("stock"));
        assert!(registry.is_active("club"));
        assert!(registry.is_active("stock"));

        let club = registry.group("club").unwrap();
        let strobe = club.get(CueType::BigRockEnding).unwrap();
        assert_eq!(strobe.style(), crate::cues::CueStyle::Secondary);

        let show = config.show();
        assert_eq!(show.bpm(), 140.0);
        assert_eq!(show.beats_per_measure(), 4);
        assert_eq!(show.duration().unwrap(), Some(Duration::from_secs(30)));
        let script = show.script().unwrap();
        assert_eq!(script[0].cue, CueType::Verse);
        assert_eq!(script[0].section.as_deref(), Some("verse 1"));
        assert_eq!(script[1].at, Duration::from_secs(8));
    }

    #[test]
    fn test_defaults() {
        let config = parse(
            r#"
lights:
  - id: front-1
    group: front
"#,
        );
        assert_eq!(config.tick_rate(), 44.0);
        assert_eq!(config.keying(), EffectKeying::PerLight);
        assert_eq!(config.idle_grace().unwrap(), DEFAULT_IDLE_GRACE);
        assert_eq!(config.show().duration().unwrap(), None);

        let registry = config.cue_registry().unwrap();
        assert_eq!(registry.default_group(), Some("stock"));
        assert_eq!(registry.groups().len(), 1);
    }

    #[test]
    fn test_invalid_values() {
        let duplicate = parse(
            r#"
lights:
  - id: front-1
    group: front
  - id: front-1
    group: back
"#,
        );
        assert!(matches!(
            duplicate.validate(),
            Err(ConfigError::Invalid(_))
        ));

        let bad_duration = parse(
            r#"
idle_grace: soon
lights:
  - id: front-1
    group: front
"#,
        );
        assert!(matches!(
            bad_duration.idle_grace(),
            Err(ConfigError::Duration { .. })
        ));

        let bad_color = parse(
            r#"
lights:
  - id: front-1
    group: front
cues:
  groups:
    - name: broken
      cues:
        - cue: verse
          effect:
            kind: wash
            color: plaid
"#,
        );
        assert!(matches!(bad_color.validate(), Err(ConfigError::Color(_))));

        let unknown_default = parse(
            r#"
lights:
  - id: front-1
    group: front
cues:
  default_group: missing
"#,
        );
        assert!(matches!(
            unknown_default.validate(),
            Err(ConfigError::Registry(_))
        ));
    }

    #[test]
    fn test_show_tempo_is_clamped() {
        let show = |bpm: &str| {
            let yaml = format!(
                "lights:\n  - id: front-1\n    group: front\nshow:\n  bpm: {}\n",
                bpm
            );
            parse(&yaml).show().bpm()
        };
        assert_eq!(show("140"), 140.0);
        assert_eq!(show("100000"), crate::cues::types::MAX_BPM);
        assert_eq!(show("0.000001"), crate::cues::types::MIN_BPM);
        assert_eq!(show("-3"), 120.0);
    }

    #[test]
    fn test_wash_defaults() {
        let config = parse(
            r#"
lights:
  - id: front-1
    group: front
cues:
  groups:
    - name: washes
      cues:
        - cue: intro
          effect:
            kind: wash
            color: teal
            layer: 5
            fade: 2s
"#,
        );
        let registry = config.cue_registry().unwrap();
        let cue = registry.group("washes").unwrap().get(CueType::Intro).unwrap();
        assert_eq!(cue.description(), "intro wash");

        let definition = &config.cues().groups()[0].cues()[0];
        match definition.effect().to_builtin().unwrap() {
            BuiltinCue::Wash(wash) => {
                assert_eq!(wash.layer, 5);
                assert!(!wash.replace_all);
                assert_eq!(wash.fade, Duration::from_secs(2));
                assert_eq!(wash.selection.groups.len(), 2);
            }
            other => panic!("expected a wash, got {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = Lumacue::deserialize(file.path()).unwrap();
        assert_eq!(config.lights().len(), 3);
        assert_eq!(config.seed(), Some(9));
        assert!(matches!(
            Lumacue::deserialize(Path::new("/nonexistent/lumacue.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_effect_definition_conversion() {
        let config = parse(FULL);
        let club = &config.cues().groups()[0];
        assert_eq!(club.name(), "club");

        let group = club.to_cue_group().unwrap();
        assert_eq!(
            group.cue_types(),
            vec![CueType::Chorus, CueType::Verse, CueType::BigRockEnding]
        );

        match club.cues()[2].effect().to_builtin().unwrap() {
            BuiltinCue::Cycle(cycle) => {
                assert_eq!(
                    cycle.colors,
                    vec![
                        crate::lighting::types::Rgbio::new(0, 0, 255),
                        crate::lighting::types::Rgbio::new(0, 255, 255)
                    ]
                );
                assert_eq!(cycle.count, 2);
                assert_eq!(
                    cycle.on,
                    crate::lighting::effect::WaitCondition::Color(
                        crate::lighting::effect::TriggerColor::Blue
                    )
                );
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_demo_config() {
        let config = Lumacue::deserialize(Path::new("demos/club.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.lights().len(), 7);

        let mut registry = config.cue_registry().unwrap();
        let chorus = registry
            .get_cue_implementation(CueType::Chorus)
            .unwrap()
            .unwrap();
        assert_eq!(chorus.description(), "Magenta and teal on the measure");
        assert!(registry
            .get_cue_implementation(CueType::BlackoutSlow)
            .unwrap()
            .is_some());
    }
}
