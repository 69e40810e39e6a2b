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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lumacue::clock::Clock;
use lumacue::config::{parse_duration, Lumacue};
use lumacue::cues::{CueData, CueType};
use lumacue::output::{JsonLinesSink, LogSink, OutputSink};
use lumacue::sequencer::{LightingController, Sequencer};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A cue driven lighting compositor."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    /// One JSON object per frame on stdout.
    Json,
    /// Frames are traced at the trace level.
    Log,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the show scripted in the given config.
    Run {
        /// The path to the config.
        config_path: String,
        /// How long to run, overriding the show duration. For example, 30s.
        #[arg(short, long)]
        duration: Option<String>,
        /// Where frames go.
        #[arg(short, long, value_enum, default_value = "json")]
        output: Output,
    },
    /// Lists the cue groups and which of them implement each cue.
    Cues {
        /// The path to the config.
        config_path: String,
    },
    /// Verifies the given config.
    Check {
        /// The path to the config.
        config_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config_path,
            duration,
            output,
        } => run(&PathBuf::from(config_path), duration, output).await?,
        Commands::Cues { config_path } => {
            let config = Lumacue::deserialize(&PathBuf::from(config_path))?;
            let registry = config.cue_registry()?;

            println!("Cue groups (count: {}):", registry.groups().len());
            for group in registry.groups() {
                let mut flags = Vec::new();
                if registry.default_group() == Some(group.name.as_str()) {
                    flags.push("default");
                }
                if registry.is_active(&group.name) {
                    flags.push("active");
                } else if registry.is_enabled(&group.name) {
                    flags.push("enabled");
                }
                println!("- {} [{}]", group.name, flags.join(", "));
                if let Some(description) = &group.description {
                    println!("    {}", description);
                }
            }

            println!("Cues:");
            for cue_type in CueType::ALL {
                let availability = registry.get_cue_availability(cue_type);
                if availability.all.is_empty() {
                    println!("- {}: (none)", cue_type);
                } else {
                    println!(
                        "- {}: active: [{}], all: [{}]",
                        cue_type,
                        availability.active.join(", "),
                        availability.all.join(", ")
                    );
                }
            }
        }
        Commands::Check { config_path } => {
            let config = Lumacue::deserialize(&PathBuf::from(&config_path))?;
            config.validate()?;
            println!("{} is valid.", config_path);
        }
    };

    Ok(())
}

/// Drives the scripted show: a metronome from the show tempo feeds the beat events and
/// script entries fire their cues as they come due.
async fn run(
    config_path: &Path,
    duration: Option<String>,
    output: Output,
) -> Result<(), Box<dyn Error>> {
    let config = Lumacue::deserialize(config_path)?;
    config.validate()?;

    let inventory = config.inventory()?;
    let mut registry = config.cue_registry()?;
    let sink: Arc<dyn OutputSink> = match output {
        Output::Json => Arc::new(JsonLinesSink::new(std::io::stdout())),
        Output::Log => Arc::new(LogSink),
    };
    let sequencer = Sequencer::new(config.effect_manager()?, sink);
    let mut clock = Clock::start(sequencer.clone(), config.tick_rate());

    let show = config.show();
    let duration = match duration {
        Some(duration) => Some(parse_duration(&duration)?),
        None => show.duration()?,
    };
    let beats_per_measure = u64::from(show.beats_per_measure());
    let mut script = show.script()?.into_iter().peekable();
    if duration.is_none() && script.peek().is_none() {
        warn!("Show has no script and no duration, running until interrupted");
    }
    info!(
        bpm = show.bpm(),
        duration = duration.map(|d| d.as_secs_f64()),
        "Starting show"
    );

    // Ctrl-C cancels the clock, and the show ends once the clock is cancelled.
    let cancel_handle = clock.cancel_handle();
    let mut stopped = {
        let cancel_handle = cancel_handle.clone();
        tokio::task::spawn_blocking(move || cancel_handle.wait())
    };
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_handle.cancel(),
            Err(e) => error!(err = e.to_string(), "Error listening for ctrl-c"),
        }
    });

    let mut metronome = tokio::time::interval(Duration::from_secs_f64(30.0 / show.bpm()));
    let start = tokio::time::Instant::now();
    let mut half_beats: u64 = 0;
    let mut previous_cue: Option<CueType> = None;
    let mut execution_count: u32 = 0;

    loop {
        tokio::select! {
            _ = metronome.tick() => {}
            _ = &mut stopped => {
                info!("Show interrupted");
                break;
            }
        }
        let elapsed = start.elapsed();
        if duration.is_some_and(|duration| elapsed >= duration) {
            break;
        }

        while let Some(entry) = script.next_if(|entry| entry.at <= elapsed) {
            execution_count = match previous_cue {
                Some(previous) if previous == entry.cue => execution_count + 1,
                _ => 0,
            };
            let data = CueData {
                bpm: show.bpm(),
                venue_size: show.venue_size(),
                song_section: entry.section.clone(),
                previous_cue,
                execution_count,
            };

            match registry.get_cue_implementation(entry.cue)? {
                Some(cue) => {
                    info!(cue = %entry.cue, implementation = cue.description(), "Firing cue");
                    cue.execute(&data, &sequencer, &inventory);
                }
                None => warn!(cue = %entry.cue, "Nothing implements cue"),
            }
            previous_cue = Some(entry.cue);
        }

        if half_beats % 2 == 0 {
            let beat = half_beats / 2;
            sequencer.on_beat();
            if beat % beats_per_measure == 0 {
                sequencer.on_measure();
            }
        }
        sequencer.on_half_beat();
        half_beats += 1;
    }

    clock.stop();
    sequencer.reset();
    info!("Show finished");
    Ok(())
}
