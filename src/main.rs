//! Command-line driver: load an array configuration, estimate bearings and
//! the source position, and print a report.
//!
//! ```text
//! tdoa-localize [config.json] [--json | --csv]
//! ```
//!
//! Without a configuration file a four-microphone demo array is used with
//! noiseless observations of a source at (2, -1).

use std::env;
use std::error::Error;

use tdoa_localization::algorithms::doa::compute_all_doa;
use tdoa_localization::algorithms::multilateration::synthesize_observation;
use tdoa_localization::api::{LocalizationReport, OutputFormat};
use tdoa_localization::utils::{LocalizationConfig, MicrophoneConfig, ObservationConfig};
use tdoa_localization::validation::{LocalizationResult, ObservationValidator, ValidationConfig};
use tdoa_localization::{MicrophoneArray, MicrophoneId, Position2};
use tracing::{info, warn};

const DEMO_SOURCE: Position2 = Position2 { x: 2.0, y: -1.0 };

fn demo_config() -> LocalizationResult<LocalizationConfig> {
    let mut config = LocalizationConfig::default();
    let placements = [("north", 0.0, 10.0), ("east", 10.0, 0.0), ("south", 0.0, -10.0), ("west", -10.0, 0.0)];
    config.microphones = placements
        .iter()
        .enumerate()
        .map(|(i, &(name, x, y))| MicrophoneConfig {
            id: MicrophoneId(i as u32),
            name: name.to_string(),
            position: Position2::new(x, y),
        })
        .collect();

    let array = MicrophoneArray::from_config(&config.microphones)?;
    for lead in 0..4u32 {
        let ids: [MicrophoneId; 4] = std::array::from_fn(|j| MicrophoneId((lead + j as u32) % 4));
        let quad = array.observation(ids, 0.0)?.microphones().clone();
        let observation = synthesize_observation(quad, DEMO_SOURCE, config.speed_of_sound_ms)?;
        config.observations.push(ObservationConfig {
            microphones: ids,
            tdoa_s: observation.tdoa(),
        });
    }
    Ok(config)
}

fn run(config: &LocalizationConfig) -> LocalizationResult<LocalizationReport> {
    let array = config.microphone_array()?;
    let observations = config.observations(&array)?;
    info!(microphones = array.len(), observations = observations.len(), "loaded observations");

    let validator = ObservationValidator::with_config(ValidationConfig {
        max_tau_s: config.max_tau_s,
        ..ValidationConfig::default()
    });
    for (index, issue) in &validator.validate(&observations).issues {
        warn!(index, %issue, "observation failed validation");
    }

    let mut report = LocalizationReport::new(config.speed_of_sound_ms, config.max_tau_s);

    if config.max_tau_s.is_some() {
        report = match compute_all_doa(&observations, config.max_tau_s, config.debug_logging) {
            Ok(bearings) => report.with_bearings(&observations, &bearings),
            Err(e) => {
                warn!(error = %e, "bearing estimation failed");
                report.with_bearing_error(e)
            }
        };
    }

    report = match config.multilaterator().solve(&observations) {
        Ok(source) => report.with_source(source),
        Err(e) => {
            warn!(error = %e, "multilateration failed");
            report.with_source_error(e)
        }
    };

    Ok(report)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let format = if args.iter().any(|a| a == "--json") {
        OutputFormat::Json
    } else if args.iter().any(|a| a == "--csv") {
        OutputFormat::Csv
    } else {
        OutputFormat::Text
    };

    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => LocalizationConfig::from_file(path)?,
        None => demo_config()?,
    };

    let level = if config.debug_logging {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let report = run(&config)?;
    println!("{}", report.render(format)?);
    Ok(())
}
