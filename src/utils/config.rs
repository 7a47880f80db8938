use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::algorithms::multilateration::{Multilaterator, SolverSettings};
use crate::core::array::MicrophoneArray;
use crate::core::constants::{DEFAULT_SPEED_OF_SOUND, QUAD_SIZE};
use crate::core::types::{MicrophoneId, Position2, Tdoa4};
use crate::validation::error::LocalizationResult;

/// Localization run configuration, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Speed of sound (m/s)
    pub speed_of_sound_ms: f64,
    /// Maximum feasible TDOA for the DOA stage (seconds); DOA is skipped when unset
    pub max_tau_s: Option<f64>,
    /// Emit every DOA record and solver iteration as debug events
    pub debug_logging: bool,
    /// Solver limits and tolerances
    pub solver: SolverSettings,
    /// Microphone registry
    pub microphones: Vec<MicrophoneConfig>,
    /// Recorded TDOA observations
    pub observations: Vec<ObservationConfig>,
}

/// Individual microphone configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrophoneConfig {
    pub id: MicrophoneId,
    pub name: String,
    /// Position in the array frame (meters)
    pub position: Position2,
}

/// One TDOA observation over four registered microphones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationConfig {
    pub microphones: [MicrophoneId; QUAD_SIZE],
    pub tdoa_s: f64,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("I/O error: {message}")]
    Io { message: String },
    #[error("serialization error: {message}")]
    Serialization { message: String },
    #[error("invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
    #[error("microphone {id} is configured more than once")]
    DuplicateMicrophone { id: MicrophoneId },
    #[error("observation {index} references unknown microphone {id}")]
    UnknownMicrophone { index: usize, id: MicrophoneId },
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            speed_of_sound_ms: DEFAULT_SPEED_OF_SOUND,
            max_tau_s: None,
            debug_logging: false,
            solver: SolverSettings::default(),
            microphones: Vec::new(),
            observations: Vec::new(),
        }
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl LocalizationConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to serialize config: {}", e),
        })
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = self.to_json_string()?;
        fs::write(&path, content).map_err(|e| ConfigError::Io {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Update the speed of sound, returning the previous value
    pub fn set_speed_of_sound(&mut self, speed_of_sound_ms: f64) -> Result<f64, ConfigError> {
        if !speed_of_sound_ms.is_finite() || speed_of_sound_ms <= 0.0 {
            return Err(invalid("speed_of_sound_ms", speed_of_sound_ms, "must be positive and finite"));
        }
        Ok(std::mem::replace(&mut self.speed_of_sound_ms, speed_of_sound_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.speed_of_sound_ms.is_finite() || self.speed_of_sound_ms <= 0.0 {
            return Err(invalid("speed_of_sound_ms", self.speed_of_sound_ms, "must be positive and finite"));
        }
        if let Some(max_tau) = self.max_tau_s {
            if !max_tau.is_finite() || max_tau <= 0.0 {
                return Err(invalid("max_tau_s", max_tau, "must be positive and finite"));
            }
        }
        self.validate_solver()?;

        let mut ids = HashSet::new();
        for mic in &self.microphones {
            if !ids.insert(mic.id) {
                return Err(ConfigError::DuplicateMicrophone { id: mic.id });
            }
            if !mic.position.is_finite() {
                return Err(invalid(
                    "microphones.position",
                    format!("{} ({}, {})", mic.id, mic.position.x, mic.position.y),
                    "coordinates must be finite",
                ));
            }
        }

        for (index, observation) in self.observations.iter().enumerate() {
            if let Some(&id) = observation.microphones.iter().find(|id| !ids.contains(*id)) {
                return Err(ConfigError::UnknownMicrophone { index, id });
            }
            if !observation.tdoa_s.is_finite() {
                return Err(invalid("observations.tdoa_s", observation.tdoa_s, "must be finite"));
            }
        }

        Ok(())
    }

    fn validate_solver(&self) -> Result<(), ConfigError> {
        let solver = &self.solver;
        if solver.max_iterations == 0 {
            return Err(invalid("solver.max_iterations", 0, "must be at least 1"));
        }
        let tolerances = [
            ("solver.cost_tolerance", solver.cost_tolerance),
            ("solver.step_tolerance", solver.step_tolerance),
            ("solver.gradient_tolerance", solver.gradient_tolerance),
        ];
        for (parameter, value) in tolerances {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(parameter, value, "must be non-negative and finite"));
            }
        }
        if !solver.initial_damping.is_finite() || solver.initial_damping <= 0.0 {
            return Err(invalid("solver.initial_damping", solver.initial_damping, "must be positive and finite"));
        }
        Ok(())
    }

    pub fn microphone_array(&self) -> LocalizationResult<MicrophoneArray> {
        MicrophoneArray::from_config(&self.microphones)
    }

    /// Configured observations bound to the microphones of `array`
    pub fn observations(&self, array: &MicrophoneArray) -> LocalizationResult<Vec<Tdoa4>> {
        self.observations
            .iter()
            .map(|obs| array.observation(obs.microphones, obs.tdoa_s))
            .collect()
    }

    pub fn multilaterator(&self) -> Multilaterator {
        Multilaterator::new(self.speed_of_sound_ms).with_settings(self.solver)
    }
}
