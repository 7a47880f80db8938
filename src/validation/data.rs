use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{MicrophoneId, Tdoa4};

/// Configuration for observation validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Distinct microphones closer than this are treated as coincident (meters)
    pub min_microphone_spacing_m: f64,
    /// Flag observations whose |tdoa| exceeds this bound (seconds)
    pub max_tau_s: Option<f64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_microphone_spacing_m: 1e-3,
            max_tau_s: None,
        }
    }
}

/// Problems found in a batch of observations
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ValidationIssue {
    #[error("microphone {id} has a non-finite position")]
    NonFinitePosition { id: MicrophoneId },
    #[error("microphone {id} appears more than once in the same observation")]
    RepeatedMicrophone { id: MicrophoneId },
    #[error("microphones {first} and {second} are only {distance_m:.4} m apart")]
    CoincidentMicrophones { first: MicrophoneId, second: MicrophoneId, distance_m: f64 },
    #[error("TDOA {tdoa_s} s exceeds maximum tau {max_tau_s} s")]
    TdoaExceedsMaxTau { tdoa_s: f64, max_tau_s: f64 },
}

/// Issues found per observation, keyed by input index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<(usize, ValidationIssue)>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for(&self, index: usize) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |(i, _)| *i == index).map(|(_, issue)| issue)
    }
}

/// Geometry and range checks on observation batches.
///
/// The algorithms do not depend on this; it lets callers spot calibration
/// defects before a run.
#[derive(Debug, Clone, Default)]
pub struct ObservationValidator {
    config: ValidationConfig,
}

impl ObservationValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, observations: &[Tdoa4]) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (index, observation) in observations.iter().enumerate() {
            for issue in self.check_observation(observation) {
                report.issues.push((index, issue));
            }
        }
        report
    }

    fn check_observation(&self, observation: &Tdoa4) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mics = observation.microphones();

        for mic in mics {
            if !mic.position().is_finite() {
                issues.push(ValidationIssue::NonFinitePosition { id: mic.id() });
            }
        }

        for (i, a) in mics.iter().enumerate() {
            for b in &mics[i + 1..] {
                if a.id() == b.id() {
                    issues.push(ValidationIssue::RepeatedMicrophone { id: a.id() });
                    continue;
                }
                let distance_m = a.distance_to(b);
                if distance_m < self.config.min_microphone_spacing_m {
                    issues.push(ValidationIssue::CoincidentMicrophones {
                        first: a.id(),
                        second: b.id(),
                        distance_m,
                    });
                }
            }
        }

        if let Some(max_tau_s) = self.config.max_tau_s {
            if observation.tdoa().abs() > max_tau_s {
                issues.push(ValidationIssue::TdoaExceedsMaxTau {
                    tdoa_s: observation.tdoa(),
                    max_tau_s,
                });
            }
        }

        issues
    }
}
