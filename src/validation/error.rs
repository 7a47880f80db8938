//! Error classification for the localization pipeline

use thiserror::Error;

use crate::core::types::MicrophoneId;
use crate::utils::config::ConfigError;

pub type LocalizationResult<T> = Result<T, LocalizationError>;

/// Errors raised by the DOA converter, the multilateration solver and the
/// microphone registry.
///
/// Every error aborts the whole call; there is no partial-result mode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocalizationError {
    // Caller contract violations
    #[error("no TDOA observations provided")]
    EmptyObservations,

    #[error("no maximum tau provided for DOA computation")]
    MissingMaxTau,

    #[error("maximum tau must be a positive, finite number of seconds (got {max_tau})")]
    InvalidMaxTau { max_tau: f64 },

    #[error("at least {required} observations are required, {available} provided")]
    InsufficientObservations { available: usize, required: usize },

    #[error("speed of sound must be a positive, finite number (got {speed} m/s)")]
    InvalidSpeedOfSound { speed: f64 },

    #[error("{field} must be finite (got {value})")]
    NonFiniteMeasurement { field: &'static str, value: f64 },

    #[error("microphone {id} is not registered")]
    UnknownMicrophone { id: MicrophoneId },

    #[error("microphone {id} is registered more than once")]
    DuplicateMicrophone { id: MicrophoneId },

    // Measurement inconsistent with geometry
    #[error("TDOA {tdoa} s exceeds the maximum possible delay of {max_tau} s")]
    TdoaOutOfRange { tdoa: f64, max_tau: f64 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LocalizationError {
    /// True for caller contract violations, false for measurement or
    /// configuration problems
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::TdoaOutOfRange { .. } | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(LocalizationError::EmptyObservations.is_invalid_input());
        assert!(LocalizationError::MissingMaxTau.is_invalid_input());
        assert!(LocalizationError::InsufficientObservations { available: 1, required: 2 }.is_invalid_input());
        assert!(!LocalizationError::TdoaOutOfRange { tdoa: 1.0, max_tau: 0.5 }.is_invalid_input());
    }

    #[test]
    fn test_error_messages() {
        let err = LocalizationError::TdoaOutOfRange { tdoa: 1.0, max_tau: 0.5 };
        assert_eq!(err.to_string(), "TDOA 1 s exceeds the maximum possible delay of 0.5 s");

        let err = LocalizationError::InsufficientObservations { available: 1, required: 2 };
        assert_eq!(err.to_string(), "at least 2 observations are required, 1 provided");

        let err = LocalizationError::UnknownMicrophone { id: MicrophoneId(12) };
        assert_eq!(err.to_string(), "microphone 12 is not registered");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: LocalizationError = ConfigError::InvalidParameter {
            parameter: "speed_of_sound_ms".to_string(),
            value: "-1".to_string(),
            reason: "must be positive".to_string(),
        }
        .into();
        assert!(matches!(err, LocalizationError::Config(_)));
        assert!(!err.is_invalid_input());
    }
}
