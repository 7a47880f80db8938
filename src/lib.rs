//! Microphone Array Localization
//!
//! Bearing and 2D position estimation for a sound source from TDOA
//! measurements taken by a four-microphone array.

pub mod core;
pub mod algorithms;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{
    Doa4, Microphone, MicrophoneArray, MicrophoneHandle, MicrophoneId, Position2, Tdoa4,
    DEFAULT_SPEED_OF_SOUND,
};
pub use crate::algorithms::{
    compute_all_doa, compute_all_doa_observed, compute_doa, max_tau_for_pair, multilaterate,
    DoaObserver, MultilaterationResult, Multilaterator, SolverSettings, Termination, TracingObserver,
};
pub use crate::validation::{LocalizationError, LocalizationResult, ObservationValidator};
pub use crate::utils::{ConfigError, LocalizationConfig};
pub use crate::api::{LocalizationReport, OutputFormat};
