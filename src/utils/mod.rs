//! Configuration

pub mod config;

pub use config::{ConfigError, LocalizationConfig, MicrophoneConfig, ObservationConfig};
