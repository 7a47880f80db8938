//! Core types and constants for microphone-array localization

pub mod types;
pub mod constants;
pub mod array;

pub use types::*;
pub use constants::*;
pub use array::MicrophoneArray;
