//! Error types and observation validation

pub mod data;
pub mod error;

pub use data::{ObservationValidator, ValidationConfig, ValidationIssue, ValidationReport};
pub use error::{LocalizationError, LocalizationResult};
