//! Physical constants and array parameters

/// Speed of sound in air at roughly 20 °C (m/s)
pub const DEFAULT_SPEED_OF_SOUND: f64 = 343.2;

/// Number of microphones attributed to a single observation
pub const QUAD_SIZE: usize = 4;

/// Minimum number of observations that constrain a 2-D position
pub const MIN_MULTILATERATION_OBSERVATIONS: usize = 2;
