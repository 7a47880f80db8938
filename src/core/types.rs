//! Core data types for the localization pipeline

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::constants::QUAD_SIZE;
use crate::validation::error::{LocalizationError, LocalizationResult};

/// Opaque microphone identifier (the capture device index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MicrophoneId(pub u32);

impl fmt::Display for MicrophoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 2D position in the array's local frame (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position2 {
    pub x: f64,
    pub y: f64,
}

impl Position2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Position2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Microphone identity and placement.
///
/// Owned by the [`MicrophoneArray`](crate::core::MicrophoneArray) registry and
/// shared with observations through `Arc` handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Microphone {
    id: MicrophoneId,
    name: String,
    position: Position2,
}

impl Microphone {
    pub fn new(id: MicrophoneId, name: impl Into<String>, position: Position2) -> Self {
        Self {
            id,
            name: name.into(),
            position,
        }
    }

    pub fn id(&self) -> MicrophoneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Position2 {
        self.position
    }

    pub fn distance_to(&self, other: &Microphone) -> f64 {
        self.position.distance_to(&other.position)
    }
}

/// Shared, non-owning handle to a registered microphone
pub type MicrophoneHandle = Arc<Microphone>;

/// A TDOA observation (seconds) attributed to a set of four microphones.
///
/// The sign convention is whatever the upstream estimator produced; it must
/// stay consistent across every observation fed into one run.
#[derive(Debug, Clone)]
pub struct Tdoa4 {
    microphones: [MicrophoneHandle; QUAD_SIZE],
    tdoa: f64,
}

impl Tdoa4 {
    pub fn new(microphones: [MicrophoneHandle; QUAD_SIZE], tdoa: f64) -> LocalizationResult<Self> {
        if !tdoa.is_finite() {
            return Err(LocalizationError::NonFiniteMeasurement {
                field: "tdoa",
                value: tdoa,
            });
        }
        Ok(Self { microphones, tdoa })
    }

    pub fn microphones(&self) -> &[MicrophoneHandle; QUAD_SIZE] {
        &self.microphones
    }

    pub fn mic1(&self) -> &Microphone {
        &self.microphones[0]
    }

    pub fn mic2(&self) -> &Microphone {
        &self.microphones[1]
    }

    pub fn mic3(&self) -> &Microphone {
        &self.microphones[2]
    }

    pub fn mic4(&self) -> &Microphone {
        &self.microphones[3]
    }

    /// Time difference of arrival in seconds
    pub fn tdoa(&self) -> f64 {
        self.tdoa
    }

    /// Mean position of the four microphones
    pub fn centroid(&self) -> Position2 {
        let sum = self
            .microphones
            .iter()
            .fold(Vector2::zeros(), |acc, mic| acc + mic.position().to_vector());
        Position2::from_vector(&(sum / QUAD_SIZE as f64))
    }
}

impl fmt::Display for Tdoa4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Tdoa4: mic1={}, mic2={}, mic3={}, mic4={}, tdoa={:.6})",
            self.mic1().name(),
            self.mic2().name(),
            self.mic3().name(),
            self.mic4().name(),
            self.tdoa
        )
    }
}

/// Direction of arrival (degrees) computed for a set of four microphones
#[derive(Debug, Clone)]
pub struct Doa4 {
    microphones: [MicrophoneHandle; QUAD_SIZE],
    doa: f64,
}

impl Doa4 {
    pub(crate) fn from_observation(observation: &Tdoa4, doa: f64) -> Self {
        Self {
            microphones: observation.microphones.clone(),
            doa,
        }
    }

    pub fn microphones(&self) -> &[MicrophoneHandle; QUAD_SIZE] {
        &self.microphones
    }

    pub fn mic1(&self) -> &Microphone {
        &self.microphones[0]
    }

    pub fn mic2(&self) -> &Microphone {
        &self.microphones[1]
    }

    pub fn mic3(&self) -> &Microphone {
        &self.microphones[2]
    }

    pub fn mic4(&self) -> &Microphone {
        &self.microphones[3]
    }

    /// Bearing in degrees relative to the broadside axis, in [-90, 90]
    pub fn doa(&self) -> f64 {
        self.doa
    }
}

impl fmt::Display for Doa4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Doa4: mic1={}, mic2={}, mic3={}, mic4={}, doa={:.2})",
            self.mic1().name(),
            self.mic2().name(),
            self.mic3().name(),
            self.mic4().name(),
            self.doa
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mic(id: u32, name: &str, x: f64, y: f64) -> MicrophoneHandle {
        Arc::new(Microphone::new(MicrophoneId(id), name, Position2::new(x, y)))
    }

    fn quad() -> [MicrophoneHandle; QUAD_SIZE] {
        [
            mic(0, "north", 0.0, 10.0),
            mic(1, "east", 10.0, 0.0),
            mic(2, "south", 0.0, -10.0),
            mic(3, "west", -10.0, 0.0),
        ]
    }

    #[test]
    fn test_position_distance() {
        let a = Position2::new(0.0, 0.0);
        let b = Position2::new(3.0, 4.0);
        assert_relative_eq!(a.distance_to(&b), 5.0);
        assert_relative_eq!(b.distance_to(&a), 5.0);
    }

    #[test]
    fn test_tdoa4_rejects_non_finite() {
        assert!(Tdoa4::new(quad(), f64::NAN).is_err());
        assert!(Tdoa4::new(quad(), f64::INFINITY).is_err());
        assert!(Tdoa4::new(quad(), -0.002).is_ok());
    }

    #[test]
    fn test_tdoa4_shares_microphones() {
        let mics = quad();
        let observation = Tdoa4::new(mics.clone(), 0.001).unwrap();
        assert!(Arc::ptr_eq(&observation.microphones()[0], &mics[0]));
        assert_eq!(observation.mic3().name(), "south");
    }

    #[test]
    fn test_tdoa4_centroid() {
        let observation = Tdoa4::new(quad(), 0.0).unwrap();
        let centroid = observation.centroid();
        assert_relative_eq!(centroid.x, 0.0);
        assert_relative_eq!(centroid.y, 0.0);
    }

    #[test]
    fn test_display_formats() {
        let observation = Tdoa4::new(quad(), 0.0015).unwrap();
        assert_eq!(
            observation.to_string(),
            "(Tdoa4: mic1=north, mic2=east, mic3=south, mic4=west, tdoa=0.001500)"
        );

        let doa = Doa4::from_observation(&observation, 12.3456);
        assert_eq!(
            doa.to_string(),
            "(Doa4: mic1=north, mic2=east, mic3=south, mic4=west, doa=12.35)"
        );
    }
}
