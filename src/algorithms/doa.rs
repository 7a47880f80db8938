//! TDOA to direction-of-arrival conversion
//!
//! The ratio `tdoa / max_tau` is treated as the sine of the bearing relative
//! to the broadside axis of the microphone set, so every valid result lies in
//! [-90°, 90°].

use tracing::debug;

use crate::core::types::{Doa4, Microphone, Tdoa4};
use crate::validation::error::{LocalizationError, LocalizationResult};

/// Receives every DOA record as it is computed.
///
/// Observers only watch the batch; they cannot change its result.
pub trait DoaObserver {
    fn observe(&self, index: usize, doa: &Doa4);
}

impl<F> DoaObserver for F
where
    F: Fn(usize, &Doa4),
{
    fn observe(&self, index: usize, doa: &Doa4) {
        self(index, doa)
    }
}

/// Emits each record as a `tracing` debug event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DoaObserver for TracingObserver {
    fn observe(&self, index: usize, doa: &Doa4) {
        debug!(
            index,
            mic1 = doa.mic1().name(),
            mic2 = doa.mic2().name(),
            mic3 = doa.mic3().name(),
            mic4 = doa.mic4().name(),
            doa_deg = doa.doa(),
            "{}",
            doa
        );
    }
}

struct SilentObserver;

impl DoaObserver for SilentObserver {
    fn observe(&self, _index: usize, _doa: &Doa4) {}
}

/// Maximum feasible TDOA for a microphone pair: `distance / speed_of_sound`
pub fn max_tau_for_pair(a: &Microphone, b: &Microphone, speed_of_sound: f64) -> LocalizationResult<f64> {
    if !speed_of_sound.is_finite() || speed_of_sound <= 0.0 {
        return Err(LocalizationError::InvalidSpeedOfSound { speed: speed_of_sound });
    }
    Ok(a.distance_to(b) / speed_of_sound)
}

/// Bearing in degrees for a single TDOA.
///
/// Fails when `|tdoa| > max_tau`; such a delay is geometrically impossible
/// and is never clamped.
pub fn compute_doa(tdoa: f64, max_tau: f64) -> LocalizationResult<f64> {
    if !max_tau.is_finite() || max_tau <= 0.0 {
        return Err(LocalizationError::InvalidMaxTau { max_tau });
    }
    if !tdoa.is_finite() {
        return Err(LocalizationError::NonFiniteMeasurement { field: "tdoa", value: tdoa });
    }
    if tdoa.abs() > max_tau {
        return Err(LocalizationError::TdoaOutOfRange { tdoa, max_tau });
    }

    Ok((tdoa / max_tau).asin().to_degrees())
}

/// One [`Doa4`] per observation, in input order.
///
/// With `debug` set every record is also emitted through [`TracingObserver`].
pub fn compute_all_doa(
    observations: &[Tdoa4],
    max_tau: Option<f64>,
    debug: bool,
) -> LocalizationResult<Vec<Doa4>> {
    if debug {
        compute_all_doa_observed(observations, max_tau, &TracingObserver)
    } else {
        compute_all_doa_observed(observations, max_tau, &SilentObserver)
    }
}

/// Same as [`compute_all_doa`] with a caller-supplied observer
pub fn compute_all_doa_observed(
    observations: &[Tdoa4],
    max_tau: Option<f64>,
    observer: &dyn DoaObserver,
) -> LocalizationResult<Vec<Doa4>> {
    if observations.is_empty() {
        return Err(LocalizationError::EmptyObservations);
    }
    let max_tau = max_tau.ok_or(LocalizationError::MissingMaxTau)?;

    let mut results = Vec::with_capacity(observations.len());
    for (index, observation) in observations.iter().enumerate() {
        let angle = compute_doa(observation.tdoa(), max_tau)?;
        let doa = Doa4::from_observation(observation, angle);
        observer.observe(index, &doa);
        results.push(doa);
    }

    Ok(results)
}
