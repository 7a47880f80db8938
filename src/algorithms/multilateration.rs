//! Hyperbolic multilateration over four-microphone TDOA observations
//!
//! Each observation contributes one residual
//!
//! ```text
//! r(p) = |p - m1| - |p - m2| - |p - m3| - |p - m4| - tdoa * c
//! ```
//!
//! and the source position is the unconstrained least-squares minimiser of
//! `Σ r²`, found with Levenberg-Marquardt starting from the mean microphone
//! centroid. The solver returns whatever point it reaches; fit quality is
//! reported alongside it rather than enforced.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::constants::{DEFAULT_SPEED_OF_SOUND, MIN_MULTILATERATION_OBSERVATIONS, QUAD_SIZE};
use crate::core::types::{MicrophoneHandle, Position2, Tdoa4};
use crate::validation::error::{LocalizationError, LocalizationResult};

/// Iteration limits and convergence tolerances for the solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of Levenberg-Marquardt iterations
    pub max_iterations: usize,
    /// Stop when an accepted step reduces the cost by less than this fraction
    pub cost_tolerance: f64,
    /// Stop when the step is this small relative to the estimate
    pub step_tolerance: f64,
    /// Stop when the largest gradient component falls below this value
    pub gradient_tolerance: f64,
    /// Damping applied to the first iteration
    pub initial_damping: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            cost_tolerance: 1e-10,
            step_tolerance: 1e-10,
            gradient_tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

const DAMPING_FACTOR: f64 = 10.0;
const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING: f64 = 1e15;

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    GradientTolerance,
    StepTolerance,
    CostTolerance,
    MaxIterations,
    /// Damping grew past its limit without finding a downhill step
    DampingLimit,
}

impl Termination {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            Termination::GradientTolerance | Termination::StepTolerance | Termination::CostTolerance
        )
    }
}

/// Source estimate plus the diagnostics of the fit that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultilaterationResult {
    pub x: f64,
    pub y: f64,
    /// Per-observation residuals at the estimate (meters)
    pub residuals: Vec<f64>,
    /// Sum of squared residuals
    pub cost: f64,
    pub residual_norm: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl MultilaterationResult {
    pub fn position(&self) -> Position2 {
        Position2::new(self.x, self.y)
    }

    pub fn converged(&self) -> bool {
        self.termination.is_converged()
    }
}

/// Range-difference model term `|p-m1| - |p-m2| - |p-m3| - |p-m4|`
pub fn range_difference(position: &Vector2<f64>, microphones: &[MicrophoneHandle; QUAD_SIZE]) -> f64 {
    microphones
        .iter()
        .enumerate()
        .map(|(k, mic)| {
            let distance = (position - mic.position().to_vector()).norm();
            if k == 0 { distance } else { -distance }
        })
        .sum()
}

/// Noiseless observation of a source at `source`, as the model predicts it
pub fn synthesize_observation(
    microphones: [MicrophoneHandle; QUAD_SIZE],
    source: Position2,
    speed_of_sound: f64,
) -> LocalizationResult<Tdoa4> {
    validate_speed_of_sound(speed_of_sound)?;
    let tdoa = range_difference(&source.to_vector(), &microphones) / speed_of_sound;
    Tdoa4::new(microphones, tdoa)
}

/// Mean over observations of each observation's microphone centroid
pub fn initial_guess(observations: &[Tdoa4]) -> Vector2<f64> {
    if observations.is_empty() {
        return Vector2::zeros();
    }
    let sum = observations
        .iter()
        .fold(Vector2::zeros(), |acc, obs| acc + obs.centroid().to_vector());
    sum / observations.len() as f64
}

/// Estimated `(x, y)` of the source using `speed_of_sound` (m/s)
pub fn multilaterate(observations: &[Tdoa4], speed_of_sound: f64) -> LocalizationResult<(f64, f64)> {
    let result = Multilaterator::new(speed_of_sound).solve(observations)?;
    Ok((result.x, result.y))
}

fn validate_speed_of_sound(speed: f64) -> LocalizationResult<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(LocalizationError::InvalidSpeedOfSound { speed });
    }
    Ok(())
}

/// Nonlinear least-squares multilateration solver
#[derive(Debug, Clone, PartialEq)]
pub struct Multilaterator {
    /// Speed of sound used to turn TDOAs into range differences (m/s)
    pub speed_of_sound: f64,
    pub settings: SolverSettings,
}

impl Default for Multilaterator {
    fn default() -> Self {
        Self {
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            settings: SolverSettings::default(),
        }
    }
}

impl Multilaterator {
    pub fn new(speed_of_sound: f64) -> Self {
        Self {
            speed_of_sound,
            ..Self::default()
        }
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Solve for the source position.
    ///
    /// Fails only on invalid input. A fit that did not converge is still
    /// returned; check [`MultilaterationResult::converged`] and the residuals.
    pub fn solve(&self, observations: &[Tdoa4]) -> LocalizationResult<MultilaterationResult> {
        if observations.len() < MIN_MULTILATERATION_OBSERVATIONS {
            return Err(LocalizationError::InsufficientObservations {
                available: observations.len(),
                required: MIN_MULTILATERATION_OBSERVATIONS,
            });
        }
        validate_speed_of_sound(self.speed_of_sound)?;

        let range_differences: Vec<f64> = observations
            .iter()
            .map(|obs| obs.tdoa() * self.speed_of_sound)
            .collect();

        let start = initial_guess(observations);
        debug!(x = start.x, y = start.y, observations = observations.len(), "multilateration initial guess");

        let (estimate, iterations, termination) = self.levenberg_marquardt(observations, &range_differences, start);
        let (residuals, _) = self.compute_residuals_and_jacobian(observations, &range_differences, &estimate);
        let cost = residuals.dot(&residuals);

        let result = MultilaterationResult {
            x: estimate.x,
            y: estimate.y,
            residuals: residuals.iter().copied().collect(),
            cost,
            residual_norm: cost.sqrt(),
            iterations,
            termination,
        };

        if result.converged() {
            info!(
                x = result.x,
                y = result.y,
                residual_norm = result.residual_norm,
                iterations,
                "multilateration converged"
            );
        } else {
            warn!(
                x = result.x,
                y = result.y,
                residual_norm = result.residual_norm,
                iterations,
                ?termination,
                "multilateration did not converge"
            );
        }

        Ok(result)
    }

    /// Levenberg-Marquardt with Marquardt diagonal scaling
    fn levenberg_marquardt(
        &self,
        observations: &[Tdoa4],
        range_differences: &[f64],
        start: Vector2<f64>,
    ) -> (Vector2<f64>, usize, Termination) {
        let settings = &self.settings;
        let mut estimate = start;
        let (mut residuals, mut jacobian) =
            self.compute_residuals_and_jacobian(observations, range_differences, &estimate);
        let mut cost = residuals.dot(&residuals);
        let mut lambda = settings.initial_damping;

        for iteration in 0..settings.max_iterations {
            let jt_j = jacobian.transpose() * &jacobian;
            let jt_r = jacobian.transpose() * &residuals;
            let gradient = Vector2::new(jt_r[0], jt_r[1]);

            if gradient.amax() < settings.gradient_tolerance {
                return (estimate, iteration, Termination::GradientTolerance);
            }

            let mut augmented = Matrix2::from_fn(|r, c| jt_j[(r, c)]);
            for i in 0..2 {
                augmented[(i, i)] += lambda * jt_j[(i, i)].max(1e-12);
            }

            let step = match augmented.try_inverse() {
                Some(inverse) => -(inverse * gradient),
                None => {
                    lambda *= DAMPING_FACTOR;
                    if lambda > MAX_DAMPING {
                        return (estimate, iteration, Termination::DampingLimit);
                    }
                    continue;
                }
            };

            if step.norm() < settings.step_tolerance * (settings.step_tolerance + estimate.norm()) {
                return (estimate, iteration, Termination::StepTolerance);
            }

            let candidate = estimate + step;
            let (new_residuals, new_jacobian) =
                self.compute_residuals_and_jacobian(observations, range_differences, &candidate);
            let new_cost = new_residuals.dot(&new_residuals);

            debug!(iteration, cost, new_cost, lambda, "levenberg-marquardt step");

            if new_cost < cost {
                let reduction = cost - new_cost;
                let previous_cost = cost;

                estimate = candidate;
                residuals = new_residuals;
                jacobian = new_jacobian;
                cost = new_cost;
                lambda = (lambda / DAMPING_FACTOR).max(MIN_DAMPING);

                if reduction <= settings.cost_tolerance * previous_cost {
                    return (estimate, iteration + 1, Termination::CostTolerance);
                }
            } else {
                lambda *= DAMPING_FACTOR;
                if lambda > MAX_DAMPING {
                    return (estimate, iteration + 1, Termination::DampingLimit);
                }
            }
        }

        (estimate, settings.max_iterations, Termination::MaxIterations)
    }

    /// Residuals and their Jacobian with respect to (x, y)
    fn compute_residuals_and_jacobian(
        &self,
        observations: &[Tdoa4],
        range_differences: &[f64],
        estimate: &Vector2<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let n = observations.len();
        let mut residuals = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(n, 2);

        for (i, (observation, d)) in observations.iter().zip(range_differences).enumerate() {
            residuals[i] = range_difference(estimate, observation.microphones()) - d;

            // d|p - m|/dp is the unit vector from m to p; undefined on the microphone itself
            for (k, mic) in observation.microphones().iter().enumerate() {
                let diff = estimate - mic.position().to_vector();
                let distance = diff.norm();
                if distance > 1e-12 {
                    let sign = if k == 0 { 1.0 } else { -1.0 };
                    jacobian[(i, 0)] += sign * diff.x / distance;
                    jacobian[(i, 1)] += sign * diff.y / distance;
                }
            }
        }

        (residuals, jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Microphone, MicrophoneId};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const SPEED: f64 = DEFAULT_SPEED_OF_SOUND;

    fn cross_array() -> Vec<MicrophoneHandle> {
        [(0.0, 10.0), (10.0, 0.0), (0.0, -10.0), (-10.0, 0.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                Arc::new(Microphone::new(MicrophoneId(i as u32), format!("mic{}", i), Position2::new(x, y)))
            })
            .collect()
    }

    /// `count` observations, each rotating which microphone leads the set
    fn rotated_quads(count: usize) -> Vec<[MicrophoneHandle; QUAD_SIZE]> {
        let mics = cross_array();
        (0..count)
            .map(|k| std::array::from_fn(|j| Arc::clone(&mics[(k + j) % QUAD_SIZE])))
            .collect()
    }

    fn observations_for(source: Position2, count: usize) -> Vec<Tdoa4> {
        rotated_quads(count)
            .into_iter()
            .map(|quad| synthesize_observation(quad, source, SPEED).unwrap())
            .collect()
    }

    #[test]
    fn test_requires_two_observations() {
        let solver = Multilaterator::default();
        assert_eq!(
            solver.solve(&[]).unwrap_err(),
            LocalizationError::InsufficientObservations { available: 0, required: 2 }
        );

        let single = observations_for(Position2::new(1.0, 1.0), 1);
        assert_eq!(
            solver.solve(&single).unwrap_err(),
            LocalizationError::InsufficientObservations { available: 1, required: 2 }
        );

        let pair = observations_for(Position2::new(1.0, 1.0), 2);
        assert!(multilaterate(&pair, SPEED).is_ok());
    }

    #[test]
    fn test_invalid_speed_of_sound() {
        let observations = observations_for(Position2::new(1.0, 0.0), 4);
        assert!(matches!(
            multilaterate(&observations, 0.0),
            Err(LocalizationError::InvalidSpeedOfSound { .. })
        ));
        assert!(matches!(
            multilaterate(&observations, f64::NAN),
            Err(LocalizationError::InvalidSpeedOfSound { .. })
        ));
    }

    #[test]
    fn test_initial_guess_is_mean_centroid() {
        let mics = cross_array();
        let shifted: [MicrophoneHandle; QUAD_SIZE] = std::array::from_fn(|j| {
            let p = mics[j].position();
            Arc::new(Microphone::new(MicrophoneId(10 + j as u32), "shifted", Position2::new(p.x + 4.0, p.y + 2.0)))
        });
        let observations = vec![
            Tdoa4::new(rotated_quads(1).remove(0), 0.0).unwrap(),
            Tdoa4::new(shifted, 0.0).unwrap(),
        ];

        let guess = initial_guess(&observations);
        assert_relative_eq!(guess.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(guess.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_residual_sign_convention() {
        let quad = rotated_quads(1).remove(0);
        let origin = Vector2::zeros();
        // one positive term, three negative
        assert_relative_eq!(range_difference(&origin, &quad), 10.0 - 30.0, epsilon = 1e-12);

        let observation = synthesize_observation(quad, Position2::new(0.0, 0.0), SPEED).unwrap();
        assert_relative_eq!(observation.tdoa() * SPEED, -20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_symmetric_source_at_centroid() {
        let observations = observations_for(Position2::new(0.0, 0.0), 4);
        let result = Multilaterator::default().solve(&observations).unwrap();

        assert!(result.converged());
        assert_relative_eq!(result.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(result.y, 0.0, epsilon = 1e-3);
        assert!(result.residual_norm < 1e-9);
    }

    #[test]
    fn test_recovers_off_centre_sources() {
        for &(x, y) in &[(2.0, -1.0), (4.0, 4.0), (-3.0, 0.5), (7.0, 2.0)] {
            for count in 2..=4 {
                let observations = observations_for(Position2::new(x, y), count);
                let (ex, ey) = multilaterate(&observations, SPEED).unwrap();
                assert_relative_eq!(ex, x, epsilon = 1e-3);
                assert_relative_eq!(ey, y, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_estimate_follows_source_along_axis() {
        let mut previous = f64::NEG_INFINITY;
        for step in 0..=5 {
            let source_x = step as f64;
            let observations = observations_for(Position2::new(source_x, 0.0), 4);
            let result = Multilaterator::default().solve(&observations).unwrap();

            assert!(result.x > previous, "estimate {} did not move past {}", result.x, previous);
            assert_relative_eq!(result.x, source_x, epsilon = 1e-3);
            assert_relative_eq!(result.y, 0.0, epsilon = 1e-3);
            previous = result.x;
        }
    }

    #[test]
    fn test_resolving_own_output_is_a_fixed_point() {
        let mut observations = observations_for(Position2::new(2.0, -1.0), 4);
        let noise = [0.05, -0.03, 0.02, -0.04];
        observations = observations
            .into_iter()
            .zip(noise)
            .map(|(obs, n)| Tdoa4::new(obs.microphones().clone(), obs.tdoa() + n / SPEED).unwrap())
            .collect();

        let first = Multilaterator::default().solve(&observations).unwrap();
        let regenerated: Vec<Tdoa4> = rotated_quads(4)
            .into_iter()
            .map(|quad| synthesize_observation(quad, first.position(), SPEED).unwrap())
            .collect();
        let second = Multilaterator::default().solve(&regenerated).unwrap();

        assert_relative_eq!(second.x, first.x, epsilon = 1e-6);
        assert_relative_eq!(second.y, first.y, epsilon = 1e-6);
        assert!(second.residual_norm < 1e-9);
    }

    #[test]
    fn test_noisy_fit_reports_residuals() {
        let noise = [0.05, -0.03, 0.02, -0.04];
        let observations: Vec<Tdoa4> = observations_for(Position2::new(2.0, -1.0), 4)
            .into_iter()
            .zip(noise)
            .map(|(obs, n)| Tdoa4::new(obs.microphones().clone(), obs.tdoa() + n / SPEED).unwrap())
            .collect();

        let result = Multilaterator::default().solve(&observations).unwrap();
        assert!(result.converged());
        assert_eq!(result.residuals.len(), 4);
        assert!(result.residual_norm > 1e-3);
        assert_relative_eq!(result.cost, result.residual_norm.powi(2), epsilon = 1e-12);
        assert!((result.x - 2.0).abs() < 0.1);
        assert!((result.y + 1.0).abs() < 0.1);
    }

    #[test]
    fn test_iteration_limit_is_reported() {
        let observations = observations_for(Position2::new(7.0, 2.0), 4);
        let settings = SolverSettings { max_iterations: 1, ..SolverSettings::default() };
        let result = Multilaterator::default().with_settings(settings).solve(&observations).unwrap();

        assert_eq!(result.termination, Termination::MaxIterations);
        assert!(!result.converged());
        assert!(result.residual_norm > 0.0);
    }
}
