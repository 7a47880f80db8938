//! Bearing and position estimation

pub mod doa;
pub mod multilateration;

pub use doa::{compute_all_doa, compute_all_doa_observed, compute_doa, max_tau_for_pair, DoaObserver, TracingObserver};
pub use multilateration::{multilaterate, MultilaterationResult, Multilaterator, SolverSettings, Termination};
