// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Canonical Parameters
// ─────────────────────────────────────────────────────────────────────
//! Default constants for the transition rules and the built-in suites.
//!
//! These are starting points for the suites, not claims about any
//! physical system. Scenario files may override all of them.

use std::f64::consts::PI;

/// Sine-map gain: x ← sin(gain · x).
pub const DEFAULT_SINE_GAIN: f64 = PI;

/// Ensemble dimensionality used by the basin/perturbation/scale suites.
pub const ENSEMBLE_DIMS: usize = 4;
/// Leading dimensions counted as "observed" by the variance ratio.
pub const OBSERVED_DIMS: usize = 3;

/// Mean-field coupling of the coupled sine map.
pub const GOLDILOCKS_COUPLING: f64 = 0.5;
/// Per-dimension noise floor; the map's σ is `GOLDILOCKS_NOISE_PER_DIM · dims`.
pub const GOLDILOCKS_NOISE_PER_DIM: f64 = 1e-5;
/// Variance multiplier applied to the last dimension at start.
pub const GOLDILOCKS_IMBALANCE: f64 = 1000.0;
/// Dimension counts compared by the goldilocks suite.
pub const GOLDILOCKS_DIMS: [usize; 3] = [3, 4, 5];

/// Rotational coupling between the winding ratios.
pub const WINDING_COUPLING: f64 = 0.42;
/// Pull applied to the innermost ratio while it sits below 1.
pub const WINDING_VOID_BIAS: f64 = 0.15;
/// Power hierarchy 8⁰, 8¹, 8² of the winding couplings.
pub const WINDING_HIERARCHY: [f64; 3] = [1.0, 8.0, 64.0];
/// Operator size of the toroidal winding recursion.
pub const WINDING_MATRIX_SIZE: usize = 4;

/// Amplitude clamp of the mirror map.
pub const MIRROR_TRACE_FLOOR: f64 = 0.75;
/// Phase jitter of the mirror map.
pub const MIRROR_MATTER_BIAS: f64 = 0.03;
/// Observation scales swept by the mirror suite.
pub const MIRROR_SCALES: [f64; 7] = [1e5, 100.0, 2.0, 1.0, 0.5, 0.01, 1e-5];
/// Corridor a mirror sweep point must land in to count as reflected.
pub const MIRROR_CORRIDOR: (f64, f64) = (0.70, 0.85);

/// Ensemble sizes compared by the scale-invariance scenario.
pub const SCALE_INVARIANCE_SIZES: [usize; 4] = [100, 1_000, 10_000, 100_000];

/// Inverse temperature of the modular flow.
pub const MODULAR_BETA: f64 = 1.0;
/// Ring-mixing angle of the modular flow.
pub const MODULAR_MIXING_ANGLE: f64 = 0.3;
/// Dephasing strength of the modular flow.
pub const MODULAR_DEPHASING: f64 = 0.1;

/// Circulant recursion gain and shift coupling.
pub const CIRCULANT_GAIN: f64 = 1.5;
pub const CIRCULANT_SHIFT_COUPLING: f64 = 0.25;

/// Expected variance ratio of `observed` out of `dims` equally-weighted
/// dimensions: `observed / dims`.
pub fn dimension_count_expectation(observed: usize, dims: usize) -> f64 {
    if dims == 0 {
        return 0.0;
    }
    observed.min(dims) as f64 / dims as f64
}
