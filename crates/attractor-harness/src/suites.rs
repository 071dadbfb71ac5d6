// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Built-in Suites
// ─────────────────────────────────────────────────────────────────────
//! Named scenario collections.
//!
//!   - fortress: sine-map ensemble basin, stability, perturbation,
//!     scale invariance, and the null baseline
//!   - goldilocks: coupled sine maps in 3, 4 and 5 dimensions
//!   - spectral: toroidal winding, modular flow, circulant recursion
//!   - mirror: scalar mirror map swept across observation scales

use attractor_dynamics::params::{
    ENSEMBLE_DIMS, GOLDILOCKS_DIMS, GOLDILOCKS_IMBALANCE, MIRROR_CORRIDOR, MIRROR_SCALES,
    MIRROR_TRACE_FLOOR, OBSERVED_DIMS, SCALE_INVARIANCE_SIZES, WINDING_MATRIX_SIZE,
};
use attractor_dynamics::{Extractor, Transition};
use attractor_types::{AttractorError, AttractorResult};

use crate::scenario::{InitialState, ScenarioKind, ScenarioSpec};

pub const SUITE_NAMES: [&str; 4] = ["fortress", "goldilocks", "spectral", "mirror"];

const FORTRESS_PARTICLES: usize = 10_000;
const FORTRESS_TARGET: f64 = 0.75;

/// Scenarios of the named suite; `all` concatenates every suite.
pub fn suite(name: &str) -> AttractorResult<Vec<ScenarioSpec>> {
    match name {
        "fortress" => Ok(fortress()),
        "goldilocks" => Ok(goldilocks()),
        "spectral" => Ok(spectral()),
        "mirror" => Ok(mirror()),
        "all" => Ok(all()),
        other => Err(AttractorError::Config(format!(
            "unknown suite '{other}' (expected one of {}, all)",
            SUITE_NAMES.join(", ")
        ))),
    }
}

pub fn all() -> Vec<ScenarioSpec> {
    let mut specs = fortress();
    specs.extend(goldilocks());
    specs.extend(spectral());
    specs.extend(mirror());
    specs
}

/// One-line description for listings.
pub fn describe(name: &str) -> &'static str {
    match name {
        "fortress" => "sine-map ensemble: basin, stability, perturbation, scale, null",
        "goldilocks" => "mean-field coupled sine maps in 3, 4 and 5 dimensions",
        "spectral" => "toroidal winding, modular flow and circulant matrix recursions",
        "mirror" => "scalar mirror map across observation scales",
        _ => "",
    }
}

fn sine_scenario(name: &str, kind: ScenarioKind, iterations: u64, seeds: usize) -> ScenarioSpec {
    let mut s = ScenarioSpec::new(
        name,
        kind,
        Transition::sine_map(),
        Extractor::variance_ratio(OBSERVED_DIMS),
        InitialState::ensemble(FORTRESS_PARTICLES, ENSEMBLE_DIMS),
    );
    s.target = Some(FORTRESS_TARGET);
    s.kernel.max_iterations = iterations;
    s.seed_count = seeds;
    s
}

pub fn fortress() -> Vec<ScenarioSpec> {
    let mut null = sine_scenario("fortress-null", ScenarioKind::Null, 1, 1000);
    null.transition = Transition::Frozen;
    null.target = None;

    let basin = sine_scenario("fortress-basin", ScenarioKind::Basin, 800, 100);
    let stability = sine_scenario("fortress-stability", ScenarioKind::Stability, 800, 20);
    let perturbation = sine_scenario("fortress-perturbation", ScenarioKind::Perturbation, 500, 20);

    let mut scale = sine_scenario("fortress-scale", ScenarioKind::Scale, 500, 1);
    scale.sizes = SCALE_INVARIANCE_SIZES.to_vec();

    vec![null, basin, stability, perturbation, scale]
}

pub fn goldilocks() -> Vec<ScenarioSpec> {
    GOLDILOCKS_DIMS
        .iter()
        .map(|&n| {
            let mut scales = vec![1.0; n];
            scales[n - 1] = GOLDILOCKS_IMBALANCE;
            let mut s = ScenarioSpec::new(
                format!("goldilocks-n{n}"),
                ScenarioKind::Stability,
                Transition::goldilocks(n),
                Extractor::variance_ratio(n - 1),
                InitialState::Ensemble {
                    particles: 2000,
                    dims: n,
                    scales: Some(scales),
                },
            );
            s.target = Some((n - 1) as f64 / n as f64);
            s.kernel.max_iterations = 1000;
            s.seed_count = 50;
            s.cohort = Some("goldilocks".to_string());
            s
        })
        .collect()
}

pub fn spectral() -> Vec<ScenarioSpec> {
    let mut toroidal = ScenarioSpec::new(
        "spectral-toroidal",
        ScenarioKind::Stability,
        Transition::toroidal_winding(),
        Extractor::top_eigen(3),
        InitialState::Hermitian {
            n: WINDING_MATRIX_SIZE,
        },
    );
    toroidal.kernel.max_iterations = 5000;
    toroidal.seed_count = 150;

    let mut modular = ScenarioSpec::new(
        "spectral-modular",
        ScenarioKind::Stability,
        Transition::modular_flow(),
        Extractor::harmonic(0.01),
        InitialState::Density { n: 8 },
    );
    modular.kernel.max_iterations = 500;
    modular.seed_count = 20;

    let mut circulant = ScenarioSpec::new(
        "spectral-circulant",
        ScenarioKind::Stability,
        Transition::circulant_recursion(),
        Extractor::top_eigen(1),
        InitialState::Circulant { n: 6 },
    );
    circulant.kernel.max_iterations = 500;
    circulant.seed_count = 20;

    vec![toroidal, modular, circulant]
}

pub fn mirror() -> Vec<ScenarioSpec> {
    let (lo, hi) = MIRROR_CORRIDOR;
    let mut s = ScenarioSpec::new(
        "mirror-scales",
        ScenarioKind::ParameterSweep,
        Transition::mirror(1.0),
        Extractor::identity(),
        InitialState::Scalar {
            value: MIRROR_TRACE_FLOOR,
        },
    );
    s.target = Some((lo + hi) / 2.0);
    s.tolerance = (hi - lo) / 2.0;
    s.sweep = MIRROR_SCALES.to_vec();
    s.kernel.max_iterations = 2000;
    s.kernel.tail_window = 500;
    // deterministic: one seed per scale
    s.seed_count = 1;
    vec![s]
}
