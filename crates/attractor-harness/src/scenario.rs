// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Scenario Specification
// ─────────────────────────────────────────────────────────────────────
//! One validation scenario: which rule to run, from which initial
//! states, over which seeds, and what counts as a pass.
//!
//! Specs are immutable once built and validated eagerly; an invalid spec
//! aborts only its own scenario.

use serde::{Deserialize, Serialize};

use attractor_dynamics::params::dimension_count_expectation;
use attractor_dynamics::{ExtractorKind, Extractor, SeededRng, State, Transition};
use attractor_types::{AttractorError, AttractorResult, KernelConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Basin,
    Stability,
    Perturbation,
    Scale,
    ParameterSweep,
    Null,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScenarioKind::Basin => "basin",
            ScenarioKind::Stability => "stability",
            ScenarioKind::Perturbation => "perturbation",
            ScenarioKind::Scale => "scale",
            ScenarioKind::ParameterSweep => "sweep",
            ScenarioKind::Null => "null",
        };
        f.write_str(s)
    }
}

/// How each run's initial state is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitialState {
    /// Gaussian particle ensemble; `scales` gives per-dimension standard
    /// deviations (all 1 when absent).
    Ensemble {
        particles: usize,
        dims: usize,
        #[serde(default)]
        scales: Option<Vec<f64>>,
    },
    /// Random Hermitian (G + G†) / 2.
    Hermitian { n: usize },
    /// Random density matrix G G† / tr.
    Density { n: usize },
    /// Random real circulant matrix.
    Circulant { n: usize },
    Scalar { value: f64 },
}

impl InitialState {
    pub fn ensemble(particles: usize, dims: usize) -> Self {
        InitialState::Ensemble {
            particles,
            dims,
            scales: None,
        }
    }

    fn is_ensemble(&self) -> bool {
        matches!(self, InitialState::Ensemble { .. })
    }

    fn is_matrix(&self) -> bool {
        matches!(
            self,
            InitialState::Hermitian { .. } | InitialState::Density { .. } | InitialState::Circulant { .. }
        )
    }

    /// Same payload kind and shape (ensemble sizes may differ).
    fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (InitialState::Ensemble { dims: a, .. }, InitialState::Ensemble { dims: b, .. }) => {
                a == b
            }
            (InitialState::Hermitian { n: a }, InitialState::Hermitian { n: b })
            | (InitialState::Density { n: a }, InitialState::Density { n: b })
            | (InitialState::Circulant { n: a }, InitialState::Circulant { n: b }) => a == b,
            (InitialState::Scalar { .. }, InitialState::Scalar { .. }) => true,
            _ => false,
        }
    }

    fn matrix_size(&self) -> Option<usize> {
        match self {
            InitialState::Hermitian { n }
            | InitialState::Density { n }
            | InitialState::Circulant { n } => Some(*n),
            _ => None,
        }
    }

    fn validate(&self) -> AttractorResult<()> {
        match self {
            InitialState::Ensemble {
                particles,
                dims,
                scales,
            } => {
                if *particles == 0 || *dims == 0 {
                    return Err(AttractorError::Config(format!(
                        "ensemble needs particles >= 1 and dims >= 1, got {particles}x{dims}"
                    )));
                }
                if let Some(s) = scales {
                    if s.len() != *dims {
                        return Err(AttractorError::Config(format!(
                            "{} scales given for {dims} dims",
                            s.len()
                        )));
                    }
                    if s.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
                        return Err(AttractorError::Config(
                            "ensemble scales must be finite and >= 0".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            InitialState::Hermitian { n }
            | InitialState::Density { n }
            | InitialState::Circulant { n } => {
                if *n < 2 {
                    return Err(AttractorError::Config(format!(
                        "matrix size must be >= 2, got {n}"
                    )));
                }
                Ok(())
            }
            InitialState::Scalar { value } => {
                if !value.is_finite() {
                    return Err(AttractorError::Config(format!(
                        "initial scalar must be finite, got {value}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Draw a state. `particles` overrides the ensemble size (scale runs).
    pub fn build(&self, particles: Option<usize>, rng: &mut SeededRng) -> AttractorResult<State> {
        match self {
            InitialState::Ensemble {
                particles: p,
                dims,
                scales,
            } => {
                let ones = vec![1.0; *dims];
                let scales = scales.as_deref().unwrap_or(&ones);
                State::gaussian_ensemble(particles.unwrap_or(*p), *dims, scales, rng)
            }
            InitialState::Hermitian { n } => State::random_hermitian(*n, rng),
            InitialState::Density { n } => State::random_density(*n, rng),
            InitialState::Circulant { n } => State::circulant(*n, rng),
            InitialState::Scalar { value } => Ok(State::scalar(*value)),
        }
    }
}

fn default_seed_count() -> usize {
    20
}
fn default_tolerance() -> f64 {
    0.01
}
fn default_max_imbalance() -> f64 {
    1000.0
}
fn default_perturbation_strength() -> f64 {
    10.0
}
fn default_min_converged_fraction() -> f64 {
    0.9
}
fn default_min_recovery() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub kind: ScenarioKind,
    pub transition: Transition,
    pub extractor: Extractor,
    pub initial: InitialState,

    /// Iteration budget and detector settings. For perturbation runs the
    /// budget applies before and again after the shock.
    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub seed_start: u64,
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,

    /// Expected attractor value. Null scenarios default to the
    /// dimension-count expectation `observed / dims`.
    #[serde(default)]
    pub target: Option<f64>,

    /// Verdict band half-width around the target.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Basin: imbalance drawn from U(1, max_imbalance).
    #[serde(default = "default_max_imbalance")]
    pub max_imbalance: f64,

    /// Perturbation: σ of the additive shock.
    #[serde(default = "default_perturbation_strength")]
    pub perturbation_strength: f64,

    /// Scale: ensemble sizes, each run with the same seeds.
    #[serde(default)]
    pub sizes: Vec<usize>,

    /// Parameter sweep: values of the transition's primary parameter.
    #[serde(default)]
    pub sweep: Vec<f64>,

    #[serde(default = "default_min_converged_fraction")]
    pub min_converged_fraction: f64,

    #[serde(default = "default_min_recovery")]
    pub min_recovery: f64,

    /// Null scenario to measure sigma separation against. Without one,
    /// the first null scenario sharing this scenario's observable is used.
    #[serde(default)]
    pub null_baseline: Option<String>,

    /// Scenarios sharing a cohort are ranked against each other by mean
    /// distance to their targets.
    #[serde(default)]
    pub cohort: Option<String>,
}

/// CLI-level overrides applied on top of suite definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioOverrides {
    pub iterations: Option<u64>,
    pub seeds: Option<usize>,
    pub particles: Option<usize>,
    pub tolerance: Option<f64>,
}

impl ScenarioSpec {
    pub fn new(
        name: impl Into<String>,
        kind: ScenarioKind,
        transition: Transition,
        extractor: Extractor,
        initial: InitialState,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            transition,
            extractor,
            initial,
            kernel: KernelConfig::default(),
            seed_start: 0,
            seed_count: default_seed_count(),
            target: None,
            tolerance: default_tolerance(),
            max_imbalance: default_max_imbalance(),
            perturbation_strength: default_perturbation_strength(),
            sizes: Vec::new(),
            sweep: Vec::new(),
            min_converged_fraction: default_min_converged_fraction(),
            min_recovery: default_min_recovery(),
            null_baseline: None,
            cohort: None,
        }
    }

    /// Both scenarios extract the same order parameter from states of the
    /// same shape, so their values can be compared.
    pub fn shares_observable(&self, other: &ScenarioSpec) -> bool {
        self.extractor == other.extractor && self.initial.same_shape(&other.initial)
    }

    pub fn seeds(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.seed_count as u64).map(move |i| self.seed_start + i)
    }

    /// Target used for verdicts.
    pub fn effective_target(&self) -> Option<f64> {
        if self.target.is_some() || self.kind != ScenarioKind::Null {
            return self.target;
        }
        match (&self.extractor.kind, &self.initial) {
            (ExtractorKind::VarianceRatio { observed }, InitialState::Ensemble { dims, .. }) => {
                Some(dimension_count_expectation(*observed, *dims))
            }
            _ => None,
        }
    }

    /// Kernel configuration actually handed to each run.
    ///
    /// The scenario target becomes the detector reference unless the
    /// stability settings name their own; perturbation runs get twice the
    /// budget with the shock in the middle.
    pub fn effective_kernel(&self) -> KernelConfig {
        let mut cfg = self.kernel.clone();
        if cfg.stability.target.is_none() {
            cfg.stability.target = self.effective_target();
        }
        if self.kind == ScenarioKind::Perturbation {
            cfg.max_iterations = cfg.max_iterations.saturating_mul(2);
        }
        cfg
    }

    /// Iteration before which the perturbation shock is injected.
    pub fn shock_iteration(&self) -> u64 {
        self.kernel.max_iterations + 1
    }

    /// Transitions run by this scenario, one per sweep point (a single
    /// entry for every other kind).
    pub fn transitions(&self) -> AttractorResult<Vec<(Option<f64>, Transition)>> {
        if self.kind != ScenarioKind::ParameterSweep {
            return Ok(vec![(None, self.transition.clone())]);
        }
        self.sweep
            .iter()
            .map(|&v| Ok((Some(v), self.transition.with_parameter(v)?)))
            .collect()
    }

    pub fn apply_overrides(&mut self, overrides: &ScenarioOverrides) {
        if let Some(it) = overrides.iterations {
            self.kernel.max_iterations = it;
            self.kernel.tail_window = self.kernel.tail_window.min(it as usize).max(1);
        }
        if let Some(seeds) = overrides.seeds {
            if self.kind != ScenarioKind::Scale {
                self.seed_count = seeds;
            }
        }
        if let Some(p) = overrides.particles {
            if let InitialState::Ensemble { particles, .. } = &mut self.initial {
                *particles = p;
            }
        }
        if let Some(t) = overrides.tolerance {
            self.tolerance = t;
            self.kernel.stability.tolerance = t;
        }
    }

    /// Eager validation; every failure is a `Config` error.
    pub fn validate(&self) -> AttractorResult<()> {
        let fail = |msg: String| Err(AttractorError::Config(format!("{}: {msg}", self.name)));

        if self.name.trim().is_empty() {
            return Err(AttractorError::Config("scenario name is empty".to_string()));
        }
        if self.seed_count == 0 {
            return fail("seed_count must be >= 1".to_string());
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return fail(format!("tolerance must be finite and > 0, got {}", self.tolerance));
        }
        if let Some(t) = self.target {
            if !(0.0..=1.0).contains(&t) {
                return fail(format!("target must be in [0, 1], got {t}"));
            }
        }
        if !(0.0..=1.0).contains(&self.min_converged_fraction) {
            return fail(format!(
                "min_converged_fraction must be in [0, 1], got {}",
                self.min_converged_fraction
            ));
        }
        if !self.min_recovery.is_finite() {
            return fail("min_recovery must be finite".to_string());
        }
        if self.kind == ScenarioKind::Null && self.null_baseline.is_some() {
            return fail("null scenarios cannot reference a null baseline".to_string());
        }

        self.initial.validate().map_err(|e| prefix(&self.name, e))?;
        self.transition.validate().map_err(|e| prefix(&self.name, e))?;
        self.extractor.validate().map_err(|e| prefix(&self.name, e))?;
        self.check_extractor_fits_initial()?;

        if self.kind != ScenarioKind::Null {
            self.effective_kernel()
                .validate()
                .map_err(|e| prefix(&self.name, e))?;
            self.check_transition_fits_initial()?;
        }

        match self.kind {
            ScenarioKind::Basin => {
                if !self.initial.is_ensemble() {
                    return fail("basin scenarios need an ensemble initial state".to_string());
                }
                if !(self.max_imbalance.is_finite() && self.max_imbalance >= 1.0) {
                    return fail(format!(
                        "max_imbalance must be finite and >= 1, got {}",
                        self.max_imbalance
                    ));
                }
            }
            ScenarioKind::Perturbation => {
                if self.effective_target().is_none() {
                    return fail("perturbation scenarios need a target".to_string());
                }
                if !(self.perturbation_strength.is_finite() && self.perturbation_strength >= 0.0) {
                    return fail(format!(
                        "perturbation_strength must be finite and >= 0, got {}",
                        self.perturbation_strength
                    ));
                }
            }
            ScenarioKind::Scale => {
                if !self.initial.is_ensemble() {
                    return fail("scale scenarios need an ensemble initial state".to_string());
                }
                if self.sizes.is_empty() || self.sizes.contains(&0) {
                    return fail("scale sizes must be non-empty and >= 1".to_string());
                }
            }
            ScenarioKind::ParameterSweep => {
                if self.effective_target().is_none() {
                    return fail("parameter sweeps need a target".to_string());
                }
                if self.sweep.is_empty() {
                    return fail("sweep grid is empty".to_string());
                }
                self.transitions().map_err(|e| prefix(&self.name, e))?;
            }
            ScenarioKind::Stability | ScenarioKind::Null => {}
        }
        Ok(())
    }

    fn check_extractor_fits_initial(&self) -> AttractorResult<()> {
        let ok = match (&self.extractor.kind, &self.initial) {
            (ExtractorKind::VarianceRatio { observed }, InitialState::Ensemble { dims, .. }) => {
                observed <= dims
            }
            (ExtractorKind::TopEigen { k }, init) => {
                init.matrix_size().is_some_and(|n| *k <= n)
            }
            (ExtractorKind::HarmonicSpectral { .. }, init) => init.is_matrix(),
            (ExtractorKind::Identity, InitialState::Scalar { .. }) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(AttractorError::Config(format!(
                "{}: {} extractor does not fit the initial state {:?}",
                self.name,
                self.extractor.name(),
                self.initial
            )))
        }
    }

    fn check_transition_fits_initial(&self) -> AttractorResult<()> {
        let ok = match &self.transition {
            Transition::SineMap { .. } => {
                self.initial.is_ensemble() || matches!(self.initial, InitialState::Scalar { .. })
            }
            Transition::CoupledSineMap { .. } => self.initial.is_ensemble(),
            Transition::ToroidalWinding { hierarchy, .. } => self
                .initial
                .matrix_size()
                .is_some_and(|n| hierarchy.len() + 1 >= n),
            Transition::ModularFlow { .. } | Transition::CirculantRecursion { .. } => {
                self.initial.is_matrix()
            }
            Transition::MirrorMap { .. } => matches!(self.initial, InitialState::Scalar { .. }),
            Transition::Frozen => true,
        };
        if ok {
            Ok(())
        } else {
            Err(AttractorError::Config(format!(
                "{}: {} transition does not fit the initial state {:?}",
                self.name,
                self.transition.name(),
                self.initial
            )))
        }
    }

    pub fn from_json(json: &str) -> AttractorResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AttractorError::Config(format!("scenario JSON parse error: {e}")))
    }

    /// Parse a JSON array of scenarios.
    pub fn list_from_json(json: &str) -> AttractorResult<Vec<Self>> {
        serde_json::from_str(json)
            .map_err(|e| AttractorError::Config(format!("scenario list JSON parse error: {e}")))
    }
}

fn prefix(name: &str, e: AttractorError) -> AttractorError {
    match e {
        AttractorError::Config(msg) => AttractorError::Config(format!("{name}: {msg}")),
        other => AttractorError::Config(format!("{name}: {other}")),
    }
}
