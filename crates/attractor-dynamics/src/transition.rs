// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Transition Rules
// ─────────────────────────────────────────────────────────────────────
//! Pure maps State → next State.
//!
//! Each rule consumes the state and returns the next one with the same
//! shape. Normalization is not applied here: every rule names a
//! [`NormPolicy`] and the kernel applies it after the step.
//!
//! Rules:
//!   - `SineMap`: x ← sin(g·x) on every ensemble entry
//!   - `CoupledSineMap`: mean-field coupled sine map with a noise floor
//!   - `ToroidalWinding`: eigenvalue-ratio recursion with a winding
//!     hierarchy and void repulsion on the innermost ratio
//!   - `ModularFlow`: ρ ↦ exp(−βK) with K = −ln ρ, ring mixing, dephasing
//!   - `CirculantRecursion`: element-wise sine plus a cyclic shift
//!   - `MirrorMap`: scalar sine map with reflection at 1 − floor

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use attractor_types::{AttractorError, AttractorResult};

use crate::matrix::ComplexMatrix;
use crate::params;
use crate::rng::SeededRng;
use crate::spectral::{
    clamp_to_floor, coherence_filter, reconstruct, HermitianEigen, SymmetricEigen, SPECTRAL_FLOOR,
};
use crate::state::{Payload, State};

/// Guard added to the innermost winding eigenvalue before division.
const WINDING_GUARD: f64 = 1e-12;

/// Post-step normalization applied by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormPolicy {
    /// Bounded maps: the norm is checked against the collapse epsilon but
    /// not rescaled.
    Guard,
    /// Matrix trace → 1.
    UnitTrace,
    /// Matrix Frobenius norm → 1.
    UnitFrobenius,
}

/// Per-step spectral bookkeeping reported back to the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepDiagnostics {
    /// Eigenvalues raised to the spectral floor.
    pub spectral_clamps: u64,
    /// Eigenvalues zeroed by the coherence filter.
    pub filtered_modes: u64,
}

pub trait Evolve {
    /// Advance one iteration. Shape must be preserved.
    fn evolve(
        &self,
        state: State,
        rng: &mut SeededRng,
        diag: &mut StepDiagnostics,
    ) -> AttractorResult<State>;

    fn norm_policy(&self) -> NormPolicy;
}

fn default_gain() -> f64 {
    params::DEFAULT_SINE_GAIN
}
fn default_goldilocks_coupling() -> f64 {
    params::GOLDILOCKS_COUPLING
}
fn default_winding_coupling() -> f64 {
    params::WINDING_COUPLING
}
fn default_void_bias() -> f64 {
    params::WINDING_VOID_BIAS
}
fn default_hierarchy() -> Vec<f64> {
    params::WINDING_HIERARCHY.to_vec()
}
fn default_beta() -> f64 {
    params::MODULAR_BETA
}
fn default_mixing_angle() -> f64 {
    params::MODULAR_MIXING_ANGLE
}
fn default_dephasing() -> f64 {
    params::MODULAR_DEPHASING
}
fn default_circulant_gain() -> f64 {
    params::CIRCULANT_GAIN
}
fn default_shift_coupling() -> f64 {
    params::CIRCULANT_SHIFT_COUPLING
}
fn default_trace_floor() -> f64 {
    params::MIRROR_TRACE_FLOOR
}
fn default_matter_bias() -> f64 {
    params::MIRROR_MATTER_BIAS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    SineMap {
        #[serde(default = "default_gain")]
        gain: f64,
    },
    CoupledSineMap {
        #[serde(default = "default_gain")]
        gain: f64,
        #[serde(default = "default_goldilocks_coupling")]
        coupling: f64,
        #[serde(default)]
        noise_floor: f64,
    },
    ToroidalWinding {
        #[serde(default = "default_winding_coupling")]
        coupling: f64,
        #[serde(default = "default_void_bias")]
        void_bias: f64,
        #[serde(default = "default_hierarchy")]
        hierarchy: Vec<f64>,
    },
    ModularFlow {
        #[serde(default = "default_beta")]
        beta: f64,
        #[serde(default = "default_mixing_angle")]
        mixing_angle: f64,
        #[serde(default = "default_dephasing")]
        dephasing: f64,
        #[serde(default)]
        filter_fraction: Option<f64>,
    },
    CirculantRecursion {
        #[serde(default = "default_circulant_gain")]
        gain: f64,
        #[serde(default = "default_shift_coupling")]
        shift_coupling: f64,
    },
    MirrorMap {
        scale: f64,
        #[serde(default = "default_trace_floor")]
        trace_floor: f64,
        #[serde(default = "default_matter_bias")]
        matter_bias: f64,
    },
    /// Identity map; the null scenario evolves nothing.
    Frozen,
}

impl Transition {
    pub fn sine_map() -> Self {
        Transition::SineMap {
            gain: params::DEFAULT_SINE_GAIN,
        }
    }

    /// Coupled sine map with noise σ = `GOLDILOCKS_NOISE_PER_DIM · dims`.
    pub fn goldilocks(dims: usize) -> Self {
        Transition::CoupledSineMap {
            gain: params::DEFAULT_SINE_GAIN,
            coupling: params::GOLDILOCKS_COUPLING,
            noise_floor: params::GOLDILOCKS_NOISE_PER_DIM * dims as f64,
        }
    }

    pub fn toroidal_winding() -> Self {
        Transition::ToroidalWinding {
            coupling: params::WINDING_COUPLING,
            void_bias: params::WINDING_VOID_BIAS,
            hierarchy: default_hierarchy(),
        }
    }

    pub fn modular_flow() -> Self {
        Transition::ModularFlow {
            beta: params::MODULAR_BETA,
            mixing_angle: params::MODULAR_MIXING_ANGLE,
            dephasing: params::MODULAR_DEPHASING,
            filter_fraction: None,
        }
    }

    pub fn circulant_recursion() -> Self {
        Transition::CirculantRecursion {
            gain: params::CIRCULANT_GAIN,
            shift_coupling: params::CIRCULANT_SHIFT_COUPLING,
        }
    }

    pub fn mirror(scale: f64) -> Self {
        Transition::MirrorMap {
            scale,
            trace_floor: params::MIRROR_TRACE_FLOOR,
            matter_bias: params::MIRROR_MATTER_BIAS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::SineMap { .. } => "sine_map",
            Transition::CoupledSineMap { .. } => "coupled_sine_map",
            Transition::ToroidalWinding { .. } => "toroidal_winding",
            Transition::ModularFlow { .. } => "modular_flow",
            Transition::CirculantRecursion { .. } => "circulant_recursion",
            Transition::MirrorMap { .. } => "mirror_map",
            Transition::Frozen => "frozen",
        }
    }

    /// Name of the parameter a sweep varies.
    pub fn parameter_name(&self) -> &'static str {
        match self {
            Transition::SineMap { .. } | Transition::CirculantRecursion { .. } => "gain",
            Transition::CoupledSineMap { .. } | Transition::ToroidalWinding { .. } => "coupling",
            Transition::ModularFlow { .. } => "beta",
            Transition::MirrorMap { .. } => "scale",
            Transition::Frozen => "none",
        }
    }

    pub fn primary_parameter(&self) -> Option<f64> {
        match self {
            Transition::SineMap { gain } => Some(*gain),
            Transition::CoupledSineMap { coupling, .. } => Some(*coupling),
            Transition::ToroidalWinding { coupling, .. } => Some(*coupling),
            Transition::ModularFlow { beta, .. } => Some(*beta),
            Transition::CirculantRecursion { gain, .. } => Some(*gain),
            Transition::MirrorMap { scale, .. } => Some(*scale),
            Transition::Frozen => None,
        }
    }

    /// Copy with the primary parameter replaced.
    pub fn with_parameter(&self, value: f64) -> AttractorResult<Self> {
        let mut next = self.clone();
        match &mut next {
            Transition::SineMap { gain } => *gain = value,
            Transition::CoupledSineMap { coupling, .. } => *coupling = value,
            Transition::ToroidalWinding { coupling, .. } => *coupling = value,
            Transition::ModularFlow { beta, .. } => *beta = value,
            Transition::CirculantRecursion { gain, .. } => *gain = value,
            Transition::MirrorMap { scale, .. } => *scale = value,
            Transition::Frozen => {
                return Err(AttractorError::Config(
                    "frozen transition has no parameter to sweep".to_string(),
                ))
            }
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> AttractorResult<()> {
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(AttractorError::Config(format!(
                    "{} {name} must be finite, got {v}",
                    self.name()
                )))
            }
        };
        match self {
            Transition::SineMap { gain } => finite("gain", *gain),
            Transition::CoupledSineMap {
                gain,
                coupling,
                noise_floor,
            } => {
                finite("gain", *gain)?;
                finite("coupling", *coupling)?;
                if !(noise_floor.is_finite() && *noise_floor >= 0.0) {
                    return Err(AttractorError::Config(format!(
                        "coupled_sine_map noise_floor must be >= 0, got {noise_floor}"
                    )));
                }
                Ok(())
            }
            Transition::ToroidalWinding {
                coupling,
                void_bias,
                hierarchy,
            } => {
                finite("coupling", *coupling)?;
                finite("void_bias", *void_bias)?;
                if hierarchy.is_empty() || hierarchy.iter().any(|h| !h.is_finite()) {
                    return Err(AttractorError::Config(
                        "toroidal_winding hierarchy must be non-empty and finite".to_string(),
                    ));
                }
                Ok(())
            }
            Transition::ModularFlow {
                beta,
                mixing_angle,
                dephasing,
                filter_fraction,
            } => {
                if !(beta.is_finite() && *beta > 0.0) {
                    return Err(AttractorError::Config(format!(
                        "modular_flow beta must be > 0, got {beta}"
                    )));
                }
                finite("mixing_angle", *mixing_angle)?;
                if !(0.0..=1.0).contains(dephasing) {
                    return Err(AttractorError::Config(format!(
                        "modular_flow dephasing must be in [0, 1], got {dephasing}"
                    )));
                }
                if let Some(f) = filter_fraction {
                    if !(0.0..1.0).contains(f) {
                        return Err(AttractorError::Config(format!(
                            "modular_flow filter_fraction must be in [0, 1), got {f}"
                        )));
                    }
                }
                Ok(())
            }
            Transition::CirculantRecursion {
                gain,
                shift_coupling,
            } => {
                finite("gain", *gain)?;
                finite("shift_coupling", *shift_coupling)
            }
            Transition::MirrorMap {
                scale,
                trace_floor,
                matter_bias,
            } => {
                if !(scale.is_finite() && *scale > 0.0) {
                    return Err(AttractorError::Config(format!(
                        "mirror_map scale must be finite and > 0, got {scale}"
                    )));
                }
                if !(*trace_floor > 0.0 && *trace_floor <= 1.0) {
                    return Err(AttractorError::Config(format!(
                        "mirror_map trace_floor must be in (0, 1], got {trace_floor}"
                    )));
                }
                finite("matter_bias", *matter_bias)
            }
            Transition::Frozen => Ok(()),
        }
    }
}

impl Evolve for Transition {
    fn evolve(
        &self,
        state: State,
        rng: &mut SeededRng,
        diag: &mut StepDiagnostics,
    ) -> AttractorResult<State> {
        match self {
            Transition::SineMap { gain } => sine_map(state, *gain),
            Transition::CoupledSineMap {
                gain,
                coupling,
                noise_floor,
            } => coupled_sine_map(state, *gain, *coupling, *noise_floor, rng),
            Transition::ToroidalWinding {
                coupling,
                void_bias,
                hierarchy,
            } => toroidal_winding(state, *coupling, *void_bias, hierarchy),
            Transition::ModularFlow {
                beta,
                mixing_angle,
                dephasing,
                filter_fraction,
            } => modular_flow(state, *beta, *mixing_angle, *dephasing, *filter_fraction, diag),
            Transition::CirculantRecursion {
                gain,
                shift_coupling,
            } => circulant_recursion(state, *gain, *shift_coupling),
            Transition::MirrorMap {
                scale,
                trace_floor,
                matter_bias,
            } => mirror_map(state, *scale, *trace_floor, *matter_bias),
            Transition::Frozen => Ok(state),
        }
    }

    fn norm_policy(&self) -> NormPolicy {
        match self {
            Transition::ToroidalWinding { .. } | Transition::ModularFlow { .. } => {
                NormPolicy::UnitTrace
            }
            Transition::CirculantRecursion { .. } => NormPolicy::UnitFrobenius,
            _ => NormPolicy::Guard,
        }
    }
}

fn wrong_payload(rule: &str, expected: &str, state: &State) -> AttractorError {
    AttractorError::Shape(format!(
        "{rule} needs a {expected} payload, state is {}",
        state.shape()
    ))
}

fn sine_map(mut state: State, gain: f64) -> AttractorResult<State> {
    match &mut state.payload {
        Payload::Ensemble(e) => {
            for x in e.data_mut() {
                *x = (gain * *x).sin();
            }
        }
        Payload::Scalar { value } => *value = (gain * *value).sin(),
        Payload::Matrix(_) => return Err(wrong_payload("sine_map", "ensemble or scalar", &state)),
    }
    Ok(state)
}

/// x'_rd = sin(g·x_rd + ε·(Σ_d' x_rd' − x_rd)) + σ·N(0, 1), all from the
/// pre-step particle.
fn coupled_sine_map(
    mut state: State,
    gain: f64,
    coupling: f64,
    noise_floor: f64,
    rng: &mut SeededRng,
) -> AttractorResult<State> {
    let Payload::Ensemble(e) = &mut state.payload else {
        return Err(wrong_payload("coupled_sine_map", "ensemble", &state));
    };
    let dims = e.dims();
    for row in e.data_mut().chunks_exact_mut(dims) {
        let sum: f64 = row.iter().sum();
        for x in row.iter_mut() {
            let interaction = coupling * (sum - *x);
            let noise = if noise_floor > 0.0 {
                noise_floor * rng.normal()
            } else {
                0.0
            };
            *x = (gain * *x + interaction).sin() + noise;
        }
    }
    Ok(state)
}

/// Eigenvalue-ratio recursion on the real part of the operator.
///
/// Eigenpairs are ordered by |λ| descending. With normalized magnitudes
/// e_0 ≥ … ≥ e_{n−1}, ratios r_k = e_k / e_{n−1} are updated in place
/// (Gauss-Seidel): r_k ← |sin(π r_k + c·h_k·(Σr − r_k))|. The innermost
/// ratio is pulled down by the void bias while below 1. The new spectrum
/// {r_0, …, r_{n−2}, 1}, sorted descending, is written back onto the
/// eigenvectors in their |λ| order.
fn toroidal_winding(
    mut state: State,
    coupling: f64,
    void_bias: f64,
    hierarchy: &[f64],
) -> AttractorResult<State> {
    let Payload::Matrix(m) = &state.payload else {
        return Err(wrong_payload("toroidal_winding", "matrix", &state));
    };
    let n = m.n();
    if n < 2 || hierarchy.len() < n - 1 {
        return Err(AttractorError::Shape(format!(
            "toroidal_winding needs n >= 2 and {} hierarchy levels, got n={n} with {}",
            n.saturating_sub(1),
            hierarchy.len()
        )));
    }

    let eig = SymmetricEigen::compute(&m.hermitian_part().real_part(), n)?;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eig.values[b]
            .abs()
            .partial_cmp(&eig.values[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mags: Vec<f64> = order.iter().map(|&k| eig.values[k].abs()).collect();
    let mass: f64 = mags.iter().sum();
    if !(mass >= WINDING_GUARD) {
        return Err(AttractorError::DegenerateSpectrum(format!(
            "toroidal_winding: spectral mass {mass:e} at iteration {}",
            state.iteration
        )));
    }
    let total = mass + WINDING_GUARD;
    let inner = mags[n - 1] / total + WINDING_GUARD;

    let mut r: Vec<f64> = mags[..n - 1].iter().map(|&e| (e / total) / inner).collect();
    for k in 0..r.len() {
        let others: f64 = r.iter().sum::<f64>() - r[k];
        r[k] = (PI * r[k] + coupling * hierarchy[k] * others).sin().abs();
    }
    let last = r.len() - 1;
    if r[last] < 1.0 {
        r[last] += void_bias * (r[last] - 1.0);
    }

    let mut spectrum = r;
    spectrum.push(1.0);
    spectrum.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut values = vec![0.0; n];
    for (slot, &k) in order.iter().enumerate() {
        values[k] = spectrum[slot];
    }
    let vectors = ComplexMatrix::from_real(n, &eig.vectors)?;
    state.payload = Payload::Matrix(reconstruct(&vectors, &values)?);
    Ok(state)
}

/// Ring mixing unitary exp(iθL) for the cycle-graph Laplacian L.
fn ring_unitary(n: usize, theta: f64) -> AttractorResult<ComplexMatrix> {
    let mut lap = vec![0.0; n * n];
    if n > 1 {
        for i in 0..n {
            lap[i * n + i] += 2.0;
            lap[i * n + (i + 1) % n] -= 1.0;
            lap[i * n + (i + n - 1) % n] -= 1.0;
        }
    }
    let eig = SymmetricEigen::compute(&lap, n)?;
    let phases: Vec<Complex64> = eig
        .values
        .iter()
        .map(|&mu| Complex64::from_polar(1.0, theta * mu))
        .collect();
    let mut u = ComplexMatrix::zeros(n);
    for i in 0..n {
        for j in 0..n {
            let mut acc = Complex64::new(0.0, 0.0);
            for (k, &ph) in phases.iter().enumerate() {
                acc += ph * (eig.vectors[i * n + k] * eig.vectors[j * n + k]);
            }
            u.set(i, j, acc);
        }
    }
    Ok(u)
}

/// ρ' = (1 − γ)·UσU† + γ·diag(UσU†) with σ = exp(−βK), K = −ln ρ.
fn modular_flow(
    mut state: State,
    beta: f64,
    mixing_angle: f64,
    dephasing: f64,
    filter_fraction: Option<f64>,
    diag: &mut StepDiagnostics,
) -> AttractorResult<State> {
    let Payload::Matrix(m) = &state.payload else {
        return Err(wrong_payload("modular_flow", "matrix", &state));
    };
    let n = m.n();
    let eig = HermitianEigen::compute(m)?;
    let mut values = eig.values;

    if let Some(fraction) = filter_fraction {
        diag.filtered_modes += coherence_filter(&mut values, fraction);
    }
    let clamped = clamp_to_floor(&mut values, SPECTRAL_FLOOR);
    if clamped > 0 {
        log::debug!(
            "modular_flow: {clamped} eigenvalue(s) raised to floor {SPECTRAL_FLOOR:e} at iteration {}",
            state.iteration
        );
    }
    diag.spectral_clamps += clamped;

    let weights: Vec<f64> = values.iter().map(|&lam| (beta * lam.ln()).exp()).collect();
    let sigma = reconstruct(&eig.vectors, &weights)?;
    let u = ring_unitary(n, mixing_angle)?;
    let mixed = u.matmul(&sigma)?.matmul(&u.adjoint())?;
    let next = mixed.blend(1.0 - dephasing, &mixed.diagonal_part(), dephasing)?;

    state.payload = Payload::Matrix(next);
    Ok(state)
}

/// X'_ij = sin(g·X_ij) + κ·X_{i,(j−1) mod n}.
fn circulant_recursion(mut state: State, gain: f64, shift_coupling: f64) -> AttractorResult<State> {
    let Payload::Matrix(m) = &state.payload else {
        return Err(wrong_payload("circulant_recursion", "matrix", &state));
    };
    let n = m.n();
    let mut next = ComplexMatrix::zeros(n);
    for i in 0..n {
        for j in 0..n {
            let shifted = m.get(i, (j + n - 1) % n);
            next.set(i, j, (m.get(i, j) * gain).sin() + shifted * shift_coupling);
        }
    }
    state.payload = Payload::Matrix(next);
    Ok(state)
}

/// s ← f·|sin(π(L + 1/L)·s + b)|, reflected to 1 − s when below 1 − f.
fn mirror_map(
    mut state: State,
    scale: f64,
    trace_floor: f64,
    matter_bias: f64,
) -> AttractorResult<State> {
    let Payload::Scalar { value } = &mut state.payload else {
        return Err(wrong_payload("mirror_map", "scalar", &state));
    };
    let phase = PI * (scale + 1.0 / scale);
    let mut s = trace_floor * (phase * *value + matter_bias).sin().abs();
    if s < 1.0 - trace_floor {
        s = 1.0 - s;
    }
    *value = s;
    Ok(state)
}
