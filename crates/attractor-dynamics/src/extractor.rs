// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Order-Parameter Extractors
// ─────────────────────────────────────────────────────────────────────
//! Pure maps State → ratio in [0, 1].
//!
//! Extractors never know the target. A denominator below `epsilon`
//! returns the configured `fallback`; everything else is clamped.

use serde::{Deserialize, Serialize};

use attractor_types::{clamp_ratio, AttractorError, AttractorResult, OrderParameter};

use crate::spectral::{spectral_weights, HermitianEigen};
use crate::state::{Payload, State};

pub trait Extract {
    fn extract(&self, state: &State) -> AttractorResult<OrderParameter>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Σ var(first `observed` dims) / Σ var(all dims).
    VarianceRatio { observed: usize },
    /// Σ top-k |λ| / Σ |λ| of the Hermitian part.
    TopEigen { k: usize },
    /// n_f² / Σ 1/p_i over weights p_i ≥ `floor_fraction`.
    HarmonicSpectral { floor_fraction: f64 },
    /// Scalar payload, clamped.
    Identity,
}

fn default_epsilon() -> f64 {
    1e-10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extractor {
    #[serde(flatten)]
    pub kind: ExtractorKind,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub fallback: f64,
}

impl Extractor {
    pub fn new(kind: ExtractorKind) -> Self {
        Self {
            kind,
            epsilon: default_epsilon(),
            fallback: 0.0,
        }
    }

    pub fn variance_ratio(observed: usize) -> Self {
        Self::new(ExtractorKind::VarianceRatio { observed })
    }

    pub fn top_eigen(k: usize) -> Self {
        Self::new(ExtractorKind::TopEigen { k })
    }

    pub fn harmonic(floor_fraction: f64) -> Self {
        Self::new(ExtractorKind::HarmonicSpectral { floor_fraction })
    }

    pub fn identity() -> Self {
        Self::new(ExtractorKind::Identity)
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ExtractorKind::VarianceRatio { .. } => "variance_ratio",
            ExtractorKind::TopEigen { .. } => "top_eigen",
            ExtractorKind::HarmonicSpectral { .. } => "harmonic_spectral",
            ExtractorKind::Identity => "identity",
        }
    }

    pub fn validate(&self) -> AttractorResult<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(AttractorError::Config(format!(
                "extractor epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.fallback) {
            return Err(AttractorError::Config(format!(
                "extractor fallback must be in [0, 1], got {}",
                self.fallback
            )));
        }
        match self.kind {
            ExtractorKind::VarianceRatio { observed } if observed == 0 => Err(
                AttractorError::Config("variance_ratio observed must be >= 1".to_string()),
            ),
            ExtractorKind::TopEigen { k } if k == 0 => Err(AttractorError::Config(
                "top_eigen k must be >= 1".to_string(),
            )),
            ExtractorKind::HarmonicSpectral { floor_fraction }
                if !(0.0..1.0).contains(&floor_fraction) =>
            {
                Err(AttractorError::Config(format!(
                    "harmonic_spectral floor_fraction must be in [0, 1), got {floor_fraction}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn extract_top_eigen(&self, state: &State, k: usize) -> AttractorResult<OrderParameter> {
        let Payload::Matrix(m) = &state.payload else {
            return Err(payload_error("top_eigen", "matrix", state));
        };
        if k > m.n() {
            return Err(AttractorError::Shape(format!(
                "top_eigen k={k} exceeds matrix size {}",
                m.n()
            )));
        }
        let mut mags: Vec<f64> = HermitianEigen::compute(m)?
            .values
            .iter()
            .map(|v| v.abs())
            .collect();
        mags.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let total: f64 = mags.iter().sum();
        if !(total >= self.epsilon) {
            return Ok(OrderParameter::scalar(self.fallback));
        }
        let top: f64 = mags[..k].iter().sum();
        Ok(OrderParameter {
            ratio: clamp_ratio(top / total, self.fallback),
            top_weight: Some(clamp_ratio(mags[0] / total, self.fallback)),
        })
    }

    fn extract_harmonic(&self, state: &State, floor_fraction: f64) -> AttractorResult<OrderParameter> {
        let Payload::Matrix(m) = &state.payload else {
            return Err(payload_error("harmonic_spectral", "matrix", state));
        };
        let values = HermitianEigen::compute(m)?.values;
        let Some(weights) = spectral_weights(&values, self.epsilon) else {
            return Ok(OrderParameter::scalar(self.fallback));
        };
        let kept: Vec<f64> = weights
            .iter()
            .copied()
            .filter(|&p| p > 0.0 && p >= floor_fraction)
            .collect();
        let inverse_sum: f64 = kept.iter().map(|p| 1.0 / p).sum();
        if kept.is_empty() || !(inverse_sum >= self.epsilon) {
            return Ok(OrderParameter::scalar(self.fallback));
        }
        let nf = kept.len() as f64;
        let top = weights.iter().copied().fold(0.0, f64::max);
        Ok(OrderParameter {
            ratio: clamp_ratio(nf * nf / inverse_sum, self.fallback),
            top_weight: Some(top),
        })
    }
}

impl Extract for Extractor {
    fn extract(&self, state: &State) -> AttractorResult<OrderParameter> {
        match self.kind {
            ExtractorKind::VarianceRatio { observed } => {
                let Payload::Ensemble(e) = &state.payload else {
                    return Err(payload_error("variance_ratio", "ensemble", state));
                };
                if observed > e.dims() {
                    return Err(AttractorError::Shape(format!(
                        "variance_ratio observes {observed} of {} dims",
                        e.dims()
                    )));
                }
                Ok(OrderParameter::scalar(variance_ratio(
                    &e.column_variances(),
                    observed,
                    self.epsilon,
                    self.fallback,
                )))
            }
            ExtractorKind::TopEigen { k } => self.extract_top_eigen(state, k),
            ExtractorKind::HarmonicSpectral { floor_fraction } => {
                self.extract_harmonic(state, floor_fraction)
            }
            ExtractorKind::Identity => match state.payload {
                Payload::Scalar { value } => {
                    Ok(OrderParameter::scalar(clamp_ratio(value, self.fallback)))
                }
                _ => Err(payload_error("identity", "scalar", state)),
            },
        }
    }
}

fn payload_error(extractor: &str, expected: &str, state: &State) -> AttractorError {
    AttractorError::Shape(format!(
        "{extractor} extractor needs a {expected} payload, state is {}",
        state.shape()
    ))
}

/// Σ variances[..observed] / Σ variances, or `fallback` when the total
/// is below `epsilon`.
pub fn variance_ratio(variances: &[f64], observed: usize, epsilon: f64, fallback: f64) -> f64 {
    let total: f64 = variances.iter().sum();
    if !(total >= epsilon) {
        return fallback;
    }
    let observed: f64 = variances[..observed.min(variances.len())].iter().sum();
    clamp_ratio(observed / total, fallback)
}
