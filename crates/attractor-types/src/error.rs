// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all engine failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttractorError {
    /// A normalization denominator (trace, norm, total variance) fell
    /// below epsilon. Fatal to the run that hit it.
    #[error(
        "numerical collapse at iteration {iteration}: {quantity} = {value:e} < epsilon {epsilon:e}"
    )]
    NumericalCollapse {
        iteration: u64,
        quantity: String,
        value: f64,
        epsilon: f64,
    },

    /// A spectrum a spectral rule cannot work from: no eigenvalue mass at
    /// all, or eigenvectors the Hermitian solver could not separate.
    /// Non-positive eigenvalues before a logarithm are not reported here;
    /// they are floor-clamped and counted in `RunResult::spectral_clamps`.
    #[error("degenerate spectrum: {0}")]
    DegenerateSpectrum(String),

    /// Scenario or kernel parameters are inconsistent.
    #[error("config error: {0}")]
    Config(String),

    /// Payload shape does not match what the transition or extractor needs.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// NaN/Inf in a payload.
    #[error("numerical error: {0}")]
    Numerical(String),
}

impl AttractorError {
    /// True for the condition that marks a run invalid and sets the
    /// nonzero exit status of the driver.
    pub fn is_collapse(&self) -> bool {
        matches!(self, AttractorError::NumericalCollapse { .. })
    }
}

pub type AttractorResult<T> = Result<T, AttractorError>;
