// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Kernel Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{AttractorError, AttractorResult};

/// Stability-window settings for the convergence detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Band half-width: a sample counts as stable when
    /// `|sample - reference| < tolerance`.
    /// Default: 0.01.
    pub tolerance: f64,

    /// Consecutive stable samples needed to declare convergence.
    /// Default: 10.
    pub required_run: usize,

    /// Fixed reference value. When `None` the detector tracks the
    /// accelerated estimate of its own block means.
    pub target: Option<f64>,

    /// Block length (in samples) between reference re-estimates when no
    /// target is supplied.
    /// Default: 25.
    pub reestimate_every: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            required_run: 10,
            target: None,
            reestimate_every: 25,
        }
    }
}

/// Per-run configuration copied into every kernel invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Iteration budget.
    /// Default: 800.
    pub max_iterations: u64,

    /// Record one trajectory sample every `sample_stride` iterations.
    /// Default: 1.
    pub sample_stride: u64,

    /// Normalization denominators below this abort the run.
    /// Default: 1e-10.
    pub collapse_epsilon: f64,

    /// End the run as soon as the detector reports `Converged`.
    /// Default: false (the harness measures over the full budget).
    pub stop_on_convergence: bool,

    /// Samples averaged into the run's tail mean.
    /// Default: 100.
    pub tail_window: usize,

    /// Block length used when extrapolating the predicted limit.
    /// 1 applies Aitken to the raw last three samples.
    /// Default: 1.
    pub accel_block: usize,

    pub stability: StabilityConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_iterations: 800,
            sample_stride: 1,
            collapse_epsilon: 1e-10,
            stop_on_convergence: false,
            tail_window: 100,
            accel_block: 1,
            stability: StabilityConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Maximum number of trajectory samples a run can record.
    pub fn sample_capacity(&self) -> usize {
        if self.sample_stride == 0 {
            return 0;
        }
        (self.max_iterations / self.sample_stride) as usize
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> AttractorResult<()> {
        if self.max_iterations == 0 {
            return Err(AttractorError::Config(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if self.sample_stride == 0 || self.sample_stride > self.max_iterations {
            return Err(AttractorError::Config(format!(
                "sample_stride must be in [1, {}], got {}",
                self.max_iterations, self.sample_stride
            )));
        }
        if !(self.collapse_epsilon.is_finite() && self.collapse_epsilon > 0.0) {
            return Err(AttractorError::Config(format!(
                "collapse_epsilon must be finite and > 0, got {}",
                self.collapse_epsilon
            )));
        }
        if self.tail_window == 0 {
            return Err(AttractorError::Config(
                "tail_window must be >= 1".to_string(),
            ));
        }
        if self.accel_block == 0 {
            return Err(AttractorError::Config(
                "accel_block must be >= 1".to_string(),
            ));
        }

        let st = &self.stability;
        if !(st.tolerance.is_finite() && st.tolerance > 0.0) {
            return Err(AttractorError::Config(format!(
                "stability tolerance must be finite and > 0, got {}",
                st.tolerance
            )));
        }
        if st.required_run == 0 {
            return Err(AttractorError::Config(
                "stability required_run must be >= 1".to_string(),
            ));
        }
        if st.required_run > self.sample_capacity() {
            return Err(AttractorError::Config(format!(
                "stability threshold {} exceeds the {} samples the iteration budget can record",
                st.required_run,
                self.sample_capacity()
            )));
        }
        if st.reestimate_every == 0 {
            return Err(AttractorError::Config(
                "stability reestimate_every must be >= 1".to_string(),
            ));
        }
        if let Some(t) = st.target {
            if !(0.0..=1.0).contains(&t) {
                return Err(AttractorError::Config(format!(
                    "stability target must be in [0, 1], got {t}"
                )));
            }
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> AttractorResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AttractorError::Config(format!("JSON parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(KernelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let cfg = KernelConfig {
            max_iterations: 0,
            ..KernelConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AttractorError::Config(_))));
    }

    #[test]
    fn test_threshold_exceeding_budget_rejected() {
        let cfg = KernelConfig {
            max_iterations: 20,
            sample_stride: 4,
            stability: StabilityConfig {
                required_run: 6,
                ..StabilityConfig::default()
            },
            ..KernelConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn test_target_outside_unit_interval_rejected() {
        let cfg = KernelConfig {
            stability: StabilityConfig {
                target: Some(1.5),
                ..StabilityConfig::default()
            },
            ..KernelConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sample_capacity() {
        let cfg = KernelConfig {
            max_iterations: 100,
            sample_stride: 3,
            ..KernelConfig::default()
        };
        assert_eq!(cfg.sample_capacity(), 33);
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let cfg = KernelConfig::from_json(r#"{"max_iterations": 50, "tail_window": 5}"#).unwrap();
        assert_eq!(cfg.max_iterations, 50);
        assert_eq!(cfg.tail_window, 5);
        assert_eq!(cfg.sample_stride, 1);
        assert_eq!(cfg.stability.required_run, 10);
    }

    #[test]
    fn test_from_json_garbage() {
        assert!(KernelConfig::from_json("{not json").is_err());
    }
}
