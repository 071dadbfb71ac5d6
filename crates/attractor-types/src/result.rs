// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Trajectory and Run Result Types
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// Clamp a ratio to [0, 1], mapping NaN to `fallback` and Inf to the
/// nearest bound.
#[inline]
pub fn clamp_ratio(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        log::warn!("clamp_ratio: NaN detected, using fallback {fallback:.4}");
        return fallback;
    }
    if value.is_infinite() {
        let boundary = if value > 0.0 { 1.0 } else { 0.0 };
        log::warn!("clamp_ratio: Inf detected, clamping to {boundary:.4}");
        return boundary;
    }
    value.clamp(0.0, 1.0)
}

/// Output of an order-parameter extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderParameter {
    /// Observed/total ratio in [0, 1] (or the extractor's fallback).
    pub ratio: f64,
    /// Weight of the dominant spectral mode, for spectral extractors.
    pub top_weight: Option<f64>,
}

impl OrderParameter {
    pub fn scalar(ratio: f64) -> Self {
        Self {
            ratio,
            top_weight: None,
        }
    }
}

/// Ordered order-parameter samples recorded by one run.
///
/// Sample `j` was taken after iteration `(j + 1) * stride`. There are no
/// mutators: samples are appended through a [`TrajectoryRecorder`] that is
/// consumed when the run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    stride: u64,
    samples: Vec<f64>,
}

impl Trajectory {
    /// Start recording a trajectory with the given stride.
    pub fn recorder(stride: u64, capacity: usize) -> TrajectoryRecorder {
        TrajectoryRecorder {
            inner: Trajectory {
                stride: stride.max(1),
                samples: Vec::with_capacity(capacity),
            },
        }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    /// Last `n` samples (fewer if the trajectory is shorter).
    pub fn tail(&self, n: usize) -> &[f64] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }

    /// Mean of the last `n` samples; `None` for an empty trajectory.
    pub fn tail_mean(&self, n: usize) -> Option<f64> {
        mean_of(self.tail(n))
    }

    /// Largest of the last `n` samples.
    pub fn tail_max(&self, n: usize) -> Option<f64> {
        self.tail(n).iter().copied().reduce(f64::max)
    }
}

/// Append-only handle used by the kernel while a run is in progress.
#[derive(Debug)]
pub struct TrajectoryRecorder {
    inner: Trajectory,
}

impl TrajectoryRecorder {
    pub fn push(&mut self, sample: f64) {
        self.inner.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.inner.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Freeze the trajectory.
    pub fn finish(self) -> Trajectory {
        self.inner
    }
}

/// Mean of a slice; `None` when empty.
pub fn mean_of(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Which condition ended a kernel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Detector reached `Converged` and the kernel was told to stop there.
    Converged,
    /// Iteration budget spent.
    BudgetExhausted,
}

/// Terminal scalars extracted from one completed trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub seed: u64,
    /// Order parameter of the final state.
    pub final_ratio: f64,
    /// Mean of the last `tail_window` samples.
    pub tail_mean: f64,
    /// Largest of the last `tail_window` samples.
    pub tail_max: f64,
    /// Accelerated (predicted) limit. Advisory, never a measurement.
    pub predicted: f64,
    /// Dominant-mode weight of the final state, for spectral extractors.
    pub top_weight: Option<f64>,
    /// Detector reached `Converged` at some point during the run.
    pub converged: bool,
    /// Longest run of consecutive in-band samples.
    pub longest_stable_run: usize,
    pub termination: Termination,
    pub iterations: u64,
    /// Eigenvalue floor clamps applied (recovered degenerate spectra).
    pub spectral_clamps: u64,
    /// Eigenvalues zeroed by the coherence filter.
    pub filtered_modes: u64,
    /// Population std of the final ensemble's per-dimension variances;
    /// zero for a perfectly balanced ensemble. `None` for other payloads.
    pub symmetry_error: Option<f64>,
    /// Order parameter right before a shock was injected.
    pub pre_shock_ratio: Option<f64>,
    /// Order parameter right after a shock was injected.
    pub shocked_ratio: Option<f64>,
}
