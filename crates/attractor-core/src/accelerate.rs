// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Sequence Accelerator
// ─────────────────────────────────────────────────────────────────────
//! Aitken Δ² extrapolation of a trajectory's limit.
//!
//! Estimates are predictions. They are reported under a "predicted"
//! label and never substituted for measured tail means.

/// Second differences below this return the newest sample unchanged.
pub const AITKEN_DENOM_MIN: f64 = 1e-12;

/// s0 − (s1 − s0)² / (s2 − 2·s1 + s0).
#[inline]
pub fn aitken(s0: f64, s1: f64, s2: f64) -> f64 {
    let denom = s2 - 2.0 * s1 + s0;
    if denom.abs() < AITKEN_DENOM_MIN || !denom.is_finite() {
        return s2;
    }
    let d = s1 - s0;
    s0 - d * d / denom
}

/// Aitken over the last three samples.
///
/// Fewer than three samples → the last sample; empty → `None`.
pub fn estimate(seq: &[f64]) -> Option<f64> {
    match seq {
        [] => None,
        [.., s0, s1, s2] => Some(aitken(*s0, *s1, *s2)),
        [.., last] => Some(*last),
    }
}

/// Aitken over the means of the last three complete blocks of `block`
/// samples. With fewer than three blocks, the mean of the last block
/// (or of everything, if not even one block is complete).
pub fn estimate_blocks(seq: &[f64], block: usize) -> Option<f64> {
    if seq.is_empty() {
        return None;
    }
    let block = block.max(1);
    if block == 1 {
        return estimate(seq);
    }
    let complete = seq.len() / block;
    if complete == 0 {
        return Some(mean(seq));
    }
    let start = seq.len() - complete.min(3) * block;
    let means: Vec<f64> = seq[start..].chunks_exact(block).map(mean).collect();
    estimate(&means)
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}
