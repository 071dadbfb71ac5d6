// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Convergence Detector
// ─────────────────────────────────────────────────────────────────────
//! Stability-window state machine over trajectory samples.
//!
//! ```text
//! Seeking ──in band──▶ Stabilizing ──run ≥ required──▶ Converged
//!    ▲                     │
//!    └──────excursion──────┘          finish() ──▶ Exhausted
//! ```
//!
//! The reference is either a fixed target or, without one, the Aitken
//! estimate over the last three block means, refreshed every
//! `reestimate_every` samples. Nothing is counted before the first
//! reference exists. Run statistics keep accumulating after
//! `Converged` so the longest stable run covers the whole trajectory.

use serde::{Deserialize, Serialize};

use attractor_types::StabilityConfig;

use crate::accelerate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Seeking,
    Stabilizing,
    /// Terminal.
    Converged,
    /// Terminal: budget ran out before convergence.
    Exhausted,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Converged | Phase::Exhausted)
    }
}

#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    tolerance: f64,
    required_run: usize,
    target: Option<f64>,
    block: usize,
    phase: Phase,
    reference: Option<f64>,
    run: usize,
    longest: usize,
    observed: usize,
    converged_at: Option<usize>,
    recent: Vec<f64>,
}

impl ConvergenceDetector {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            required_run: config.required_run.max(1),
            target: config.target,
            block: config.reestimate_every.max(1),
            phase: Phase::Seeking,
            reference: config.target,
            run: 0,
            longest: 0,
            observed: 0,
            converged_at: None,
            recent: Vec::new(),
        }
    }

    /// Feed one sample; returns the phase after it.
    pub fn observe(&mut self, sample: f64) -> Phase {
        if self.phase == Phase::Exhausted {
            return self.phase;
        }
        self.observed += 1;

        if self.target.is_none() {
            self.recent.push(sample);
            let keep = 3 * self.block;
            if self.recent.len() > keep {
                let excess = self.recent.len() - keep;
                self.recent.drain(..excess);
            }
            if self.observed % self.block == 0 {
                self.reference = accelerate::estimate_blocks(&self.recent, self.block);
            }
        }

        let Some(reference) = self.reference else {
            return self.phase;
        };

        if (sample - reference).abs() < self.tolerance {
            self.run += 1;
            self.longest = self.longest.max(self.run);
            if self.phase != Phase::Converged {
                if self.run >= self.required_run {
                    self.phase = Phase::Converged;
                    self.converged_at = Some(self.observed);
                } else {
                    self.phase = Phase::Stabilizing;
                }
            }
        } else {
            self.run = 0;
            if self.phase != Phase::Converged {
                self.phase = Phase::Seeking;
            }
        }
        self.phase
    }

    /// Close the trajectory: anything short of `Converged` is `Exhausted`.
    pub fn finish(&mut self) -> Phase {
        if self.phase != Phase::Converged {
            self.phase = Phase::Exhausted;
        }
        self.phase
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_converged(&self) -> bool {
        self.phase == Phase::Converged
    }

    /// Current reference value, if any.
    pub fn reference(&self) -> Option<f64> {
        self.reference
    }

    pub fn current_run(&self) -> usize {
        self.run
    }

    pub fn longest_run(&self) -> usize {
        self.longest
    }

    /// 1-based sample count at which `Converged` was reached.
    pub fn converged_at(&self) -> Option<usize> {
        self.converged_at
    }

    pub fn samples_observed(&self) -> usize {
        self.observed
    }
}
