// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Core
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Evolution kernel, convergence detector, and Aitken sequence
//! accelerator.

pub mod accelerate;
pub mod convergence;
pub mod kernel;

pub use accelerate::{aitken, estimate, estimate_blocks};
pub use convergence::{ConvergenceDetector, Phase};
pub use kernel::{
    EvolutionKernel, KernelHook, NoHook, ProgressHook, RunOutcome, ShockInjector, ShockReading,
};
