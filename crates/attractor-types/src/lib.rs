// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Shared Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, kernel configuration, and error hierarchy shared by
//! the dynamics, kernel, and harness crates.

pub mod config;
pub mod error;
pub mod result;

pub use config::{KernelConfig, StabilityConfig};
pub use error::{AttractorError, AttractorResult};
pub use result::{
    clamp_ratio, mean_of, OrderParameter, RunResult, Termination, Trajectory, TrajectoryRecorder,
};
