// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Validation Harness
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Scenario specs, parallel run orchestration, aggregation, and the
//! built-in suites.
//!
//! Pipeline: `ScenarioSpec` → runs (rayon) → `RunRecord` → `Summary`
//! → `HarnessReport`.

pub mod harness;
pub mod report;
pub mod scenario;
pub mod stats;
pub mod suites;
pub mod summary;

pub use harness::{Harness, HarnessConfig, RunRecord};
pub use report::{HarnessReport, RunFailure, RunTrajectory, ScenarioError, SummaryRecord};
pub use scenario::{InitialState, ScenarioKind, ScenarioOverrides, ScenarioSpec};
pub use suites::{suite, SUITE_NAMES};
pub use summary::{CohortSelection, GridPoint, NullBaseline, ScenarioDetail, Summary};
