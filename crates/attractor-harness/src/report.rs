// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Harness Report
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use attractor_types::{AttractorError, AttractorResult, Trajectory};

use crate::scenario::ScenarioKind;
use crate::summary::{CohortSelection, ScenarioDetail, Summary};

/// A scenario rejected before any of its runs started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioError {
    pub scenario: String,
    pub message: String,
}

/// A run that aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub scenario: String,
    pub seed: u64,
    pub group: Option<f64>,
    pub message: String,
    /// Aborted with `NumericalCollapse`.
    pub collapse: bool,
}

/// Raw trajectory of one completed run, for external plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrajectory {
    pub seed: u64,
    pub group: Option<f64>,
    pub trajectory: Trajectory,
}

/// Per-scenario entry of the structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub kind: ScenarioKind,
    pub target: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub convergence_rate: f64,
    pub deviation: Option<f64>,
    pub mean_abs_deviation: Option<f64>,
    pub sigma_separation: Option<f64>,
    pub null_scenario: Option<String>,
    /// Accelerated (Aitken) estimate, not an observation.
    pub predicted_mean: Option<f64>,
    pub mean_top_weight: Option<f64>,
    pub mean_symmetry_error: Option<f64>,
    pub cohort: Option<String>,
    pub runs: usize,
    pub failed_runs: usize,
    pub skipped_runs: usize,
    pub passed: bool,
    pub detail: ScenarioDetail,
}

impl From<&Summary> for SummaryRecord {
    fn from(s: &Summary) -> Self {
        Self {
            kind: s.kind,
            target: s.target,
            mean: s.mean,
            std: s.std,
            convergence_rate: s.convergence_rate,
            deviation: s.deviation,
            mean_abs_deviation: s.mean_abs_deviation,
            sigma_separation: s.sigma_separation,
            null_scenario: s.null_scenario.clone(),
            predicted_mean: s.predicted_mean,
            mean_top_weight: s.mean_top_weight,
            mean_symmetry_error: s.mean_symmetry_error,
            cohort: s.cohort.clone(),
            runs: s.runs,
            failed_runs: s.failed_runs,
            skipped_runs: s.skipped_runs,
            passed: s.passed,
            detail: s.detail.clone(),
        }
    }
}

#[derive(Serialize)]
struct StructuredReport<'a> {
    scenarios: BTreeMap<String, SummaryRecord>,
    errors: &'a [ScenarioError],
    failures: &'a [RunFailure],
    #[serde(skip_serializing_if = "no_cohorts")]
    cohorts: &'a [CohortSelection],
    #[serde(skip_serializing_if = "no_trajectories")]
    trajectories: &'a BTreeMap<String, Vec<RunTrajectory>>,
    elapsed_s: f64,
}

fn no_cohorts(c: &&[CohortSelection]) -> bool {
    c.is_empty()
}

fn no_trajectories(t: &&BTreeMap<String, Vec<RunTrajectory>>) -> bool {
    t.is_empty()
}

/// Everything one `Harness::run` produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarnessReport {
    /// In execution order (null scenarios first).
    pub summaries: Vec<Summary>,
    pub errors: Vec<ScenarioError>,
    pub failures: Vec<RunFailure>,
    /// Best member of every cohort that ran.
    pub cohorts: Vec<CohortSelection>,
    /// Keyed by scenario name; empty unless `keep_trajectories` is set.
    pub trajectories: BTreeMap<String, Vec<RunTrajectory>>,
    pub elapsed_s: f64,
}

impl HarnessReport {
    pub fn summary(&self, scenario: &str) -> Option<&Summary> {
        self.summaries.iter().find(|s| s.scenario == scenario)
    }

    pub fn collapsed_runs(&self) -> usize {
        self.failures.iter().filter(|f| f.collapse).count()
    }

    pub fn has_collapse(&self) -> bool {
        self.collapsed_runs() > 0
    }

    pub fn has_config_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn all_passed(&self) -> bool {
        self.errors.is_empty() && self.summaries.iter().all(|s| s.passed)
    }

    pub fn to_structured(&self) -> BTreeMap<String, SummaryRecord> {
        self.summaries
            .iter()
            .map(|s| (s.scenario.clone(), SummaryRecord::from(s)))
            .collect()
    }

    /// Structured output plus errors, failures and any kept trajectories.
    pub fn to_json(&self) -> AttractorResult<String> {
        let doc = StructuredReport {
            scenarios: self.to_structured(),
            errors: &self.errors,
            failures: &self.failures,
            cohorts: &self.cohorts,
            trajectories: &self.trajectories,
            elapsed_s: self.elapsed_s,
        };
        serde_json::to_string_pretty(&doc)
            .map_err(|e| AttractorError::Numerical(format!("report serialization failed: {e}")))
    }

    /// Fixed-width summary table.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<28} {:<13} {:>10} {:>10} {:>8} {:>6} {:>8} {:>7}  {}",
            "scenario", "kind", "mean", "std", "target", "rate", "sigma", "runs", "verdict"
        );
        let _ = writeln!(out, "{}", "-".repeat(104));
        for s in &self.summaries {
            let runs = if s.failed_runs + s.skipped_runs > 0 {
                format!(
                    "{}/{}",
                    s.runs - s.failed_runs - s.skipped_runs,
                    s.runs
                )
            } else {
                s.runs.to_string()
            };
            let _ = writeln!(
                out,
                "{:<28} {:<13} {:>10} {:>10} {:>8} {:>6.3} {:>8} {:>7}  {}",
                s.scenario,
                s.kind.to_string(),
                fmt_opt(s.mean, 6),
                fmt_sci(s.std),
                fmt_opt(s.target, 4),
                s.convergence_rate,
                fmt_opt(s.sigma_separation, 1),
                runs,
                if s.passed { "PASS" } else { "FAIL" }
            );
        }
        for c in &self.cohorts {
            let _ = writeln!(
                out,
                "cohort {}: best {} (mean |delta| {}) of {}",
                c.cohort,
                c.best.as_deref().unwrap_or("-"),
                fmt_sci(c.best_mean_abs_deviation),
                c.members.join(", ")
            );
        }
        for e in &self.errors {
            let _ = writeln!(out, "{:<28} {:<13} {}", e.scenario, "rejected", e.message);
        }
        if !self.failures.is_empty() {
            let _ = writeln!(
                out,
                "{} run(s) aborted, {} by numerical collapse",
                self.failures.len(),
                self.collapsed_runs()
            );
        }
        let _ = writeln!(out, "elapsed {:.2}s", self.elapsed_s);
        out
    }
}

fn fmt_opt(v: Option<f64>, precision: usize) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.precision$}"))
}

fn fmt_sci(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.2e}"))
}
