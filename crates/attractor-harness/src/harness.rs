// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Validation Harness
// ─────────────────────────────────────────────────────────────────────
//! Scenario orchestration: validate every spec, fan its runs out over
//! rayon, aggregate, and collect everything into a `HarnessReport`.
//!
//! A run is one (seed, grid point) pair. Each run owns its state, its
//! trajectory and a `SeededRng` seeded from the run's seed, so results
//! are identical for any thread count. Null scenarios run first so that
//! every later summary can report its separation from a baseline of the
//! same observable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use attractor_core::{EvolutionKernel, KernelHook, ProgressHook, ShockInjector};
use attractor_dynamics::{Extract, SeededRng, State, Transition};
use attractor_types::{
    AttractorError, AttractorResult, KernelConfig, RunResult, Termination, Trajectory,
};

use crate::report::{HarnessReport, RunFailure, RunTrajectory, ScenarioError};
use crate::scenario::{InitialState, ScenarioKind, ScenarioSpec};
use crate::summary::{select_cohorts, summarize, NullBaseline};

/// Harness-wide limits and output options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Runs dispatched after this many seconds are skipped.
    pub max_wall_clock_s: Option<f64>,
    /// Runs dispatched after this many kernel iterations are skipped.
    pub max_total_iterations: Option<u64>,
    /// Keep per-run trajectories in the report.
    pub keep_trajectories: bool,
    /// Log a progress line every N iterations of every run (0 = off).
    pub progress_every: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_wall_clock_s: None,
            max_total_iterations: None,
            keep_trajectories: false,
            progress_every: 0,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> AttractorResult<()> {
        if let Some(s) = self.max_wall_clock_s {
            if !(s.is_finite() && s > 0.0) {
                return Err(AttractorError::Config(format!(
                    "max_wall_clock_s must be finite and > 0, got {s}"
                )));
            }
        }
        if self.max_total_iterations == Some(0) {
            return Err(AttractorError::Config(
                "max_total_iterations must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> AttractorResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AttractorError::Config(format!("harness JSON parse error: {e}")))
    }
}

/// Outcome of one run as seen by the aggregator.
#[derive(Debug, Clone)]
pub enum RunRecord {
    Completed {
        /// Ensemble size (scale) or parameter value (sweep).
        group: Option<f64>,
        result: RunResult,
        trajectory: Option<Trajectory>,
    },
    Failed {
        group: Option<f64>,
        seed: u64,
        error: AttractorError,
    },
    Skipped {
        group: Option<f64>,
        seed: u64,
    },
}

/// One unit of parallel work.
struct Job<'a> {
    seed: u64,
    group: Option<f64>,
    particles: Option<usize>,
    transition: &'a Transition,
}

/// Shared wall-clock and iteration caps.
struct Budget {
    started: Instant,
    max_wall: Option<Duration>,
    max_iterations: Option<u64>,
    spent: AtomicU64,
    tripped: AtomicBool,
}

impl Budget {
    fn new(config: &HarnessConfig, started: Instant) -> Self {
        Self {
            started,
            max_wall: config.max_wall_clock_s.map(Duration::from_secs_f64),
            max_iterations: config.max_total_iterations,
            spent: AtomicU64::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    /// Reserve `cost` iterations; false once either cap has been hit.
    fn admit(&self, cost: u64) -> bool {
        if self.tripped.load(Ordering::Relaxed) {
            return false;
        }
        if let Some(limit) = self.max_wall {
            if self.started.elapsed() >= limit {
                self.trip("wall-clock");
                return false;
            }
        }
        if let Some(cap) = self.max_iterations {
            let before = self.spent.fetch_add(cost, Ordering::Relaxed);
            if before >= cap {
                self.trip("iteration");
                return false;
            }
        }
        true
    }

    fn trip(&self, which: &str) {
        if !self.tripped.swap(true, Ordering::Relaxed) {
            log::warn!("{which} cap reached; remaining runs are skipped");
        }
    }
}

pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> AttractorResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every scenario. Invalid scenarios are reported in
    /// `HarnessReport::errors` and skipped; failing runs never abort the
    /// harness.
    pub fn run(&self, specs: &[ScenarioSpec]) -> HarnessReport {
        let started = Instant::now();
        let budget = Budget::new(&self.config, started);
        let mut report = HarnessReport::default();

        let mut valid: Vec<&ScenarioSpec> = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let duplicate = specs[..i].iter().any(|s| s.name == spec.name);
            let checked = if duplicate {
                Err(AttractorError::Config(format!(
                    "duplicate scenario name '{}'",
                    spec.name
                )))
            } else {
                spec.validate().and_then(|()| check_null_reference(spec, specs))
            };
            match checked {
                Ok(()) => valid.push(spec),
                Err(e) => {
                    log::error!("scenario '{}' rejected: {e}", spec.name);
                    report.errors.push(ScenarioError {
                        scenario: spec.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        valid.sort_by_key(|s| s.kind != ScenarioKind::Null);

        let mut nulls: Vec<(&ScenarioSpec, NullBaseline)> = Vec::new();
        for spec in valid {
            let records = match self.run_scenario(spec, &budget) {
                Ok(records) => records,
                Err(e) => {
                    log::error!("scenario '{}' rejected: {e}", spec.name);
                    report.errors.push(ScenarioError {
                        scenario: spec.name.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let summary = summarize(spec, &records, baseline_for(spec, &nulls));
            if spec.kind == ScenarioKind::Null {
                if let Some(base) = summary.baseline() {
                    nulls.push((spec, base));
                }
            }
            log::info!(
                "scenario '{}' ({}): mean={} rate={:.3} failed={} skipped={} -> {}",
                summary.scenario,
                summary.kind,
                summary
                    .mean
                    .map_or_else(|| "-".to_string(), |m| format!("{m:.6}")),
                summary.convergence_rate,
                summary.failed_runs,
                summary.skipped_runs,
                if summary.passed { "PASS" } else { "FAIL" }
            );
            report.summaries.push(summary);
            self.collect_runs(spec, records, &mut report);
        }

        report.cohorts = select_cohorts(&report.summaries);
        for c in &report.cohorts {
            if let (Some(best), Some(d)) = (&c.best, c.best_mean_abs_deviation) {
                log::info!(
                    "cohort '{}': best of {} is '{best}' (mean |delta| {d:.3e})",
                    c.cohort,
                    c.members.len()
                );
            }
        }
        report.elapsed_s = started.elapsed().as_secs_f64();
        report
    }

    fn collect_runs(&self, spec: &ScenarioSpec, records: Vec<RunRecord>, report: &mut HarnessReport) {
        for record in records {
            match record {
                RunRecord::Completed {
                    group,
                    result,
                    trajectory: Some(trajectory),
                } => report
                    .trajectories
                    .entry(spec.name.clone())
                    .or_default()
                    .push(RunTrajectory {
                        seed: result.seed,
                        group,
                        trajectory,
                    }),
                RunRecord::Failed { group, seed, error } => report.failures.push(RunFailure {
                    scenario: spec.name.clone(),
                    seed,
                    group,
                    collapse: error.is_collapse(),
                    message: error.to_string(),
                }),
                RunRecord::Completed { .. } | RunRecord::Skipped { .. } => {}
            }
        }
    }

    fn run_scenario(
        &self,
        spec: &ScenarioSpec,
        budget: &Budget,
    ) -> AttractorResult<Vec<RunRecord>> {
        let kernel = spec.effective_kernel();
        let transitions = spec.transitions()?;
        let jobs = jobs_for(spec, &transitions);
        log::info!(
            "scenario '{}' ({}): {} run(s), {} iteration(s) each",
            spec.name,
            spec.kind,
            jobs.len(),
            if spec.kind == ScenarioKind::Null {
                0
            } else {
                kernel.max_iterations
            }
        );

        let records = jobs
            .par_iter()
            .map(|job| self.run_job(spec, &kernel, job, budget))
            .collect();
        Ok(records)
    }

    fn run_job(
        &self,
        spec: &ScenarioSpec,
        kernel: &KernelConfig,
        job: &Job<'_>,
        budget: &Budget,
    ) -> RunRecord {
        let cost = if spec.kind == ScenarioKind::Null {
            0
        } else {
            kernel.max_iterations
        };
        if !budget.admit(cost) {
            return RunRecord::Skipped {
                group: job.group,
                seed: job.seed,
            };
        }
        match self.execute(spec, kernel, job) {
            Ok((result, trajectory)) => RunRecord::Completed {
                group: job.group,
                result,
                trajectory: trajectory.filter(|_| self.config.keep_trajectories),
            },
            Err(error) => {
                log::error!("{}: seed {} aborted: {error}", spec.name, job.seed);
                RunRecord::Failed {
                    group: job.group,
                    seed: job.seed,
                    error,
                }
            }
        }
    }

    fn execute(
        &self,
        spec: &ScenarioSpec,
        kernel: &KernelConfig,
        job: &Job<'_>,
    ) -> AttractorResult<(RunResult, Option<Trajectory>)> {
        let mut rng = SeededRng::new(job.seed);
        let initial = initial_state(spec, job, &mut rng)?;

        if spec.kind == ScenarioKind::Null {
            return Ok((null_result(job.seed, spec, &initial)?, None));
        }

        let label = match job.group {
            Some(g) => format!("{}[seed {} @ {g}]", spec.name, job.seed),
            None => format!("{}[seed {}]", spec.name, job.seed),
        };
        let progress = ProgressHook::new(label, self.config.progress_every, spec.effective_target());
        let mut hook: Box<dyn KernelHook> = if spec.kind == ScenarioKind::Perturbation {
            Box::new((
                ShockInjector::new(spec.shock_iteration(), None, spec.perturbation_strength),
                progress,
            ))
        } else {
            Box::new(progress)
        };

        let outcome = EvolutionKernel::new(kernel, job.transition, &spec.extractor).run(
            initial,
            &mut rng,
            hook.as_mut(),
        )?;
        Ok((outcome.to_result(job.seed, kernel), Some(outcome.trajectory)))
    }
}

/// An explicit null reference must name a null scenario of the same call.
fn check_null_reference(spec: &ScenarioSpec, specs: &[ScenarioSpec]) -> AttractorResult<()> {
    let Some(name) = &spec.null_baseline else {
        return Ok(());
    };
    if specs
        .iter()
        .any(|s| &s.name == name && s.kind == ScenarioKind::Null)
    {
        Ok(())
    } else {
        Err(AttractorError::Config(format!(
            "{}: null_baseline '{name}' is not a null scenario of this run",
            spec.name
        )))
    }
}

/// Baseline a scenario's sigma separation is measured against: the named
/// null, or the first null with the same observable.
fn baseline_for<'a>(
    spec: &ScenarioSpec,
    nulls: &'a [(&ScenarioSpec, NullBaseline)],
) -> Option<&'a NullBaseline> {
    if spec.kind == ScenarioKind::Null {
        return None;
    }
    let found = match &spec.null_baseline {
        Some(name) => nulls.iter().find(|(null, _)| &null.name == name),
        None => nulls.iter().find(|(null, _)| null.shares_observable(spec)),
    };
    found.map(|(_, base)| base)
}

fn jobs_for<'a>(spec: &ScenarioSpec, transitions: &'a [(Option<f64>, Transition)]) -> Vec<Job<'a>> {
    let mut jobs = Vec::new();
    for (value, transition) in transitions {
        if spec.kind == ScenarioKind::Scale {
            for &size in &spec.sizes {
                jobs.extend(spec.seeds().map(|seed| Job {
                    seed,
                    group: Some(size as f64),
                    particles: Some(size),
                    transition,
                }));
            }
        } else {
            jobs.extend(spec.seeds().map(|seed| Job {
                seed,
                group: *value,
                particles: None,
                transition,
            }));
        }
    }
    jobs
}

fn initial_state(spec: &ScenarioSpec, job: &Job<'_>, rng: &mut SeededRng) -> AttractorResult<State> {
    if spec.kind != ScenarioKind::Basin {
        return spec.initial.build(job.particles, rng);
    }
    let InitialState::Ensemble { particles, dims, .. } = &spec.initial else {
        return Err(AttractorError::Config(format!(
            "{}: basin scenarios need an ensemble initial state",
            spec.name
        )));
    };
    let (state, imbalance) =
        State::imbalanced_ensemble(job.particles.unwrap_or(*particles), *dims, spec.max_imbalance, rng)?;
    log::debug!(
        "{}[seed {}]: dimension {} scaled by {:.3}",
        spec.name,
        job.seed,
        imbalance.dim,
        imbalance.factor
    );
    Ok(state)
}

/// Order parameter of the raw initial state; no transition is applied.
fn null_result(seed: u64, spec: &ScenarioSpec, initial: &State) -> AttractorResult<RunResult> {
    let op = spec.extractor.extract(initial)?;
    Ok(RunResult {
        seed,
        final_ratio: op.ratio,
        tail_mean: op.ratio,
        tail_max: op.ratio,
        predicted: op.ratio,
        top_weight: op.top_weight,
        converged: false,
        longest_stable_run: 0,
        termination: Termination::BudgetExhausted,
        iterations: 0,
        spectral_clamps: 0,
        filtered_modes: 0,
        symmetry_error: initial.symmetry_error(),
        pre_shock_ratio: None,
        shocked_ratio: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use attractor_dynamics::Extractor;

    fn tiny(kind: ScenarioKind) -> ScenarioSpec {
        let mut s = ScenarioSpec::new(
            format!("tiny-{kind}"),
            kind,
            Transition::sine_map(),
            Extractor::variance_ratio(3),
            InitialState::ensemble(500, 4),
        );
        s.target = Some(0.75);
        s.seed_count = 3;
        s.tolerance = 0.05;
        s.kernel.max_iterations = 60;
        s.kernel.tail_window = 20;
        s
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(HarnessConfig::default().validate().is_ok());
        let bad = HarnessConfig {
            max_wall_clock_s: Some(-1.0),
            ..HarnessConfig::default()
        };
        assert!(Harness::new(bad).is_err());
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let cfg = HarnessConfig::from_json(r#"{"keep_trajectories": true}"#).unwrap();
        assert!(cfg.keep_trajectories);
        assert_eq!(cfg.max_total_iterations, None);
    }

    #[test]
    fn test_jobs_cover_scale_grid() {
        let mut s = tiny(ScenarioKind::Scale);
        s.sizes = vec![10, 20];
        let ts = s.transitions().unwrap();
        let jobs = jobs_for(&s, &ts);
        assert_eq!(jobs.len(), 6);
        assert_eq!(jobs[0].particles, Some(10));
        assert_eq!(jobs[5].group, Some(20.0));
    }

    #[test]
    fn test_iteration_cap_skips_remaining_runs() {
        let harness = Harness::new(HarnessConfig {
            max_total_iterations: Some(1),
            ..HarnessConfig::default()
        })
        .unwrap();
        let report = harness.run(&[tiny(ScenarioKind::Basin)]);
        let s = &report.summaries[0];
        assert_eq!(s.runs, 3);
        assert_eq!(s.skipped_runs, 2, "{s:?}");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let harness = Harness::new(HarnessConfig::default()).unwrap();
        let a = tiny(ScenarioKind::Basin);
        let report = harness.run(&[a.clone(), a]);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_results_do_not_depend_on_scheduling() {
        let harness = Harness::new(HarnessConfig::default()).unwrap();
        let spec = tiny(ScenarioKind::Stability);
        let a = harness.run(std::slice::from_ref(&spec));
        let b = harness.run(std::slice::from_ref(&spec));
        assert_eq!(a.summaries[0].mean, b.summaries[0].mean);
    }

    #[test]
    fn test_null_runs_first_and_feeds_sigma() {
        let harness = Harness::new(HarnessConfig::default()).unwrap();
        let mut null = tiny(ScenarioKind::Null);
        null.transition = Transition::Frozen;
        null.target = None;
        null.seed_count = 20;
        let report = harness.run(&[tiny(ScenarioKind::Basin), null]);
        assert_eq!(report.summaries[0].kind, ScenarioKind::Null);
        assert_eq!(report.summaries[0].target, Some(0.75));
        assert!(report.summaries[1].sigma_separation.is_some());
    }

    #[test]
    fn test_sigma_only_against_matching_observable() {
        let harness = Harness::new(HarnessConfig::default()).unwrap();
        let mut null = tiny(ScenarioKind::Null);
        null.transition = Transition::Frozen;
        null.target = None;
        null.seed_count = 20;

        let mut five = tiny(ScenarioKind::Stability);
        five.name = "five-dims".into();
        five.initial = InitialState::ensemble(500, 5);
        five.target = Some(0.6);

        let report = harness.run(&[null.clone(), tiny(ScenarioKind::Basin), five]);
        let basin = report.summary("tiny-basin").unwrap();
        assert!(basin.sigma_separation.is_some());
        assert_eq!(basin.null_scenario.as_deref(), Some("tiny-null"));
        let five = report.summary("five-dims").unwrap();
        assert_eq!(five.sigma_separation, None);
        assert_eq!(five.null_scenario, None);
    }

    #[test]
    fn test_explicit_null_reference() {
        let harness = Harness::new(HarnessConfig::default()).unwrap();
        let mut null = tiny(ScenarioKind::Null);
        null.transition = Transition::Frozen;
        null.target = None;
        null.seed_count = 20;

        let mut named = tiny(ScenarioKind::Stability);
        named.name = "named".into();
        named.initial = InitialState::ensemble(500, 5);
        named.target = Some(0.6);
        named.null_baseline = Some("tiny-null".into());

        let mut dangling = tiny(ScenarioKind::Stability);
        dangling.name = "dangling".into();
        dangling.null_baseline = Some("missing".into());

        let report = harness.run(&[null, named, dangling]);
        let named = report.summary("named").unwrap();
        assert_eq!(named.null_scenario.as_deref(), Some("tiny-null"));
        assert!(named.sigma_separation.is_some());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].scenario, "dangling");
    }

    #[test]
    fn test_cohort_selection_reported() {
        let harness = Harness::new(HarnessConfig::default()).unwrap();
        let mut near = tiny(ScenarioKind::Stability);
        near.name = "near".into();
        near.cohort = Some("dims".into());
        let mut far = near.clone();
        far.name = "far".into();
        far.target = Some(0.5);
        far.tolerance = 0.5;

        let report = harness.run(&[far, near]);
        assert_eq!(report.cohorts.len(), 1);
        let c = &report.cohorts[0];
        assert_eq!(c.members, ["far", "near"]);
        assert_eq!(c.best.as_deref(), Some("near"));
    }

    #[test]
    fn test_trajectories_kept_on_request() {
        let harness = Harness::new(HarnessConfig {
            keep_trajectories: true,
            ..HarnessConfig::default()
        })
        .unwrap();
        let spec = tiny(ScenarioKind::Stability);
        let report = harness.run(std::slice::from_ref(&spec));
        let runs = &report.trajectories[&spec.name];
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].trajectory.len(), 60);
    }
}
