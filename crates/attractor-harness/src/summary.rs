// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Scenario Aggregation
// ─────────────────────────────────────────────────────────────────────
//! Collapse one scenario's run records into a `Summary` with a verdict.
//!
//! Only completed runs enter the statistics. Failed and skipped runs are
//! counted separately.

use serde::{Deserialize, Serialize};

use attractor_types::RunResult;

use crate::harness::RunRecord;
use crate::scenario::{ScenarioKind, ScenarioSpec};
use crate::stats::{fraction_within, mean, population_std, sigma_separation};

/// Guard on the recovery-score denominator.
pub const RECOVERY_EPSILON: f64 = 1e-10;
/// Null spreads at or below this produce no sigma separation.
pub const NULL_STD_EPSILON: f64 = 1e-12;

/// Mean and spread of a null scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct NullBaseline {
    /// Null scenario the numbers come from.
    pub scenario: String,
    pub mean: f64,
    pub std: f64,
}

/// One grid point of a scale or sweep scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    /// Ensemble size or parameter value.
    pub value: f64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    /// Largest sample in any run's tail window (peak of the attractor).
    pub max: Option<f64>,
    pub runs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioDetail {
    Basin {
        worst_deviation: Option<f64>,
    },
    Stability {
        converged_fraction: f64,
        mean_longest_run: Option<f64>,
    },
    Perturbation {
        /// 1 − |after − t| / |shocked − t|, averaged. Drives the verdict.
        mean_recovery: Option<f64>,
        /// 1 − |after − t| / |pre-shock − t|, averaged. Reported only: a
        /// run sitting on the target before the shock drives it far below
        /// zero however well it recovers.
        mean_recovery_vs_pre_shock: Option<f64>,
        mean_pre_shock_deviation: Option<f64>,
        mean_shocked_deviation: Option<f64>,
    },
    Scale {
        points: Vec<GridPoint>,
        /// Population std of the per-size means.
        dispersion: Option<f64>,
    },
    Sweep {
        parameter: String,
        points: Vec<GridPoint>,
        worst_deviation: Option<f64>,
    },
    Null {
        expected: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub scenario: String,
    pub kind: ScenarioKind,
    pub target: Option<f64>,
    /// Mean of per-run tail means.
    pub mean: Option<f64>,
    pub std: Option<f64>,
    /// Fraction of runs within tolerance of the target; the detector's
    /// `Converged` fraction when there is no target.
    pub convergence_rate: f64,
    /// |mean − target|.
    pub deviation: Option<f64>,
    /// Mean over runs of |tail mean − target|.
    pub mean_abs_deviation: Option<f64>,
    pub runs: usize,
    pub failed_runs: usize,
    pub skipped_runs: usize,
    pub sigma_separation: Option<f64>,
    /// Null scenario the sigma separation is measured against.
    pub null_scenario: Option<String>,
    /// Mean of the accelerated per-run estimates. A prediction only.
    pub predicted_mean: Option<f64>,
    /// Mean dominant-mode weight of the final states (spectral extractors).
    pub mean_top_weight: Option<f64>,
    /// Mean spread of the final per-dimension variances (ensembles).
    pub mean_symmetry_error: Option<f64>,
    pub cohort: Option<String>,
    pub passed: bool,
    pub detail: ScenarioDetail,
}

impl Summary {
    pub fn baseline(&self) -> Option<NullBaseline> {
        Some(NullBaseline {
            scenario: self.scenario.clone(),
            mean: self.mean?,
            std: self.std?,
        })
    }
}

/// Best member of a cohort of comparable scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSelection {
    pub cohort: String,
    pub members: Vec<String>,
    /// Member with the smallest mean |tail mean − target|.
    pub best: Option<String>,
    pub best_mean_abs_deviation: Option<f64>,
}

/// Recovery score 1 − |after − t| / (|shocked − t| + ε).
pub fn recovery_score(after: f64, shocked: f64, target: f64) -> f64 {
    1.0 - (after - target).abs() / ((shocked - target).abs() + RECOVERY_EPSILON)
}

/// Recovery relative to the pre-shock deviation,
/// 1 − |after − t| / (|before − t| + ε).
pub fn pre_shock_recovery_score(after: f64, before: f64, target: f64) -> f64 {
    1.0 - (after - target).abs() / ((before - target).abs() + RECOVERY_EPSILON)
}

/// Group summaries by cohort, in order of first appearance, and pick the
/// member closest to its target on average.
pub fn select_cohorts(summaries: &[Summary]) -> Vec<CohortSelection> {
    let mut out: Vec<CohortSelection> = Vec::new();
    for s in summaries {
        let Some(cohort) = &s.cohort else {
            continue;
        };
        let idx = match out.iter().position(|c| &c.cohort == cohort) {
            Some(i) => i,
            None => {
                out.push(CohortSelection {
                    cohort: cohort.clone(),
                    members: Vec::new(),
                    best: None,
                    best_mean_abs_deviation: None,
                });
                out.len() - 1
            }
        };
        let sel = &mut out[idx];
        sel.members.push(s.scenario.clone());
        if let Some(d) = s.mean_abs_deviation {
            if sel.best_mean_abs_deviation.map_or(true, |b| d < b) {
                sel.best = Some(s.scenario.clone());
                sel.best_mean_abs_deviation = Some(d);
            }
        }
    }
    out
}

pub fn summarize(
    spec: &ScenarioSpec,
    records: &[RunRecord],
    null: Option<&NullBaseline>,
) -> Summary {
    let mut completed: Vec<(Option<f64>, &RunResult)> = Vec::new();
    let mut failed = 0;
    let mut skipped = 0;
    for rec in records {
        match rec {
            RunRecord::Completed { group, result, .. } => completed.push((*group, result)),
            RunRecord::Failed { .. } => failed += 1,
            RunRecord::Skipped { .. } => skipped += 1,
        }
    }

    let target = spec.effective_target();
    let values: Vec<f64> = completed.iter().map(|(_, r)| r.tail_mean).collect();
    let mean_value = mean(&values);
    let std_value = population_std(&values);
    let converged_fraction = if completed.is_empty() {
        0.0
    } else {
        completed.iter().filter(|(_, r)| r.converged).count() as f64 / completed.len() as f64
    };
    let convergence_rate = match target {
        Some(t) => fraction_within(&values, t, spec.tolerance),
        None => converged_fraction,
    };
    let deviation = mean_value.zip(target).map(|(m, t)| (m - t).abs());
    let abs_deviations: Vec<f64> = match target {
        Some(t) => values.iter().map(|v| (v - t).abs()).collect(),
        None => Vec::new(),
    };
    let predicted: Vec<f64> = completed.iter().map(|(_, r)| r.predicted).collect();
    let top_weights: Vec<f64> = completed.iter().filter_map(|(_, r)| r.top_weight).collect();
    let symmetry: Vec<f64> = completed
        .iter()
        .filter_map(|(_, r)| r.symmetry_error)
        .collect();

    let null = null.filter(|_| spec.kind != ScenarioKind::Null);
    let sigma = match (null, mean_value) {
        (Some(base), Some(m)) => sigma_separation(m, base.mean, base.std, NULL_STD_EPSILON),
        _ => None,
    };

    let (passed, detail) = match spec.kind {
        ScenarioKind::Basin => {
            let worst = target.and_then(|t| {
                values
                    .iter()
                    .map(|v| (v - t).abs())
                    .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
            });
            (
                convergence_rate >= spec.min_converged_fraction,
                ScenarioDetail::Basin {
                    worst_deviation: worst,
                },
            )
        }
        ScenarioKind::Stability => {
            let longest: Vec<f64> = completed
                .iter()
                .map(|(_, r)| r.longest_stable_run as f64)
                .collect();
            (
                converged_fraction >= spec.min_converged_fraction,
                ScenarioDetail::Stability {
                    converged_fraction,
                    mean_longest_run: mean(&longest),
                },
            )
        }
        ScenarioKind::Perturbation => perturbation_detail(spec, &completed, target),
        ScenarioKind::Scale => {
            let points = grid_points(
                spec.sizes.iter().map(|&s| s as f64),
                &completed,
            );
            let means: Vec<f64> = points.iter().filter_map(|p| p.mean).collect();
            let dispersion = if means.len() == points.len() {
                population_std(&means)
            } else {
                None
            };
            (
                dispersion.is_some_and(|d| d < spec.tolerance),
                ScenarioDetail::Scale { points, dispersion },
            )
        }
        ScenarioKind::ParameterSweep => {
            let points = grid_points(spec.sweep.iter().copied(), &completed);
            let worst = target.and_then(|t| {
                points
                    .iter()
                    .map(|p| p.mean.map(|m| (m - t).abs()))
                    .try_fold(0.0f64, |acc, d| d.map(|d| acc.max(d)))
            });
            (
                worst.is_some_and(|w| w < spec.tolerance),
                ScenarioDetail::Sweep {
                    parameter: spec.transition.parameter_name().to_string(),
                    points,
                    worst_deviation: worst,
                },
            )
        }
        ScenarioKind::Null => (true, ScenarioDetail::Null { expected: target }),
    };

    Summary {
        scenario: spec.name.clone(),
        kind: spec.kind,
        target,
        mean: mean_value,
        std: std_value,
        convergence_rate,
        deviation,
        mean_abs_deviation: mean(&abs_deviations),
        runs: records.len(),
        failed_runs: failed,
        skipped_runs: skipped,
        sigma_separation: sigma,
        null_scenario: null.map(|b| b.scenario.clone()),
        predicted_mean: mean(&predicted),
        mean_top_weight: mean(&top_weights),
        mean_symmetry_error: mean(&symmetry),
        cohort: spec.cohort.clone(),
        passed: passed && !values.is_empty(),
        detail,
    }
}

fn perturbation_detail(
    spec: &ScenarioSpec,
    completed: &[(Option<f64>, &RunResult)],
    target: Option<f64>,
) -> (bool, ScenarioDetail) {
    let Some(t) = target else {
        return (
            false,
            ScenarioDetail::Perturbation {
                mean_recovery: None,
                mean_recovery_vs_pre_shock: None,
                mean_pre_shock_deviation: None,
                mean_shocked_deviation: None,
            },
        );
    };
    let mut recoveries = Vec::new();
    let mut vs_pre = Vec::new();
    let mut pre = Vec::new();
    let mut shocked = Vec::new();
    for (_, r) in completed {
        if let (Some(p), Some(s)) = (r.pre_shock_ratio, r.shocked_ratio) {
            recoveries.push(recovery_score(r.tail_mean, s, t));
            vs_pre.push(pre_shock_recovery_score(r.tail_mean, p, t));
            pre.push((p - t).abs());
            shocked.push((s - t).abs());
        }
    }
    let mean_recovery = mean(&recoveries);
    (
        mean_recovery.is_some_and(|m| m > spec.min_recovery),
        ScenarioDetail::Perturbation {
            mean_recovery,
            mean_recovery_vs_pre_shock: mean(&vs_pre),
            mean_pre_shock_deviation: mean(&pre),
            mean_shocked_deviation: mean(&shocked),
        },
    )
}

fn grid_points(
    grid: impl Iterator<Item = f64>,
    completed: &[(Option<f64>, &RunResult)],
) -> Vec<GridPoint> {
    grid.map(|value| {
        let runs: Vec<&RunResult> = completed
            .iter()
            .filter(|(g, _)| *g == Some(value))
            .map(|(_, r)| *r)
            .collect();
        let xs: Vec<f64> = runs.iter().map(|r| r.tail_mean).collect();
        let max = runs
            .iter()
            .map(|r| r.tail_max)
            .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))));
        GridPoint {
            value,
            mean: mean(&xs),
            std: population_std(&xs),
            max,
            runs: xs.len(),
        }
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::InitialState;
    use attractor_dynamics::{Extractor, Transition};
    use attractor_types::{AttractorError, Termination};

    fn result(seed: u64, tail: f64) -> RunResult {
        RunResult {
            seed,
            final_ratio: tail,
            tail_mean: tail,
            tail_max: tail,
            predicted: tail,
            top_weight: None,
            converged: (tail - 0.75).abs() < 0.01,
            longest_stable_run: 12,
            termination: Termination::BudgetExhausted,
            iterations: 100,
            spectral_clamps: 0,
            filtered_modes: 0,
            symmetry_error: None,
            pre_shock_ratio: None,
            shocked_ratio: None,
        }
    }

    fn completed(group: Option<f64>, r: RunResult) -> RunRecord {
        RunRecord::Completed {
            group,
            result: r,
            trajectory: None,
        }
    }

    fn spec(kind: ScenarioKind) -> ScenarioSpec {
        let mut s = ScenarioSpec::new(
            "s",
            kind,
            Transition::sine_map(),
            Extractor::variance_ratio(3),
            InitialState::ensemble(100, 4),
        );
        s.target = Some(0.75);
        s
    }

    #[test]
    fn test_failed_runs_excluded_from_statistics() {
        let records = vec![
            completed(None, result(0, 0.75)),
            completed(None, result(1, 0.752)),
            RunRecord::Failed {
                group: None,
                seed: 2,
                error: AttractorError::NumericalCollapse {
                    iteration: 4,
                    quantity: "trace".into(),
                    value: 0.0,
                    epsilon: 1e-10,
                },
            },
            RunRecord::Skipped {
                group: None,
                seed: 3,
            },
        ];
        let s = summarize(&spec(ScenarioKind::Basin), &records, None);
        assert_eq!(s.runs, 4);
        assert_eq!(s.failed_runs, 1);
        assert_eq!(s.skipped_runs, 1);
        assert!((s.mean.unwrap() - 0.751).abs() < 1e-12);
        assert_eq!(s.convergence_rate, 1.0);
        assert!(s.passed);
    }

    #[test]
    fn test_no_completed_runs_fails() {
        let records = vec![RunRecord::Skipped {
            group: None,
            seed: 0,
        }];
        let s = summarize(&spec(ScenarioKind::Basin), &records, None);
        assert_eq!(s.mean, None);
        assert!(!s.passed);
    }

    #[test]
    fn test_sigma_separation_against_null() {
        let records = vec![completed(None, result(0, 0.80))];
        let base = NullBaseline {
            scenario: "null".into(),
            mean: 0.75,
            std: 0.01,
        };
        let s = summarize(&spec(ScenarioKind::Basin), &records, Some(&base));
        assert!((s.sigma_separation.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(s.null_scenario.as_deref(), Some("null"));

        let flat = NullBaseline {
            scenario: "null".into(),
            mean: 0.75,
            std: 0.0,
        };
        let s = summarize(&spec(ScenarioKind::Basin), &records, Some(&flat));
        assert_eq!(s.sigma_separation, None);
    }

    #[test]
    fn test_recovery_score() {
        assert!((recovery_score(0.75, 0.95, 0.75) - 1.0).abs() < 1e-9);
        assert!((recovery_score(0.85, 0.95, 0.75) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pre_shock_recovery_score() {
        assert!((pre_shock_recovery_score(0.76, 0.74, 0.75) - 0.0).abs() < 1e-6);
        assert!((pre_shock_recovery_score(0.755, 0.74, 0.75) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_perturbation_verdict() {
        let mut r = result(0, 0.751);
        r.pre_shock_ratio = Some(0.749);
        r.shocked_ratio = Some(0.98);
        let s = summarize(&spec(ScenarioKind::Perturbation), &[completed(None, r)], None);
        let ScenarioDetail::Perturbation {
            mean_recovery,
            mean_recovery_vs_pre_shock,
            ..
        } = s.detail
        else {
            panic!("wrong detail");
        };
        assert!(mean_recovery.unwrap() > 0.99);
        // same distance from target before and after: zero against the
        // pre-shock deviation, while the verdict score passes
        assert!(mean_recovery_vs_pre_shock.unwrap().abs() < 1e-6);
        assert!(s.passed);
    }

    #[test]
    fn test_spectral_and_ensemble_aggregates() {
        let mut a = result(0, 0.74);
        a.top_weight = Some(0.4);
        a.symmetry_error = Some(0.02);
        let mut b = result(1, 0.76);
        b.top_weight = Some(0.6);
        let s = summarize(
            &spec(ScenarioKind::Stability),
            &[completed(None, a), completed(None, b)],
            None,
        );
        assert!((s.mean_top_weight.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(s.mean_symmetry_error, Some(0.02));
        // |mean − t| vanishes, mean |tail − t| does not
        assert!(s.deviation.unwrap() < 1e-12);
        assert!((s.mean_abs_deviation.unwrap() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_cohort_picks_smallest_mean_abs_deviation() {
        let summary = |name: &str, tail: f64, cohort: Option<&str>| {
            let mut sp = spec(ScenarioKind::Stability);
            sp.name = name.into();
            sp.cohort = cohort.map(str::to_string);
            summarize(&sp, &[completed(None, result(0, tail))], None)
        };
        let all = vec![
            summary("n3", 0.70, Some("g")),
            summary("n4", 0.751, Some("g")),
            summary("alone", 0.75, None),
            summary("n5", 0.80, Some("g")),
        ];
        let cohorts = select_cohorts(&all);
        assert_eq!(cohorts.len(), 1);
        assert_eq!(cohorts[0].members, ["n3", "n4", "n5"]);
        assert_eq!(cohorts[0].best.as_deref(), Some("n4"));
        assert!((cohorts[0].best_mean_abs_deviation.unwrap() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_grid_point_peak() {
        let mut sp = spec(ScenarioKind::ParameterSweep);
        sp.sweep = vec![1.0];
        let mut a = result(0, 0.75);
        a.tail_max = 0.81;
        let mut b = result(1, 0.74);
        b.tail_max = 0.79;
        let s = summarize(&sp, &[completed(Some(1.0), a), completed(Some(1.0), b)], None);
        let ScenarioDetail::Sweep { points, .. } = &s.detail else {
            panic!("wrong detail");
        };
        assert_eq!(points[0].max, Some(0.81));
        assert_eq!(points[0].runs, 2);
    }

    #[test]
    fn test_scale_dispersion() {
        let mut sp = spec(ScenarioKind::Scale);
        sp.sizes = vec![100, 1000];
        let records = vec![
            completed(Some(100.0), result(0, 0.748)),
            completed(Some(1000.0), result(0, 0.752)),
        ];
        let s = summarize(&sp, &records, None);
        let ScenarioDetail::Scale { points, dispersion } = &s.detail else {
            panic!("wrong detail");
        };
        assert_eq!(points.len(), 2);
        assert!((dispersion.unwrap() - 0.002).abs() < 1e-12);
        assert!(s.passed);
    }

    #[test]
    fn test_sweep_fails_when_a_point_is_off_target() {
        let mut sp = spec(ScenarioKind::ParameterSweep);
        sp.sweep = vec![3.0, 3.2];
        let records = vec![
            completed(Some(3.0), result(0, 0.75)),
            completed(Some(3.2), result(0, 0.6)),
        ];
        let s = summarize(&sp, &records, None);
        assert!(!s.passed);
        let ScenarioDetail::Sweep {
            worst_deviation, ..
        } = s.detail
        else {
            panic!("wrong detail");
        };
        assert!((worst_deviation.unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_no_target_uses_converged_fraction() {
        let mut sp = spec(ScenarioKind::Stability);
        sp.target = None;
        let mut a = result(0, 0.3);
        a.converged = true;
        let b = result(1, 0.3);
        let s = summarize(&sp, &[completed(None, a), completed(None, b)], None);
        assert_eq!(s.convergence_rate, 0.5);
        assert_eq!(s.deviation, None);
    }
}
