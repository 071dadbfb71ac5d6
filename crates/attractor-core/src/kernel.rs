// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Evolution Kernel
// ─────────────────────────────────────────────────────────────────────
//! Repeated Transition → Normalization → Extraction with numerical
//! safety, trajectory recording, and step hooks.
//!
//! Per iteration `i` (1-based):
//!   1. `before_step` hook may perturb the state (one-time shocks)
//!   2. transition consumes the state and returns the next one
//!   3. the transition's normalization policy is applied; a denominator
//!      below `collapse_epsilon` aborts the run
//!   4. the order parameter is extracted and, on stride boundaries,
//!      sampled into the trajectory and fed to the detector
//!   5. stop on budget exhaustion, or on convergence when configured

use attractor_dynamics::{Evolve, Extract, SeededRng, State, StepDiagnostics};
use attractor_types::{
    AttractorError, AttractorResult, KernelConfig, OrderParameter, RunResult, Termination,
    Trajectory,
};

use crate::accelerate;
use crate::convergence::{ConvergenceDetector, Phase};

/// Callbacks invoked by the kernel during a run.
pub trait KernelHook {
    /// Called before iteration `iteration` is applied. Return `true` when
    /// the state was perturbed.
    fn before_step(
        &mut self,
        _iteration: u64,
        _state: &mut State,
        _rng: &mut SeededRng,
    ) -> AttractorResult<bool> {
        Ok(false)
    }

    /// Called after every trajectory sample.
    fn on_sample(&mut self, _iteration: u64, _sample: f64, _phase: Phase) {}
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

impl KernelHook for NoHook {}

impl<A: KernelHook, B: KernelHook> KernelHook for (A, B) {
    fn before_step(
        &mut self,
        iteration: u64,
        state: &mut State,
        rng: &mut SeededRng,
    ) -> AttractorResult<bool> {
        let a = self.0.before_step(iteration, state, rng)?;
        let b = self.1.before_step(iteration, state, rng)?;
        Ok(a || b)
    }

    fn on_sample(&mut self, iteration: u64, sample: f64, phase: Phase) {
        self.0.on_sample(iteration, sample, phase);
        self.1.on_sample(iteration, sample, phase);
    }
}

/// One-time additive shock of `strength`·N(0, 1) before iteration `at`.
///
/// `dim = None` picks the dimension uniformly from the run's own RNG.
#[derive(Debug, Clone)]
pub struct ShockInjector {
    at: u64,
    dim: Option<usize>,
    strength: f64,
    fired: Option<usize>,
}

impl ShockInjector {
    pub fn new(at: u64, dim: Option<usize>, strength: f64) -> Self {
        Self {
            at,
            dim,
            strength,
            fired: None,
        }
    }

    /// Dimension the shock hit, once fired.
    pub fn fired_dim(&self) -> Option<usize> {
        self.fired
    }
}

impl KernelHook for ShockInjector {
    fn before_step(
        &mut self,
        iteration: u64,
        state: &mut State,
        rng: &mut SeededRng,
    ) -> AttractorResult<bool> {
        if self.fired.is_some() || iteration != self.at {
            return Ok(false);
        }
        let dim = match self.dim {
            Some(d) => d,
            None => rng.index(state.shock_dims()),
        };
        state.inject_shock(dim, self.strength, rng)?;
        log::debug!(
            "seed {}: shock injected before iteration {iteration}: dim={dim} strength={}",
            rng.seed(),
            self.strength
        );
        self.fired = Some(dim);
        Ok(true)
    }
}

/// Logs iteration, ratio and deviation every `every` iterations.
#[derive(Debug, Clone)]
pub struct ProgressHook {
    label: String,
    every: u64,
    target: Option<f64>,
}

impl ProgressHook {
    pub fn new(label: impl Into<String>, every: u64, target: Option<f64>) -> Self {
        Self {
            label: label.into(),
            every,
            target,
        }
    }
}

impl KernelHook for ProgressHook {
    fn on_sample(&mut self, iteration: u64, sample: f64, phase: Phase) {
        if self.every == 0 || iteration % self.every != 0 {
            return;
        }
        match self.target {
            Some(t) => log::info!(
                "{} iter {iteration}: ratio={sample:.6} deviation={:.6} phase={phase:?}",
                self.label,
                (sample - t).abs()
            ),
            None => log::info!(
                "{} iter {iteration}: ratio={sample:.6} phase={phase:?}",
                self.label
            ),
        }
    }
}

/// Order parameter around a shock injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShockReading {
    pub iteration: u64,
    /// Ratio of the state the shock was applied to.
    pub pre_ratio: f64,
    /// Ratio right after the shock, before any further evolution.
    pub shocked_ratio: f64,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: State,
    pub trajectory: Trajectory,
    pub termination: Termination,
    pub phase: Phase,
    pub longest_stable_run: usize,
    pub converged_at: Option<usize>,
    /// Detector reference at the end of the run.
    pub reference: Option<f64>,
    pub final_order: OrderParameter,
    pub spectral_clamps: u64,
    pub filtered_modes: u64,
    pub shock: Option<ShockReading>,
}

impl RunOutcome {
    /// Accelerated limit of the trajectory; the final ratio when nothing
    /// was sampled.
    pub fn predicted(&self, block: usize) -> f64 {
        accelerate::estimate_blocks(self.trajectory.samples(), block)
            .unwrap_or(self.final_order.ratio)
    }

    /// Terminal scalars for the harness.
    pub fn to_result(&self, seed: u64, config: &KernelConfig) -> RunResult {
        RunResult {
            seed,
            final_ratio: self.final_order.ratio,
            tail_mean: self
                .trajectory
                .tail_mean(config.tail_window)
                .unwrap_or(self.final_order.ratio),
            tail_max: self
                .trajectory
                .tail_max(config.tail_window)
                .unwrap_or(self.final_order.ratio),
            predicted: self.predicted(config.accel_block),
            top_weight: self.final_order.top_weight,
            converged: self.phase == Phase::Converged,
            longest_stable_run: self.longest_stable_run,
            termination: self.termination,
            iterations: self.state.iteration,
            spectral_clamps: self.spectral_clamps,
            filtered_modes: self.filtered_modes,
            symmetry_error: self.state.symmetry_error(),
            pre_shock_ratio: self.shock.map(|s| s.pre_ratio),
            shocked_ratio: self.shock.map(|s| s.shocked_ratio),
        }
    }
}

/// Drives one run of a transition/extractor pair.
pub struct EvolutionKernel<'a, T: ?Sized, E: ?Sized> {
    config: &'a KernelConfig,
    transition: &'a T,
    extractor: &'a E,
}

impl<'a, T, E> EvolutionKernel<'a, T, E>
where
    T: Evolve + ?Sized,
    E: Extract + ?Sized,
{
    pub fn new(config: &'a KernelConfig, transition: &'a T, extractor: &'a E) -> Self {
        Self {
            config,
            transition,
            extractor,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        self.config
    }

    /// Evolve `initial` until the budget is spent (or convergence, when
    /// `stop_on_convergence` is set).
    pub fn run(
        &self,
        initial: State,
        rng: &mut SeededRng,
        hook: &mut dyn KernelHook,
    ) -> AttractorResult<RunOutcome> {
        let config = self.config;
        config.validate()?;
        initial.check_finite()?;

        let shape = initial.shape();
        let policy = self.transition.norm_policy();
        let stride = config.sample_stride;

        let mut detector = ConvergenceDetector::new(&config.stability);
        let mut recorder = Trajectory::recorder(stride, config.sample_capacity());
        let mut diag = StepDiagnostics::default();
        let mut shock = None;
        let mut termination = Termination::BudgetExhausted;

        let mut current = self.extractor.extract(&initial)?;
        let mut state = initial;

        for iteration in 1..=config.max_iterations {
            if hook.before_step(iteration, &mut state, rng)? {
                state.check_finite()?;
                let shocked = self.extractor.extract(&state)?;
                shock = Some(ShockReading {
                    iteration,
                    pre_ratio: current.ratio,
                    shocked_ratio: shocked.ratio,
                });
                current = shocked;
            }

            let mut next = self.transition.evolve(state, rng, &mut diag)?;
            if next.shape() != shape {
                return Err(AttractorError::Shape(format!(
                    "transition changed state shape from {shape} to {} at iteration {iteration}",
                    next.shape()
                )));
            }
            next.iteration = iteration;
            if let Err(e) = next.normalize(policy, config.collapse_epsilon) {
                if e.is_collapse() {
                    log::warn!("run aborted: {e}");
                }
                return Err(e);
            }
            next.check_finite()?;

            let op = self.extractor.extract(&next)?;
            next.last_change = (op.ratio - current.ratio).abs();
            current = op;
            state = next;

            if iteration % stride == 0 {
                recorder.push(op.ratio);
                let phase = detector.observe(op.ratio);
                hook.on_sample(iteration, op.ratio, phase);
                if phase == Phase::Converged && config.stop_on_convergence {
                    termination = Termination::Converged;
                    break;
                }
            }
        }

        let phase = detector.finish();
        if diag.spectral_clamps > 0 {
            log::debug!(
                "{} eigenvalue floor clamp(s) recovered during run",
                diag.spectral_clamps
            );
        }

        Ok(RunOutcome {
            state,
            trajectory: recorder.finish(),
            termination,
            phase,
            longest_stable_run: detector.longest_run(),
            converged_at: detector.converged_at(),
            reference: detector.reference(),
            final_order: current,
            spectral_clamps: diag.spectral_clamps,
            filtered_modes: diag.filtered_modes,
            shock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attractor_dynamics::{ComplexMatrix, Extractor, NormPolicy, Payload, Transition};
    use attractor_types::StabilityConfig;

    fn config(max_iterations: u64) -> KernelConfig {
        KernelConfig {
            max_iterations,
            tail_window: 20,
            stability: StabilityConfig {
                required_run: 5,
                target: Some(0.75),
                ..StabilityConfig::default()
            },
            ..KernelConfig::default()
        }
    }

    /// Test rule that shrinks a scalar geometrically toward zero.
    struct Decay(f64);

    impl Evolve for Decay {
        fn evolve(
            &self,
            mut state: State,
            _rng: &mut SeededRng,
            _diag: &mut StepDiagnostics,
        ) -> AttractorResult<State> {
            if let Payload::Scalar { value } = &mut state.payload {
                *value *= self.0;
            }
            Ok(state)
        }

        fn norm_policy(&self) -> NormPolicy {
            NormPolicy::Guard
        }
    }

    /// Test rule that turns a scalar into a matrix.
    struct Reshape;

    impl Evolve for Reshape {
        fn evolve(
            &self,
            _state: State,
            _rng: &mut SeededRng,
            _diag: &mut StepDiagnostics,
        ) -> AttractorResult<State> {
            Ok(State::matrix(ComplexMatrix::identity(2)))
        }

        fn norm_policy(&self) -> NormPolicy {
            NormPolicy::Guard
        }
    }

    #[test]
    fn test_sine_ensemble_approaches_three_quarters() {
        let cfg = config(300);
        let t = Transition::sine_map();
        let ex = Extractor::variance_ratio(3);
        let mut rng = SeededRng::new(42);
        let initial = State::gaussian_ensemble(5_000, 4, &[1.0, 1.0, 1.0, 10.0], &mut rng).unwrap();
        let out = EvolutionKernel::new(&cfg, &t, &ex)
            .run(initial, &mut rng, &mut NoHook)
            .unwrap();
        let tail = out.trajectory.tail_mean(20).unwrap();
        assert!((tail - 0.75).abs() < 0.03, "tail mean {tail}");
        assert_eq!(out.trajectory.len(), 300);
        assert_eq!(out.state.iteration, 300);
        assert_eq!(out.termination, Termination::BudgetExhausted);
    }

    #[test]
    fn test_stop_on_convergence_reports_termination() {
        let mut cfg = config(1000);
        cfg.stop_on_convergence = true;
        let ex = Extractor::identity();
        // frozen scalar sits on the target from the first sample
        let frozen = Transition::Frozen;
        let mut rng = SeededRng::new(0);
        let out = EvolutionKernel::new(&cfg, &frozen, &ex)
            .run(State::scalar(0.75), &mut rng, &mut NoHook)
            .unwrap();
        assert_eq!(out.termination, Termination::Converged);
        assert_eq!(out.converged_at, Some(5));
        assert_eq!(out.state.iteration, 5);
    }

    #[test]
    fn test_collapse_aborts_run() {
        let cfg = config(100);
        let ex = Extractor::identity();
        let mut rng = SeededRng::new(0);
        let err = EvolutionKernel::new(&cfg, &Decay(1e-4), &ex)
            .run(State::scalar(1.0), &mut rng, &mut NoHook)
            .unwrap_err();
        match err {
            AttractorError::NumericalCollapse { iteration, .. } => assert_eq!(iteration, 3),
            other => panic!("expected collapse, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_change_rejected() {
        let cfg = config(10);
        let ex = Extractor::identity();
        let mut rng = SeededRng::new(0);
        let err = EvolutionKernel::new(&cfg, &Reshape, &ex)
            .run(State::scalar(0.5), &mut rng, &mut NoHook)
            .unwrap_err();
        assert!(matches!(err, AttractorError::Shape(_)), "{err:?}");
    }

    #[test]
    fn test_invalid_config_rejected_before_running() {
        let cfg = KernelConfig {
            max_iterations: 0,
            ..KernelConfig::default()
        };
        let ex = Extractor::identity();
        let mut rng = SeededRng::new(0);
        let err = EvolutionKernel::new(&cfg, &Transition::Frozen, &ex)
            .run(State::scalar(0.5), &mut rng, &mut NoHook)
            .unwrap_err();
        assert!(matches!(err, AttractorError::Config(_)));
    }

    #[test]
    fn test_stride_sampling() {
        let mut cfg = config(100);
        cfg.sample_stride = 10;
        let ex = Extractor::identity();
        let mut rng = SeededRng::new(0);
        let out = EvolutionKernel::new(&cfg, &Transition::Frozen, &ex)
            .run(State::scalar(0.75), &mut rng, &mut NoHook)
            .unwrap();
        assert_eq!(out.trajectory.len(), 10);
        assert_eq!(out.trajectory.stride(), 10);
    }

    #[test]
    fn test_shock_reading_recorded() {
        let cfg = config(40);
        let t = Transition::sine_map();
        let ex = Extractor::variance_ratio(3);
        let mut rng = SeededRng::new(7);
        let initial = State::gaussian_ensemble(2_000, 4, &[1.0; 4], &mut rng).unwrap();
        let mut hook = ShockInjector::new(21, Some(0), 10.0);
        let out = EvolutionKernel::new(&cfg, &t, &ex)
            .run(initial, &mut rng, &mut hook)
            .unwrap();
        let shock = out.shock.expect("shock fired");
        assert_eq!(shock.iteration, 21);
        assert_eq!(hook.fired_dim(), Some(0));
        // a large kick on an observed dimension raises the observed share
        assert!(shock.shocked_ratio > shock.pre_ratio);
        let result = out.to_result(7, &cfg);
        assert_eq!(result.pre_shock_ratio, Some(shock.pre_ratio));
        assert_eq!(result.shocked_ratio, Some(shock.shocked_ratio));
    }

    #[test]
    fn test_coherence_filter_counts_reach_run_result() {
        let mut cfg = config(30);
        cfg.stability.target = None;
        let t = Transition::ModularFlow {
            beta: 1.0,
            mixing_angle: 0.3,
            dephasing: 0.1,
            filter_fraction: Some(0.25),
        };
        let ex = Extractor::harmonic(0.01);
        let mut rng = SeededRng::new(5);
        let initial = State::random_density(4, &mut rng).unwrap();
        let out = EvolutionKernel::new(&cfg, &t, &ex)
            .run(initial, &mut rng, &mut NoHook)
            .unwrap();
        assert!(out.filtered_modes >= 1, "no mode was filtered");
        let Payload::Matrix(m) = &out.state.payload else {
            panic!("expected matrix");
        };
        assert!((m.trace().re - 1.0).abs() < 1e-9);
        let r = out.to_result(5, &cfg);
        assert_eq!(r.filtered_modes, out.filtered_modes);
        assert_eq!(r.spectral_clamps, out.spectral_clamps);
        assert_eq!(r.symmetry_error, None);
    }

    #[test]
    fn test_last_change_tracks_order_parameter() {
        let cfg = config(5);
        let ex = Extractor::identity();
        let mut rng = SeededRng::new(0);
        let out = EvolutionKernel::new(&cfg, &Decay(0.5), &ex)
            .run(State::scalar(0.8), &mut rng, &mut NoHook)
            .unwrap();
        // 0.8 · 0.5⁵ = 0.025; previous 0.05
        assert!((out.state.last_change - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_to_result_uses_tail_window() {
        let cfg = config(50);
        let ex = Extractor::identity();
        let mut rng = SeededRng::new(0);
        let out = EvolutionKernel::new(&cfg, &Transition::Frozen, &ex)
            .run(State::scalar(0.6), &mut rng, &mut NoHook)
            .unwrap();
        let r = out.to_result(3, &cfg);
        assert_eq!(r.seed, 3);
        assert_eq!(r.tail_mean, 0.6);
        assert_eq!(r.predicted, 0.6);
        assert!(!r.converged);
        assert_eq!(r.iterations, 50);
    }
}
