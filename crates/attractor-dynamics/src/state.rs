// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Evolving State
// ─────────────────────────────────────────────────────────────────────
//! The object a transition rule evolves: a particle ensemble, a complex
//! matrix, or a scalar, plus the iteration index and the magnitude of the
//! last order-parameter change.
//!
//! A state's shape is fixed when the run starts. Transitions consume the
//! state and hand back the next one; the kernel rejects any step that
//! changes the shape.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use attractor_types::{AttractorError, AttractorResult};

use crate::matrix::ComplexMatrix;
use crate::rng::SeededRng;
use crate::transition::NormPolicy;

/// Particle ensemble, `rows` particles × `dims` dimensions, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    rows: usize,
    dims: usize,
    data: Vec<f64>,
}

impl Ensemble {
    pub fn new(rows: usize, dims: usize, data: Vec<f64>) -> AttractorResult<Self> {
        if rows == 0 || dims == 0 {
            return Err(AttractorError::Shape(format!(
                "ensemble needs at least one particle and one dimension, got {rows}x{dims}"
            )));
        }
        if data.len() != rows * dims {
            return Err(AttractorError::Shape(format!(
                "ensemble payload has {} values, expected {rows}x{dims}",
                data.len()
            )));
        }
        Ok(Self { rows, dims, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Population variance of every dimension (two-pass).
    pub fn column_variances(&self) -> Vec<f64> {
        let n = self.rows as f64;
        let mut means = vec![0.0; self.dims];
        for row in self.data.chunks_exact(self.dims) {
            for (m, &x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in means.iter_mut() {
            *m /= n;
        }
        let mut vars = vec![0.0; self.dims];
        for row in self.data.chunks_exact(self.dims) {
            for ((v, &m), &x) in vars.iter_mut().zip(&means).zip(row) {
                let d = x - m;
                *v += d * d;
            }
        }
        for v in vars.iter_mut() {
            *v /= n;
        }
        vars
    }

    /// Population std of the per-dimension variances.
    pub fn variance_spread(&self) -> f64 {
        let vars = self.column_variances();
        let n = vars.len() as f64;
        let mean = vars.iter().sum::<f64>() / n;
        (vars.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
    }

    fn rms(&self) -> f64 {
        (self.data.iter().map(|x| x * x).sum::<f64>() / self.data.len() as f64).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Ensemble(Ensemble),
    Matrix(ComplexMatrix),
    Scalar { value: f64 },
}

/// Payload shape; fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Ensemble { rows: usize, dims: usize },
    Matrix { n: usize },
    Scalar,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Ensemble { rows, dims } => write!(f, "ensemble {rows}x{dims}"),
            Shape::Matrix { n } => write!(f, "matrix {n}x{n}"),
            Shape::Scalar => write!(f, "scalar"),
        }
    }
}

/// Random draw applied by the basin scenario before evolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imbalance {
    pub dim: usize,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub payload: Payload,
    /// Completed iterations.
    pub iteration: u64,
    /// |Δ order parameter| over the last iteration.
    pub last_change: f64,
}

impl State {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            iteration: 0,
            last_change: 0.0,
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self::new(Payload::Scalar { value })
    }

    pub fn matrix(m: ComplexMatrix) -> Self {
        Self::new(Payload::Matrix(m))
    }

    /// Gaussian ensemble; dimension `d` has standard deviation `scales[d]`.
    pub fn gaussian_ensemble(
        rows: usize,
        dims: usize,
        scales: &[f64],
        rng: &mut SeededRng,
    ) -> AttractorResult<Self> {
        if scales.len() != dims {
            return Err(AttractorError::Shape(format!(
                "{} scales supplied for {dims} dimensions",
                scales.len()
            )));
        }
        let mut data = Vec::with_capacity(rows * dims);
        for _ in 0..rows {
            for &s in scales {
                data.push(rng.normal() * s);
            }
        }
        Ok(Self::new(Payload::Ensemble(Ensemble::new(rows, dims, data)?)))
    }

    /// Standard Gaussian ensemble with one randomly chosen dimension
    /// scaled by a factor drawn from U(1, max_imbalance).
    pub fn imbalanced_ensemble(
        rows: usize,
        dims: usize,
        max_imbalance: f64,
        rng: &mut SeededRng,
    ) -> AttractorResult<(Self, Imbalance)> {
        let factor = rng.uniform(1.0, max_imbalance);
        let dim = rng.index(dims);
        let mut scales = vec![1.0; dims];
        if let Some(s) = scales.get_mut(dim) {
            *s = factor;
        }
        let state = Self::gaussian_ensemble(rows, dims, &scales, rng)?;
        Ok((state, Imbalance { dim, factor }))
    }

    /// Random Hermitian matrix (G + G†) / 2 with complex Gaussian G.
    pub fn random_hermitian(n: usize, rng: &mut SeededRng) -> AttractorResult<Self> {
        Ok(Self::matrix(gaussian_matrix(n, rng)?.hermitian_part()))
    }

    /// Random density matrix G G† / tr(G G†).
    pub fn random_density(n: usize, rng: &mut SeededRng) -> AttractorResult<Self> {
        let g = gaussian_matrix(n, rng)?;
        let mut rho = g.matmul(&g.adjoint())?;
        let tr = rho.trace().re;
        if tr <= 0.0 {
            return Err(AttractorError::Numerical(
                "random density has zero trace".to_string(),
            ));
        }
        rho.scale(1.0 / tr);
        Ok(Self::matrix(rho))
    }

    /// Real circulant matrix X_ij = c[(j - i) mod n] with Gaussian c.
    pub fn circulant(n: usize, rng: &mut SeededRng) -> AttractorResult<Self> {
        let c: Vec<f64> = (0..n).map(|_| rng.normal()).collect();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                values[i * n + j] = c[(j + n - i) % n];
            }
        }
        Ok(Self::matrix(ComplexMatrix::from_real(n, &values)?))
    }

    pub fn shape(&self) -> Shape {
        match &self.payload {
            Payload::Ensemble(e) => Shape::Ensemble {
                rows: e.rows,
                dims: e.dims,
            },
            Payload::Matrix(m) => Shape::Matrix { n: m.n() },
            Payload::Scalar { .. } => Shape::Scalar,
        }
    }

    /// Add a `strength`·N(0, 1) shock along dimension `dim`.
    ///
    /// Ensembles get an independent draw per particle on that column,
    /// matrices on diagonal entry (dim, dim), scalars directly.
    pub fn inject_shock(
        &mut self,
        dim: usize,
        strength: f64,
        rng: &mut SeededRng,
    ) -> AttractorResult<()> {
        match &mut self.payload {
            Payload::Ensemble(e) => {
                if dim >= e.dims {
                    return Err(AttractorError::Shape(format!(
                        "shock dimension {dim} outside ensemble with {} dims",
                        e.dims
                    )));
                }
                let dims = e.dims;
                for row in e.data.chunks_exact_mut(dims) {
                    row[dim] += strength * rng.normal();
                }
            }
            Payload::Matrix(m) => {
                if dim >= m.n() {
                    return Err(AttractorError::Shape(format!(
                        "shock dimension {dim} outside {}x{} matrix",
                        m.n(),
                        m.n()
                    )));
                }
                let kick = Complex64::new(strength * rng.normal(), 0.0);
                let cur = m.get(dim, dim);
                m.set(dim, dim, cur + kick);
            }
            Payload::Scalar { value } => {
                *value += strength * rng.normal();
            }
        }
        Ok(())
    }

    /// Variance spread across dimensions, for ensemble payloads.
    pub fn symmetry_error(&self) -> Option<f64> {
        match &self.payload {
            Payload::Ensemble(e) => Some(e.variance_spread()),
            _ => None,
        }
    }

    /// Number of shockable dimensions.
    pub fn shock_dims(&self) -> usize {
        match &self.payload {
            Payload::Ensemble(e) => e.dims,
            Payload::Matrix(m) => m.n(),
            Payload::Scalar { .. } => 1,
        }
    }

    /// Apply the transition's normalization policy.
    ///
    /// Every policy aborts with `NumericalCollapse` when its denominator
    /// falls below `epsilon`; `Guard` checks without rescaling.
    pub fn normalize(&mut self, policy: NormPolicy, epsilon: f64) -> AttractorResult<()> {
        let iteration = self.iteration;
        let shape = self.shape();
        let collapse = |quantity: &str, value: f64| AttractorError::NumericalCollapse {
            iteration,
            quantity: quantity.to_string(),
            value,
            epsilon,
        };

        match (policy, &mut self.payload) {
            (NormPolicy::Guard, Payload::Ensemble(e)) => {
                let rms = e.rms();
                if !(rms >= epsilon) {
                    return Err(collapse("ensemble rms", rms));
                }
            }
            (NormPolicy::Guard, Payload::Matrix(m)) => {
                let f = m.frobenius();
                if !(f >= epsilon) {
                    return Err(collapse("frobenius norm", f));
                }
            }
            (NormPolicy::Guard, Payload::Scalar { value }) => {
                if !(value.abs() >= epsilon) {
                    return Err(collapse("scalar magnitude", value.abs()));
                }
            }
            (NormPolicy::UnitTrace, Payload::Matrix(m)) => {
                let tr = m.trace().re;
                if !(tr.abs() >= epsilon) {
                    return Err(collapse("trace", tr));
                }
                m.scale(1.0 / tr);
            }
            (NormPolicy::UnitFrobenius, Payload::Matrix(m)) => {
                let f = m.frobenius();
                if !(f >= epsilon) {
                    return Err(collapse("frobenius norm", f));
                }
                m.scale(1.0 / f);
            }
            (policy, _) => {
                return Err(AttractorError::Shape(format!(
                    "{policy:?} normalization needs a matrix payload, state is {shape}"
                )));
            }
        }
        Ok(())
    }

    /// Reject NaN/Inf anywhere in the payload.
    pub fn check_finite(&self) -> AttractorResult<()> {
        let finite = match &self.payload {
            Payload::Ensemble(e) => e.data.iter().all(|x| x.is_finite()),
            Payload::Matrix(m) => m.is_finite(),
            Payload::Scalar { value } => value.is_finite(),
        };
        if finite {
            Ok(())
        } else {
            Err(AttractorError::Numerical(format!(
                "non-finite value in {} payload at iteration {}",
                self.shape(),
                self.iteration
            )))
        }
    }
}

fn gaussian_matrix(n: usize, rng: &mut SeededRng) -> AttractorResult<ComplexMatrix> {
    if n == 0 {
        return Err(AttractorError::Shape("matrix size must be >= 1".to_string()));
    }
    let data = (0..n * n)
        .map(|_| Complex64::new(rng.normal(), rng.normal()))
        .collect();
    ComplexMatrix::from_vec(n, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensemble_shape_checked() {
        assert!(Ensemble::new(2, 3, vec![0.0; 5]).is_err());
        assert!(Ensemble::new(0, 3, vec![]).is_err());
    }

    #[test]
    fn test_column_variances_population() {
        // dim 0: [1, 3] → var 1; dim 1: [2, 2] → var 0
        let e = Ensemble::new(2, 2, vec![1.0, 2.0, 3.0, 2.0]).unwrap();
        assert_eq!(e.column_variances(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_symmetry_error_is_variance_spread() {
        // variances [1, 0] → mean 0.5, spread 0.5
        let e = Ensemble::new(2, 2, vec![1.0, 2.0, 3.0, 2.0]).unwrap();
        let s = State::new(Payload::Ensemble(e));
        assert_eq!(s.symmetry_error(), Some(0.5));
        assert_eq!(State::scalar(0.3).symmetry_error(), None);
    }

    #[test]
    fn test_gaussian_ensemble_scales() {
        let mut rng = SeededRng::new(1);
        let s = State::gaussian_ensemble(20_000, 2, &[1.0, 10.0], &mut rng).unwrap();
        let Payload::Ensemble(e) = &s.payload else {
            panic!("expected ensemble");
        };
        let v = e.column_variances();
        assert!((v[0] - 1.0).abs() < 0.05, "v={v:?}");
        assert!((v[1] - 100.0).abs() < 5.0, "v={v:?}");
    }

    #[test]
    fn test_imbalanced_ensemble_reports_draw() {
        let mut rng = SeededRng::new(5);
        let (s, imb) = State::imbalanced_ensemble(100, 4, 1000.0, &mut rng).unwrap();
        assert!(imb.dim < 4);
        assert!((1.0..1000.0).contains(&imb.factor));
        assert_eq!(s.shape(), Shape::Ensemble { rows: 100, dims: 4 });
    }

    #[test]
    fn test_random_density_unit_trace_hermitian() {
        let mut rng = SeededRng::new(2);
        let s = State::random_density(4, &mut rng).unwrap();
        let Payload::Matrix(m) = &s.payload else {
            panic!("expected matrix");
        };
        assert!((m.trace().re - 1.0).abs() < 1e-12);
        for i in 0..4 {
            for j in 0..4 {
                assert!((m.get(i, j) - m.get(j, i).conj()).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn test_circulant_structure() {
        let mut rng = SeededRng::new(3);
        let s = State::circulant(5, &mut rng).unwrap();
        let Payload::Matrix(m) = &s.payload else {
            panic!("expected matrix");
        };
        for i in 0..5 {
            assert_eq!(m.get(i, (i + 1) % 5), m.get(0, 1));
            assert_eq!(m.get(i, i), m.get(0, 0));
        }
    }

    #[test]
    fn test_unit_trace_normalization() {
        let mut s = State::matrix(ComplexMatrix::identity(4));
        s.normalize(NormPolicy::UnitTrace, 1e-10).unwrap();
        let Payload::Matrix(m) = &s.payload else {
            panic!("expected matrix");
        };
        assert!((m.trace().re - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_collapse_below_epsilon() {
        let mut s = State::matrix(ComplexMatrix::zeros(3));
        s.iteration = 17;
        let err = s.normalize(NormPolicy::UnitTrace, 1e-10).unwrap_err();
        match err {
            AttractorError::NumericalCollapse {
                iteration,
                quantity,
                ..
            } => {
                assert_eq!(iteration, 17);
                assert_eq!(quantity, "trace");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_guard_does_not_rescale() {
        let mut s = State::scalar(0.8);
        s.normalize(NormPolicy::Guard, 1e-10).unwrap();
        assert_eq!(s.payload, Payload::Scalar { value: 0.8 });
    }

    #[test]
    fn test_unit_trace_on_ensemble_is_shape_error() {
        let mut s = State::new(Payload::Ensemble(Ensemble::new(1, 1, vec![1.0]).unwrap()));
        assert!(matches!(
            s.normalize(NormPolicy::UnitTrace, 1e-10),
            Err(AttractorError::Shape(_))
        ));
    }

    #[test]
    fn test_inject_shock_touches_one_dimension() {
        let mut rng = SeededRng::new(4);
        let mut s = State::new(Payload::Ensemble(Ensemble::new(10, 3, vec![0.0; 30]).unwrap()));
        s.inject_shock(1, 10.0, &mut rng).unwrap();
        let Payload::Ensemble(e) = &s.payload else {
            panic!("expected ensemble");
        };
        let v = e.column_variances();
        assert_eq!(v[0], 0.0);
        assert_eq!(v[2], 0.0);
        assert!(v[1] > 0.0);
        assert!(s.inject_shock(3, 1.0, &mut rng).is_err());
    }

    #[test]
    fn test_check_finite() {
        assert!(State::scalar(f64::NAN).check_finite().is_err());
        assert!(State::scalar(0.3).check_finite().is_ok());
    }
}
