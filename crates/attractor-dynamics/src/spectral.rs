// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Spectral Toolkit
// ─────────────────────────────────────────────────────────────────────
//! Eigendecomposition for the spectral transitions and extractors.
//!
//! - `SymmetricEigen`: cyclic Jacobi for real symmetric n×n.
//! - `HermitianEigen`: complex Hermitian via the real 2n×2n embedding
//!   [[A, -B], [B, A]]; each eigenvalue appears twice there, and complex
//!   Gram-Schmidt keeps one eigenvector per pair.
//! - Floor clamping before logarithms and the coherence filter.
//!
//! Eigenvalues are returned in descending order.

use num_complex::Complex64;

use attractor_types::{AttractorError, AttractorResult};

use crate::matrix::ComplexMatrix;

/// Strictly positive floor applied before any logarithm.
pub const SPECTRAL_FLOOR: f64 = 1e-12;

const JACOBI_MAX_SWEEPS: usize = 64;
const JACOBI_TOL: f64 = 1e-14;
/// Residual below which an embedded eigenvector is a phase copy of one
/// already accepted.
const PAIR_RESIDUAL_MIN: f64 = 1e-6;

/// Eigenpairs of a real symmetric matrix.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub n: usize,
    /// Descending.
    pub values: Vec<f64>,
    /// n×n row-major; column k is the eigenvector of `values[k]`.
    pub vectors: Vec<f64>,
}

impl SymmetricEigen {
    /// Decompose `a` (n×n row-major). The input is symmetrised first.
    pub fn compute(a: &[f64], n: usize) -> AttractorResult<Self> {
        if a.len() != n * n {
            return Err(AttractorError::Shape(format!(
                "symmetric eigen input has {} entries, expected {n}x{n}",
                a.len()
            )));
        }
        if a.iter().any(|v| !v.is_finite()) {
            return Err(AttractorError::Numerical(
                "eigen input contains NaN or Inf".to_string(),
            ));
        }

        let mut m = a.to_vec();
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (m[i * n + j] + m[j * n + i]);
                m[i * n + j] = avg;
                m[j * n + i] = avg;
            }
        }

        let mut v = vec![0.0; n * n];
        for i in 0..n {
            v[i * n + i] = 1.0;
        }

        let scale = m.iter().map(|x| x * x).sum::<f64>().sqrt().max(1.0);
        for _ in 0..JACOBI_MAX_SWEEPS {
            if off_diagonal_norm(&m, n) < JACOBI_TOL * scale {
                break;
            }
            for p in 0..n {
                for q in (p + 1)..n {
                    jacobi_rotate(&mut m, &mut v, n, p, q);
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&x, &y| {
            m[y * n + y]
                .partial_cmp(&m[x * n + x])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let values = order.iter().map(|&k| m[k * n + k]).collect();
        let mut vectors = vec![0.0; n * n];
        for (new_col, &old_col) in order.iter().enumerate() {
            for row in 0..n {
                vectors[row * n + new_col] = v[row * n + old_col];
            }
        }

        Ok(Self { n, values, vectors })
    }

    /// Column `k` as an owned vector.
    pub fn vector(&self, k: usize) -> Vec<f64> {
        (0..self.n).map(|row| self.vectors[row * self.n + k]).collect()
    }
}

fn off_diagonal_norm(m: &[f64], n: usize) -> f64 {
    let mut s = 0.0;
    for p in 0..n {
        for q in (p + 1)..n {
            s += m[p * n + q] * m[p * n + q];
        }
    }
    s.sqrt()
}

/// One Jacobi rotation annihilating m[p][q].
fn jacobi_rotate(m: &mut [f64], v: &mut [f64], n: usize, p: usize, q: usize) {
    let apq = m[p * n + q];
    if apq.abs() < f64::MIN_POSITIVE {
        return;
    }
    let theta = (m[q * n + q] - m[p * n + p]) / (2.0 * apq);
    // Smaller root of t² + 2θt - 1 = 0; 0.0f64.signum() is 1.0.
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    m[p * n + p] -= t * apq;
    m[q * n + q] += t * apq;
    m[p * n + q] = 0.0;
    m[q * n + p] = 0.0;

    for r in 0..n {
        if r == p || r == q {
            continue;
        }
        let arp = m[r * n + p];
        let arq = m[r * n + q];
        let new_rp = c * arp - s * arq;
        let new_rq = s * arp + c * arq;
        m[r * n + p] = new_rp;
        m[p * n + r] = new_rp;
        m[r * n + q] = new_rq;
        m[q * n + r] = new_rq;
    }

    for r in 0..n {
        let vrp = v[r * n + p];
        let vrq = v[r * n + q];
        v[r * n + p] = c * vrp - s * vrq;
        v[r * n + q] = s * vrp + c * vrq;
    }
}

/// Eigenpairs of a complex Hermitian matrix.
#[derive(Debug, Clone)]
pub struct HermitianEigen {
    /// Descending.
    pub values: Vec<f64>,
    /// Column k is the unit eigenvector of `values[k]`.
    pub vectors: ComplexMatrix,
}

impl HermitianEigen {
    /// Decompose the Hermitian part of `m`.
    pub fn compute(m: &ComplexMatrix) -> AttractorResult<Self> {
        if !m.is_finite() {
            return Err(AttractorError::Numerical(
                "eigen input contains NaN or Inf".to_string(),
            ));
        }
        let h = m.hermitian_part();
        let n = h.n();

        if h.max_imag() <= JACOBI_TOL * h.frobenius().max(1.0) {
            let sym = SymmetricEigen::compute(&h.real_part(), n)?;
            let vectors = ComplexMatrix::from_real(n, &sym.vectors)?;
            return Ok(Self {
                values: sym.values,
                vectors,
            });
        }

        let n2 = 2 * n;
        let mut embed = vec![0.0; n2 * n2];
        for i in 0..n {
            for j in 0..n {
                let z = h.get(i, j);
                embed[i * n2 + j] = z.re;
                embed[i * n2 + n + j] = -z.im;
                embed[(n + i) * n2 + j] = z.im;
                embed[(n + i) * n2 + n + j] = z.re;
            }
        }
        let sym = SymmetricEigen::compute(&embed, n2)?;

        let mut values = Vec::with_capacity(n);
        let mut columns: Vec<Vec<Complex64>> = Vec::with_capacity(n);
        for k in 0..n2 {
            if columns.len() == n {
                break;
            }
            let mut z: Vec<Complex64> = (0..n)
                .map(|i| Complex64::new(sym.vectors[i * n2 + k], sym.vectors[(n + i) * n2 + k]))
                .collect();
            for u in &columns {
                let proj: Complex64 = u.iter().zip(z.iter()).map(|(a, b)| a.conj() * b).sum();
                for (zi, ui) in z.iter_mut().zip(u.iter()) {
                    *zi -= ui * proj;
                }
            }
            let norm = z.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
            if norm > PAIR_RESIDUAL_MIN {
                for zi in z.iter_mut() {
                    *zi /= norm;
                }
                values.push(sym.values[k]);
                columns.push(z);
            }
        }

        if columns.len() < n {
            return Err(AttractorError::DegenerateSpectrum(format!(
                "hermitian embedding yielded {} of {n} eigenvectors",
                columns.len()
            )));
        }

        let mut vectors = ComplexMatrix::zeros(n);
        for (col, z) in columns.iter().enumerate() {
            for (row, &val) in z.iter().enumerate() {
                vectors.set(row, col, val);
            }
        }
        Ok(Self { values, vectors })
    }
}

/// Raise every eigenvalue below `floor` to `floor`.
///
/// Returns how many were clamped (recovered degenerate-spectrum events).
pub fn clamp_to_floor(values: &mut [f64], floor: f64) -> u64 {
    let mut clamped = 0;
    for v in values.iter_mut() {
        if !(*v >= floor) {
            *v = floor;
            clamped += 1;
        }
    }
    clamped
}

/// Coherence filter: zero eigenvalues whose magnitude is below
/// `fraction` of the total spectral energy Σ|λ|. Returns how many were
/// zeroed.
pub fn coherence_filter(values: &mut [f64], fraction: f64) -> u64 {
    let total: f64 = values.iter().map(|v| v.abs()).sum();
    let cutoff = fraction * total;
    let mut zeroed = 0;
    for v in values.iter_mut() {
        if v.abs() < cutoff && *v != 0.0 {
            *v = 0.0;
            zeroed += 1;
        }
    }
    zeroed
}

/// Σ_k λ_k v_k v_k†.
pub fn reconstruct(vectors: &ComplexMatrix, values: &[f64]) -> AttractorResult<ComplexMatrix> {
    let n = vectors.n();
    if values.len() != n {
        return Err(AttractorError::Shape(format!(
            "reconstruct with {} eigenvalues for {n}x{n} eigenvectors",
            values.len()
        )));
    }
    let mut out = ComplexMatrix::zeros(n);
    for (k, &lam) in values.iter().enumerate() {
        if lam == 0.0 {
            continue;
        }
        for i in 0..n {
            let vik = vectors.get(i, k) * lam;
            for j in 0..n {
                let cur = out.get(i, j);
                out.set(i, j, cur + vik * vectors.get(j, k).conj());
            }
        }
    }
    Ok(out)
}

/// |λ_i| / Σ|λ|; `None` when the total is below `epsilon`.
pub fn spectral_weights(values: &[f64], epsilon: f64) -> Option<Vec<f64>> {
    let total: f64 = values.iter().map(|v| v.abs()).sum();
    if !(total >= epsilon) {
        return None;
    }
    Some(values.iter().map(|v| v.abs() / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_eigenvalues_descending() {
        let n = 4;
        let mut a = vec![0.0; n * n];
        for i in 0..n {
            a[i * n + i] = (i + 1) as f64;
        }
        let eig = SymmetricEigen::compute(&a, n).unwrap();
        for (k, &v) in eig.values.iter().enumerate() {
            assert!((v - (n - k) as f64).abs() < 1e-12, "values={:?}", eig.values);
        }
    }

    #[test]
    fn test_symmetric_eigenvectors_orthonormal_and_reconstruct() {
        let n = 4;
        let a = vec![
            4.0, 1.0, 0.5, 0.2, 1.0, 3.0, 0.8, 0.3, 0.5, 0.8, 2.0, 0.1, 0.2, 0.3, 0.1, 1.0,
        ];
        let eig = SymmetricEigen::compute(&a, n).unwrap();
        for i in 0..n {
            for j in 0..n {
                let dot: f64 = (0..n)
                    .map(|k| eig.vectors[k * n + i] * eig.vectors[k * n + j])
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-10, "V^T V[{i},{j}] = {dot}");
            }
        }
        // A v = λ v for the dominant pair
        let v0 = eig.vector(0);
        for row in 0..n {
            let av: f64 = (0..n).map(|c| a[row * n + c] * v0[c]).sum();
            assert!((av - eig.values[0] * v0[row]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_nan_input_rejected() {
        let a = vec![1.0, f64::NAN, f64::NAN, 1.0];
        assert!(SymmetricEigen::compute(&a, 2).is_err());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(SymmetricEigen::compute(&[1.0, 2.0, 3.0], 2).is_err());
    }

    #[test]
    fn test_complex_hermitian_two_by_two() {
        // [[2, i], [-i, 2]] has eigenvalues 3 and 1.
        let m = ComplexMatrix::from_vec(
            2,
            vec![
                Complex64::new(2.0, 0.0),
                Complex64::new(0.0, 1.0),
                Complex64::new(0.0, -1.0),
                Complex64::new(2.0, 0.0),
            ],
        )
        .unwrap();
        let eig = HermitianEigen::compute(&m).unwrap();
        assert!((eig.values[0] - 3.0).abs() < 1e-10, "{:?}", eig.values);
        assert!((eig.values[1] - 1.0).abs() < 1e-10, "{:?}", eig.values);

        let back = reconstruct(&eig.vectors, &eig.values).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert!((back.get(i, j) - m.get(i, j)).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn test_complex_hermitian_degenerate_spectrum() {
        // Identity plus a purely imaginary rank-2 part; eigenvalue 1 twice.
        let n = 3;
        let mut m = ComplexMatrix::identity(n);
        m.set(0, 1, Complex64::new(0.0, 0.5));
        m.set(1, 0, Complex64::new(0.0, -0.5));
        let eig = HermitianEigen::compute(&m).unwrap();
        let sum: f64 = eig.values.iter().sum();
        assert!((sum - 3.0).abs() < 1e-10, "trace preserved: {:?}", eig.values);
        assert!((eig.values[0] - 1.5).abs() < 1e-10);
        assert!((eig.values[2] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_clamp_to_floor_counts() {
        let mut v = vec![0.5, 0.0, -1e-3, f64::NAN];
        let n = clamp_to_floor(&mut v, SPECTRAL_FLOOR);
        assert_eq!(n, 3);
        assert!(v.iter().all(|&x| x >= SPECTRAL_FLOOR));
        assert_eq!(v[0], 0.5);
    }

    #[test]
    fn test_coherence_filter_zeroes_weak_modes() {
        let mut v = vec![0.6, 0.3, 0.07, 0.03];
        let zeroed = coherence_filter(&mut v, 0.05);
        assert_eq!(zeroed, 1);
        assert_eq!(v, vec![0.6, 0.3, 0.07, 0.0]);
    }

    #[test]
    fn test_spectral_weights_degenerate() {
        assert!(spectral_weights(&[0.0, 0.0], 1e-10).is_none());
        let w = spectral_weights(&[3.0, -1.0], 1e-10).unwrap();
        assert!((w[0] - 0.75).abs() < 1e-12);
    }
}
