// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Dense Complex Matrix
// ─────────────────────────────────────────────────────────────────────
//! Square complex matrix, row-major. Real matrices carry zero imaginary
//! parts. Sizes here are tiny (n ≤ 16), so everything is naive O(n³).

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use attractor_types::{AttractorError, AttractorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexMatrix {
    n: usize,
    data: Vec<Complex64>,
}

impl ComplexMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![Complex64::new(0.0, 0.0); n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m.data[i * n + i] = Complex64::new(1.0, 0.0);
        }
        m
    }

    pub fn from_vec(n: usize, data: Vec<Complex64>) -> AttractorResult<Self> {
        if data.len() != n * n {
            return Err(AttractorError::Shape(format!(
                "matrix payload has {} entries, expected {n}x{n}",
                data.len()
            )));
        }
        Ok(Self { n, data })
    }

    pub fn from_real(n: usize, values: &[f64]) -> AttractorResult<Self> {
        Self::from_vec(
            n,
            values.iter().map(|&v| Complex64::new(v, 0.0)).collect(),
        )
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        self.data[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: Complex64) {
        self.data[i * self.n + j] = v;
    }

    pub fn trace(&self) -> Complex64 {
        (0..self.n).map(|i| self.get(i, i)).sum()
    }

    pub fn frobenius(&self) -> f64 {
        self.data.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
    }

    pub fn scale(&mut self, factor: f64) {
        for z in self.data.iter_mut() {
            *z *= factor;
        }
    }

    pub fn adjoint(&self) -> Self {
        let n = self.n;
        let mut out = Self::zeros(n);
        for i in 0..n {
            for j in 0..n {
                out.data[j * n + i] = self.data[i * n + j].conj();
            }
        }
        out
    }

    pub fn matmul(&self, other: &Self) -> AttractorResult<Self> {
        if self.n != other.n {
            return Err(AttractorError::Shape(format!(
                "matmul of {}x{} by {}x{}",
                self.n, self.n, other.n, other.n
            )));
        }
        let n = self.n;
        let mut out = Self::zeros(n);
        for i in 0..n {
            for k in 0..n {
                let a = self.data[i * n + k];
                if a == Complex64::new(0.0, 0.0) {
                    continue;
                }
                for j in 0..n {
                    out.data[i * n + j] += a * other.data[k * n + j];
                }
            }
        }
        Ok(out)
    }

    /// (M + M†) / 2.
    pub fn hermitian_part(&self) -> Self {
        let n = self.n;
        let mut out = Self::zeros(n);
        for i in 0..n {
            for j in 0..n {
                out.data[i * n + j] = (self.data[i * n + j] + self.data[j * n + i].conj()) * 0.5;
            }
        }
        out
    }

    /// Real parts, row-major.
    pub fn real_part(&self) -> Vec<f64> {
        self.data.iter().map(|z| z.re).collect()
    }

    pub fn max_imag(&self) -> f64 {
        self.data.iter().fold(0.0, |m, z| m.max(z.im.abs()))
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|z| z.re.is_finite() && z.im.is_finite())
    }

    /// Keep only the diagonal.
    pub fn diagonal_part(&self) -> Self {
        let mut out = Self::zeros(self.n);
        for i in 0..self.n {
            out.set(i, i, self.get(i, i));
        }
        out
    }

    /// `a * self + b * other`, element-wise.
    pub fn blend(&self, a: f64, other: &Self, b: f64) -> AttractorResult<Self> {
        if self.n != other.n {
            return Err(AttractorError::Shape(format!(
                "blend of {}x{} with {}x{}",
                self.n, self.n, other.n, other.n
            )));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&x, &y)| x * a + y * b)
            .collect();
        Ok(Self { n: self.n, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_identity_trace() {
        let m = ComplexMatrix::identity(4);
        assert_eq!(m.trace(), c(4.0, 0.0));
        assert!((m.frobenius() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_vec_shape_checked() {
        assert!(ComplexMatrix::from_vec(2, vec![c(1.0, 0.0); 3]).is_err());
    }

    #[test]
    fn test_matmul_identity() {
        let m = ComplexMatrix::from_vec(2, vec![c(1.0, 2.0), c(0.0, -1.0), c(3.0, 0.0), c(0.5, 0.5)])
            .unwrap();
        let p = m.matmul(&ComplexMatrix::identity(2)).unwrap();
        assert_eq!(p, m);
    }

    #[test]
    fn test_hermitian_part_is_hermitian() {
        let m = ComplexMatrix::from_vec(2, vec![c(1.0, 1.0), c(2.0, -1.0), c(0.0, 3.0), c(4.0, 0.0)])
            .unwrap();
        let h = m.hermitian_part();
        assert_eq!(h.adjoint(), h);
        assert!(h.get(0, 0).im.abs() < 1e-15);
    }

    #[test]
    fn test_blend_and_diagonal() {
        let m = ComplexMatrix::from_real(2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let d = m.diagonal_part();
        assert_eq!(d.get(0, 1), c(0.0, 0.0));
        let b = m.blend(0.5, &d, 0.5).unwrap();
        assert_eq!(b.get(0, 0), c(1.0, 0.0));
        assert_eq!(b.get(0, 1), c(1.0, 0.0));
    }
}
