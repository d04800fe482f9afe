use faer::linalg::solvers::Solve;
use faer::{linalg::matmul::matmul, Accum, MatRef, Par, Side};

use crate::error::{CofactorError, Result};
use crate::math::{axpy, dot};
use crate::weights::{EntityKey, Weights};

/// Dense symmetric `k x k` matrix in row-major order.
///
/// The sweep-level background matrix is built once and then only borrowed:
/// [`Gram::with_ridge`] and [`Gram::corrected`] hand back fresh matrices, so a
/// per-row solve can never write into the shared background.
#[derive(Debug, Clone, PartialEq)]
pub struct Gram {
    k: usize,
    data: Vec<f64>,
}

impl Gram {
    pub fn zeros(k: usize) -> Self {
        Self {
            k,
            data: vec![0.0; k * k],
        }
    }

    pub fn identity(k: usize) -> Self {
        Self::zeros(k).with_ridge(1.0)
    }

    pub fn from_row_major(k: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != k * k {
            return Err(CofactorError::DimensionMismatch {
                expected: k * k,
                actual: data.len(),
            });
        }
        Ok(Self { k, data })
    }

    pub fn dim(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.k + col]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copy with `lambda` added to every diagonal entry.
    pub fn with_ridge(&self, lambda: f64) -> Gram {
        let mut out = self.clone();
        for j in 0..self.k {
            out.data[j * self.k + j] += lambda;
        }
        out
    }

    /// `self + correction` as a new matrix.
    pub fn corrected(&self, correction: &Gram) -> Gram {
        debug_assert_eq!(self.k, correction.k);
        let mut out = self.clone();
        axpy(1.0, &correction.data, &mut out.data);
        out
    }

    /// `self += weight * v vᵀ`
    pub(crate) fn add_outer(&mut self, weight: f64, v: &[f64]) {
        let k = self.k;
        for r in 0..k {
            axpy(weight * v[r], v, &mut self.data[r * k..(r + 1) * k]);
        }
    }

    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        (0..self.k)
            .map(|r| dot(&self.data[r * self.k..(r + 1) * self.k], x))
            .collect()
    }

    /// `xᵀ M x`
    pub fn quadratic_form(&self, x: &[f64]) -> f64 {
        dot(x, &self.mul_vec(x))
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.k).all(|r| (r + 1..self.k).all(|c| (self.get(r, c) - self.get(c, r)).abs() <= tol))
    }

    /// Solves `self · x = rhs` through an LLᵀ factorization.
    ///
    /// The matrix must be symmetric positive definite; a failed factorization
    /// is fatal for the calling sweep.
    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let k = self.k;
        if rhs.len() != k {
            return Err(CofactorError::DimensionMismatch {
                expected: k,
                actual: rhs.len(),
            });
        }
        let a_mat = MatRef::from_row_major_slice(&self.data, k, k);
        let b_mat = MatRef::from_column_major_slice(rhs, k, 1);

        let llt = a_mat
            .llt(Side::Lower)
            .map_err(|_| CofactorError::NotPositiveDefinite { dim: k })?;
        let x = llt.solve(b_mat);

        let out: Vec<f64> = (0..k).map(|i| x[(i, 0)]).collect();
        if out.iter().any(|v| !v.is_finite()) {
            return Err(CofactorError::NonFiniteSolution);
        }
        Ok(out)
    }
}

/// `weight · WᵀW` over every vector in the table.
pub fn weighted_gram<K: EntityKey>(weights: &Weights<K>, weight: f64) -> Gram {
    let k = weights.factor();
    let n = weights.len();
    let mut g = Gram::zeros(k);
    if n == 0 || k == 0 {
        return g;
    }

    let y = MatRef::from_row_major_slice(weights.as_flat(), n, k);
    let yt = y.transpose();
    let mut m = faer::Mat::<f64>::zeros(k, k);
    matmul(m.as_mut(), Accum::Replace, yt, y, weight, Par::Seq);

    for a in 0..k {
        for b in 0..k {
            g.data[a * k + b] = m[(a, b)];
        }
    }
    g
}

/// `weight · WᵀW` restricted to `keys`. Keys without a vector contribute
/// nothing.
pub fn weighted_gram_subset<K: EntityKey>(keys: &[K], weights: &Weights<K>, weight: f64) -> Gram {
    let mut g = Gram::zeros(weights.factor());
    for key in keys {
        if let Some(v) = weights.get(key) {
            g.add_outer(weight, v);
        }
    }
    g
}
