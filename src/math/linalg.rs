//! Fixed-size SPD linear algebra for the LinUCB arms.
//!
//! Arm matrices are `A = I + sum(x xᵀ)` over 8-dimensional feature vectors,
//! stored as flat 64-element row-major buffers. A is positive-definite by
//! construction, so Cholesky factorization is both the cheapest and the most
//! numerically honest route to `A⁻¹ b` and `xᵀ A⁻¹ x`; a factorization
//! failure means the invariant is broken, not that a pivot strategy is
//! missing.

use crate::error::CoreError;

/// Feature dimension: 7 context features plus a constant bias term.
pub const FEATURE_DIM: usize = 8;

/// Flat row-major length of an arm matrix.
pub const MATRIX_LEN: usize = FEATURE_DIM * FEATURE_DIM;

/// Lower-triangular Cholesky factor of an SPD matrix.
#[derive(Debug)]
pub struct Cholesky {
    l: [f64; MATRIX_LEN],
}

impl Cholesky {
    /// Factor `a` (row-major, symmetric positive-definite) as `L Lᵀ`.
    ///
    /// Returns `CoreError::Fatal` if a pivot is not strictly positive.
    pub fn factor(a: &[f64; MATRIX_LEN]) -> Result<Self, CoreError> {
        let mut l = [0.0f64; MATRIX_LEN];
        for i in 0..FEATURE_DIM {
            for j in 0..=i {
                let mut sum = a[i * FEATURE_DIM + j];
                for k in 0..j {
                    sum -= l[i * FEATURE_DIM + k] * l[j * FEATURE_DIM + k];
                }
                if i == j {
                    if sum <= 0.0 || !sum.is_finite() {
                        return Err(CoreError::Fatal(format!(
                            "arm matrix is not positive-definite (pivot {i} = {sum})"
                        )));
                    }
                    l[i * FEATURE_DIM + j] = sum.sqrt();
                } else {
                    l[i * FEATURE_DIM + j] = sum / l[j * FEATURE_DIM + j];
                }
            }
        }
        Ok(Self { l })
    }

    /// Solve `A x = b` via forward then back substitution.
    pub fn solve(&self, b: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let y = self.forward(b);
        // Back substitution on Lᵀ
        let mut x = [0.0f64; FEATURE_DIM];
        for i in (0..FEATURE_DIM).rev() {
            let mut sum = y[i];
            for k in (i + 1)..FEATURE_DIM {
                sum -= self.l[k * FEATURE_DIM + i] * x[k];
            }
            x[i] = sum / self.l[i * FEATURE_DIM + i];
        }
        x
    }

    /// Quadratic form `xᵀ A⁻¹ x`, computed as `‖L⁻¹ x‖²` without ever
    /// forming the inverse.
    pub fn quad_form(&self, x: &[f64; FEATURE_DIM]) -> f64 {
        let z = self.forward(x);
        z.iter().map(|v| v * v).sum()
    }

    fn forward(&self, b: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut y = [0.0f64; FEATURE_DIM];
        for i in 0..FEATURE_DIM {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.l[i * FEATURE_DIM + k] * y[k];
            }
            y[i] = sum / self.l[i * FEATURE_DIM + i];
        }
        y
    }
}

/// Accumulate `a += x xᵀ` in place.
pub fn rank_one_update(a: &mut [f64; MATRIX_LEN], x: &[f64; FEATURE_DIM]) {
    for i in 0..FEATURE_DIM {
        for j in 0..FEATURE_DIM {
            a[i * FEATURE_DIM + j] += x[i] * x[j];
        }
    }
}

/// Row-major identity, the initial value of every arm matrix.
pub fn identity() -> [f64; MATRIX_LEN] {
    let mut a = [0.0f64; MATRIX_LEN];
    for i in 0..FEATURE_DIM {
        a[i * FEATURE_DIM + i] = 1.0;
    }
    a
}
