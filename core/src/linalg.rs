//! Linear algebra helpers for covariance propagation and least-squares solves.
//!
//! Public API:
//!     pub fn pseudo_inverse(matrix: &DMatrix<f64>) -> DMatrix<f64>
//!     pub fn pseudo_inverse_with_rank(matrix: &DMatrix<f64>) -> (DMatrix<f64>, usize)
//!     pub fn least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64>
//!     pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64>
//!     pub fn is_symmetric(m: &DMatrix<f64>, tol: f64) -> bool
//!     pub fn is_finite(m: &DMatrix<f64>) -> bool
//!
//! Strategy for the pseudo-inverse:
//! 1) Reject non-finite input early (SVD on NaN does not converge) → NaN result
//! 2) Thin SVD  A = U Σ Vᵀ
//! 3) Singular values below `ε · max(m, n) · σ_max` are treated as zero
//! 4) A⁺ = V Σ⁺ Uᵀ
//!
//! Every inversion of a covariance-like matrix in this crate goes through
//! [pseudo_inverse] so that singular or ill-conditioned inputs degrade into
//! wide uncertainty rather than a failure.

use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector};

/// Iteration cap for the SVD. Well-conditioned inputs converge in a handful of sweeps.
const MAX_SVD_ITERATIONS: usize = 1_000;

/// Moore-Penrose pseudo-inverse of an arbitrary (possibly singular, possibly
/// rectangular) matrix.
///
/// # Arguments
/// * `matrix` - the m×n matrix to invert
///
/// # Returns
/// The n×m pseudo-inverse. A zero matrix yields a zero pseudo-inverse. Input
/// containing NaN or infinity yields an all-NaN result so that the caller can
/// detect it with [is_finite] instead of stalling in the SVD.
pub fn pseudo_inverse(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    pseudo_inverse_with_rank(matrix).0
}

/// Pseudo-inverse together with the numerical rank used to build it.
///
/// The rank is the count of singular values above the cutoff. Callers use it as
/// a degeneracy signal (a 2×2 normal matrix of rank 1 means colinear anchors).
pub fn pseudo_inverse_with_rank(matrix: &DMatrix<f64>) -> (DMatrix<f64>, usize) {
    let (nrows, ncols) = matrix.shape();
    if nrows == 0 || ncols == 0 {
        return (DMatrix::zeros(ncols, nrows), 0);
    }
    if !is_finite(matrix) {
        return (DMatrix::from_element(ncols, nrows, f64::NAN), 0);
    }
    let Some(svd) = SVD::try_new(
        matrix.clone(),
        true,
        true,
        f64::EPSILON,
        MAX_SVD_ITERATIONS,
    ) else {
        return (DMatrix::from_element(ncols, nrows, f64::NAN), 0);
    };
    let (Some(u), Some(v_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
        return (DMatrix::from_element(ncols, nrows, f64::NAN), 0);
    };
    let sigma_max = svd.singular_values.max();
    let cutoff = f64::EPSILON * nrows.max(ncols) as f64 * sigma_max;

    let k = svd.singular_values.len();
    let mut sigma_plus = DMatrix::<f64>::zeros(k, k);
    let mut rank = 0;
    for i in 0..k {
        let s = svd.singular_values[i];
        if s > cutoff {
            sigma_plus[(i, i)] = 1.0 / s;
            rank += 1;
        }
    }
    (v_t.transpose() * sigma_plus * u.transpose(), rank)
}

/// Least-squares solution of `A x = b` minimizing `‖A x − b‖`.
///
/// Uses the pseudo-inverse, so rank-deficient systems return the minimum-norm
/// solution instead of failing.
pub fn least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    assert_eq!(a.nrows(), b.len(), "least_squares: A and b incompatible");
    pseudo_inverse(a) * b
}

/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
///
/// Removes round-off asymmetry after covariance products.
#[inline]
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}

/// Check symmetry within an absolute tolerance. Non-square matrices are never symmetric.
pub fn is_symmetric(m: &DMatrix<f64>, tol: f64) -> bool {
    if !m.is_square() {
        return false;
    }
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            if (m[(i, j)] - m[(j, i)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

/// True when every entry is finite.
#[inline]
pub fn is_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/* =============================== Tests ==================================== */

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) -> bool {
        if a.shape() != b.shape() {
            return false;
        }
        let mut max_abs = 0.0f64;
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                max_abs = max_abs.max((a[(i, j)] - b[(i, j)]).abs());
            }
        }
        max_abs <= tol
    }

    #[test]
    fn t_symmetrize() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 3.0]);
        let s = symmetrize(&m);
        let s_expected = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 3.0]);
        assert!(approx_eq(&s, &s_expected, 1e-15));
        assert!(is_symmetric(&s, 0.0));
        assert!(!is_symmetric(&m, 1e-3));
    }

    #[test]
    fn t_is_symmetric_non_square() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(!is_symmetric(&m, 1.0));
    }

    #[test]
    fn t_pinv_matches_inverse_when_invertible() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let (pinv, rank) = pseudo_inverse_with_rank(&a);
        let inv = a.clone().try_inverse().unwrap();
        assert_eq!(rank, 2);
        assert!(approx_eq(&pinv, &inv, 1e-12));
    }

    #[test]
    fn t_pinv_singular_is_graceful() {
        // Rank one: second row is zero
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 0.0]);
        let (pinv, rank) = pseudo_inverse_with_rank(&a);
        assert_eq!(rank, 1);
        assert!(is_finite(&pinv));
        // Penrose condition: A A⁺ A = A
        let back = &a * &pinv * &a;
        assert!(approx_eq(&back, &a, 1e-12));
    }

    #[test]
    fn t_pinv_zero_matrix() {
        let a = DMatrix::<f64>::zeros(3, 2);
        let (pinv, rank) = pseudo_inverse_with_rank(&a);
        assert_eq!(pinv.shape(), (2, 3));
        assert_eq!(rank, 0);
        assert!(pinv.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn t_pinv_rectangular() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let pinv = pseudo_inverse(&a);
        assert_eq!(pinv.shape(), (2, 3));
        // Full column rank: A⁺ A = I
        let i = &pinv * &a;
        assert!(approx_eq(&i, &DMatrix::identity(2, 2), 1e-12));
    }

    #[test]
    fn t_pinv_non_finite() {
        let a = DMatrix::from_row_slice(2, 2, &[f64::NAN, 0.0, 0.0, 1.0]);
        let pinv = pseudo_inverse(&a);
        assert!(!is_finite(&pinv));
    }

    #[test]
    fn t_least_squares_overdetermined() {
        // y = 2x + 1 sampled exactly
        let a = DMatrix::from_row_slice(4, 2, &[0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 3.0, 5.0, 7.0]);
        let x = least_squares(&a, &b);
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn t_least_squares_rank_deficient_is_minimum_norm() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 0.0]);
        let b = DVector::from_vec(vec![2.0, 4.0]);
        let x = least_squares(&a, &b);
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "least_squares: A and b incompatible")]
    fn t_least_squares_incompatible_panics() {
        let a = DMatrix::<f64>::identity(2, 2);
        let b = DVector::<f64>::zeros(3);
        let _ = least_squares(&a, &b);
    }
}
