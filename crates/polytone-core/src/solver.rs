//! Dense linear least-squares solver.
//!
//! The calling convention follows LAPACK's `?gels`: `a` is an `m x n` matrix in
//! column-major storage (leading dimension `m`) and `trans` selects whether `A`
//! or `Aᵀ` is the system matrix. Errors report 1-based parameter and pivot
//! indices the same way `info` does:
//!
//! ```text
//!   1 trans   2 m   3 n   4 nrhs   5 a   6 lda   7 b   8 ldb
//! ```
//!
//! The factorization is Householder QR in f64. Overdetermined systems get the
//! least-squares solution, underdetermined systems the minimum-norm one.

use tracing::debug;

use crate::basis::BasisMatrix;
use crate::error::{Result, ToneError};

const PARAM_A: usize = 5;
const PARAM_B: usize = 7;

/// Diagonal entries of R at or below this fraction of the largest one count as zero.
const SINGULAR_RTOL: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transpose {
    /// Solve `A·x = b`.
    No,
    /// Solve `Aᵀ·x = b`.
    Yes,
}

/// Output of [`solve`].
///
/// Like the `b` array `?gels` writes back, `values` has `max(equations, unknowns)`
/// entries. The first `unknowns` are the solution; for an overdetermined system
/// the rest hold the transformed residual.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    values: Vec<f64>,
    unknowns: usize,
}

impl Solution {
    pub fn x(&self) -> &[f64] {
        &self.values[..self.unknowns]
    }

    pub fn into_x(mut self) -> Vec<f64> {
        self.values.truncate(self.unknowns);
        self.values
    }

    /// Sum of squares of the entries past the solution. Zero unless the
    /// system was overdetermined.
    pub fn residual_sum_of_squares(&self) -> f64 {
        self.values[self.unknowns..].iter().map(|v| v * v).sum()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

pub fn solve(trans: Transpose, m: usize, n: usize, a: &[f64], b: &[f64]) -> Result<Solution> {
    if a.len() != m * n || a.iter().any(|v| !v.is_finite()) {
        return Err(ToneError::IllegalParameter { index: PARAM_A });
    }

    let (equations, unknowns) = match trans {
        Transpose::No => (m, n),
        Transpose::Yes => (n, m),
    };
    if b.len() != equations || b.iter().any(|v| !v.is_finite()) {
        return Err(ToneError::IllegalParameter { index: PARAM_B });
    }

    if equations == 0 || unknowns == 0 {
        return Ok(Solution {
            values: vec![0.0; equations.max(unknowns)],
            unknowns,
        });
    }

    // System matrix E (equations x unknowns), column-major.
    let mut system = vec![0.0; equations * unknowns];
    for col in 0..unknowns {
        for row in 0..equations {
            system[row + col * equations] = match trans {
                Transpose::No => a[row + col * m],
                Transpose::Yes => a[col + row * m],
            };
        }
    }

    if equations >= unknowns {
        least_squares(system, equations, unknowns, b)
    } else {
        minimum_norm(system, equations, unknowns, b)
    }
}

/// Solves the row-major system a basis matrix describes: `basis · x = rhs`.
///
/// A row-major matrix read as column-major storage is its transpose, so this
/// forwards to [`solve`] with [`Transpose::Yes`].
pub fn solve_rows(basis: &BasisMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
    let n = basis.size();
    solve(Transpose::Yes, n, n, basis.as_slice(), rhs).map(Solution::into_x)
}

fn least_squares(system: Vec<f64>, rows: usize, cols: usize, b: &[f64]) -> Result<Solution> {
    let qr = HouseholderQr::factor(system, rows, cols);
    qr.check_rank()?;

    let mut values = b.to_vec();
    qr.apply_qt(&mut values);

    // Back substitution on the leading `cols` entries: R·x = (Qᵀb)[..cols].
    for i in (0..cols).rev() {
        let mut sum = values[i];
        for j in i + 1..cols {
            sum -= qr.r(i, j) * values[j];
        }
        values[i] = sum / qr.r(i, i);
    }

    Ok(Solution {
        values,
        unknowns: cols,
    })
}

fn minimum_norm(system: Vec<f64>, rows: usize, cols: usize, b: &[f64]) -> Result<Solution> {
    // Factor Eᵀ = Q·R, so E = Rᵀ·Qᵀ and x = Q·[R⁻ᵀ·b; 0].
    let mut transposed = vec![0.0; rows * cols];
    for col in 0..cols {
        for row in 0..rows {
            transposed[col + row * cols] = system[row + col * rows];
        }
    }
    let qr = HouseholderQr::factor(transposed, cols, rows);
    qr.check_rank()?;

    let mut values = vec![0.0; cols];
    for i in 0..rows {
        let mut sum = b[i];
        for j in 0..i {
            sum -= qr.r(j, i) * values[j];
        }
        values[i] = sum / qr.r(i, i);
    }
    qr.apply_q(&mut values);

    Ok(Solution {
        values,
        unknowns: cols,
    })
}

/// Compact Householder QR of a tall column-major matrix.
///
/// R occupies the upper triangle; the reflector vectors sit below the diagonal
/// with an implicit leading 1.
struct HouseholderQr {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    tau: Vec<f64>,
}

impl HouseholderQr {
    fn factor(mut data: Vec<f64>, rows: usize, cols: usize) -> Self {
        debug_assert!(rows >= cols);
        let mut tau = vec![0.0; cols];

        for k in 0..cols {
            let base = k * rows;
            let norm = data[base + k..base + rows]
                .iter()
                .map(|v| v * v)
                .sum::<f64>()
                .sqrt();
            if norm == 0.0 {
                continue;
            }

            let alpha = data[base + k];
            let beta = if alpha >= 0.0 { -norm } else { norm };
            let scale = alpha - beta;
            for i in k + 1..rows {
                data[base + i] /= scale;
            }
            tau[k] = (beta - alpha) / beta;
            data[base + k] = beta;

            for j in k + 1..cols {
                let col = j * rows;
                let mut s = data[col + k];
                for i in k + 1..rows {
                    s += data[base + i] * data[col + i];
                }
                s *= tau[k];
                data[col + k] -= s;
                for i in k + 1..rows {
                    data[col + i] -= s * data[base + i];
                }
            }
        }

        Self {
            rows,
            cols,
            data,
            tau,
        }
    }

    fn r(&self, row: usize, col: usize) -> f64 {
        self.data[row + col * self.rows]
    }

    fn check_rank(&self) -> Result<()> {
        let largest = (0..self.cols)
            .map(|k| self.r(k, k).abs())
            .fold(0.0, f64::max);
        match (0..self.cols).find(|&k| self.r(k, k).abs() <= largest * SINGULAR_RTOL) {
            Some(k) => {
                debug!(
                    index = k + 1,
                    pivot = self.r(k, k),
                    largest,
                    "rank-deficient triangular factor"
                );
                Err(ToneError::SingularMatrix { index: k + 1 })
            }
            None => Ok(()),
        }
    }

    fn reflect(&self, k: usize, v: &mut [f64]) {
        let base = k * self.rows;
        let mut s = v[k];
        for i in k + 1..self.rows {
            s += self.data[base + i] * v[i];
        }
        s *= self.tau[k];
        v[k] -= s;
        for i in k + 1..self.rows {
            v[i] -= s * self.data[base + i];
        }
    }

    /// v <- Qᵀ·v
    fn apply_qt(&self, v: &mut [f64]) {
        for k in 0..self.cols {
            self.reflect(k, v);
        }
    }

    /// v <- Q·v
    fn apply_q(&self, v: &mut [f64]) {
        for k in (0..self.cols).rev() {
            self.reflect(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < tol, "x[{i}] = {a}, expected {e}");
        }
    }

    #[test]
    fn square_system_column_major() {
        // A = [[1, 2], [3, 4]] stored column-major.
        let a = [1.0, 3.0, 2.0, 4.0];
        let solution = solve(Transpose::No, 2, 2, &a, &[5.0, 6.0]).unwrap();
        assert_close(solution.x(), &[-4.0, 4.5], 1e-12);
        assert_eq!(solution.residual_sum_of_squares(), 0.0);
    }

    #[test]
    fn transpose_flag_reads_row_major() {
        // Same A, stored row-major and flagged as transposed.
        let a = [1.0, 2.0, 3.0, 4.0];
        let solution = solve(Transpose::Yes, 2, 2, &a, &[5.0, 6.0]).unwrap();
        assert_close(solution.x(), &[-4.0, 4.5], 1e-12);
    }

    #[test]
    fn overdetermined_least_squares() {
        // Fit y = c0 + c1 t to (0,1), (1,2), (2,4).
        let a = [1.0, 1.0, 1.0, 0.0, 1.0, 2.0];
        let solution = solve(Transpose::No, 3, 2, &a, &[1.0, 2.0, 4.0]).unwrap();
        assert_close(solution.x(), &[5.0 / 6.0, 1.5], 1e-12);
        assert_eq!(solution.values().len(), 3);
        assert!((solution.residual_sum_of_squares() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn underdetermined_minimum_norm() {
        // x0 + x1 = 2 has minimum-norm solution (1, 1).
        let solution = solve(Transpose::No, 1, 2, &[1.0, 1.0], &[2.0]).unwrap();
        assert_close(solution.x(), &[1.0, 1.0], 1e-12);
        assert_eq!(solution.residual_sum_of_squares(), 0.0);
    }

    #[test]
    fn underdetermined_via_transpose() {
        // 2x3 system given as its 3x2 transpose.
        // Rows: x0 + x2 = 1, x1 + x2 = 1  => min-norm (1/3, 1/3, 2/3)
        let at = [1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let solution = solve(Transpose::Yes, 3, 2, &at, &[1.0, 1.0]).unwrap();
        assert_close(solution.x(), &[1.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0], 1e-12);
    }

    #[test]
    fn zero_column_is_singular() {
        let a = [1.0, 2.0, 0.0, 0.0];
        let err = solve(Transpose::No, 2, 2, &a, &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, ToneError::SingularMatrix { index: 2 });
    }

    #[test]
    fn repeated_rows_are_singular() {
        let a = [1.0, 1.0, 1.0, 1.0];
        let err = solve(Transpose::No, 2, 2, &a, &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, ToneError::SingularMatrix { index: 2 });
    }

    #[test]
    fn all_zero_matrix_reports_first_pivot() {
        let err = solve(Transpose::No, 2, 2, &[0.0; 4], &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, ToneError::SingularMatrix { index: 1 });
    }

    #[test]
    fn wrong_matrix_length_is_parameter_five() {
        let err = solve(Transpose::No, 2, 2, &[1.0, 0.0, 0.0], &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, ToneError::IllegalParameter { index: 5 });
    }

    #[test]
    fn wrong_rhs_length_is_parameter_seven() {
        let a = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        // Transposed 3x2 means 2 equations.
        let err = solve(Transpose::Yes, 3, 2, &a, &[1.0, 1.0, 1.0]).unwrap_err();
        assert_eq!(err, ToneError::IllegalParameter { index: 7 });
    }

    #[test]
    fn non_finite_inputs_rejected() {
        let err = solve(Transpose::No, 1, 1, &[f64::NAN], &[1.0]).unwrap_err();
        assert_eq!(err, ToneError::IllegalParameter { index: 5 });
        let err = solve(Transpose::No, 1, 1, &[1.0], &[f64::INFINITY]).unwrap_err();
        assert_eq!(err, ToneError::IllegalParameter { index: 7 });
    }

    #[test]
    fn empty_system() {
        let solution = solve(Transpose::No, 0, 0, &[], &[]).unwrap();
        assert!(solution.x().is_empty());
    }

    #[test]
    fn vandermonde_interpolates() {
        let basis = BasisMatrix::ramp(5).unwrap();
        let targets = [0.1, 0.7, 0.2, 0.9, 0.4];
        let x = solve_rows(&basis, &targets).unwrap();
        for (r, &p) in basis.positions().iter().enumerate() {
            let value: f64 = x.iter().enumerate().map(|(c, coef)| coef * p.powi(c as i32)).sum();
            assert!((value - targets[r]).abs() < 1e-10, "row {r}: {value}");
        }
    }

    #[test]
    fn negative_leading_entry() {
        // Exercises the sign choice for the Householder reflector.
        let a = [-2.0, 1.0, 1.0, 3.0];
        let solution = solve(Transpose::No, 2, 2, &a, &[-1.0, 4.0]).unwrap();
        // -2x + y = -1, x + 3y = 4  => x = 1, y = 1
        assert_close(solution.x(), &[1.0, 1.0], 1e-12);
    }
}
