//! Linear solvers for the assembled global system.

use crate::error::{Result, SolidifyError};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use tracing::{debug, trace};

/// Breakdown threshold for the BiCGStab inner products
const BREAKDOWN_TOLERANCE: f64 = 1e-300;

pub trait LinearSolver {
    fn name(&self) -> &'static str;

    /// Solve `a x = b`. Failure to produce a solution is an error, never a
    /// partial answer.
    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>>;
}

/// Dense LU factorization; meant for small systems and as a reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLuSolver;

impl LinearSolver for DenseLuSolver {
    fn name(&self) -> &'static str {
        "dense_lu"
    }

    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        let n = a.nrows();
        let mut dense = DMatrix::<f64>::zeros(n, a.ncols());
        for (i, j, v) in a.triplet_iter() {
            dense[(i, j)] += *v;
        }
        dense.lu().solve(b).ok_or(SolidifyError::SingularMatrix(n))
    }
}

/// Jacobi-preconditioned BiCGStab.
#[derive(Debug, Clone, Copy)]
pub struct BiCgStabSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl BiCgStabSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

/// `y = a x` straight off the CSR arrays
pub fn spmv(a: &CsrMatrix<f64>, x: &DVector<f64>, y: &mut DVector<f64>) {
    let offsets = a.row_offsets();
    let cols = a.col_indices();
    let vals = a.values();
    for row in 0..a.nrows() {
        let mut sum = 0.0;
        for k in offsets[row]..offsets[row + 1] {
            sum += vals[k] * x[cols[k]];
        }
        y[row] = sum;
    }
}

/// Inverse diagonal; rows with a zero diagonal are left unscaled
fn jacobi_inverse(a: &CsrMatrix<f64>) -> DVector<f64> {
    let mut inv = DVector::from_element(a.nrows(), 1.0);
    for (i, j, v) in a.triplet_iter() {
        if i == j && v.abs() > 0.0 {
            inv[i] = 1.0 / *v;
        }
    }
    inv
}

impl LinearSolver for BiCgStabSolver {
    fn name(&self) -> &'static str {
        "bicgstab"
    }

    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        let n = b.len();
        let mut x = DVector::zeros(n);
        let b_norm = b.norm();
        if b_norm == 0.0 {
            return Ok(x);
        }
        let target = self.tolerance * b_norm;
        let precond = jacobi_inverse(a);

        // x0 = 0, so r = b
        let mut r = b.clone();
        let r0 = r.clone();
        let mut p = DVector::zeros(n);
        let mut v = DVector::zeros(n);
        let mut s = DVector::zeros(n);
        let mut t = DVector::zeros(n);
        let mut rho_old = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;

        for iter in 0..self.max_iterations {
            let rho = r0.dot(&r);
            if rho.abs() < BREAKDOWN_TOLERANCE {
                break;
            }
            let beta = if iter == 0 {
                0.0
            } else {
                (rho / rho_old) * (alpha / omega)
            };
            rho_old = rho;

            // p = r + beta (p - omega v)
            p.axpy(-omega, &v, 1.0);
            p.axpy(1.0, &r, beta);

            let z = p.component_mul(&precond);
            spmv(a, &z, &mut v);
            let r0v = r0.dot(&v);
            if r0v.abs() < BREAKDOWN_TOLERANCE {
                break;
            }
            alpha = rho / r0v;

            s.copy_from(&r);
            s.axpy(-alpha, &v, 1.0);
            x.axpy(alpha, &z, 1.0);

            let s_norm = s.norm();
            if s_norm <= target {
                debug!(iterations = iter + 1, residual = s_norm, "bicgstab converged");
                return Ok(x);
            }

            let zs = s.component_mul(&precond);
            spmv(a, &zs, &mut t);
            let tt = t.dot(&t);
            omega = if tt > 0.0 { t.dot(&s) / tt } else { 0.0 };
            if omega.abs() < BREAKDOWN_TOLERANCE {
                break;
            }
            x.axpy(omega, &zs, 1.0);

            r.copy_from(&s);
            r.axpy(-omega, &t, 1.0);

            let r_norm = r.norm();
            trace!(iteration = iter + 1, residual = r_norm, "bicgstab");
            if r_norm <= target {
                debug!(iterations = iter + 1, residual = r_norm, "bicgstab converged");
                return Ok(x);
            }
        }

        // breakdown or iteration cap: accept only if the true residual is small
        let mut ax = DVector::zeros(n);
        spmv(a, &x, &mut ax);
        let residual = (b - ax).norm();
        if residual <= target {
            return Ok(x);
        }
        Err(SolidifyError::LinearSolve {
            iterations: self.max_iterations,
            residual: residual / b_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::CooMatrix;

    /// 1D Laplacian plus a mass shift, with a convective skew part
    fn test_matrix(n: usize, skew: f64) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 4.0);
            if i > 0 {
                coo.push(i, i - 1, -1.0 - skew);
            }
            if i + 1 < n {
                coo.push(i, i + 1, -1.0 + skew);
            }
        }
        CsrMatrix::from(&coo)
    }

    fn check_solution(solver: &dyn LinearSolver, a: &CsrMatrix<f64>) {
        let n = a.nrows();
        let expected = DVector::from_fn(n, |i, _| (i as f64 * 0.3).sin() + 1.0);
        let mut b = DVector::zeros(n);
        spmv(a, &expected, &mut b);

        let x = solver.solve(a, &b).unwrap();
        for i in 0..n {
            assert_abs_diff_eq!(x[i], expected[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_dense_lu() {
        check_solution(&DenseLuSolver, &test_matrix(12, 0.0));
        check_solution(&DenseLuSolver, &test_matrix(12, 0.4));
    }

    #[test]
    fn test_bicgstab_symmetric_and_nonsymmetric() {
        let solver = BiCgStabSolver::new(1e-12, 500);
        check_solution(&solver, &test_matrix(40, 0.0));
        check_solution(&solver, &test_matrix(40, 0.4));
    }

    #[test]
    fn test_duplicate_entries_are_summed() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0);
        coo.push(0, 0, 1.0);
        coo.push(1, 1, 4.0);
        let a = CsrMatrix::from(&coo);
        let x = DenseLuSolver
            .solve(&a, &DVector::from_vec(vec![2.0, 2.0]))
            .unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(x[1], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_zero_rhs() {
        let solver = BiCgStabSolver::new(1e-10, 10);
        let x = solver.solve(&test_matrix(5, 0.0), &DVector::zeros(5)).unwrap();
        assert_eq!(x.norm(), 0.0);
    }

    #[test]
    fn test_singular_matrix_fails() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0);
        coo.push(0, 1, 1.0);
        coo.push(1, 0, 1.0);
        coo.push(1, 1, 1.0);
        let a = CsrMatrix::from(&coo);
        let b = DVector::from_vec(vec![1.0, 0.0]);

        assert!(matches!(
            DenseLuSolver.solve(&a, &b),
            Err(SolidifyError::SingularMatrix(2))
        ));
        assert!(matches!(
            BiCgStabSolver::new(1e-12, 50).solve(&a, &b),
            Err(SolidifyError::LinearSolve { .. })
        ));
    }
}
