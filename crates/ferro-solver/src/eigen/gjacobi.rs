//! Generalized Jacobi iteration for dense symmetric pairs.
//!
//! Simultaneously diagonalizes `(K, M)` by generalized rotations, sweeping
//! the upper triangle until every eigenvalue estimate settles and every
//! off-diagonal pair is negligible:
//!
//! ```text
//! zeroing threshold per sweep:  eps = (0.01^sweep)^2
//! rotation from the 2x2 block:  akk = K_kk*M_jk - M_kk*K_jk
//!                               ajj = K_jj*M_jk - M_jj*K_jk
//!                               ab  = K_jj*M_kk - K_kk*M_jj
//!                               check = (ab^2 + 4*akk*ajj) / 4
//! ```
//!
//! A negative `check` beyond numerical noise means the pair is not
//! positive definite and the solve fails. Intended for small reduced
//! problems; the sparse path belongs to [`super::InverseIteration`].

use nalgebra::{DMatrix, DVector};

use ferro_model::matrix::SparseMtrx;

use crate::eigen::{densify, GeneralizedEigenSolver};
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

const ZERO_CHECK_TOL: f64 = 1e-40;

/// Dense simultaneous-diagonalization solver.
#[derive(Debug, Clone)]
pub struct GJacobiSolver {
    /// Sweep cap.
    pub nsmax: usize,
    domain_index: usize,
}

impl Default for GJacobiSolver {
    fn default() -> Self {
        Self {
            nsmax: 15,
            domain_index: 0,
        }
    }
}

impl GJacobiSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagonalize the dense pair in place.
    ///
    /// `a` and `b` are reduced towards diagonal form; `eigv` receives the
    /// eigenvalue estimates in matrix order and `x` the rotation product,
    /// with columns scaled to `xᵗ·b·x = 1` on exit.
    pub fn solve_pair(
        &self,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
        eigv: &mut DVector<f64>,
        x: &mut DMatrix<f64>,
        rtol: f64,
    ) -> Outcome {
        let n = a.nrows();
        assert!(a.is_square() && b.is_square());
        assert_eq!(b.nrows(), n);

        let mut d = DVector::zeros(n);
        for i in 0..n {
            d[i] = a[(i, i)] / b[(i, i)];
        }
        *eigv = d.clone();
        *x = DMatrix::identity(n, n);
        if n == 1 {
            x[(0, 0)] /= b[(0, 0)].abs().sqrt();
            return Outcome::Converged;
        }

        let mut converged = false;
        let mut nsweep: usize = 0;
        while nsweep < self.nsmax && !converged {
            nsweep += 1;
            let eps = 0.01_f64.powi(nsweep as i32).powi(2);

            for j in 0..n - 1 {
                for k in j + 1..n {
                    let eptola = a[(j, k)] * a[(j, k)] / (a[(j, j)] * a[(k, k)]);
                    let eptolb = b[(j, k)] * b[(j, k)] / (b[(j, j)] * b[(k, k)]);
                    if eptola < eps && eptolb < eps {
                        continue;
                    }

                    let akk = a[(k, k)] * b[(j, k)] - b[(k, k)] * a[(j, k)];
                    let ajj = a[(j, j)] * b[(j, k)] - b[(j, j)] * a[(j, k)];
                    let ab = a[(j, j)] * b[(k, k)] - a[(k, k)] * b[(j, j)];
                    let mut check = (ab * ab + 4.0 * akk * ajj) / 4.0;
                    if check.abs() < ZERO_CHECK_TOL {
                        check = check.abs();
                    } else if check < 0.0 {
                        // pair is not positive definite
                        return Outcome::Failed;
                    }

                    let sqch = check.sqrt();
                    let d1 = ab / 2.0 + sqch;
                    let d2 = ab / 2.0 - sqch;
                    let den = if d2.abs() > d1.abs() { d2 } else { d1 };
                    let (ca, cg) = if den != 0.0 {
                        (akk / den, -ajj / den)
                    } else {
                        (0.0, -a[(j, k)] / a[(k, k)])
                    };

                    rotate(a, b, x, j, k, ca, cg);
                }
            }

            for i in 0..n {
                eigv[i] = a[(i, i)] / b[(i, i)];
            }

            let settled = (0..n).all(|i| (eigv[i] - d[i]).abs() <= rtol * d[i]);
            if settled {
                let off_eps = rtol * rtol;
                converged = (0..n - 1).all(|j| {
                    (j + 1..n).all(|k| {
                        let epsa = a[(j, k)] * a[(j, k)] / (a[(j, j)] * a[(k, k)]);
                        let epsb = b[(j, k)] * b[(j, k)] / (b[(j, j)] * b[(k, k)]);
                        epsa < off_eps && epsb < off_eps
                    })
                });
            }
            if !converged {
                d.copy_from(eigv);
            }
        }

        for i in 0..n {
            for j in i + 1..n {
                a[(j, i)] = a[(i, j)];
                b[(j, i)] = b[(i, j)];
            }
        }
        for j in 0..n {
            let bb = b[(j, j)].abs().sqrt();
            for i in 0..n {
                x[(i, j)] /= bb;
            }
        }

        if converged {
            Outcome::Converged
        } else {
            Outcome::DivergedIterations
        }
    }
}

/// Apply one generalized rotation to rows/columns `j,k` of both matrices
/// and to the accumulated eigenvector matrix. Only the upper triangle is
/// kept current during sweeps.
fn rotate(
    a: &mut DMatrix<f64>,
    b: &mut DMatrix<f64>,
    x: &mut DMatrix<f64>,
    j: usize,
    k: usize,
    ca: f64,
    cg: f64,
) {
    let n = a.nrows();
    if n > 2 {
        for i in 0..j {
            let (aj, ak) = (a[(i, j)], a[(i, k)]);
            let (bj, bk) = (b[(i, j)], b[(i, k)]);
            a[(i, j)] = aj + cg * ak;
            b[(i, j)] = bj + cg * bk;
            a[(i, k)] = ak + ca * aj;
            b[(i, k)] = bk + ca * bj;
        }
        for i in k + 1..n {
            let (aj, ak) = (a[(j, i)], a[(k, i)]);
            let (bj, bk) = (b[(j, i)], b[(k, i)]);
            a[(j, i)] = aj + cg * ak;
            b[(j, i)] = bj + cg * bk;
            a[(k, i)] = ak + ca * aj;
            b[(k, i)] = bk + ca * bj;
        }
        for i in j + 1..k {
            let (aj, ak) = (a[(j, i)], a[(i, k)]);
            let (bj, bk) = (b[(j, i)], b[(i, k)]);
            a[(j, i)] = aj + cg * ak;
            b[(j, i)] = bj + cg * bk;
            a[(i, k)] = ak + ca * aj;
            b[(i, k)] = bk + ca * bj;
        }
    }

    let ak = a[(k, k)];
    let bk = b[(k, k)];
    a[(k, k)] = ak + 2.0 * ca * a[(j, k)] + ca * ca * a[(j, j)];
    b[(k, k)] = bk + 2.0 * ca * b[(j, k)] + ca * ca * b[(j, j)];
    a[(j, j)] += 2.0 * cg * a[(j, k)] + cg * cg * ak;
    b[(j, j)] += 2.0 * cg * b[(j, k)] + cg * cg * bk;
    a[(j, k)] = 0.0;
    b[(j, k)] = 0.0;

    for i in 0..a.nrows() {
        let xj = x[(i, j)];
        let xk = x[(i, k)];
        x[(i, j)] = xj + cg * xk;
        x[(i, k)] = xk + ca * xj;
    }
}

impl NumericalMethod for GJacobiSolver {
    fn state_kind(&self) -> &'static str {
        "jacobi"
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }
}

impl GeneralizedEigenSolver for GJacobiSolver {
    fn solve(
        &mut self,
        k: &mut dyn SparseMtrx,
        m: &mut dyn SparseMtrx,
        eigenvalues: &mut DVector<f64>,
        eigenvectors: &mut DMatrix<f64>,
        rtol: f64,
        nroot: usize,
    ) -> Outcome {
        let n = k.n_rows();
        assert!(nroot >= 1 && nroot <= n);
        assert_eq!(m.n_rows(), n);

        let mut a = densify(k);
        let mut b = densify(m);
        let mut vals = DVector::zeros(n);
        let mut vecs = DMatrix::zeros(n, n);
        let outcome = self.solve_pair(&mut a, &mut b, &mut vals, &mut vecs, rtol);
        if outcome == Outcome::Failed {
            return outcome;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&p, &q| vals[p].total_cmp(&vals[q]));

        *eigenvalues = DVector::from_fn(nroot, |i, _| vals[order[i]]);
        *eigenvectors = DMatrix::zeros(n, nroot);
        for (i, &src) in order.iter().take(nroot).enumerate() {
            eigenvectors.set_column(i, &vecs.column(src));
        }
        outcome
    }
}
