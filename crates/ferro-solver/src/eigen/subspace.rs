//! Inverse iteration over a working subspace for sparse pairs.
//!
//! Iterates `K·x = M·x_prev` on `nc = min(2·nroot, nroot+8, n)` vectors at
//! once, tracking Rayleigh quotients `w = zᵗx / (Mx)ᵗx` and keeping the
//! set M-orthonormal between passes. Iteration stops once more than
//! `nroot` quotients are stationary within `rtol`, so the requested roots
//! are guarded by extra trailing vectors.

use nalgebra::{DMatrix, DVector};

use ferro_model::matrix::SparseMtrx;

use crate::eigen::GeneralizedEigenSolver;
use crate::linear::{DirectSolver, LinearSolver};
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

/// Sparse generalized eigensolver based on inverse iteration.
pub struct InverseIteration {
    /// Iteration cap.
    pub nitem: usize,
    domain_index: usize,
    linear: Box<dyn LinearSolver>,
}

impl Default for InverseIteration {
    fn default() -> Self {
        Self {
            nitem: 100,
            domain_index: 0,
            linear: Box::new(DirectSolver::new()),
        }
    }
}

impl InverseIteration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the inner linear solver used for `K·x = z`.
    pub fn with_linear_solver(mut self, linear: Box<dyn LinearSolver>) -> Self {
        self.linear = linear;
        self
    }
}

impl NumericalMethod for InverseIteration {
    fn state_kind(&self) -> &'static str {
        "inverseit"
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
        self.linear.set_domain(domain_index);
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }

    fn reinitialize(&mut self) {
        self.linear.reinitialize();
    }
}

impl GeneralizedEigenSolver for InverseIteration {
    fn solve(
        &mut self,
        k: &mut dyn SparseMtrx,
        m: &mut dyn SparseMtrx,
        eigenvalues: &mut DVector<f64>,
        eigenvectors: &mut DMatrix<f64>,
        rtol: f64,
        nroot: usize,
    ) -> Outcome {
        let nn = k.n_rows();
        assert_eq!(k.n_columns(), nn);
        assert_eq!(m.n_rows(), nn);
        assert!(nroot >= 1 && nroot <= nn);

        let nc = (2 * nroot).min(nroot + 8).min(nn);
        let mut w = DVector::<f64>::zeros(nc);
        let mut ww = DVector::<f64>::zeros(nc);
        let mut x: Vec<DVector<f64>> = vec![DVector::zeros(nn); nc];
        let mut z: Vec<DVector<f64>> = vec![DVector::zeros(nn); nc];
        let mut zz: Vec<DVector<f64>> = vec![DVector::zeros(nn); nc];

        // seed unit vectors at the DOFs with the smallest |K_ii|/|M_ii|,
        // the directions closest to the lowest modes
        let kd = k.diagonal().abs();
        let md = m.diagonal().abs();
        let mut seed_order: Vec<usize> = (0..nn).collect();
        seed_order.sort_by(|&p, &q| (md[q] * kd[p]).total_cmp(&(md[p] * kd[q])));
        for (i, xi) in x.iter_mut().enumerate() {
            xi[seed_order[i]] = 1.0;
            z[i] = m.times(xi);
            ww[i] = z[i].dot(xi);
        }

        let mut converged = false;
        for _ in 0..self.nitem {
            for j in 0..nc {
                zz[j].copy_from(&z[j]);
            }
            for j in 0..nc {
                if self.linear.solve(k, &z[j], &mut x[j]) != Outcome::Converged {
                    return Outcome::Failed;
                }
            }

            for j in 0..nc {
                w[j] = zz[j].dot(&x[j]);
            }
            for j in 0..nc {
                z[j] = m.times(&x[j]);
            }
            for j in 0..nc {
                w[j] /= z[j].dot(&x[j]);
            }

            let mut ac = 0;
            for j in 0..nc {
                if (ww[j] - w[j]).abs() <= (w[j] * rtol).abs() {
                    ac += 1;
                }
                ww[j] = w[j];
            }

            for j in 0..nc {
                let (head, tail) = x.split_at_mut(j);
                let xj = &mut tail[0];
                if j > 0 {
                    let t = m.times(xj);
                    for xi in head.iter() {
                        let c = xi.dot(&t);
                        xj.axpy(-c, xi, 1.0);
                    }
                }
                let t = m.times(xj);
                let norm = xj.dot(&t).sqrt();
                if !norm.is_finite() || norm == 0.0 {
                    return Outcome::Failed;
                }
                *xj /= norm;
            }

            if ac > nroot {
                converged = true;
                break;
            }

            for j in 0..nc {
                z[j] = m.times(&x[j]);
            }
        }

        let mut order: Vec<usize> = (0..nc).collect();
        order.sort_by(|&p, &q| w[p].total_cmp(&w[q]));
        *eigenvalues = DVector::from_fn(nroot, |i, _| w[order[i]]);
        *eigenvectors = DMatrix::zeros(nn, nroot);
        for (i, &src) in order.iter().take(nroot).enumerate() {
            eigenvectors.set_column(i, &x[src]);
        }

        if converged {
            Outcome::Converged
        } else {
            eprintln!(
                "warning: inverse iteration stopped after {} iterations without convergence",
                self.nitem
            );
            Outcome::DivergedIterations
        }
    }
}
