//! Preconditioned Krylov solvers: conjugate gradients and restarted GMRES.
//!
//! The preconditioner is built from the assembled matrix and cached against
//! the matrix identity and version stamp, so repeated solves inside a
//! Newton iteration reuse it and a reassembled matrix triggers exactly one
//! rebuild. Failure to meet the tolerance within the iteration budget is
//! reported as [`Outcome::DivergedIterations`]; a breakdown that the method
//! cannot recover from (an indefinite operator under CG, a zero pivot in
//! the reduced system) is [`Outcome::Failed`].

use nalgebra::{DMatrix, DVector};

use ferro_model::matrix::{MatrixKind, SparseMtrx, SparseTriplets};

use crate::linear::LinearSolver;
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

/// Krylov method variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrylovMethod {
    /// Conjugate gradients, for symmetric positive definite systems.
    ConjugateGradient,
    /// Restarted GMRES, for general systems.
    Gmres,
}

/// Preconditioner variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionerKind {
    None,
    Diagonal,
    /// Incomplete LU with zero fill-in, on the matrix's own sparsity.
    Ilu,
}

/// Settings for [`IterativeSolver`].
#[derive(Debug, Clone)]
pub struct IterativeConfig {
    pub method: KrylovMethod,
    pub preconditioner: PreconditionerKind,
    /// Total matrix-vector products allowed, across restarts.
    pub max_iterations: usize,
    /// Relative residual tolerance.
    pub tolerance: f64,
    /// Krylov subspace dimension between GMRES restarts.
    pub restart: usize,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            method: KrylovMethod::ConjugateGradient,
            preconditioner: PreconditionerKind::Diagonal,
            max_iterations: 1000,
            tolerance: 1e-8,
            restart: 30,
        }
    }
}

impl IterativeConfig {
    pub fn cg() -> Self {
        Self::default()
    }

    pub fn gmres() -> Self {
        Self {
            method: KrylovMethod::Gmres,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
enum Preconditioner {
    Identity,
    Diagonal(DVector<f64>),
    Ilu(IluFactors),
}

impl Preconditioner {
    fn apply(&self, r: &DVector<f64>) -> DVector<f64> {
        match self {
            Preconditioner::Identity => r.clone(),
            Preconditioner::Diagonal(inv_diag) => r.component_mul(inv_diag),
            Preconditioner::Ilu(factors) => factors.apply(r),
        }
    }
}

/// Compressed-row L·U factors sharing the matrix's sparsity pattern.
#[derive(Debug)]
struct IluFactors {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    diag_ptr: Vec<usize>,
}

impl IluFactors {
    /// Run the zero-fill incomplete factorization. Returns `None` on a
    /// missing or vanishing pivot.
    fn build(triplets: &SparseTriplets) -> Option<Self> {
        let n = triplets.nrows;
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for ((&r, &c), &v) in triplets
            .row_indices
            .iter()
            .zip(&triplets.col_indices)
            .zip(&triplets.values)
        {
            rows[r].push((c, v));
        }

        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        let mut diag_ptr = vec![usize::MAX; n];
        row_ptr.push(0);
        for (i, row) in rows.iter_mut().enumerate() {
            row.sort_by_key(|&(c, _)| c);
            for &(c, v) in row.iter() {
                if c == i {
                    diag_ptr[i] = col_idx.len();
                }
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        if diag_ptr.iter().any(|&p| p == usize::MAX) {
            return None;
        }

        for i in 0..n {
            for kk in row_ptr[i]..diag_ptr[i] {
                let k = col_idx[kk];
                let pivot = values[diag_ptr[k]];
                if pivot.abs() < f64::MIN_POSITIVE {
                    return None;
                }
                values[kk] /= pivot;
                let factor = values[kk];
                for jj in kk + 1..row_ptr[i + 1] {
                    let j = col_idx[jj];
                    let row_k = &col_idx[row_ptr[k]..row_ptr[k + 1]];
                    if let Ok(offset) = row_k.binary_search(&j) {
                        values[jj] -= factor * values[row_ptr[k] + offset];
                    }
                }
            }
            if values[diag_ptr[i]].abs() < f64::MIN_POSITIVE {
                return None;
            }
        }

        Some(Self {
            n,
            row_ptr,
            col_idx,
            values,
            diag_ptr,
        })
    }

    /// Solve `L·U·z = r` by forward then backward substitution.
    fn apply(&self, r: &DVector<f64>) -> DVector<f64> {
        let mut z = r.clone();
        for i in 0..self.n {
            let mut s = z[i];
            for p in self.row_ptr[i]..self.diag_ptr[i] {
                s -= self.values[p] * z[self.col_idx[p]];
            }
            z[i] = s;
        }
        for i in (0..self.n).rev() {
            let mut s = z[i];
            for p in self.diag_ptr[i] + 1..self.row_ptr[i + 1] {
                s -= self.values[p] * z[self.col_idx[p]];
            }
            z[i] = s / self.values[self.diag_ptr[i]];
        }
        z
    }
}

/// Preconditioned Krylov solver with a stamped preconditioner cache.
#[derive(Debug)]
pub struct IterativeSolver {
    config: IterativeConfig,
    domain_index: usize,
    preconditioner: Preconditioner,
    stamp: Option<(u64, u64)>,
    rebuilds: usize,
}

impl IterativeSolver {
    pub fn new(config: IterativeConfig) -> Self {
        Self {
            config,
            domain_index: 0,
            preconditioner: Preconditioner::Identity,
            stamp: None,
            rebuilds: 0,
        }
    }

    /// How many times the preconditioner has been built, for cache
    /// diagnostics.
    pub fn preconditioner_rebuilds(&self) -> usize {
        self.rebuilds
    }

    fn refresh_preconditioner(&mut self, a: &dyn SparseMtrx) {
        let stamp = (a.id(), a.version());
        if self.stamp == Some(stamp) {
            return;
        }
        self.preconditioner = match self.config.preconditioner {
            PreconditionerKind::None => Preconditioner::Identity,
            PreconditionerKind::Diagonal => Preconditioner::Diagonal(inverse_diagonal(a)),
            PreconditionerKind::Ilu => match IluFactors::build(&a.to_triplets()) {
                Some(factors) => Preconditioner::Ilu(factors),
                None => {
                    eprintln!(
                        "warning: incomplete factorization broke down, using diagonal preconditioning"
                    );
                    Preconditioner::Diagonal(inverse_diagonal(a))
                }
            },
        };
        self.stamp = Some(stamp);
        self.rebuilds += 1;
    }

    fn solve_cg(&self, a: &mut dyn SparseMtrx, b: &DVector<f64>, x: &mut DVector<f64>) -> Outcome {
        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Outcome::Converged;
        }

        let mut r = b - a.times(x);
        let mut z = self.preconditioner.apply(&r);
        let mut p = z.clone();
        let mut rho = r.dot(&z);

        for _ in 0..self.config.max_iterations {
            if r.norm() <= self.config.tolerance * b_norm {
                return Outcome::Converged;
            }
            let q = a.times(&p);
            let pq = p.dot(&q);
            let alpha = rho / pq;
            if pq <= 0.0 || !alpha.is_finite() {
                return Outcome::Failed;
            }
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &q, 1.0);
            z = self.preconditioner.apply(&r);
            let rho_next = r.dot(&z);
            let beta = rho_next / rho;
            p.axpy(1.0, &z, beta);
            rho = rho_next;
        }

        if r.norm() <= self.config.tolerance * b_norm {
            Outcome::Converged
        } else {
            Outcome::DivergedIterations
        }
    }

    fn solve_gmres(
        &self,
        a: &mut dyn SparseMtrx,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Outcome {
        let n = b.len();
        if b.norm() == 0.0 {
            x.fill(0.0);
            return Outcome::Converged;
        }
        let ref_norm = self.preconditioner.apply(b).norm();
        let target = self.config.tolerance * ref_norm;
        let m = self.config.restart.clamp(1, n);
        let mut total = 0;

        loop {
            let r0 = self.preconditioner.apply(&(b - a.times(x)));
            let beta = r0.norm();
            if beta <= target {
                return Outcome::Converged;
            }
            if total >= self.config.max_iterations {
                return Outcome::DivergedIterations;
            }

            let mut basis: Vec<DVector<f64>> = vec![r0.unscale(beta)];
            let mut h = DMatrix::<f64>::zeros(m + 1, m);
            let mut cs = vec![0.0_f64; m];
            let mut sn = vec![0.0_f64; m];
            let mut g = DVector::<f64>::zeros(m + 1);
            g[0] = beta;
            let mut width = 0;

            for j in 0..m {
                total += 1;
                let mut w = self.preconditioner.apply(&a.times(&basis[j]));
                for i in 0..=j {
                    h[(i, j)] = w.dot(&basis[i]);
                    w.axpy(-h[(i, j)], &basis[i], 1.0);
                }
                h[(j + 1, j)] = w.norm();
                let breakdown = h[(j + 1, j)] <= f64::EPSILON * beta;
                if !breakdown {
                    basis.push(w.unscale(h[(j + 1, j)]));
                }

                for i in 0..j {
                    let t = cs[i] * h[(i, j)] + sn[i] * h[(i + 1, j)];
                    h[(i + 1, j)] = -sn[i] * h[(i, j)] + cs[i] * h[(i + 1, j)];
                    h[(i, j)] = t;
                }
                let denom = (h[(j, j)].powi(2) + h[(j + 1, j)].powi(2)).sqrt();
                if denom == 0.0 {
                    cs[j] = 1.0;
                    sn[j] = 0.0;
                } else {
                    cs[j] = h[(j, j)] / denom;
                    sn[j] = h[(j + 1, j)] / denom;
                }
                h[(j, j)] = cs[j] * h[(j, j)] + sn[j] * h[(j + 1, j)];
                h[(j + 1, j)] = 0.0;
                g[j + 1] = -sn[j] * g[j];
                g[j] *= cs[j];
                width = j + 1;

                if g[j + 1].abs() <= target
                    || breakdown
                    || total >= self.config.max_iterations
                {
                    break;
                }
            }

            let mut y = vec![0.0_f64; width];
            for i in (0..width).rev() {
                let mut s = g[i];
                for j in i + 1..width {
                    s -= h[(i, j)] * y[j];
                }
                y[i] = s / h[(i, i)];
                if !y[i].is_finite() {
                    return Outcome::Failed;
                }
            }
            for (i, &yi) in y.iter().enumerate() {
                x.axpy(yi, &basis[i], 1.0);
            }
        }
    }
}

fn inverse_diagonal(a: &dyn SparseMtrx) -> DVector<f64> {
    a.diagonal().map(|d| if d != 0.0 { 1.0 / d } else { 1.0 })
}

impl NumericalMethod for IterativeSolver {
    fn state_kind(&self) -> &'static str {
        match self.config.method {
            KrylovMethod::ConjugateGradient => "cg",
            KrylovMethod::Gmres => "gmres",
        }
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }

    fn reinitialize(&mut self) {
        self.preconditioner = Preconditioner::Identity;
        self.stamp = None;
    }
}

impl LinearSolver for IterativeSolver {
    fn solve(
        &mut self,
        a: &mut dyn SparseMtrx,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Outcome {
        assert_eq!(a.n_rows(), b.len());
        assert_eq!(b.len(), x.len());

        self.refresh_preconditioner(a);
        match self.config.method {
            KrylovMethod::ConjugateGradient => self.solve_cg(a, b, x),
            KrylovMethod::Gmres => self.solve_gmres(a, b, x),
        }
    }

    fn recommended_storage(&self, _symmetric: bool) -> MatrixKind {
        MatrixKind::Csr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMtrx;

    fn chain_triplets(n: usize, k: f64) -> SparseTriplets {
        let mut t = SparseTriplets::new(n, n);
        for i in 0..n {
            t.push(i, i, 2.0 * k);
            if i + 1 < n {
                t.push(i, i + 1, -k);
                t.push(i + 1, i, -k);
            }
        }
        t
    }

    fn residual_norm(a: &dyn SparseMtrx, b: &DVector<f64>, x: &DVector<f64>) -> f64 {
        (b - a.times(x)).norm()
    }

    #[test]
    fn cg_solves_chain() {
        let mut a = CsrMtrx::from_triplets(&chain_triplets(20, 100.0));
        let b = DVector::from_element(20, 1.0);
        let mut x = DVector::zeros(20);
        let mut solver = IterativeSolver::new(IterativeConfig::cg());
        assert_eq!(solver.solve(&mut a, &b, &mut x), Outcome::Converged);
        assert!(residual_norm(&a, &b, &x) < 1e-6);
    }

    #[test]
    fn cg_fails_on_indefinite_matrix() {
        let mut t = SparseTriplets::new(2, 2);
        t.push(0, 0, 1.0);
        t.push(1, 1, -1.0);
        let mut a = CsrMtrx::from_triplets(&t);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        let mut x = DVector::zeros(2);
        let mut solver = IterativeSolver::new(IterativeConfig {
            preconditioner: PreconditionerKind::None,
            ..IterativeConfig::cg()
        });
        assert_eq!(solver.solve(&mut a, &b, &mut x), Outcome::Failed);
    }

    #[test]
    fn cg_diverges_within_budget() {
        let mut a = CsrMtrx::from_triplets(&chain_triplets(50, 1.0));
        let b = DVector::from_element(50, 1.0);
        let mut x = DVector::zeros(50);
        let mut solver = IterativeSolver::new(IterativeConfig {
            max_iterations: 3,
            tolerance: 1e-14,
            ..IterativeConfig::cg()
        });
        assert_eq!(
            solver.solve(&mut a, &b, &mut x),
            Outcome::DivergedIterations
        );
    }

    #[test]
    fn gmres_solves_asymmetric_system() {
        let mut t = SparseTriplets::new(4, 4);
        for i in 0..4 {
            t.push(i, i, 5.0);
            if i + 1 < 4 {
                t.push(i, i + 1, -2.0);
                t.push(i + 1, i, -1.0);
            }
        }
        let mut a = CsrMtrx::from_triplets(&t);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let mut x = DVector::zeros(4);
        let mut solver = IterativeSolver::new(IterativeConfig {
            preconditioner: PreconditionerKind::Ilu,
            ..IterativeConfig::gmres()
        });
        assert_eq!(solver.solve(&mut a, &b, &mut x), Outcome::Converged);
        assert!(residual_norm(&a, &b, &x) < 1e-6);
    }

    #[test]
    fn gmres_restarts_until_converged() {
        let mut a = CsrMtrx::from_triplets(&chain_triplets(30, 10.0));
        let b = DVector::from_element(30, 1.0);
        let mut x = DVector::zeros(30);
        let mut solver = IterativeSolver::new(IterativeConfig {
            restart: 5,
            ..IterativeConfig::gmres()
        });
        assert_eq!(solver.solve(&mut a, &b, &mut x), Outcome::Converged);
        assert!(residual_norm(&a, &b, &x) < 1e-6);
    }

    #[test]
    fn preconditioner_rebuilds_only_on_new_version() {
        let mut a = CsrMtrx::from_triplets(&chain_triplets(10, 100.0));
        let b = DVector::from_element(10, 1.0);
        let mut solver = IterativeSolver::new(IterativeConfig {
            preconditioner: PreconditionerKind::Ilu,
            ..IterativeConfig::cg()
        });

        let mut x = DVector::zeros(10);
        solver.solve(&mut a, &b, &mut x);
        let mut x2 = DVector::zeros(10);
        solver.solve(&mut a, &b, &mut x2);
        assert_eq!(solver.preconditioner_rebuilds(), 1);

        a.zero();
        let block = nalgebra::DMatrix::from_row_slice(2, 2, &[200.0, -100.0, -100.0, 200.0]);
        for i in 0..9 {
            a.assemble(&[i + 1, i + 2], &block);
        }
        a.assemble(&[10, 0], &nalgebra::DMatrix::from_element(2, 2, 100.0));
        let mut x3 = DVector::zeros(10);
        solver.solve(&mut a, &b, &mut x3);
        assert_eq!(solver.preconditioner_rebuilds(), 2);
    }

    #[test]
    fn ilu_is_exact_for_tridiagonal_pattern() {
        // Zero fill-in loses nothing on a tridiagonal system, so the
        // preconditioned residual drops immediately.
        let triplets = chain_triplets(8, 3.0);
        let factors = IluFactors::build(&triplets).unwrap();
        let a = CsrMtrx::from_triplets(&triplets);
        let b = DVector::from_element(8, 1.0);
        let z = factors.apply(&b);
        assert!((&b - a.times(&z)).norm() < 1e-10);
    }
}
