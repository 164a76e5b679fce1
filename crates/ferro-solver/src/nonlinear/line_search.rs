//! Line search along a Newton correction.
//!
//! Probes a damping factor η for the update `X + η·δ` until the energy
//! product `s(η) = δᵗ·(λR + R0 − F(X + η·δ))` has shrunk to a fraction of
//! `s(0)`. The bracket is expanded by an amplification factor while `s`
//! keeps its sign, then tightened by regula falsi. Equations under direct
//! displacement control are masked out of the product. Failure to find an
//! acceptable η is not fatal; the caller proceeds with η = 1.

use nalgebra::DVector;

use ferro_model::model::{EngineeringModel, TimeStep};
use ferro_model::numbering::DefaultNumbering;

use crate::error::Result;
use crate::nonlinear::{refresh_internal_forces, total_load};

/// Settings for [`LineSearch`].
#[derive(Debug, Clone)]
pub struct LineSearchConfig {
    /// Accept η once `|s(η)| ≤ tolerance·|s(0)|`.
    pub tolerance: f64,
    /// Bracket growth factor while the energy product keeps its sign.
    pub amplification: f64,
    pub eta_min: f64,
    pub eta_max: f64,
    /// Residual evaluations allowed per search.
    pub max_probes: usize,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.8,
            amplification: 2.5,
            eta_min: 0.1,
            eta_max: 8.0,
            max_probes: 10,
        }
    }
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchStatus {
    /// The returned η satisfies the decrease test.
    Accepted,
    /// No acceptable η found; the returned η is the unit fallback.
    FellBack,
}

/// One-dimensional sub-solver refining Newton corrections.
#[derive(Debug, Clone, Default)]
pub struct LineSearch {
    pub config: LineSearchConfig,
}

impl LineSearch {
    pub fn new(config: LineSearchConfig) -> Self {
        Self { config }
    }

    /// Search a damping factor for `x_old + η·delta`.
    ///
    /// The model's internal state is left at the last probed point; the
    /// caller re-updates it with the accepted solution.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        model: &mut dyn EngineeringModel,
        step: &TimeStep,
        x_old: &DVector<f64>,
        delta: &DVector<f64>,
        r: &DVector<f64>,
        r0: Option<&DVector<f64>>,
        load_level: f64,
        excluded: &[bool],
        domain_index: usize,
    ) -> Result<(f64, LineSearchStatus)> {
        let neq = x_old.len();
        assert_eq!(delta.len(), neq);
        assert_eq!(r.len(), neq);

        let cfg = &self.config;
        let fallback = 1.0_f64.clamp(cfg.eta_min, cfg.eta_max);
        let numbering = DefaultNumbering::from_domain(model.domain(domain_index));
        let rt = total_load(r, r0, load_level);

        let mut masked_delta = delta.clone();
        for (value, &masked) in masked_delta.iter_mut().zip(excluded.iter()) {
            if masked {
                *value = 0.0;
            }
        }

        let probe = |eta: f64, model: &mut dyn EngineeringModel| -> Result<f64> {
            let x_trial = x_old + delta * eta;
            let mut f_trial = DVector::zeros(neq);
            refresh_internal_forces(model, &mut f_trial, &x_trial, &numbering, step, domain_index)?;
            let mut residual = &rt - f_trial;
            for (value, &masked) in residual.iter_mut().zip(excluded.iter()) {
                if masked {
                    *value = 0.0;
                }
            }
            let ctx = model.parallel_context(domain_index);
            Ok(ctx.local_dot_product(&masked_delta, &residual))
        };

        let s0 = probe(0.0, model)?;
        if s0.abs() < f64::MIN_POSITIVE {
            return Ok((fallback, LineSearchStatus::Accepted));
        }
        let target = cfg.tolerance * s0.abs();

        let mut eta_a = 0.0_f64;
        let mut s_a = s0;
        let mut eta_b = fallback;
        let mut s_b = probe(eta_b, model)?;
        let mut probes = 1;
        if s_b.abs() <= target {
            return Ok((eta_b, LineSearchStatus::Accepted));
        }

        // expand while the product keeps the s(0) sign
        while s_b * s0 > 0.0 && probes < cfg.max_probes && eta_b < cfg.eta_max {
            eta_a = eta_b;
            s_a = s_b;
            eta_b = (eta_b * cfg.amplification).min(cfg.eta_max);
            s_b = probe(eta_b, model)?;
            probes += 1;
            if s_b.abs() <= target {
                return Ok((eta_b, LineSearchStatus::Accepted));
            }
        }
        if s_b * s0 > 0.0 {
            return Ok((fallback, LineSearchStatus::FellBack));
        }

        // regula falsi inside the sign-changing bracket
        while probes < cfg.max_probes {
            let denom = s_b - s_a;
            if denom == 0.0 {
                break;
            }
            let mut eta = eta_a - s_a * (eta_b - eta_a) / denom;
            eta = eta.clamp(cfg.eta_min, cfg.eta_max);
            if eta == eta_a || eta == eta_b {
                eta = 0.5 * (eta_a + eta_b);
            }
            let s = probe(eta, model)?;
            probes += 1;
            if s.abs() <= target {
                return Ok((eta, LineSearchStatus::Accepted));
            }
            if s * s_a > 0.0 {
                eta_a = eta;
                s_a = s;
            } else {
                eta_b = eta;
                s_b = s;
            }
        }
        Ok((fallback, LineSearchStatus::FellBack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_model::sample::SpringChain;

    #[test]
    fn damps_an_overshooting_direction() {
        // spring force 10x + 10x³; the balanced state for R = 20 is x = 1,
        // and the probed direction overshoots it threefold
        let mut chain = SpringChain::hardening(1, 10.0, 10.0);
        let step = TimeStep::new(1, 1.0);
        let x_old = DVector::zeros(1);
        let delta = DVector::from_vec(vec![3.0]);
        let r = DVector::from_vec(vec![20.0]);

        let search = LineSearch::default();
        let (eta, status) = search
            .search(&mut chain, &step, &x_old, &delta, &r, None, 1.0, &[false], 0)
            .unwrap();
        assert_eq!(status, LineSearchStatus::Accepted);
        assert!(eta > 0.05 && eta < 0.6, "eta = {eta}");
    }

    #[test]
    fn eta_stays_within_bounds_for_either_direction_sign() {
        let step = TimeStep::new(1, 1.0);
        let r = DVector::from_vec(vec![20.0]);
        for direction in [3.0, -3.0] {
            let mut chain = SpringChain::hardening(1, 10.0, 10.0);
            let delta = DVector::from_vec(vec![direction]);
            let search = LineSearch::default();
            let (eta, _) = search
                .search(
                    &mut chain,
                    &step,
                    &DVector::zeros(1),
                    &delta,
                    &r,
                    None,
                    1.0,
                    &[false],
                    0,
                )
                .unwrap();
            assert!(eta >= search.config.eta_min && eta <= search.config.eta_max);
        }
    }

    #[test]
    fn respects_a_sub_unit_eta_ceiling() {
        let mut chain = SpringChain::hardening(1, 10.0, 10.0);
        let step = TimeStep::new(1, 1.0);
        let search = LineSearch::new(LineSearchConfig {
            eta_max: 0.5,
            ..LineSearchConfig::default()
        });
        let (eta, _) = search
            .search(
                &mut chain,
                &step,
                &DVector::zeros(1),
                &DVector::from_vec(vec![3.0]),
                &DVector::from_vec(vec![20.0]),
                None,
                1.0,
                &[false],
                0,
            )
            .unwrap();
        assert!(eta <= 0.5);
    }

    #[test]
    fn masked_equations_do_not_drive_the_search() {
        // the only equation is masked, so the product is identically zero
        // and the unit fallback is accepted
        let mut chain = SpringChain::hardening(1, 10.0, 10.0);
        let step = TimeStep::new(1, 1.0);
        let search = LineSearch::default();
        let (eta, status) = search
            .search(
                &mut chain,
                &step,
                &DVector::zeros(1),
                &DVector::from_vec(vec![3.0]),
                &DVector::from_vec(vec![20.0]),
                None,
                1.0,
                &[true],
                0,
            )
            .unwrap();
        assert_eq!(status, LineSearchStatus::Accepted);
        assert!((eta - 1.0).abs() < 1e-15);
    }
}
