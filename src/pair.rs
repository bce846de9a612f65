//! Pair energy kernels.
//!
//! All kernels work on one ordered occupied pair (i, j) with `g_ab = (ia|jb)` and
//! `d_ab = e_i + e_j - e_a - e_b`, and return the unweighted ordered-pair energy.

use crate::prelude::*;
use crate::scheme::PairRule;
use crate::structs::pair_weight;

/// Iteration cap reached before the pair energy change dropped below tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairNotConverged {
    pub niter: usize,
    pub delta: f64,
    pub e_last: f64,
}

/// `d_ab = e_i + e_j - e_a - e_b` from `d_ov = e_i - e_a`.
pub fn get_d_ab(d_ov: &Tsr, i: usize, j: usize) -> Tsr {
    d_ov.i((i, .., None)) + d_ov.i((j, None, ..))
}

/// MP2 pair energy `sum_ab g_ab (2 g_ab - g_ba) / d_ab`.
pub fn get_pair_mp2(g_ab: &Tsr, d_ab: &Tsr) -> f64 {
    get_pair_mp2_with_norm(g_ab, d_ab).0
}

/// MP2 pair energy together with the pair amplitude norm `sum_ab t_ab (2 t_ab - t_ba)`.
pub fn get_pair_mp2_with_norm(g_ab: &Tsr, d_ab: &Tsr) -> (f64, f64) {
    let t_ab = g_ab / d_ab;
    let e_bi1 = (&t_ab * g_ab).sum_all();
    let e_bi2 = (&t_ab * &g_ab.t()).sum_all();
    let n_bi1 = (&t_ab * &t_ab).sum_all();
    let n_bi2 = (&t_ab * &t_ab.t()).sum_all();
    (2.0 * e_bi1 - e_bi2, 2.0 * n_bi1 - n_bi2)
}

/// Pair energy with self-consistently shifted denominators `d_ab + scale * e`.
///
/// Starts from the MP2 pair energy; returns the converged energy and the number of iterations.
pub fn get_pair_shifted(
    g_ab: &Tsr,
    d_ab: &Tsr,
    scale: f64,
    conv_tol: f64,
    max_cycle: usize,
) -> Result<(f64, usize), PairNotConverged> {
    let g_t: Tsr = 2.0 * g_ab - g_ab.t();
    let num_ab = g_ab * &g_t;

    let mut e = (&num_ab / d_ab).sum_all();
    let mut delta = f64::INFINITY;
    for niter in 1..=max_cycle {
        let d_shifted = d_ab.mapv(|d| d + scale * e);
        let e_new = (&num_ab / &d_shifted).sum_all();
        delta = (e_new - e).abs();
        e = e_new;
        if delta < conv_tol {
            return Ok((e, niter));
        }
    }
    Err(PairNotConverged { niter: max_cycle, delta, e_last: e })
}

/// Degeneracy-corrected pair energy `sum_ab -2 g_ab (2 g_ab - g_ba) / (|d_ab| + sqrt(d_ab^2 + 4 scale g_ab^2))`.
///
/// `scale -> 0` recovers MP2.
pub fn get_pair_dcpt2(g_ab: &Tsr, d_ab: &Tsr, scale: f64) -> f64 {
    let g_t: Tsr = 2.0 * g_ab - g_ab.t();
    let d2_ab = d_ab * d_ab + (4.0 * scale) * (g_ab * g_ab);
    let denom = d_ab.mapv(|d| d.abs()) + d2_ab.mapv(|x| x.sqrt());
    let e_ab: Tsr = -2.0 * (g_ab * &g_t) / denom;
    e_ab.sum_all()
}

/// Weighted pair energy entry for pair-local rules.
///
/// Coupled-pair rules are not pair-local and are handled by [`crate::aggregate`].
pub fn eval_pair(
    rule: PairRule,
    (i, j): (usize, usize),
    g_ab: &Tsr,
    d_ab: &Tsr,
    conv_tol: f64,
    max_cycle: usize,
) -> Result<PairEnergy, PairNotConverged> {
    let (e_ij, status) = match rule {
        PairRule::MP2 | PairRule::CoupledPair(_) => (get_pair_mp2(g_ab, d_ab), PairStatus::ClosedForm),
        PairRule::ShiftedDenominator { scale } => {
            let (e_ij, niter) = get_pair_shifted(g_ab, d_ab, scale, conv_tol, max_cycle)?;
            (e_ij, PairStatus::Converged { niter })
        },
        PairRule::DegeneracyCorrected { scale } => (get_pair_dcpt2(g_ab, d_ab, scale), PairStatus::ClosedForm),
    };
    Ok(PairEnergy { i, j, e_pair: pair_weight(i, j) * e_ij, status })
}
