//! Reduction of pair energies to correlation energies.

use crate::prelude::*;
use crate::scheme::CouplingNorm;
use crate::structs::pair_weight;

/// Sum of weighted pair entries; every unordered pair is counted once.
pub fn aggregate_pairs(pairs: &[PairEnergy]) -> f64 {
    pairs.iter().map(|pair| pair.e_pair).sum()
}

/// Collect MP2 pair energies and amplitude norms of unordered pairs into symmetric matrices.
pub fn collect_mp2_pair_data(nocc: usize, pairs: &[((usize, usize), (f64, f64))]) -> MP2PairData {
    let device = DeviceTsr::default();
    let mut e_oo: Tsr = rt::zeros(([nocc, nocc], &device));
    let mut n_oo: Tsr = rt::zeros(([nocc, nocc], &device));
    for &((i, j), (e_ij, n_ij)) in pairs {
        *e_oo.index_mut([i, j]) = e_ij;
        *e_oo.index_mut([j, i]) = e_ij;
        *n_oo.index_mut([i, j]) = n_ij;
        *n_oo.index_mut([j, i]) = n_ij;
    }
    MP2PairData { e_oo, n_oo }
}

/// Coupled-pair coefficient of every unordered pair, built from the full set of MP2 amplitude norms.
pub fn get_coupling_coefficients(mp2: &MP2PairData, norm: CouplingNorm) -> Vec<((usize, usize), f64)> {
    let nocc = mp2.n_oo.shape()[0];
    let n_o = mp2.n_o();
    let n_oo = &mp2.n_oo;
    (0..nocc)
        .combinations_with_replacement(2)
        .map(|ij| {
            let (i, j) = (ij[0], ij[1]);
            let coef = match norm {
                CouplingNorm::OrbitalAverage => 1.0 + 0.5 * (n_o[[i]] + n_o[[j]]),
                CouplingNorm::CoupledPairs => 1.0 + n_o[[i]] + n_o[[j]] - n_oo[[i, j]],
            };
            ((i, j), coef)
        })
        .collect()
}

/// Pair entries of a coupled-pair corrected scheme.
pub fn get_coupled_pairs(mp2: &MP2PairData, norm: CouplingNorm) -> Vec<PairEnergy> {
    get_coupling_coefficients(mp2, norm)
        .into_iter()
        .map(|((i, j), coef)| PairEnergy {
            i,
            j,
            e_pair: pair_weight(i, j) * mp2.e_oo[[i, j]] / coef,
            status: PairStatus::ClosedForm,
        })
        .collect()
}

/// MP2 pair entries recovered from the pair data.
pub fn get_mp2_pairs(mp2: &MP2PairData) -> Vec<PairEnergy> {
    let nocc = mp2.e_oo.shape()[0];
    (0..nocc)
        .combinations_with_replacement(2)
        .map(|ij| {
            let (i, j) = (ij[0], ij[1]);
            PairEnergy { i, j, e_pair: pair_weight(i, j) * mp2.e_oo[[i, j]], status: PairStatus::ClosedForm }
        })
        .collect()
}

/// MP2 correlation energy as reduced from the pair entries.
pub fn get_mp2_energy(mp2: &MP2PairData) -> f64 {
    aggregate_pairs(&get_mp2_pairs(mp2))
}

/// Average of MP2 and a coupled-pair energy (MP2cr3 from MP2cr, MP2cr4 from MP2cr2).
pub fn get_averaged_energy(e_mp2: f64, e_coupled: f64) -> f64 {
    0.5 * (e_mp2 + e_coupled)
}
