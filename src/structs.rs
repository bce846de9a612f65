use crate::prelude::*;

/* #region RHF */

pub struct RHFResults {
    pub mo_coeff: Tsr,
    pub mo_energy: Tsr,
    pub dm: Tsr,
    pub nocc: usize,
    pub e_nuc: f64,
    pub e_elec: f64,
    pub e_tot: f64,
}

/* #endregion */

/* #region IEPA */

/// Mean-field reference and whatever integral data is at hand.
///
/// Only orbital energies and the transformed `(ia|jb)` blocks enter the pair equations;
/// coefficients are used for the integral transformation.
#[derive(Debug)]
pub struct IEPAInfo {
    /// Molecular orbital coefficients, `[nao, nmo]`.
    pub mo_coeff: Tsr,
    /// Orbital energies in ascending order, `[nmo]`.
    pub mo_energy: Tsr,
    /// Number of doubly occupied orbitals.
    pub nocc: usize,
    /// Basis set data, used to build integrals that are not given explicitly.
    pub cint_data: Option<CInt>,
    /// Auxiliary basis set data for density fitting.
    pub aux_cint_data: Option<CInt>,
    /// Atomic-orbital electron repulsion integrals, `[nao, nao, nao, nao]`.
    pub int2e: Option<Tsr>,
    /// Cholesky-decomposed three-index integrals in atomic orbitals, `[nao, nao, naux]`.
    pub cderi: Option<Tsr>,
}

impl IEPAInfo {
    /// Reference without any integral data; attach integrals or basis data afterwards.
    pub fn new(mo_coeff: Tsr, mo_energy: Tsr, nocc: usize) -> Self {
        Self { mo_coeff, mo_energy, nocc, cint_data: None, aux_cint_data: None, int2e: None, cderi: None }
    }

    /// Reference from an RHF calculation, with basis data so that integrals can be built on demand.
    pub fn from_rhf(rhf_results: &RHFResults, cint_data: CInt, aux_cint_data: Option<CInt>) -> Self {
        Self {
            mo_coeff: rhf_results.mo_coeff.clone(),
            mo_energy: rhf_results.mo_energy.clone(),
            nocc: rhf_results.nocc,
            cint_data: Some(cint_data),
            aux_cint_data,
            int2e: None,
            cderi: None,
        }
    }

    pub fn nmo(&self) -> usize {
        self.mo_coeff.shape()[1]
    }

    /// Shapes of orbital and integral data must agree before any pair is formed.
    pub fn check_reference(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidReference(msg));

        let coeff_shape = self.mo_coeff.shape();
        if coeff_shape.len() != 2 {
            return invalid(format!("mo_coeff must be 2-D [nao, nmo], got shape {coeff_shape:?}"));
        }
        let (nao, nmo) = (coeff_shape[0], coeff_shape[1]);
        let energy_shape = self.mo_energy.shape();
        if energy_shape.len() != 1 || energy_shape[0] != nmo {
            return invalid(format!("mo_energy must have shape [{nmo}], got {energy_shape:?}"));
        }
        if self.nocc > nmo {
            return invalid(format!("{} occupied orbitals exceed {nmo} molecular orbitals", self.nocc));
        }

        if let Some(cint_data) = &self.cint_data {
            if cint_data.nao() != nao {
                return invalid(format!("basis has {} functions, mo_coeff has {nao} rows", cint_data.nao()));
            }
        }
        if let Some(int2e) = &self.int2e {
            if int2e.shape()[..] != [nao; 4] {
                return invalid(format!("int2e must have shape {:?}, got {:?}", [nao; 4], int2e.shape()));
            }
        }
        if let Some(cderi) = &self.cderi {
            let cderi_shape = cderi.shape();
            if cderi_shape.len() != 3 || cderi_shape[0] != nao || cderi_shape[1] != nao {
                return invalid(format!("cderi must have shape [{nao}, {nao}, naux], got {cderi_shape:?}"));
            }
        }
        Ok(())
    }

    /// Unordered occupied pairs `(i, j)` with `i <= j`.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        (0..self.nocc).combinations_with_replacement(2).map(|ij| (ij[0], ij[1])).collect()
    }

    /// `e_i - e_a`, `[nocc, nvir]`.
    pub fn d_ov(&self) -> Tsr {
        let nocc = self.nocc;
        let nmo = self.nmo();
        let so = slice!(0, nocc);
        let sv = slice!(nocc, nmo);
        let mo_energy = &self.mo_energy;
        mo_energy.i((so, None)) - mo_energy.i((None, sv))
    }
}

/// Outcome of a single pair evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairStatus {
    ClosedForm,
    Converged { niter: usize },
}

/// Pair energy entry of an unordered occupied pair.
///
/// `e_pair` already carries the pair weight (both orderings for `i != j`), so entries are summed once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairEnergy {
    pub i: usize,
    pub j: usize,
    pub e_pair: f64,
    pub status: PairStatus,
}

/// Pair weight of the spin-adapted closed-shell formulas.
pub fn pair_weight(i: usize, j: usize) -> f64 {
    if i != j { 2.0 } else { 1.0 }
}

/// All MP2 pair quantities, needed before coupled-pair corrections can be formed.
#[derive(Debug, Clone)]
pub struct MP2PairData {
    /// Ordered-pair MP2 energies `e_ij`, symmetric, `[nocc, nocc]`.
    pub e_oo: Tsr,
    /// Ordered-pair amplitude norms `n_ij`, symmetric, `[nocc, nocc]`.
    pub n_oo: Tsr,
}

impl MP2PairData {
    /// Orbital amplitude norms `N_i = sum_k n_ik`.
    pub fn n_o(&self) -> Tsr {
        self.n_oo.sum_axes([1])
    }

    pub fn e_corr(&self) -> f64 {
        self.e_oo.sum_all()
    }
}

/* #endregion */
