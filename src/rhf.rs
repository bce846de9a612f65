//! Minimal closed-shell references for correlation calculations.

use crate::prelude::*;
use std::collections::VecDeque;

pub const MAX_CYCLE: usize = 128;
pub const CONV_TOL: f64 = 1e-10;
pub const CONV_TOL_GRAD: f64 = 1e-7;
const DIIS_SPACE: usize = 8;

pub fn get_energy_nuc(cint_data: &CInt) -> f64 {
    let device = DeviceTsr::default();

    let atom_coords = {
        let coords = cint_data.atom_coords();
        let coords = coords.into_iter().flatten().collect::<Vec<f64>>();
        rt::asarray((coords, &device)).into_shape((-1, 3))
    };
    let atom_charges = rt::asarray((cint_data.atom_charges(), &device));
    let mut dist = rt::sci::cdist((atom_coords.view(), atom_coords.view()));
    dist.diagonal_mut(None).fill(f64::INFINITY);
    0.5 * (&atom_charges * atom_charges.i((.., None)) / dist).sum()
}

/// Number of doubly occupied orbitals of a neutral closed-shell molecule.
pub fn get_nocc(cint_data: &CInt) -> usize {
    (cint_data.atom_charges().into_iter().sum::<f64>() / 2.0) as usize
}

/// Pulay extrapolation of Fock matrices weighted to minimize the commutator error `FDS - SDF`.
fn diis_extrapolate(focks: &VecDeque<Tsr>, errs: &VecDeque<Tsr>) -> Tsr {
    let device = DeviceTsr::default();
    let nspace = focks.len();

    // bordered overlap of error vectors, first row and column is `[0, 1, ..., 1]`
    let mut ovlp: Tsr = rt::zeros(([nspace + 1, nspace + 1], &device));
    ovlp.i_mut((0, 1..)).fill(1.0);
    ovlp.i_mut((1.., 0)).fill(1.0);
    for (i, j) in (0..nspace).cartesian_product(0..nspace) {
        let err_ij: Tsr = &errs[i] * &errs[j];
        ovlp[[i + 1, j + 1]] = err_ij.sum_all();
    }

    let (w, v): (Tsr, Tsr) = rt::linalg::eigh(ovlp.view()).into();
    let eps = 30.0 * f64::EPSILON;
    let w = w.mapv(|x| if x.abs() < eps { 0.0 } else { 1.0 / x });
    let mut g: Tsr = rt::zeros(([nspace + 1], &device));
    g[[0]] = 1.0;
    let c = (v.view() * w) % v.t() % g;

    let mut fock = focks[0].zeros_like();
    for (idx, fock_idx) in focks.iter().enumerate() {
        fock += fock_idx * c[[idx + 1]];
    }
    fock
}

/// DIIS-accelerated Roothaan iterations shared by both references; `get_jk` gives `J - K/2` of a density matrix.
///
/// Starts from the core Hamiltonian. Orbitals returned are canonical for the Fock matrix of the final density.
fn rhf_iterations(hcore: &Tsr, ovlp: &Tsr, nocc: usize, e_nuc: f64, get_jk: impl Fn(&Tsr) -> Tsr) -> RHFResults {
    let mut dm = ovlp.zeros_like();
    let mut focks: VecDeque<Tsr> = VecDeque::new();
    let mut errs: VecDeque<Tsr> = VecDeque::new();
    let mut e_prev = f64::INFINITY;
    let mut converged = false;

    for niter in 0..MAX_CYCLE {
        let fock = hcore + get_jk(&dm);
        let e_elec = 0.5 * (&dm * (hcore + &fock)).sum_all();
        let err: Tsr = &fock % &dm % ovlp - ovlp % &dm % &fock;
        let err_norm = err.l2_norm();
        tracing::debug!("RHF iteration {niter:3}: energy {:20.12}, |FDS - SDF| {err_norm:.3e}", e_elec + e_nuc);
        if (e_elec - e_prev).abs() < CONV_TOL && err_norm < CONV_TOL_GRAD {
            converged = true;
            break;
        }
        e_prev = e_elec;

        focks.push_back(fock);
        errs.push_back(err);
        if focks.len() > DIIS_SPACE {
            focks.pop_front();
            errs.pop_front();
        }
        let fock = if focks.len() > 1 { diis_extrapolate(&focks, &errs) } else { focks[0].clone() };

        let (_, mo_coeff): (Tsr, Tsr) = rt::linalg::eigh((fock.view(), ovlp.view())).into();
        dm = 2.0_f64 * mo_coeff.i((.., ..nocc)) % mo_coeff.i((.., ..nocc)).t();
    }
    if !converged {
        tracing::warn!("RHF not converged in {MAX_CYCLE} iterations");
    }

    let fock = hcore + get_jk(&dm);
    let (mo_energy, mo_coeff): (Tsr, Tsr) = rt::linalg::eigh((fock.view(), ovlp.view())).into();
    let e_elec = 0.5 * (&dm * (hcore + &fock)).sum_all();
    let e_tot = e_nuc + e_elec;
    tracing::info!("total elec energy: {e_elec}");
    tracing::info!("total RHF energy: {e_tot}");

    RHFResults { mo_energy, mo_coeff, dm, nocc, e_nuc, e_elec, e_tot }
}

pub fn minimal_rhf(cint_data: &CInt) -> RHFResults {
    let time = std::time::Instant::now();
    let nocc = get_nocc(cint_data);

    let e_nuc = get_energy_nuc(cint_data);
    tracing::info!("nuclear repulsion energy: {e_nuc}");

    let hcore = util::intor_row_major(cint_data, "int1e_kin") + util::intor_row_major(cint_data, "int1e_nuc");
    let ovlp = util::intor_row_major(cint_data, "int1e_ovlp");
    let int2e = util::intor_row_major(cint_data, "int2e");

    let get_jk = |dm: &Tsr| -> Tsr { ((1.0_f64 * &int2e - 0.5_f64 * int2e.swapaxes(1, 2)) * dm).sum_axes([-1, -2]) };

    let rhf_results = rhf_iterations(&hcore, &ovlp, nocc, e_nuc, get_jk);
    tracing::debug!("time elapsed (RHF): {:.3?}", time.elapsed());
    rhf_results
}

pub fn minimal_ri_rhf(cint_data: &CInt, aux_cint_data: &CInt) -> RHFResults {
    let time = std::time::Instant::now();
    let nocc = get_nocc(cint_data);
    let nao = cint_data.nao();
    let naux = aux_cint_data.nao();

    let e_nuc = get_energy_nuc(cint_data);
    tracing::info!("nuclear repulsion energy: {e_nuc}");

    let hcore = util::intor_row_major(cint_data, "int1e_kin") + util::intor_row_major(cint_data, "int1e_nuc");
    let ovlp = util::intor_row_major(cint_data, "int1e_ovlp");
    let cderi = util::get_cderi_ao(cint_data, aux_cint_data);
    let cderi_flat = cderi.reshape([nao * nao, naux]);

    let get_j = |dm: &Tsr| -> Tsr {
        let scr = dm.reshape(nao * nao) % &cderi_flat;
        (&cderi_flat % scr).into_shape([nao, nao])
    };

    // exchange from the density matrix: K_us = sum_P sum_vl B_uvP D_vl B_lsP
    let get_k = |dm: &Tsr| -> Tsr {
        let scr = (dm % cderi.reshape([nao, nao * naux])).into_shape([nao, nao, naux]);
        let scr_flat = scr.into_swapaxes(0, 1).into_shape([nao, nao * naux]);
        cderi.reshape([nao, nao * naux]) % scr_flat.t()
    };

    let get_jk = |dm: &Tsr| -> Tsr { get_j(dm) - 0.5_f64 * get_k(dm) };

    let rhf_results = rhf_iterations(&hcore, &ovlp, nocc, e_nuc, get_jk);
    tracing::debug!("time elapsed (RI-RHF): {:.3?}", time.elapsed());
    rhf_results
}
