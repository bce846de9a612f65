//! Occupied-pair blocks `g_ab = (ia|jb)` of the two-electron integrals in molecular orbitals.

use crate::prelude::*;

/// Source of pair blocks; both variants give the same `[nvir, nvir]` block up to the fitting error.
#[derive(Debug, Clone, Copy)]
pub enum PairIntegrals<'a> {
    /// Fully transformed `(ia|jb)` stored as `[nocc, nocc, nvir, nvir]`.
    Conventional(&'a Tsr),
    /// Fitted three-index integrals `B_ia^P` stored as `[nocc, nvir, naux]`.
    DensityFitted(&'a Tsr),
}

impl PairIntegrals<'_> {
    /// `g_ab = (ia|jb)` for occupied pair (i, j).
    pub fn get_g_ab(&self, i: usize, j: usize) -> Tsr {
        match self {
            PairIntegrals::Conventional(g_oovv) => g_oovv.i((i, j)).to_owned(),
            PairIntegrals::DensityFitted(b_ov) => b_ov.i(i) % b_ov.i(j).t(),
        }
    }
}

/// Four-index transformation of atomic-orbital integrals to `(ia|jb)`, stored as `[nocc, nocc, nvir, nvir]`.
pub fn get_g_oovv_conv(int2e: &Tsr, mo_coeff: &Tsr, nocc: usize) -> Tsr {
    let nao = mo_coeff.shape()[0];
    let nmo = mo_coeff.shape()[1];
    let nvir = nmo - nocc;
    let device = mo_coeff.device().clone();

    let time = std::time::Instant::now();
    let c_o = mo_coeff.i((.., ..nocc));
    let c_v = mo_coeff.i((.., nocc..));
    let int2e_flat = int2e.reshape((nao, -1));

    let g_oovv: Tsr = rt::zeros(([nocc, nocc, nvir, nvir], &device));
    (0..nocc).into_par_iter().for_each(|i| {
        // (iv|ls) -> (ia|ls) -> (ia|lb)
        let scr_vls = (c_o.i((.., i)) % &int2e_flat).into_shape((nao, nao * nao));
        let scr_als = (c_v.t() % &scr_vls).into_shape((nvir * nao, nao));
        let scr_alb = (&scr_als % &c_v).into_shape((nvir, nao, nvir));

        // (ia|jb), written to g[i, j, a, :]
        let mut g_oovv = unsafe { g_oovv.force_mut() };
        for a in 0..nvir {
            let scr_jb = c_o.t() % scr_alb.i(a);
            for j in 0..nocc {
                g_oovv.i_mut((i, j, a)).assign(&scr_jb.i(j));
            }
        }
    });
    tracing::debug!("time elapsed (conventional ao2mo): {:.3?}", time.elapsed());

    g_oovv
}

/// Transformation of Cholesky-decomposed `[nao, nao, naux]` integrals to `B_ia^P`, `[nocc, nvir, naux]`.
pub fn get_b_ov_ri(cderi: &Tsr, mo_coeff: &Tsr, nocc: usize) -> Tsr {
    let nao = mo_coeff.shape()[0];
    let nmo = mo_coeff.shape()[1];
    let naux = cderi.shape()[2];
    let so = slice!(0, nocc);
    let sv = slice!(nocc, nmo);

    let time = std::time::Instant::now();
    let cderi_svp = (mo_coeff.t() % cderi.reshape((nao, nao * naux))).into_shape((nmo, nao, naux));
    let b_ov = mo_coeff.i((.., sv)).t() % cderi_svp.i(so);
    tracing::debug!("time elapsed (density-fitted ao2mo): {:.3?}", time.elapsed());

    b_ov
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Symmetric `[n, n, naux]` factors with smooth, non-degenerate entries.
    pub(crate) fn synthetic_cderi(n: usize, naux: usize) -> Tsr {
        let device = DeviceTsr::default();
        let mut data = vec![0.0; n * n * naux];
        for u in 0..n {
            for v in 0..n {
                for p in 0..naux {
                    let (lo, hi) = (u.min(v) as f64, u.max(v) as f64);
                    let val = 0.3 * (1.0 + lo + 0.7 * hi + 1.3 * p as f64).sin() / (1.0 + (u as f64 - v as f64).abs());
                    data[(u * n + v) * naux + p] = val;
                }
            }
        }
        rt::asarray((data, [n, n, naux].c(), &device))
    }

    /// `(uv|ls) = sum_P B_uvP B_lsP`, exactly consistent with [`synthetic_cderi`].
    pub(crate) fn synthetic_int2e(cderi: &Tsr) -> Tsr {
        let n = cderi.shape()[0];
        let flat = cderi.reshape((n * n, -1));
        (&flat % flat.t()).into_shape((n, n, n, n))
    }

    /// Orthogonal (rotation) orbital coefficients mixing neighbouring orbitals.
    pub(crate) fn synthetic_mo_coeff(n: usize) -> Tsr {
        let device = DeviceTsr::default();
        let mut data = vec![0.0; n * n];
        for k in 0..n {
            data[k * n + k] = 1.0;
        }
        let (c, s) = (0.3_f64.cos(), 0.3_f64.sin());
        for k in (0..n - 1).step_by(2) {
            data[k * n + k] = c;
            data[k * n + k + 1] = -s;
            data[(k + 1) * n + k] = s;
            data[(k + 1) * n + k + 1] = c;
        }
        rt::asarray((data, [n, n].c(), &device))
    }

    #[test]
    fn test_conv_and_ri_blocks_agree() {
        let (nmo, naux, nocc) = (6, 9, 2);
        let cderi = synthetic_cderi(nmo, naux);
        let int2e = synthetic_int2e(&cderi);
        let mo_coeff = synthetic_mo_coeff(nmo);

        let g_oovv = get_g_oovv_conv(&int2e, &mo_coeff, nocc);
        let b_ov = get_b_ov_ri(&cderi, &mo_coeff, nocc);
        assert_eq!(g_oovv.shape(), &[nocc, nocc, nmo - nocc, nmo - nocc]);
        assert_eq!(b_ov.shape(), &[nocc, nmo - nocc, naux]);

        let conv = PairIntegrals::Conventional(&g_oovv);
        let ri = PairIntegrals::DensityFitted(&b_ov);
        for i in 0..nocc {
            for j in 0..nocc {
                let diff = (conv.get_g_ab(i, j) - ri.get_g_ab(i, j)).l2_norm();
                assert!(diff < 1e-12, "pair ({i}, {j}) differs by {diff}");
            }
        }
    }

    #[test]
    fn test_pair_block_symmetry() {
        // (ia|jb) = (jb|ia): block (j, i) is the transpose of block (i, j)
        let (nmo, naux, nocc) = (6, 9, 3);
        let cderi = synthetic_cderi(nmo, naux);
        let b_ov = get_b_ov_ri(&cderi, &synthetic_mo_coeff(nmo), nocc);
        let ri = PairIntegrals::DensityFitted(&b_ov);
        let diff = (ri.get_g_ab(0, 2) - ri.get_g_ab(2, 0).t()).l2_norm();
        assert!(diff < 1e-13);
    }
}
