use crate::prelude::*;

/// Obtain integrals (in row-major, same to PySCF but reverse of libcint).
///
/// # Usage
///
/// ```norun
/// let tsr = intor_row_major(&cint_data, "int1e_kin");
/// ```
pub fn intor_row_major(cint_data: &CInt, intor: &str) -> Tsr {
    // use up all rayon available threads for tensor operations
    let device = DeviceTsr::default();

    // intor, "s1", full_shls_slice
    let (out, shape) = cint_data.integrate_row_major(intor, None, None).into();

    // row-major by transposition of col-major shape
    rt::asarray((out, shape.c(), &device))
}

pub fn intor_3c2e_row_major(cint_data: &CInt, aux_cint_data: &CInt, intor: &str) -> Tsr {
    let device = DeviceTsr::default();

    // intor, "s1", full_shls_slice
    let (out, shape) = CInt::integrate_cross_row_major(intor, [cint_data, cint_data, aux_cint_data], None, None).into();

    rt::asarray((out, shape.c(), &device))
}

/// Cholesky-decomposed three-index integrals `[nao, nao, naux]`, such that
/// `(uv|ls) ~ sum_P cderi[u, v, P] cderi[l, s, P]`.
pub fn get_cderi_ao(cint_data: &CInt, aux_cint_data: &CInt) -> Tsr {
    let nao = cint_data.nao();
    let naux = aux_cint_data.nao();

    let time = std::time::Instant::now();
    let int3c2e = intor_3c2e_row_major(cint_data, aux_cint_data, "int3c2e");
    let int2c2e = intor_row_major(aux_cint_data, "int2c2e");
    tracing::debug!("time elapsed (3c2e/2c2e integrals): {:.3?}", time.elapsed());

    let time = std::time::Instant::now();
    let int3c2e_trans = int3c2e.into_shape([nao * nao, naux]).into_reverse_axes();
    let int2c2e_l = rt::linalg::cholesky((int2c2e.view(), Lower));
    let cderi = rt::linalg::solve_triangular((int2c2e_l.view(), int3c2e_trans, Lower));
    let cderi = cderi.into_reverse_axes().into_shape([nao, nao, naux]);
    tracing::debug!("time elapsed (cderi cholesky and solve_triangular): {:.3?}", time.elapsed());

    cderi
}

/// Key of a results table entry; `omega = 0` gives the bare key.
pub fn pad_omega(token: &str, omega: f64) -> String {
    if omega == 0.0 { format!("eng_corr_{token}") } else { format!("eng_corr_{token}_omega({omega:.6})") }
}
