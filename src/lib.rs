pub mod prelude;

pub mod aggregate;
pub mod basis;
pub mod config;
pub mod error;
pub mod integral;
pub mod pair;
pub mod results;
pub mod rhf;
pub mod riepa;
pub mod scheme;
pub mod structs;
pub mod util;

#[test]
fn playground_rhf() {
    use crate::prelude::*;

    let cint_data = init_h2o_def2_tzvp();
    let rhf_results = rhf::minimal_rhf(&cint_data);
    let aux_cint_data = init_h2o_def2_jk();
    let ri_rhf_results = rhf::minimal_ri_rhf(&cint_data, &aux_cint_data);
    assert_eq!(rhf_results.nocc, 5);
    assert!((rhf_results.e_tot - ri_rhf_results.e_tot).abs() < 1e-3);
}

#[test]
fn playground_iepa_all_schemes() {
    use crate::prelude::*;

    let cint_data = init_h2o_def2_tzvp();
    let rhf_results = rhf::minimal_ri_rhf(&cint_data, &init_h2o_def2_jk());
    // correlation is fitted in an even-tempered basis rather than the JK-fitting one
    let aux_cint_data = basis::get_etb_aux(&cint_data, basis::ETB_BETA);
    let info = IEPAInfo::from_rhf(&rhf_results, cint_data, Some(aux_cint_data));

    let config = IEPAConfig::default()
        .updated(|flags| {
            flags.iepa_schemes = ["MP2", "MP2cr", "MP2cr2", "IEPA", "sIEPA", "DCPT2"].into();
            flags.omega_list_iepa = vec![0.0, 0.7, -0.7];
        })
        .unwrap();
    let mut riepa = RIEPA::new(&info, config);
    let res = riepa.run().unwrap();
    println!("{}", serde_json::to_string_pretty(&res).unwrap());
    let e = |token: &str, omega: f64| res.get_scheme(token, omega).unwrap();

    assert_eq!(res.len(), 24);
    assert!(e("MP2", 0.0) < -0.1 && e("MP2", 0.0) > -0.5);
    assert_eq!(e("SIEPA", 0.0), e("IEPA", 0.0));
    for omega in [0.0, 0.7, -0.7] {
        assert!((e("MP2CR3", omega) - 0.5 * (e("MP2", omega) + e("MP2CR", omega))).abs() < 1e-10);
        assert!((e("MP2CR4", omega) - 0.5 * (e("MP2", omega) + e("MP2CR2", omega))).abs() < 1e-10);
        assert_eq!(e("IEPA", omega), e("IEPA", 0.0));
    }

    // unsupported tokens are rejected, and the driver keeps its configuration
    let flags = IEPAFlags { iepa_schemes: "RPA".into(), ..Default::default() };
    assert!(IEPAConfig::try_from(flags).is_err());
    assert!(riepa.update_flags(|flags| flags.iepa_schemes = ["MP2", "RPA"].into()).is_err());
    assert_eq!(riepa.run().unwrap(), res);

    // conventional integrals built from basis data on demand
    riepa.update_flags(|flags| flags.integral_scheme_iepa = Some("conv".into())).unwrap();
    let res_conv = riepa.run().unwrap();
    for (key, e_ri) in res.iter() {
        assert!((e_ri - res_conv[key]).abs() < 1e-3, "{key}: {e_ri} vs {}", res_conv[key]);
    }

    let discrepancy = riepa.check_integral_discrepancy().unwrap();
    println!("MP2 discrepancy of density fitting: {:.3e}", discrepancy.diff());
    assert!(discrepancy.diff() < 1e-3);
    assert!(!discrepancy.exceeds_tol());
}

#[test]
fn playground_iepa_given_integrals() {
    use crate::prelude::*;

    let cint_data = init_h2o_def2_tzvp();
    let rhf_results = rhf::minimal_rhf(&cint_data);
    let config = IEPAConfig::default()
        .updated(|flags| {
            flags.integral_scheme = "conv".into();
            flags.iepa_schemes = ["MP2", "DCPT2"].into();
        })
        .unwrap();

    // integrals built from basis data
    let mut info = IEPAInfo::from_rhf(&rhf_results, cint_data, None);
    let res_built = riepa::kernel_riepa(&info, config.clone()).unwrap();

    // same integrals given explicitly, without basis data
    let cint_data = info.cint_data.take().unwrap();
    info.int2e = Some(util::intor_row_major(&cint_data, "int2e"));
    let res_given = riepa::kernel_riepa(&info, config.clone()).unwrap();
    assert!((res_built["eng_corr_MP2"] - res_given["eng_corr_MP2"]).abs() < 1e-12);

    // removed, then restored
    let int2e = info.int2e.take();
    let err = riepa::kernel_riepa(&info, config.clone()).unwrap_err();
    assert!(err.is_config_error());
    info.int2e = int2e;
    let res_restored = riepa::kernel_riepa(&info, config).unwrap();
    assert_eq!(res_given, res_restored);
}

/// HF at 2.25 angstrom in the basis of the coupled-pair benchmarks of Int. J. Quantum Chem. 78, 226 (2000).
#[cfg(test)]
fn init_hf_stretched() -> libcint::prelude::CInt {
    use crate::basis::{self, BOHR, BasisAtom, Shell};

    let prim = Shell::primitive;

    let shells_h = vec![
        Shell::new(0, &[(68.1600, 0.00255), (10.2465, 0.01938), (2.34648, 0.09280)]),
        prim(0, 0.673320),
        prim(0, 0.224660),
        prim(0, 0.082217),
        prim(0, 0.043),
        prim(1, 0.9),
        prim(1, 0.3),
        prim(1, 0.1),
        prim(2, 0.8),
    ];
    let shells_f = vec![
        Shell::new(0, &[(23340., 0.000757), (3431., 0.006081), (757.7, 0.032636), (209.2, 0.131704), (66.73, 0.396240)]),
        prim(0, 23.37),
        prim(0, 8.624),
        prim(0, 2.692),
        prim(0, 1.009),
        prim(0, 0.3312),
        Shell::new(1, &[(65.66, 0.037012), (15.22, 0.243943), (4.788, 0.808302)]),
        prim(1, 1.732),
        prim(1, 0.6206),
        prim(1, 0.2070),
        prim(0, 0.1),
        prim(1, 0.069),
        prim(2, 1.64),
        prim(2, 0.512),
        prim(2, 0.16),
        prim(2, 0.05),
        prim(3, 0.5),
    ];
    basis::build_cint(&[
        BasisAtom { charge: 1, coord: [0.0, 0.0, 0.0], shells: shells_h },
        BasisAtom { charge: 9, coord: [0.0, 0.0, 2.25 / BOHR], shells: shells_f },
    ])
}

#[test]
fn playground_coupled_pair_reference_values() {
    use crate::prelude::*;

    let cint_data = init_hf_stretched();
    assert_eq!(cint_data.nao(), 68);
    let rhf_results = rhf::minimal_rhf(&cint_data);
    assert_eq!(rhf_results.nocc, 5);

    let info = IEPAInfo::from_rhf(&rhf_results, cint_data, None);
    let config = IEPAConfig::default()
        .updated(|flags| {
            flags.integral_scheme = "conv".into();
            flags.iepa_schemes = ["MP2", "MP2cr", "MP2cr2"].into();
        })
        .unwrap();
    let res = riepa::kernel_riepa(&info, config).unwrap();
    println!("{}", serde_json::to_string_pretty(&res).unwrap());

    let known = [
        ("eng_corr_MP2", -0.3523338),
        ("eng_corr_MP2CR", -0.3362996),
        ("eng_corr_MP2CR2", -0.3250326),
        ("eng_corr_MP2CR3", -0.3443167),
        ("eng_corr_MP2CR4", -0.3386832),
    ];
    assert_eq!(res.len(), known.len());
    for (key, e_known) in known {
        assert!((res[key] - e_known).abs() < 1e-5, "{key}: {} vs {e_known}", res[key]);
    }
}
