//! Driver of IEPA-family correlation energies (restricted, closed-shell).
//!
//! The run is a two-phase pipeline: all MP2 pairs and their norms are evaluated first when a
//! coupled-pair scheme (MP2cr, MP2cr2) is requested, then every requested scheme is evaluated
//! for every screening parameter and reduced to a correlation energy. Plain MP2 alone stays on
//! the pair-local path.

use crate::aggregate;
use crate::integral::{self, PairIntegrals};
use crate::pair::{self, PairNotConverged};
use crate::prelude::*;
use crate::scheme::PairRule;

#[derive(Debug, Default)]
pub struct RIEPAIntermediates {
    /// Conventional `(ia|jb)`, `[nocc, nocc, nvir, nvir]`.
    pub g_oovv: Option<Tsr>,
    /// Density-fitted `B_ia^P`, `[nocc, nvir, naux]`.
    pub b_ov: Option<Tsr>,
    pub mp2_conv: Option<MP2PairData>,
    pub mp2_ri: Option<MP2PairData>,
}

/// MP2 correlation energies from both integral representations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegralDiscrepancy {
    pub e_conv: f64,
    pub e_ri: f64,
    pub tol: f64,
}

impl IntegralDiscrepancy {
    pub fn diff(&self) -> f64 {
        (self.e_ri - self.e_conv).abs()
    }

    pub fn exceeds_tol(&self) -> bool {
        self.diff() > self.tol
    }
}

/// IEPA driver bound to one reference state.
///
/// Transformed integrals and MP2 pair data are memoized per integral scheme for the lifetime
/// of the driver; configuration updates never invalidate them since they only depend on the
/// reference.
pub struct RIEPA<'a> {
    pub info: &'a IEPAInfo,
    config: IEPAConfig,
    intermediates: RIEPAIntermediates,
}

impl<'a> RIEPA<'a> {
    pub fn new(info: &'a IEPAInfo, config: IEPAConfig) -> Self {
        Self { info, config, intermediates: RIEPAIntermediates::default() }
    }

    pub fn config(&self) -> &IEPAConfig {
        &self.config
    }

    /// Rebuild the configuration from updated flags; the current one is kept if validation fails.
    pub fn update_flags(&mut self, update: impl FnOnce(&mut IEPAFlags)) -> Result<(), ConfigError> {
        self.config = self.config.updated(update)?;
        Ok(())
    }

    pub fn intermediates(&self) -> &RIEPAIntermediates {
        &self.intermediates
    }

    pub fn conv_available(&self) -> bool {
        self.intermediates.g_oovv.is_some() || self.info.int2e.is_some() || self.info.cint_data.is_some()
    }

    pub fn ri_available(&self) -> bool {
        self.intermediates.b_ov.is_some()
            || self.info.cderi.is_some()
            || (self.info.cint_data.is_some() && self.info.aux_cint_data.is_some())
    }

    /// Integral scheme actually used for the requested one.
    ///
    /// Density fitting falls back to conventional integrals when no fitted integrals can be had.
    pub fn resolve_integral_scheme(&self, requested: IntegralScheme) -> Result<IntegralScheme, ConfigError> {
        match requested {
            IntegralScheme::Conventional if self.conv_available() => Ok(IntegralScheme::Conventional),
            IntegralScheme::DensityFitted if self.ri_available() => Ok(IntegralScheme::DensityFitted),
            IntegralScheme::DensityFitted if self.conv_available() => {
                tracing::warn!("density-fitted integrals not available, falling back to conventional integrals");
                Ok(IntegralScheme::Conventional)
            },
            _ => Err(ConfigError::MissingIntegrals { requested }),
        }
    }

    fn prepare_integrals(&mut self, scheme: IntegralScheme) -> Result<(), ConfigError> {
        let info = self.info;
        let missing = ConfigError::MissingIntegrals { requested: scheme };
        match scheme {
            IntegralScheme::Conventional => {
                if self.intermediates.g_oovv.is_some() {
                    return Ok(());
                }
                let g_oovv = match (&info.int2e, &info.cint_data) {
                    (Some(int2e), _) => integral::get_g_oovv_conv(int2e, &info.mo_coeff, info.nocc),
                    (None, Some(cint_data)) => {
                        let int2e = util::intor_row_major(cint_data, "int2e");
                        integral::get_g_oovv_conv(&int2e, &info.mo_coeff, info.nocc)
                    },
                    (None, None) => return Err(missing),
                };
                self.intermediates.g_oovv = Some(g_oovv);
            },
            IntegralScheme::DensityFitted => {
                if self.intermediates.b_ov.is_some() {
                    return Ok(());
                }
                let b_ov = match (&info.cderi, &info.cint_data, &info.aux_cint_data) {
                    (Some(cderi), _, _) => integral::get_b_ov_ri(cderi, &info.mo_coeff, info.nocc),
                    (None, Some(cint_data), Some(aux_cint_data)) => {
                        let cderi = util::get_cderi_ao(cint_data, aux_cint_data);
                        integral::get_b_ov_ri(&cderi, &info.mo_coeff, info.nocc)
                    },
                    _ => return Err(missing),
                };
                self.intermediates.b_ov = Some(b_ov);
            },
        }
        Ok(())
    }

    fn pair_integrals(&self, scheme: IntegralScheme) -> Result<PairIntegrals<'_>, ConfigError> {
        let missing = ConfigError::MissingIntegrals { requested: scheme };
        match scheme {
            IntegralScheme::Conventional => {
                self.intermediates.g_oovv.as_ref().map(PairIntegrals::Conventional).ok_or(missing)
            },
            IntegralScheme::DensityFitted => {
                self.intermediates.b_ov.as_ref().map(PairIntegrals::DensityFitted).ok_or(missing)
            },
        }
    }

    fn mp2_pair_data(&self, scheme: IntegralScheme) -> Option<&MP2PairData> {
        match scheme {
            IntegralScheme::Conventional => self.intermediates.mp2_conv.as_ref(),
            IntegralScheme::DensityFitted => self.intermediates.mp2_ri.as_ref(),
        }
    }

    /// Phase 1: MP2 energies and amplitude norms of all pairs.
    fn prepare_mp2_pair_data(&mut self, scheme: IntegralScheme) -> Result<(), ConfigError> {
        if self.mp2_pair_data(scheme).is_some() {
            return Ok(());
        }
        self.prepare_integrals(scheme)?;

        let time = std::time::Instant::now();
        let mp2 = get_mp2_pair_data(self.pair_integrals(scheme)?, self.info);
        tracing::debug!("time elapsed (mp2 pairs, {scheme}): {:.3?}", time.elapsed());

        match scheme {
            IntegralScheme::Conventional => self.intermediates.mp2_conv = Some(mp2),
            IntegralScheme::DensityFitted => self.intermediates.mp2_ri = Some(mp2),
        }
        Ok(())
    }

    /// Evaluate every requested scheme at every screening parameter.
    ///
    /// Schemes are evaluated in request order. The first non-converged (scheme, omega) aborts the run;
    /// energies finished before it are returned inside the error.
    pub fn run(&mut self) -> Result<IEPAResults, IEPAError> {
        let time_outer = std::time::Instant::now();

        self.info.check_reference()?;
        let integral_scheme = self.resolve_integral_scheme(self.config.integral_scheme())?;
        self.prepare_integrals(integral_scheme)?;
        if self.config.requires_mp2_pass() {
            self.prepare_mp2_pair_data(integral_scheme)?;
        }

        let this = &*self;
        let config = &this.config;
        let integrals = this.pair_integrals(integral_scheme)?;
        let mp2 = this.mp2_pair_data(integral_scheme);
        let e_mp2 = mp2.map(aggregate::get_mp2_energy);

        let mut results = IEPAResults::default();
        for &scheme in config.schemes() {
            let mut e_omega_free: Option<f64> = None;
            for &omega in config.omega_list() {
                let e_corr = match e_omega_free {
                    Some(e_corr) => e_corr,
                    None => {
                        let time = std::time::Instant::now();
                        let e_corr = match (scheme.pair_rule(omega), mp2) {
                            (PairRule::MP2, Some(mp2)) => aggregate::get_mp2_energy(mp2),
                            (PairRule::CoupledPair(norm), Some(mp2)) => {
                                aggregate::aggregate_pairs(&aggregate::get_coupled_pairs(mp2, norm))
                            },
                            (rule, _) => match get_pair_local_energies(integrals, this.info, rule, config) {
                                Ok(pairs) => aggregate::aggregate_pairs(&pairs),
                                Err(((i, j), err)) => {
                                    tracing::error!("{scheme} pair ({i}, {j}) not converged at omega = {omega}");
                                    return Err(IEPAError::NotConverged {
                                        scheme,
                                        omega,
                                        i,
                                        j,
                                        max_cycle: err.niter,
                                        delta: err.delta,
                                        completed: Box::new(results),
                                    });
                                },
                            },
                        };
                        tracing::debug!("time elapsed ({scheme}, omega = {omega}): {:.3?}", time.elapsed());
                        e_corr
                    },
                };
                if !scheme.depends_on_omega() {
                    e_omega_free = Some(e_corr);
                }

                tracing::info!("{scheme} correlation energy (omega = {omega}): {e_corr:.12}");
                results.insert(scheme.token(), omega, e_corr);
                if let (Some(token), Some(e_mp2)) = (scheme.averaged_token(), e_mp2) {
                    results.insert(token, omega, aggregate::get_averaged_energy(e_mp2, e_corr));
                }
            }
        }

        tracing::debug!("time elapsed (IEPA total, {integral_scheme}): {:.3?}", time_outer.elapsed());
        Ok(results)
    }

    /// Compare MP2 correlation energies of density-fitted and conventional integrals.
    ///
    /// Both representations must be obtainable. A difference above `tol_ri_discrepancy` is only warned.
    pub fn check_integral_discrepancy(&mut self) -> Result<IntegralDiscrepancy, ConfigError> {
        self.info.check_reference()?;
        if !self.conv_available() {
            return Err(ConfigError::MissingIntegrals { requested: IntegralScheme::Conventional });
        }
        if !self.ri_available() {
            return Err(ConfigError::MissingIntegrals { requested: IntegralScheme::DensityFitted });
        }
        self.prepare_mp2_pair_data(IntegralScheme::Conventional)?;
        self.prepare_mp2_pair_data(IntegralScheme::DensityFitted)?;

        let energy_of = |scheme| self.mp2_pair_data(scheme).map(aggregate::get_mp2_energy);
        let (Some(e_conv), Some(e_ri)) = (energy_of(IntegralScheme::Conventional), energy_of(IntegralScheme::DensityFitted))
        else {
            return Err(ConfigError::MissingIntegrals { requested: IntegralScheme::DensityFitted });
        };

        let discrepancy = IntegralDiscrepancy { e_conv, e_ri, tol: self.config.tol_ri_discrepancy() };
        if discrepancy.exceeds_tol() {
            tracing::warn!(
                "density-fitted MP2 energy {e_ri:.10} differs from conventional {e_conv:.10} by {:.3e}",
                discrepancy.diff()
            );
        }
        Ok(discrepancy)
    }
}

/// MP2 energies and amplitude norms of every unordered occupied pair.
pub fn get_mp2_pair_data(integrals: PairIntegrals, info: &IEPAInfo) -> MP2PairData {
    let d_ov = info.d_ov();
    let pair_data = info
        .pairs()
        .into_par_iter()
        .map(|(i, j)| {
            let g_ab = integrals.get_g_ab(i, j);
            let d_ab = pair::get_d_ab(&d_ov, i, j);
            ((i, j), pair::get_pair_mp2_with_norm(&g_ab, &d_ab))
        })
        .collect::<Vec<_>>();
    aggregate::collect_mp2_pair_data(info.nocc, &pair_data)
}

/// Pair entries of a pair-local rule, evaluated in parallel over pairs.
///
/// On failure, the first non-converged pair in `(i, j)` order is reported.
pub fn get_pair_local_energies(
    integrals: PairIntegrals,
    info: &IEPAInfo,
    rule: PairRule,
    config: &IEPAConfig,
) -> Result<Vec<PairEnergy>, ((usize, usize), PairNotConverged)> {
    let d_ov = info.d_ov();
    let conv_tol = config.conv_tol();
    let max_cycle = config.max_cycle();
    let entries = info
        .pairs()
        .into_par_iter()
        .map(|(i, j)| {
            let g_ab = integrals.get_g_ab(i, j);
            let d_ab = pair::get_d_ab(&d_ov, i, j);
            pair::eval_pair(rule, (i, j), &g_ab, &d_ab, conv_tol, max_cycle).map_err(|err| ((i, j), err))
        })
        .collect::<Vec<_>>();

    let entries = entries.into_iter().collect::<Result<Vec<_>, _>>()?;
    let niter_max = entries
        .iter()
        .filter_map(|pair| match pair.status {
            PairStatus::Converged { niter } => Some(niter),
            PairStatus::ClosedForm => None,
        })
        .max();
    if let Some(niter_max) = niter_max {
        tracing::debug!("pair iterations converged within {niter_max} cycles");
    }
    Ok(entries)
}

/// Run all requested schemes once on a reference.
pub fn kernel_riepa(info: &IEPAInfo, config: IEPAConfig) -> Result<IEPAResults, IEPAError> {
    RIEPA::new(info, config).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integral::tests::{synthetic_cderi, synthetic_int2e, synthetic_mo_coeff};

    const NMO: usize = 6;
    const NOCC: usize = 2;

    fn synthetic_info(with_int2e: bool, with_cderi: bool) -> IEPAInfo {
        let device = DeviceTsr::default();
        let cderi = synthetic_cderi(NMO, 9);
        let mo_energy = rt::asarray((vec![-1.2, -0.8, 0.3, 0.6, 0.9, 1.4], &device));
        let mut info = IEPAInfo::new(synthetic_mo_coeff(NMO), mo_energy, NOCC);
        if with_int2e {
            info.int2e = Some(synthetic_int2e(&cderi));
        }
        if with_cderi {
            info.cderi = Some(cderi);
        }
        info
    }

    fn config_of(integral: &str, schemes: &[&str], omega_list: &[f64]) -> IEPAConfig {
        IEPAConfig::default()
            .updated(|flags| {
                flags.integral_scheme_iepa = Some(integral.to_string());
                flags.iepa_schemes = schemes.into();
                flags.omega_list_iepa = omega_list.to_vec();
            })
            .unwrap()
    }

    const ALL_SCHEMES: [&str; 6] = ["MP2", "MP2cr", "MP2cr2", "IEPA", "sIEPA", "DCPT2"];

    #[test]
    fn test_conv_and_ri_agree() {
        let info = synthetic_info(true, true);
        let omega_list = [0.0, 0.7];
        let res_conv = kernel_riepa(&info, config_of("conv", &ALL_SCHEMES, &omega_list)).unwrap();
        let res_ri = kernel_riepa(&info, config_of("ri", &ALL_SCHEMES, &omega_list)).unwrap();

        // six schemes plus MP2CR3 and MP2CR4, at both omega
        assert_eq!(res_conv.len(), 16);
        assert_eq!(res_conv.keys().collect_vec(), res_ri.keys().collect_vec());
        for (key, e_conv) in res_conv.iter() {
            assert!((e_conv - res_ri[key]).abs() < 1e-10, "{key}: {e_conv} vs {}", res_ri[key]);
        }
    }

    #[test]
    fn test_scheme_relations() {
        let info = synthetic_info(false, true);
        let res = kernel_riepa(&info, config_of("ri", &ALL_SCHEMES, &[0.0, 0.7, -0.7])).unwrap();
        let e = |token: &str, omega: f64| res.get_scheme(token, omega).unwrap();

        let e_mp2 = e("MP2", 0.0);
        assert!(e_mp2 < 0.0);
        assert!(e_mp2 < e("MP2CR", 0.0) && e("MP2CR", 0.0) < 0.0);
        assert!(e_mp2 < e("MP2CR2", 0.0) && e("MP2CR2", 0.0) < 0.0);
        assert!(e_mp2 < e("IEPA", 0.0) && e("IEPA", 0.0) < 0.0);
        assert!(e_mp2 < e("DCPT2", 0.0) && e("DCPT2", 0.0) < 0.0);

        for omega in [0.0, 0.7, -0.7] {
            assert!((e("MP2CR3", omega) - 0.5 * (e("MP2", omega) + e("MP2CR", omega))).abs() < 1e-14);
            assert!((e("MP2CR4", omega) - 0.5 * (e("MP2", omega) + e("MP2CR2", omega))).abs() < 1e-14);
            // omega only screens sIEPA and DCPT2
            for token in ["MP2", "MP2CR", "MP2CR2", "IEPA"] {
                assert_eq!(e(token, omega), e(token, 0.0));
            }
        }

        // no screening at omega = 0
        assert_eq!(e("SIEPA", 0.0), e("IEPA", 0.0));
        // shift scale exp(-omega) interpolates between IEPA and MP2
        assert!(e("IEPA", 0.0) > e("SIEPA", 0.7) && e("SIEPA", 0.7) > e_mp2);
        assert!(e("SIEPA", -0.7) > e("IEPA", 0.0));
        assert!(e("DCPT2", 0.7) < e("DCPT2", 0.0) && e("DCPT2", 0.7) > e_mp2);
    }

    #[test]
    fn test_not_converged_keeps_completed_entries() {
        let info = synthetic_info(true, false);
        let config = config_of("conv", &["MP2", "IEPA", "DCPT2"], &[0.0]).updated(|flags| flags.max_cycle_pair_iepa = 1).unwrap();
        let err = kernel_riepa(&info, config).unwrap_err();
        assert!(!err.is_config_error());
        match err {
            IEPAError::NotConverged { scheme, omega, i, j, max_cycle, completed, .. } => {
                assert_eq!(scheme, IEPAScheme::IEPA);
                assert_eq!(omega, 0.0);
                assert_eq!((i, j), (0, 0));
                assert_eq!(max_cycle, 1);
                assert_eq!(completed.keys().collect_vec(), vec!["eng_corr_MP2"]);
            },
            _ => panic!("expected non-convergence, got {err:?}"),
        }
    }

    #[test]
    fn test_missing_integrals_and_fallback() {
        let info = synthetic_info(false, false);
        let err = kernel_riepa(&info, config_of("ri", &["MP2"], &[0.0])).unwrap_err();
        assert!(matches!(
            err,
            IEPAError::Config(ConfigError::MissingIntegrals { requested: IntegralScheme::DensityFitted })
        ));
        let err = kernel_riepa(&info, config_of("conv", &["MP2"], &[0.0])).unwrap_err();
        assert!(matches!(err, IEPAError::Config(ConfigError::MissingIntegrals { requested: IntegralScheme::Conventional })));

        // density fitting requested, only conventional integrals given
        let info = synthetic_info(true, false);
        let riepa = RIEPA::new(&info, IEPAConfig::default());
        assert_eq!(riepa.resolve_integral_scheme(IntegralScheme::DensityFitted), Ok(IntegralScheme::Conventional));
        let res_fallback = kernel_riepa(&info, config_of("ri", &["MP2", "IEPA"], &[0.0])).unwrap();
        let res_conv = kernel_riepa(&info, config_of("conv", &["MP2", "IEPA"], &[0.0])).unwrap();
        assert_eq!(res_fallback, res_conv);

        // conventional requested, only fitted integrals given: no fallback
        let info = synthetic_info(false, true);
        let mut riepa = RIEPA::new(&info, config_of("conv", &["MP2"], &[0.0]));
        assert!(riepa.run().unwrap_err().is_config_error());
        assert!(riepa.check_integral_discrepancy().is_err());
    }

    #[test]
    fn test_invalid_reference_is_rejected() {
        let device = DeviceTsr::default();

        // more occupied orbitals than molecular orbitals
        let mut info = synthetic_info(true, true);
        info.nocc = NMO + 1;
        let err = kernel_riepa(&info, config_of("conv", &ALL_SCHEMES, &[0.0])).unwrap_err();
        assert!(matches!(err, IEPAError::Config(ConfigError::InvalidReference(_))));
        let mut riepa = RIEPA::new(&info, IEPAConfig::default());
        assert!(matches!(riepa.check_integral_discrepancy(), Err(ConfigError::InvalidReference(_))));

        // orbital energies not matching the coefficients
        let mut info = synthetic_info(false, true);
        info.mo_energy = rt::asarray((vec![-1.2, -0.8, 0.3, 0.6], &device));
        let err = kernel_riepa(&info, config_of("ri", &["MP2"], &[0.0])).unwrap_err();
        assert!(err.is_config_error());

        // integrals of another basis size
        let mut info = synthetic_info(false, false);
        info.int2e = Some(rt::zeros(([NMO + 1; 4], &device)));
        let err = kernel_riepa(&info, config_of("conv", &["MP2"], &[0.0])).unwrap_err();
        assert!(matches!(err, IEPAError::Config(ConfigError::InvalidReference(_))));
    }

    #[test]
    fn test_mp2_pass_only_for_coupled_pairs() {
        let info = synthetic_info(true, false);
        let mut riepa = RIEPA::new(&info, config_of("conv", &["MP2", "IEPA"], &[0.0]));
        let res_local = riepa.run().unwrap();
        assert!(riepa.intermediates().mp2_conv.is_none());

        riepa.update_flags(|flags| flags.iepa_schemes = ["MP2", "MP2cr2"].into()).unwrap();
        let res_coupled = riepa.run().unwrap();
        assert!(riepa.intermediates().mp2_conv.is_some());
        assert!((res_local["eng_corr_MP2"] - res_coupled["eng_corr_MP2"]).abs() < 1e-14);
    }

    #[test]
    fn test_close_omega_values_keep_all_entries() {
        let info = synthetic_info(false, true);
        let omega_list = [0.7, 0.7000000001, 1e-9, 0.0];
        let config = config_of("ri", &["sIEPA", "DCPT2"], &omega_list);
        let res = kernel_riepa(&info, config.clone()).unwrap();
        assert_eq!(config.omega_list().len(), 3);
        assert_eq!(res.len(), config.schemes().len() * config.omega_list().len());
    }

    #[test]
    fn test_rerun_and_update() {
        let info = synthetic_info(true, true);
        let mut riepa = RIEPA::new(&info, config_of("ri", &ALL_SCHEMES, &[0.0, 0.7]));
        let res_first = riepa.run().unwrap();
        let res_second = riepa.run().unwrap();
        assert_eq!(res_first, res_second);

        // rejected update keeps the previous configuration
        let config = riepa.config().clone();
        assert_eq!(
            riepa.update_flags(|flags| flags.iepa_schemes = ["MP2", "RPA"].into()),
            Err(ConfigError::UnknownScheme("RPA".into()))
        );
        assert_eq!(riepa.config(), &config);

        // cached intermediates survive a configuration change
        riepa.update_flags(|flags| flags.iepa_schemes = "MP2cr".into()).unwrap();
        let res_cr = riepa.run().unwrap();
        assert_eq!(res_cr.keys().collect_vec(), vec![
            "eng_corr_MP2CR",
            "eng_corr_MP2CR3",
            "eng_corr_MP2CR3_omega(0.700000)",
            "eng_corr_MP2CR_omega(0.700000)"
        ]);
        assert_eq!(res_cr["eng_corr_MP2CR"], res_first["eng_corr_MP2CR"]);
        assert_eq!(res_cr["eng_corr_MP2CR3"], res_first["eng_corr_MP2CR3"]);
    }

    #[test]
    fn test_integral_discrepancy() {
        let info = synthetic_info(true, true);
        let mut riepa = RIEPA::new(&info, IEPAConfig::default());
        let discrepancy = riepa.check_integral_discrepancy().unwrap();
        assert!(discrepancy.diff() < 1e-10);
        assert!(!discrepancy.exceeds_tol());
        assert!(riepa.intermediates().mp2_conv.is_some() && riepa.intermediates().mp2_ri.is_some());
    }
}
