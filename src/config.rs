use crate::error::ConfigError;
use crate::scheme::IEPAScheme;
use crate::util::pad_omega;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Representation of the two-electron integrals used to form `(ia|jb)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegralScheme {
    Conventional,
    DensityFitted,
}

impl FromStr for IntegralScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conv" | "conventional" => Ok(IntegralScheme::Conventional),
            "ri" | "df" | "density-fitted" | "density_fitted" => Ok(IntegralScheme::DensityFitted),
            _ => Err(ConfigError::UnknownIntegralScheme(s.to_string())),
        }
    }
}

impl fmt::Display for IntegralScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegralScheme::Conventional => f.write_str("conventional"),
            IntegralScheme::DensityFitted => f.write_str("density-fitted"),
        }
    }
}

/// One token or a list of tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SchemeTokens {
    One(String),
    Many(Vec<String>),
}

impl SchemeTokens {
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            SchemeTokens::One(token) => vec![token.as_str()],
            SchemeTokens::Many(tokens) => tokens.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for SchemeTokens {
    fn from(token: &str) -> Self {
        SchemeTokens::One(token.to_string())
    }
}

impl<S: AsRef<str>> From<&[S]> for SchemeTokens {
    fn from(tokens: &[S]) -> Self {
        SchemeTokens::Many(tokens.iter().map(|t| t.as_ref().to_string()).collect())
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for SchemeTokens {
    fn from(tokens: [S; N]) -> Self {
        SchemeTokens::Many(tokens.iter().map(|t| t.as_ref().to_string()).collect())
    }
}

/// Raw, user-facing flags. Nothing here is validated until an [`IEPAConfig`] is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IEPAFlags {
    /// Integral scheme shared with other post-SCF methods. Default is `"ri"`.
    pub integral_scheme: String,

    /// Overrides `integral_scheme` for IEPA only.
    pub integral_scheme_iepa: Option<String>,

    /// Scheme token(s). Default is `"MP2"`.
    pub iepa_schemes: SchemeTokens,

    /// Screening parameters. Default is `[0.0]`.
    pub omega_list_iepa: Vec<f64>,

    /// Convergence threshold of pair energy for iterative schemes. Default is 1e-10.
    pub tol_eng_pair_iepa: f64,

    /// Maximum number of pair iterations for iterative schemes. Default is 64.
    pub max_cycle_pair_iepa: usize,

    /// Tolerated MP2 difference between density-fitted and conventional integrals. Default is 1e-3.
    pub tol_ri_discrepancy: f64,
}

impl Default for IEPAFlags {
    fn default() -> Self {
        Self {
            integral_scheme: "ri".to_string(),
            integral_scheme_iepa: None,
            iepa_schemes: SchemeTokens::One("MP2".to_string()),
            omega_list_iepa: vec![0.0],
            tol_eng_pair_iepa: 1.0e-10,
            max_cycle_pair_iepa: 64,
            tol_ri_discrepancy: 1.0e-3,
        }
    }
}

/// Validated, immutable configuration of an IEPA run.
///
/// Any change goes through [`IEPAConfig::updated`], which rebuilds and revalidates the whole record.
#[derive(Debug, Clone, PartialEq)]
pub struct IEPAConfig {
    flags: IEPAFlags,
    integral_scheme: IntegralScheme,
    schemes: Vec<IEPAScheme>,
    omega_list: Vec<f64>,
}

impl TryFrom<IEPAFlags> for IEPAConfig {
    type Error = ConfigError;

    fn try_from(flags: IEPAFlags) -> Result<Self, Self::Error> {
        let integral_token = flags.integral_scheme_iepa.as_deref().unwrap_or(&flags.integral_scheme);
        let integral_scheme = integral_token.parse::<IntegralScheme>()?;

        let mut schemes: Vec<IEPAScheme> = vec![];
        for token in flags.iepa_schemes.tokens() {
            let scheme = token.parse::<IEPAScheme>()?;
            if !schemes.contains(&scheme) {
                schemes.push(scheme);
            }
        }
        if schemes.is_empty() {
            return Err(ConfigError::EmptySchemes);
        }

        if flags.omega_list_iepa.is_empty() {
            return Err(ConfigError::EmptyOmegaList);
        }
        // omega values are told apart by their results key, the first one of a key is kept
        let mut omega_list: Vec<f64> = vec![];
        let mut omega_keys: HashSet<String> = HashSet::new();
        for &omega in &flags.omega_list_iepa {
            if !omega.is_finite() {
                return Err(ConfigError::NonFiniteOmega(omega));
            }
            if omega_keys.insert(pad_omega("", omega)) {
                omega_list.push(omega);
            } else if !omega_list.contains(&omega) {
                tracing::warn!("screening parameter {omega:e} shares its results key with an earlier one, skipped");
            }
        }

        let tol = flags.tol_eng_pair_iepa;
        if !(tol.is_finite() && tol > 0.0) {
            return Err(ConfigError::InvalidTolerance(tol));
        }
        let tol = flags.tol_ri_discrepancy;
        if !(tol.is_finite() && tol > 0.0) {
            return Err(ConfigError::InvalidTolerance(tol));
        }
        if flags.max_cycle_pair_iepa == 0 {
            return Err(ConfigError::InvalidMaxCycle);
        }

        Ok(Self { flags, integral_scheme, schemes, omega_list })
    }
}

impl Default for IEPAConfig {
    fn default() -> Self {
        let flags = IEPAFlags::default();
        let omega_list = flags.omega_list_iepa.clone();
        Self { flags, integral_scheme: IntegralScheme::DensityFitted, schemes: vec![IEPAScheme::MP2], omega_list }
    }
}

impl IEPAConfig {
    /// Build a new configuration from a modified copy of the current flags.
    pub fn updated(&self, update: impl FnOnce(&mut IEPAFlags)) -> Result<Self, ConfigError> {
        let mut flags = self.flags.clone();
        update(&mut flags);
        Self::try_from(flags)
    }

    pub fn integral_scheme(&self) -> IntegralScheme {
        self.integral_scheme
    }

    /// Requested schemes, in request order without duplicates.
    pub fn schemes(&self) -> &[IEPAScheme] {
        &self.schemes
    }

    pub fn omega_list(&self) -> &[f64] {
        &self.omega_list
    }

    pub fn conv_tol(&self) -> f64 {
        self.flags.tol_eng_pair_iepa
    }

    pub fn max_cycle(&self) -> usize {
        self.flags.max_cycle_pair_iepa
    }

    pub fn tol_ri_discrepancy(&self) -> f64 {
        self.flags.tol_ri_discrepancy
    }

    pub fn requires_mp2_pass(&self) -> bool {
        self.schemes.iter().any(|scheme| scheme.requires_mp2_pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_validate() {
        let config = IEPAConfig::try_from(IEPAFlags::default()).unwrap();
        assert_eq!(config, IEPAConfig::default());
        assert_eq!(config.integral_scheme(), IntegralScheme::DensityFitted);
        assert_eq!(config.schemes(), &[IEPAScheme::MP2]);
        assert_eq!(config.omega_list(), &[0.0]);
        assert_eq!(config.max_cycle(), 64);
    }

    #[test]
    fn test_method_override_of_integral_scheme() {
        let config = IEPAConfig::default()
            .updated(|flags| {
                flags.integral_scheme = "ri".into();
                flags.integral_scheme_iepa = Some("conv".into());
            })
            .unwrap();
        assert_eq!(config.integral_scheme(), IntegralScheme::Conventional);
    }

    #[test]
    fn test_scheme_list_dedup_and_order() {
        let config = IEPAConfig::default()
            .updated(|flags| flags.iepa_schemes = ["MP2cr", "mp2", "MP2CR", "sIEPA"].into())
            .unwrap();
        assert_eq!(config.schemes(), &[IEPAScheme::MP2CR, IEPAScheme::MP2, IEPAScheme::SIEPA]);
        assert!(config.requires_mp2_pass());
    }

    #[test]
    fn test_omega_dedup_by_results_key() {
        let config = IEPAConfig::default()
            .updated(|flags| flags.omega_list_iepa = vec![0.7, 0.7000000001, 1e-9, -0.0, 0.0, 0.7])
            .unwrap();
        assert_eq!(config.omega_list(), &[0.7, 1e-9, -0.0]);
        let keys = config.omega_list().iter().map(|&omega| pad_omega("SIEPA", omega)).collect::<HashSet<_>>();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_update_revalidates() {
        let config = IEPAConfig::default().updated(|flags| flags.iepa_schemes = "IEPA".into()).unwrap();
        let err = config.updated(|flags| flags.iepa_schemes = ["RPA"].into()).unwrap_err();
        assert_eq!(err, ConfigError::UnknownScheme("RPA".into()));
        // the previously validated record is untouched
        assert_eq!(config.schemes(), &[IEPAScheme::IEPA]);
    }

    #[test]
    fn test_invalid_flags() {
        let config = IEPAConfig::default();
        assert_eq!(
            config.updated(|flags| flags.integral_scheme = "cholesky".into()).unwrap_err(),
            ConfigError::UnknownIntegralScheme("cholesky".into())
        );
        assert_eq!(
            config.updated(|flags| flags.iepa_schemes = SchemeTokens::Many(vec![])).unwrap_err(),
            ConfigError::EmptySchemes
        );
        assert_eq!(config.updated(|flags| flags.omega_list_iepa = vec![]).unwrap_err(), ConfigError::EmptyOmegaList);
        assert!(matches!(
            config.updated(|flags| flags.omega_list_iepa = vec![0.0, f64::NAN]).unwrap_err(),
            ConfigError::NonFiniteOmega(_)
        ));
        assert_eq!(config.updated(|flags| flags.max_cycle_pair_iepa = 0).unwrap_err(), ConfigError::InvalidMaxCycle);
        assert_eq!(
            config.updated(|flags| flags.tol_eng_pair_iepa = -1.0).unwrap_err(),
            ConfigError::InvalidTolerance(-1.0)
        );
    }

    #[test]
    fn test_flags_from_json() {
        let flags: IEPAFlags = serde_json::from_str(
            r#"{
                "integral_scheme_iepa": "conv",
                "iepa_schemes": ["MP2", "MP2cr", "MP2cr2"],
                "omega_list_iepa": [0, 0.7, -0.7]
            }"#,
        )
        .unwrap();
        let config = IEPAConfig::try_from(flags).unwrap();
        assert_eq!(config.integral_scheme(), IntegralScheme::Conventional);
        assert_eq!(config.schemes().len(), 3);
        assert_eq!(config.omega_list(), &[0.0, 0.7, -0.7]);

        let flags: IEPAFlags = serde_json::from_str(r#"{ "iepa_schemes": "DCPT2" }"#).unwrap();
        assert_eq!(flags.iepa_schemes, SchemeTokens::One("DCPT2".into()));
        assert_eq!(flags.integral_scheme, "ri");
    }
}
