//! Closed set of IEPA-family schemes and their pair-update rules.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IEPAScheme {
    /// Second-order pair energies; baseline of every other scheme.
    MP2,
    /// Self-consistently shifted pair denominators.
    IEPA,
    /// IEPA with the denominator shift scaled by the screening factor.
    SIEPA,
    /// Degeneracy-corrected second order, closed form.
    DCPT2,
    /// MP2 pairs renormalized by averaged orbital amplitude norms.
    MP2CR,
    /// MP2 pairs renormalized by the norm of all coupled pairs.
    MP2CR2,
}

/// How a single pair energy is obtained for a scheme at a given screening parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairRule {
    /// Closed-form second-order pair energy.
    MP2,
    /// Fixed-point iteration `e = sum g (2g - g^T) / (D + scale * e)`.
    ShiftedDenominator { scale: f64 },
    /// Closed-form `- 2 g (2g - g^T) / (|D| + sqrt(D^2 + 4 scale g^2))`.
    DegeneracyCorrected { scale: f64 },
    /// MP2 pair energy divided by a coefficient that depends on all MP2 pairs.
    CoupledPair(CouplingNorm),
}

/// Normalization used for the coupled-pair coefficient of pair (i, j).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingNorm {
    /// `1 + (N_i + N_j) / 2`
    OrbitalAverage,
    /// `1 + N_i + N_j - n_ij`
    CoupledPairs,
}

/// Screening factor applied to the correction terms; `omega = 0` gives unity.
pub fn screening_factor(omega: f64) -> f64 {
    (-omega).exp()
}

impl IEPAScheme {
    pub const ALL: [IEPAScheme; 6] = [
        IEPAScheme::MP2,
        IEPAScheme::IEPA,
        IEPAScheme::SIEPA,
        IEPAScheme::DCPT2,
        IEPAScheme::MP2CR,
        IEPAScheme::MP2CR2,
    ];

    /// Upper-case token used in result keys.
    pub fn token(&self) -> &'static str {
        match self {
            IEPAScheme::MP2 => "MP2",
            IEPAScheme::IEPA => "IEPA",
            IEPAScheme::SIEPA => "SIEPA",
            IEPAScheme::DCPT2 => "DCPT2",
            IEPAScheme::MP2CR => "MP2CR",
            IEPAScheme::MP2CR2 => "MP2CR2",
        }
    }

    /// Whether the scheme needs every MP2 pair before any of its own pairs can be formed.
    pub fn requires_mp2_pass(&self) -> bool {
        matches!(self, IEPAScheme::MP2CR | IEPAScheme::MP2CR2)
    }

    pub fn depends_on_omega(&self) -> bool {
        matches!(self, IEPAScheme::SIEPA | IEPAScheme::DCPT2)
    }

    pub fn pair_rule(&self, omega: f64) -> PairRule {
        match self {
            IEPAScheme::MP2 => PairRule::MP2,
            IEPAScheme::IEPA => PairRule::ShiftedDenominator { scale: 1.0 },
            IEPAScheme::SIEPA => PairRule::ShiftedDenominator { scale: screening_factor(omega) },
            IEPAScheme::DCPT2 => PairRule::DegeneracyCorrected { scale: screening_factor(omega) },
            IEPAScheme::MP2CR => PairRule::CoupledPair(CouplingNorm::OrbitalAverage),
            IEPAScheme::MP2CR2 => PairRule::CoupledPair(CouplingNorm::CoupledPairs),
        }
    }

    /// Token of the entry reported as `0.5 * (MP2 + self)`, if any.
    pub fn averaged_token(&self) -> Option<&'static str> {
        match self {
            IEPAScheme::MP2CR => Some("MP2CR3"),
            IEPAScheme::MP2CR2 => Some("MP2CR4"),
            _ => None,
        }
    }
}

impl fmt::Display for IEPAScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for IEPAScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_uppercase();
        IEPAScheme::ALL
            .into_iter()
            .find(|scheme| scheme.token() == token)
            .ok_or_else(|| ConfigError::UnknownScheme(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("MP2cr".parse::<IEPAScheme>().unwrap(), IEPAScheme::MP2CR);
        assert_eq!("sIEPA".parse::<IEPAScheme>().unwrap(), IEPAScheme::SIEPA);
        assert_eq!(" dcpt2 ".parse::<IEPAScheme>().unwrap(), IEPAScheme::DCPT2);
        assert_eq!("mp2cr2".parse::<IEPAScheme>().unwrap(), IEPAScheme::MP2CR2);
    }

    #[test]
    fn test_parse_rejects_other_methods() {
        for token in ["RPA", "CCSD", "MP3", "", "MP2cr3"] {
            let err = token.parse::<IEPAScheme>().unwrap_err();
            assert_eq!(err, ConfigError::UnknownScheme(token.to_string()));
        }
    }

    #[test]
    fn test_zero_omega_is_unscreened() {
        assert_eq!(IEPAScheme::SIEPA.pair_rule(0.0), IEPAScheme::IEPA.pair_rule(0.0));
        assert_eq!(IEPAScheme::DCPT2.pair_rule(0.0), PairRule::DegeneracyCorrected { scale: 1.0 });
        assert!(screening_factor(0.7) < 1.0);
        assert!(screening_factor(-0.7) > 1.0);
    }

    #[test]
    fn test_only_coupled_pair_schemes_need_mp2_pass() {
        let need: Vec<_> = IEPAScheme::ALL.into_iter().filter(|s| s.requires_mp2_pass()).collect();
        assert_eq!(need, vec![IEPAScheme::MP2CR, IEPAScheme::MP2CR2]);
    }
}
