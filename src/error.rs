use crate::config::IntegralScheme;
use crate::results::IEPAResults;
use crate::scheme::IEPAScheme;
use thiserror::Error;

/// Errors raised while building or resolving an IEPA configuration.
///
/// All of these are detected before any pair work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Scheme token outside of the IEPA family.
    #[error("unsupported IEPA scheme '{0}' (supported: MP2, IEPA, sIEPA, DCPT2, MP2cr, MP2cr2)")]
    UnknownScheme(String),

    #[error("unsupported integral scheme '{0}' (supported: conv, ri)")]
    UnknownIntegralScheme(String),

    #[error("no IEPA scheme requested")]
    EmptySchemes,

    #[error("screening parameter list is empty")]
    EmptyOmegaList,

    #[error("screening parameter must be finite, got {0}")]
    NonFiniteOmega(f64),

    #[error("pair energy tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("maximum pair iteration count must be at least 1")]
    InvalidMaxCycle,

    /// Orbital data whose shapes do not describe one closed-shell reference.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Neither the requested integral representation nor a usable fallback is available.
    #[error("integrals for {requested} scheme are not available (no tensor given and no basis data to build it)")]
    MissingIntegrals { requested: IntegralScheme },
}

/// Top-level error of an IEPA run.
#[derive(Error, Debug)]
pub enum IEPAError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An iterative pair equation exceeded its iteration cap.
    ///
    /// `completed` holds every (scheme, omega) entry evaluated before the failure.
    #[error(
        "{scheme} pair ({i}, {j}) at omega = {omega} not converged after {max_cycle} iterations (last change {delta:.3e})"
    )]
    NotConverged {
        scheme: IEPAScheme,
        omega: f64,
        i: usize,
        j: usize,
        max_cycle: usize,
        delta: f64,
        completed: Box<IEPAResults>,
    },
}

impl IEPAError {
    pub fn is_config_error(&self) -> bool {
        matches!(self, IEPAError::Config(_))
    }
}
