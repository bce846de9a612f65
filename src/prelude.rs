#![allow(unused)]

/* #region for API callers */

pub use crate::config::{IEPAConfig, IEPAFlags, IntegralScheme};
pub use crate::error::{ConfigError, IEPAError};
pub use crate::results::IEPAResults;
pub use crate::riepa::{IntegralDiscrepancy, RIEPA};
pub use crate::scheme::IEPAScheme;
pub use crate::structs::{IEPAInfo, MP2PairData, PairEnergy, PairStatus, RHFResults};

/* #endregion */

/* #region for developers */

// RSTSR backend specification
#[cfg(not(feature = "use_openblas"))]
pub type DeviceTsr = DeviceFaer;
#[cfg(feature = "use_openblas")]
pub type DeviceTsr = DeviceOpenBLAS;

pub(crate) use libcint::prelude::*;
pub(crate) use itertools::Itertools;
pub(crate) use rayon::prelude::*;
pub(crate) use rstsr::prelude::*;

pub(crate) use crate::*;

pub type Tsr<D = IxD> = Tensor<f64, DeviceTsr, D>;
pub type TsrView<'a, D = IxD> = TensorView<'a, f64, DeviceTsr, D>;

/* #endregion */
