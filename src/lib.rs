//! Calibration of an HBV-style conceptual rainfall-runoff model.
//!
//! The model maps precipitation and temperature to streamflow through a
//! cascade of storage tanks (10 elevation-banded snow tanks, soil moisture,
//! upper zone, lower zone). A Nelder-Mead simplex searcher fits the 16
//! model coefficients against observed discharge by minimizing a composite
//! goodness-of-fit cost.

pub mod calibrate;
pub mod catchment;
pub mod dataset;
pub mod hbv;
pub mod metrics;
pub mod simplex;
pub mod vector;
