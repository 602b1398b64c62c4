//! HBV -- a conceptual rainfall-runoff model as a cascade of storage tanks.
//!
//! 10 elevation-banded snow tanks feed a soil moisture tank, which routes
//! water through an upper and a lower zone tank to produce discharge.

pub mod model;
pub mod params;
pub mod tanks;
