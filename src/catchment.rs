//! Static physical description of the catchment.
//!
//! Loaded once from a TOML file and immutable for the lifetime of a run.
//! The 11 elevation breakpoints (minimum, 10th..90th percentile, maximum)
//! define the 10 snow-response bands of the model.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read catchment config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catchment config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchmentParameters {
    /// Catchment area (km^2).
    pub catchment_area: f64,
    /// Length of one simulation timestep (s). Commonly 86400 (one day).
    pub seconds_per_timestep: f64,
    /// Elevation of the weather observations (masl).
    pub h_obs: i64,

    /// Lowest elevation in catchment (masl).
    pub h_min: i64,
    /// 10-percentile elevation in catchment (masl).
    pub h_10: i64,
    pub h_20: i64,
    pub h_30: i64,
    pub h_40: i64,
    pub h_50: i64,
    pub h_60: i64,
    pub h_70: i64,
    pub h_80: i64,
    /// 90-percentile elevation in catchment (masl).
    pub h_90: i64,
    /// Highest elevation in catchment (masl).
    pub h_max: i64,

    /// Precipitation gradient per 100 m of elevation.
    pub p_grad: f64,
    /// Temperature gradient per 100 m of elevation when not raining (C).
    pub t_dry_grad: f64,
    /// Temperature gradient per 100 m of elevation when raining (C).
    pub t_wet_grad: f64,

    /// Percent of the catchment covered by lakes.
    pub lake_percentage: f64,
}

impl CatchmentParameters {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// The 11 elevation breakpoints, lowest first.
    pub fn elevation_breakpoints(&self) -> [i64; 11] {
        [
            self.h_min, self.h_10, self.h_20, self.h_30, self.h_40, self.h_50, self.h_60,
            self.h_70, self.h_80, self.h_90, self.h_max,
        ]
    }

    /// Mean elevation of each of the 10 snow bands, one per pair of
    /// consecutive breakpoints.
    pub fn snow_band_elevations(&self) -> Vec<f64> {
        let h = self.elevation_breakpoints();
        h.windows(2).map(|w| (w[0] + w[1]) as f64 / 2.0).collect()
    }

    /// Example catchment (Hagabru). Used by tests.
    pub fn example() -> Self {
        Self {
            catchment_area: 3059.5,
            seconds_per_timestep: 86400.0,
            h_obs: 738,
            h_min: 57,
            h_10: 445,
            h_20: 539,
            h_30: 601,
            h_40: 666,
            h_50: 739,
            h_60: 815,
            h_70: 880,
            h_80: 947,
            h_90: 1020,
            h_max: 1325,
            p_grad: 0.05,
            t_dry_grad: -1.0,
            t_wet_grad: -0.6,
            lake_percentage: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_bands_from_eleven_breakpoints() {
        let cp = CatchmentParameters::example();
        let bands = cp.snow_band_elevations();
        assert_eq!(bands.len(), 10);
        assert_eq!(bands[0], (57.0 + 445.0) / 2.0);
        assert_eq!(bands[9], (1020.0 + 1325.0) / 2.0);
    }

    #[test]
    fn band_elevations_non_decreasing() {
        let cp = CatchmentParameters::example();
        let bands = cp.snow_band_elevations();
        for pair in bands.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn parses_toml_document() {
        let doc = r#"
            catchment_area = 3059.5
            seconds_per_timestep = 86400.0
            h_obs = 738
            h_min = 57
            h_10 = 445
            h_20 = 539
            h_30 = 601
            h_40 = 666
            h_50 = 739
            h_60 = 815
            h_70 = 880
            h_80 = 947
            h_90 = 1020
            h_max = 1325
            p_grad = 0.05
            t_dry_grad = -1.0
            t_wet_grad = -0.6
            lake_percentage = 0.0
        "#;
        let cp: CatchmentParameters = toml::from_str(doc).unwrap();
        assert_eq!(cp.catchment_area, 3059.5);
        assert_eq!(cp.h_max, 1325);
        assert_eq!(cp.t_wet_grad, -0.6);
    }

    #[test]
    fn rejects_incomplete_document() {
        let doc = "catchment_area = 3059.5";
        assert!(toml::from_str::<CatchmentParameters>(doc).is_err());
    }
}
