//! The 16 calibratable HBV coefficients.
//!
//! The vector order below is a contract between the model and the simplex
//! searcher and must never be reordered.

use std::fmt;

use thiserror::Error;

use crate::vector::ParamVector;

pub const N_PARAMS: usize = 16;

pub const PARAM_NAMES: [&str; N_PARAMS] = [
    "p_corr", "s_corr", "cx", "cfr", "cpro", "tx", "ts", "fc", "et", "beta", "epot", "kuz1",
    "kuz0", "uz1", "perc", "klz",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("expected {N_PARAMS} parameters, got {found}")]
    WrongLength { found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParameters {
    /// Precipitation correction, rain.
    pub p_corr: f64,
    /// Precipitation correction, snow.
    pub s_corr: f64,

    /// Melt constant (mm/C).
    pub cx: f64,
    /// Freeze constant (mm/C).
    pub cfr: f64,
    /// Max ratio of free water content to snow depth.
    pub cpro: f64,
    /// Snow/rain threshold (C).
    pub tx: f64,
    /// Melt/refreeze threshold (C).
    pub ts: f64,

    /// Field capacity (mm).
    pub fc: f64,
    /// Full evaporation threshold (mm).
    pub et: f64,
    /// Infiltration coefficient.
    pub beta: f64,
    /// Evaporation potential (mm/timestep).
    pub epot: f64,

    /// Quick discharge rate (1/timestep).
    pub kuz1: f64,
    /// Slow discharge rate (1/timestep).
    pub kuz0: f64,
    /// Quick discharge level (mm).
    pub uz1: f64,
    /// Percolation (mm/timestep), clamped per step to available storage.
    pub perc: f64,

    /// Lower zone discharge rate (1/timestep).
    pub klz: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            p_corr: 1.05,
            s_corr: 1.15,
            cx: 5.0,
            cfr: 3.0,
            cpro: 0.04,
            tx: 0.5,
            ts: 0.5,
            fc: 40.0,
            et: 2.0,
            beta: 1.5,
            epot: 4.0,
            kuz1: 1.0,
            kuz0: 0.1,
            uz1: 10.0,
            perc: 1.5,
            klz: 1.0,
        }
    }
}

impl ModelParameters {
    pub fn as_array(&self) -> [f64; N_PARAMS] {
        [
            self.p_corr,
            self.s_corr,
            self.cx,
            self.cfr,
            self.cpro,
            self.tx,
            self.ts,
            self.fc,
            self.et,
            self.beta,
            self.epot,
            self.kuz1,
            self.kuz0,
            self.uz1,
            self.perc,
            self.klz,
        ]
    }

    pub fn as_vector(&self) -> ParamVector {
        ParamVector::new(self.as_array().to_vec())
    }

    /// Overwrite every coefficient from a length-16 slice in wire order.
    pub fn set_from_slice(&mut self, values: &[f64]) -> Result<(), ParamError> {
        if values.len() != N_PARAMS {
            return Err(ParamError::WrongLength {
                found: values.len(),
            });
        }
        self.p_corr = values[0];
        self.s_corr = values[1];
        self.cx = values[2];
        self.cfr = values[3];
        self.cpro = values[4];
        self.tx = values[5];
        self.ts = values[6];
        self.fc = values[7];
        self.et = values[8];
        self.beta = values[9];
        self.epot = values[10];
        self.kuz1 = values[11];
        self.kuz0 = values[12];
        self.uz1 = values[13];
        self.perc = values[14];
        self.klz = values[15];
        Ok(())
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, ParamError> {
        let mut params = Self::default();
        params.set_from_slice(values)?;
        Ok(params)
    }
}

impl fmt::Display for ModelParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MODEL PARAMETERS:")?;
        writeln!(f)?;
        for (name, value) in PARAM_NAMES.iter().zip(self.as_array()) {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}
