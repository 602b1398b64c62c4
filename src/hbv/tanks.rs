//! The four storage tanks of the cascade.
//!
//! Each tank is a plain value object owning only its scalar storage; the
//! model calls the tanks' step functions in strict order (snow bands ->
//! soil -> upper zone -> lower zone). Inputs and outputs are depths in
//! mm/timestep.

use crate::catchment::CatchmentParameters;
use crate::hbv::params::ModelParameters;

/// Snow storage for one elevation band.
#[derive(Debug, Clone, Copy)]
pub struct SnowTank {
    /// Mean elevation of the band (masl).
    pub band_elevation: f64,
    /// Snow depth water equivalent (mm).
    pub snow: f64,
    /// Free water in the snow pack (mm).
    pub free_water: f64,
}

impl SnowTank {
    pub fn new(band_elevation: f64) -> Self {
        Self {
            band_elevation,
            snow: 0.0,
            free_water: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.snow = 0.0;
        self.free_water = 0.0;
    }

    /// Advance one timestep with corrected catchment-level precipitation
    /// and observed temperature; returns the band's soil infiltration.
    ///
    /// Forcing is adjusted to the band elevation first: the wet temperature
    /// gradient applies when precipitation falls, the dry one otherwise,
    /// and precipitation scales with the precipitation gradient.
    pub fn step(
        &mut self,
        cp: &CatchmentParameters,
        mp: &ModelParameters,
        p_obs: f64,
        t_obs: f64,
    ) -> f64 {
        let dh = (self.band_elevation - cp.h_obs as f64) / 100.0;

        let is_raining = p_obs > 0.0;
        let t = if is_raining {
            t_obs + cp.t_wet_grad * dh
        } else {
            t_obs + cp.t_dry_grad * dh
        };
        let p = p_obs + p_obs * cp.p_grad * dh;

        let is_snow = t < mp.tx;
        if is_snow {
            self.snow += p;
        } else {
            self.free_water += p;
        }

        // Free water above the holding capacity of the pack infiltrates;
        // melt is bounded by snow and refreeze by free water.
        let insoil = (self.free_water - mp.cpro * self.snow).max(0.0);
        let melt = (mp.cx * (t - mp.ts)).max(0.0).min(self.snow);
        let refreeze = (mp.cfr * (mp.ts - t)).max(0.0).min(self.free_water);

        self.snow += refreeze - melt;
        self.free_water += melt - refreeze - insoil;

        insoil
    }
}

/// Soil moisture storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoilMoistureTank {
    /// Soil moisture (mm).
    pub storage: f64,
}

impl SoilMoistureTank {
    pub fn reset(&mut self) {
        self.storage = 0.0;
    }

    /// Advance one timestep with the averaged snow-band infiltration;
    /// returns `(to_upper_zone, soil_evaporation)`.
    pub fn step(&mut self, mp: &ModelParameters, insoil: f64) -> (f64, f64) {
        self.storage += insoil;

        // Power-law wetness routing, capped at available storage
        let to_upper_zone = ((self.storage / mp.fc).powf(mp.beta) * insoil).min(self.storage);

        let evap_ratio = (self.storage / mp.et).min(1.0);
        let evaporation = (evap_ratio * mp.epot).min(self.storage - to_upper_zone);

        self.storage -= to_upper_zone + evaporation;

        (to_upper_zone, evaporation)
    }
}

/// Upper groundwater zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpperZoneTank {
    /// Upper zone level (mm).
    pub storage: f64,
}

impl UpperZoneTank {
    pub fn reset(&mut self) {
        self.storage = 0.0;
    }

    /// Advance one timestep with the soil routing input; returns
    /// `(effective_percolation, quick_discharge, slow_discharge)`.
    ///
    /// Percolation is clamped per step to the storage remaining after both
    /// discharge components; the declared `perc` parameter is never
    /// modified, and the clamp carries no memory into later steps.
    pub fn step(&mut self, mp: &ModelParameters, duz: f64) -> (f64, f64, f64) {
        self.storage += duz;

        let quick = mp.kuz1 * (self.storage - mp.uz1).max(0.0);
        let slow = mp.kuz0 * self.storage.min(mp.uz1);
        self.storage -= quick + slow;

        let percolation = mp.perc.min(self.storage);
        self.storage -= percolation;

        (percolation, quick, slow)
    }
}

/// Lower groundwater zone, including the lake fraction of the catchment.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerZoneTank {
    /// Lower zone level (mm).
    pub storage: f64,
}

impl LowerZoneTank {
    pub fn reset(&mut self) {
        self.storage = 0.0;
    }

    /// Advance one timestep with corrected precipitation and upper-zone
    /// percolation; returns `(discharge, lake_evaporation)`.
    pub fn step(
        &mut self,
        cp: &CatchmentParameters,
        mp: &ModelParameters,
        p: f64,
        percolation: f64,
    ) -> (f64, f64) {
        let lake_fraction = cp.lake_percentage / 100.0;
        let p_lake = p * lake_fraction;
        let lake_evaporation = lake_fraction * mp.epot;

        self.storage += p_lake + percolation;

        let discharge = mp.klz * self.storage;
        self.storage -= discharge + lake_evaporation;

        (discharge, lake_evaporation)
    }
}
