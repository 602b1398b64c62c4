//! Full HBV model: orchestrates the tank cascade over a forcing series.
//!
//! The model owns all tank state plus two running water-balance
//! accumulators, and reuses its output buffers across simulations so the
//! searcher can re-invoke it thousands of times without reallocation.

use smallvec::SmallVec;

use crate::catchment::CatchmentParameters;
use crate::dataset::ForcingRecord;
use crate::hbv::params::{ModelParameters, ParamError};
use crate::hbv::tanks::{LowerZoneTank, SnowTank, SoilMoistureTank, UpperZoneTank};
use crate::vector::ParamVector;

#[derive(Debug)]
pub struct HbvModel {
    catchment: CatchmentParameters,
    params: ModelParameters,

    snow_tanks: SmallVec<[SnowTank; 10]>,
    soil: SoilMoistureTank,
    upper_zone: UpperZoneTank,
    lower_zone: LowerZoneTank,

    /// Accumulated corrected precipitation input (mm).
    water_in: f64,
    /// Accumulated discharge plus evaporation output (mm).
    water_out: f64,

    // Reused output buffers
    rates: Vec<f64>,
    cumulative_rates: Vec<f64>,
}

impl HbvModel {
    pub fn new(catchment: CatchmentParameters, params: ModelParameters) -> Self {
        let snow_tanks = catchment
            .snow_band_elevations()
            .into_iter()
            .map(SnowTank::new)
            .collect();
        Self {
            catchment,
            params,
            snow_tanks,
            soil: SoilMoistureTank::default(),
            upper_zone: UpperZoneTank::default(),
            lower_zone: LowerZoneTank::default(),
            water_in: 0.0,
            water_out: 0.0,
            rates: Vec::new(),
            cumulative_rates: Vec::new(),
        }
    }

    pub fn with_defaults(catchment: CatchmentParameters) -> Self {
        Self::new(catchment, ModelParameters::default())
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: ModelParameters) {
        self.params = params;
    }

    pub fn set_parameters_from_slice(&mut self, values: &[f64]) -> Result<(), ParamError> {
        self.params.set_from_slice(values)
    }

    pub fn set_parameters_from_vector(&mut self, values: &ParamVector) -> Result<(), ParamError> {
        self.params.set_from_slice(values.as_slice())
    }

    /// Zero every tank's storage and the water-balance accumulators.
    ///
    /// Must be called before simulating a new, independent series;
    /// omitting it leaks state across runs.
    pub fn reset_state(&mut self) {
        for tank in &mut self.snow_tanks {
            tank.reset();
        }
        self.soil.reset();
        self.upper_zone.reset();
        self.lower_zone.reset();
        self.water_in = 0.0;
        self.water_out = 0.0;
    }

    /// Simulate one timestep from observed precipitation (mm/timestep) and
    /// temperature (C); returns the simulated discharge (m^3/s).
    pub fn step(&mut self, p_obs: f64, t_obs: f64) -> f64 {
        let mp = self.params;

        let is_snow = t_obs < mp.tx;
        let p = if is_snow {
            p_obs * mp.s_corr
        } else {
            p_obs * mp.p_corr
        };
        self.water_in += p;

        // Snow bands: unweighted mean of the per-band infiltration
        let mut insoil_sum = 0.0;
        for tank in &mut self.snow_tanks {
            insoil_sum += tank.step(&self.catchment, &mp, p, t_obs);
        }
        let insoil = insoil_sum / self.snow_tanks.len() as f64;

        let (duz, evap_soil) = self.soil.step(&mp, insoil);
        let (percolation, quick, slow) = self.upper_zone.step(&mp, duz);
        let (q_lz, evap_lake) = self.lower_zone.step(&self.catchment, &mp, p, percolation);

        let q_mm = quick + slow + q_lz;
        let evap_mm = evap_soil + evap_lake;
        self.water_out += q_mm + evap_mm;

        self.depth_to_rate(q_mm)
    }

    /// Install new parameters, reset all state, and simulate the whole
    /// series in order. Returns the per-step discharge rates and their
    /// running cumulative sum, borrowed from reused internal buffers.
    pub fn reset_and_simulate<'a>(
        &'a mut self,
        params: &[f64],
        series: &[ForcingRecord],
    ) -> Result<(&'a [f64], &'a [f64]), ParamError> {
        self.params.set_from_slice(params)?;
        self.reset_state();

        self.rates.clear();
        self.rates.reserve(series.len());
        self.cumulative_rates.clear();
        self.cumulative_rates.reserve(series.len());

        let mut q_acc = 0.0;
        for record in series {
            let q = self.step(record.precip_mm, record.temp_c);
            q_acc += q;
            self.rates.push(q);
            self.cumulative_rates.push(q_acc);
        }

        Ok((&self.rates, &self.cumulative_rates))
    }

    /// Accumulated (input, output) water since the last reset (mm).
    pub fn water_balance(&self) -> (f64, f64) {
        (self.water_in, self.water_out)
    }

    /// Convert a runoff depth (mm/timestep) to a volumetric rate (m^3/s).
    pub fn depth_to_rate(&self, q_mm: f64) -> f64 {
        q_mm * self.catchment.catchment_area * 1000.0 / self.catchment.seconds_per_timestep
    }

    /// Convert a volumetric rate (m^3/s) to a runoff depth (mm/timestep).
    pub fn rate_to_depth(&self, q_m3s: f64) -> f64 {
        q_m3s / self.catchment.catchment_area / 1000.0 * self.catchment.seconds_per_timestep
    }
}
