//! Calibration of an HBV model against observed discharge.
//!
//! `CalibrationObjective` turns a model plus a training series into a
//! cost function the simplex searcher can minimize; `CalibrationSession`
//! wires the pieces together and formats the results.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::catchment::CatchmentParameters;
use crate::dataset::{self, ForcingRecord};
use crate::hbv::model::HbvModel;
use crate::hbv::params::{ModelParameters, ParamError};
use crate::metrics;
use crate::simplex::{CostFunction, SimplexError, SimplexSearcher};
use crate::vector::ParamVector;

/// Timesteps dropped from the start of the cost window while the tanks
/// fill toward a realistic internal state.
pub const WARMUP_STEPS: usize = 30;

/// Weight of the per-timestep fit term; the remainder weights the
/// cumulative-discharge fit.
const TIMESTEP_FIT_WEIGHT: f64 = 0.8;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("training series has {found} timesteps, need at least {min}")]
    SeriesTooShort { found: usize, min: usize },
    #[error("observed discharge is constant; the fit metrics are undefined")]
    ConstantObservations,
    #[error("no calibration has been run yet")]
    NotCalibrated,
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Simplex(#[from] SimplexError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] dataset::ParseError),
}

/// Cost function for the searcher: how badly a parameter vector
/// reproduces the observed discharge of the training series.
///
/// Observed-side statistics are computed once at construction; every
/// `cost` call only re-runs the model.
pub struct CalibrationObjective<'a> {
    model: &'a mut HbvModel,
    training: &'a [ForcingRecord],

    q_obs: Vec<f64>,
    q_obs_mean: f64,
    q_obs_acc: Vec<f64>,
    q_obs_acc_mean: f64,
}

impl<'a> CalibrationObjective<'a> {
    pub fn new(
        model: &'a mut HbvModel,
        training: &'a [ForcingRecord],
    ) -> Result<Self, CalibrationError> {
        if training.len() < WARMUP_STEPS + 2 {
            return Err(CalibrationError::SeriesTooShort {
                found: training.len(),
                min: WARMUP_STEPS + 2,
            });
        }

        let q_obs: Vec<f64> = training[WARMUP_STEPS..]
            .iter()
            .map(|r| r.q_obs_m3s)
            .collect();
        let first = q_obs[0];
        if q_obs.iter().all(|&q| q == first) {
            return Err(CalibrationError::ConstantObservations);
        }

        let q_obs_mean = metrics::mean(&q_obs);
        let q_obs_acc = metrics::cumsum(&q_obs);
        let q_obs_acc_mean = metrics::mean(&q_obs_acc);

        Ok(Self {
            model,
            training,
            q_obs,
            q_obs_mean,
            q_obs_acc,
            q_obs_acc_mean,
        })
    }

    /// Bounding box for the initial simplex: each coordinate between
    /// 60% and 190% of the model's current parameter value.
    pub fn initial_bounds(&self) -> (ParamVector, ParamVector) {
        let v = self.model.parameters().as_vector();
        let min = &v - &(0.4 * &v);
        let max = &v + &(0.9 * &v);
        (min, max)
    }

    /// Weighted mix of two misfit terms over the post-warmup window:
    /// Nash-Sutcliffe on the discharge itself and normalized absolute
    /// error on the accumulated discharge. 0.0 is a perfect fit.
    pub fn cost(&mut self, solution: &ParamVector) -> f64 {
        let (rates, cumulative) = self
            .model
            .reset_and_simulate(solution.as_slice(), self.training)
            .expect("searcher vertices have the model's parameter dimension");
        let q_sim = &rates[WARMUP_STEPS..];
        let q_sim_acc = &cumulative[WARMUP_STEPS..];

        let r2 = metrics::r2(q_sim, &self.q_obs, self.q_obs_mean);
        let nae = metrics::normalized_absolute_error(q_sim_acc, &self.q_obs_acc, self.q_obs_acc_mean);

        TIMESTEP_FIT_WEIGHT * (1.0 - r2) + (1.0 - TIMESTEP_FIT_WEIGHT) * (1.0 - nae)
    }
}

impl CostFunction for CalibrationObjective<'_> {
    fn evaluate(&mut self, point: &ParamVector) -> f64 {
        self.cost(point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Training,
    Validation,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Training => "Trainingset",
            Dataset::Validation => "Validationset",
        }
    }
}

/// One calibration of a catchment: training and validation series, the
/// model under calibration, and the best solution found so far.
pub struct CalibrationSession {
    training: Vec<ForcingRecord>,
    validation: Vec<ForcingRecord>,
    model: HbvModel,

    best_solution: Option<ParamVector>,
    best_cost: f64,
    run_costs: Vec<f64>,
}

impl CalibrationSession {
    pub fn new(
        catchment: CatchmentParameters,
        training: Vec<ForcingRecord>,
        validation: Vec<ForcingRecord>,
    ) -> Self {
        Self {
            training,
            validation,
            model: HbvModel::with_defaults(catchment),
            best_solution: None,
            best_cost: f64::INFINITY,
            run_costs: Vec::new(),
        }
    }

    pub fn dataset(&self, which: Dataset) -> &[ForcingRecord] {
        match which {
            Dataset::Training => &self.training,
            Dataset::Validation => &self.validation,
        }
    }

    /// Run the simplex search `runs` times and keep the best parameter
    /// vector over all runs.
    pub fn calibrate(
        &mut self,
        runs: usize,
        max_iterations_each_run: usize,
        seed: u64,
        feedback_interval: usize,
    ) -> Result<(), CalibrationError> {
        let objective = CalibrationObjective::new(&mut self.model, &self.training)?;
        let (min_init, max_init) = objective.initial_bounds();

        let rng = ChaCha8Rng::seed_from_u64(seed);
        let mut searcher = SimplexSearcher::new(objective, min_init, max_init, rng)?;
        searcher.set_feedback_interval(feedback_interval);
        searcher.optimize_multiple_runs(runs, max_iterations_each_run);

        self.best_cost = searcher.best_cost();
        self.run_costs = searcher.run_costs().to_vec();
        self.best_solution = Some(searcher.best_solution().clone());
        Ok(())
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    pub fn run_costs(&self) -> &[f64] {
        &self.run_costs
    }

    pub fn best_parameters(&self) -> Result<ModelParameters, CalibrationError> {
        let solution = self
            .best_solution
            .as_ref()
            .ok_or(CalibrationError::NotCalibrated)?;
        Ok(ModelParameters::from_slice(solution.as_slice())?)
    }

    /// Human-readable summary: fit statistics for both datasets followed
    /// by the calibrated parameters.
    pub fn results_text(&mut self) -> Result<String, CalibrationError> {
        let params = self.best_parameters()?;

        let mut text = self.dataset_results(Dataset::Training)?;
        text.push_str("\n\n\n");
        text.push_str(&self.dataset_results(Dataset::Validation)?);
        text.push_str("\n\n\n");
        let _ = write!(text, "{params}");

        Ok(text)
    }

    pub fn write_results(&mut self, path: &Path) -> Result<(), CalibrationError> {
        let text = self.results_text()?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Write the forcing series plus the simulated discharge under the
    /// best parameters as CSV.
    pub fn write_simulation_csv(
        &mut self,
        path: &Path,
        which: Dataset,
    ) -> Result<(), CalibrationError> {
        let solution = self
            .best_solution
            .as_ref()
            .ok_or(CalibrationError::NotCalibrated)?
            .clone();
        let series = match which {
            Dataset::Training => &self.training,
            Dataset::Validation => &self.validation,
        };
        let (rates, _) = self.model.reset_and_simulate(solution.as_slice(), series)?;
        let rates = rates.to_vec();

        let file = fs::File::create(path)?;
        dataset::write_simulation_csv(file, series, &rates)?;
        Ok(())
    }

    fn dataset_results(&mut self, which: Dataset) -> Result<String, CalibrationError> {
        let solution = self
            .best_solution
            .as_ref()
            .ok_or(CalibrationError::NotCalibrated)?
            .clone();
        let series = match which {
            Dataset::Training => &self.training,
            Dataset::Validation => &self.validation,
        };

        let (rates, cumulative) = {
            let (r, c) = self.model.reset_and_simulate(solution.as_slice(), series)?;
            (r.to_vec(), c.to_vec())
        };
        let (water_in, water_out) = self.model.water_balance();

        let q_obs: Vec<f64> = series.iter().map(|r| r.q_obs_m3s).collect();
        let q_obs_acc = metrics::cumsum(&q_obs);

        let q_sim_acc_mm: Vec<f64> =
            cumulative.iter().map(|&q| self.model.rate_to_depth(q)).collect();
        let q_obs_acc_mm: Vec<f64> =
            q_obs_acc.iter().map(|&q| self.model.rate_to_depth(q)).collect();

        let r2 = metrics::r2(&rates, &q_obs, metrics::mean(&q_obs));
        let nae = metrics::normalized_absolute_error(
            &q_sim_acc_mm,
            &q_obs_acc_mm,
            metrics::mean(&q_obs_acc_mm),
        );

        let mut text = String::new();
        let _ = writeln!(text, "RESULTS: {}", which.name());
        let _ = writeln!(text, "Nash-Sutcliffe/R2: {r2}");
        let _ = writeln!(text);
        let _ = writeln!(
            text,
            "Observed accumulated discharge: {} mm",
            q_obs_acc_mm.last().copied().unwrap_or(0.0)
        );
        let _ = writeln!(
            text,
            "Simulated accumulated discharge: {} mm",
            q_sim_acc_mm.last().copied().unwrap_or(0.0)
        );
        let _ = writeln!(text, "Normalized acc absolute error: {nae}");
        let _ = write!(text, "Water still in model: {} mm", water_in - water_out);

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn forcing(n: usize) -> Vec<ForcingRecord> {
        (0..n)
            .map(|i| ForcingRecord {
                datetime: format!("1990-01-{:02}", i % 28 + 1),
                precip_mm: if i % 4 == 0 { 10.0 } else { 0.5 },
                temp_c: -6.0 + (i % 25) as f64,
                q_obs_m3s: 8.0 + (i % 7) as f64,
            })
            .collect()
    }

    fn model() -> HbvModel {
        HbvModel::with_defaults(CatchmentParameters::example())
    }

    #[test]
    fn rejects_series_shorter_than_warmup() {
        let mut m = model();
        let series = forcing(WARMUP_STEPS);
        let err = CalibrationObjective::new(&mut m, &series).err().unwrap();
        assert!(matches!(err, CalibrationError::SeriesTooShort { .. }));
    }

    #[test]
    fn rejects_constant_observations() {
        let mut m = model();
        let mut series = forcing(100);
        for r in &mut series {
            r.q_obs_m3s = 5.0;
        }
        let err = CalibrationObjective::new(&mut m, &series).err().unwrap();
        assert!(matches!(err, CalibrationError::ConstantObservations));
    }

    #[test]
    fn initial_bounds_bracket_default_parameters() {
        let mut m = model();
        let series = forcing(100);
        let objective = CalibrationObjective::new(&mut m, &series).unwrap();
        let (min, max) = objective.initial_bounds();
        let v = ModelParameters::default().as_vector();
        for i in 0..v.dim() {
            assert_relative_eq!(min[i], 0.6 * v[i], epsilon = 1e-12);
            assert_relative_eq!(max[i], 1.9 * v[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn perfect_parameters_leave_only_the_cumulative_offset() {
        // Use the model's own output as "observations": the defaults then
        // reproduce the discharge exactly and the timestep term vanishes.
        // The cumulative term keeps a constant offset: the simulated
        // running sum starts at timestep zero while the observed one
        // starts after the warmup window.
        let mut m = model();
        let mut series = forcing(120);
        let defaults = ModelParameters::default().as_array();
        let (rates, cumulative) = {
            let (r, c) = m.reset_and_simulate(&defaults, &series).unwrap();
            (r.to_vec(), c.to_vec())
        };
        for (r, q) in series.iter_mut().zip(&rates) {
            r.q_obs_m3s = *q;
        }

        let mut objective = CalibrationObjective::new(&mut m, &series).unwrap();
        let cost = objective.cost(&ParamVector::new(defaults.to_vec()));

        let q_obs_acc = metrics::cumsum(&rates[WARMUP_STEPS..]);
        let nae = metrics::normalized_absolute_error(
            &cumulative[WARMUP_STEPS..],
            &q_obs_acc,
            metrics::mean(&q_obs_acc),
        );
        assert!(cost > 0.0);
        assert_relative_eq!(cost, 0.2 * (1.0 - nae), epsilon = 1e-12);
    }

    #[test]
    fn warmup_window_excluded_from_cost() {
        let mut m = model();
        let series = forcing(120);
        let defaults = ParamVector::new(ModelParameters::default().as_array().to_vec());

        let clean = CalibrationObjective::new(&mut m, &series)
            .unwrap()
            .cost(&defaults);

        // Corrupting observations inside the warmup window only must not
        // change the cost at all.
        let mut corrupted = series.clone();
        for r in &mut corrupted[..WARMUP_STEPS] {
            r.q_obs_m3s = 999.0;
        }
        let dirty = CalibrationObjective::new(&mut m, &corrupted)
            .unwrap()
            .cost(&defaults);

        assert_eq!(clean, dirty);
    }

    #[test]
    fn results_require_calibration_first() {
        let mut session =
            CalibrationSession::new(CatchmentParameters::example(), forcing(100), forcing(60));
        assert!(matches!(
            session.results_text(),
            Err(CalibrationError::NotCalibrated)
        ));
    }

    #[test]
    fn dataset_names() {
        assert_eq!(Dataset::Training.name(), "Trainingset");
        assert_eq!(Dataset::Validation.name(), "Validationset");
    }
}
