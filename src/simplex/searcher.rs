//! Downhill simplex (Nelder-Mead) searcher with anti-stagnation shaking,
//! periodic termination checks, and multi-run restarts.
//!
//! The simplex keeps `dim + 1` vertices sorted by ascending cost; every
//! iteration reflects the worst vertex through the centroid of the rest,
//! then optionally expands, contracts, or shrinks the whole simplex
//! toward the best vertex. `optimize` is resumable: the iteration counter
//! persists across calls so a caller can advance the search one iteration
//! at a time and inspect the trace in between.

use rand::Rng;
use thiserror::Error;

use crate::metrics;
use crate::vector::ParamVector;

/// Reflection places the trial vertex at the mirror image of the worst
/// vertex through the centroid; expansion goes half as far again.
const REFLECT_FACTOR: f64 = 2.0;
const EXPAND_FACTOR: f64 = 3.0;
const CONTRACT_FACTOR: f64 = 0.5;

/// Relative tolerance for both termination criteria.
const TERMINATION_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error, PartialEq)]
pub enum SimplexError {
    #[error("bound vectors have different dimensions ({min} vs {max})")]
    BoundsMismatch { min: usize, max: usize },
    #[error("search space must have at least one dimension")]
    EmptyDimension,
    #[error("a simplex in {dim} dimensions needs {} vertices, got {found}", .dim + 1)]
    WrongVertexCount { dim: usize, found: usize },
    #[error("vertex {index} has dimension {found}, expected {dim}")]
    VertexDimension {
        index: usize,
        dim: usize,
        found: usize,
    },
}

/// Anything the searcher can minimize. `&mut self` because evaluating a
/// hydrological cost function mutates model state.
pub trait CostFunction {
    fn evaluate(&mut self, point: &ParamVector) -> f64;
}

impl<F> CostFunction for F
where
    F: FnMut(&ParamVector) -> f64,
{
    fn evaluate(&mut self, point: &ParamVector) -> f64 {
        self(point)
    }
}

/// Which move the latest iteration committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Reflect,
    Expand,
    Contract,
    Shrink,
}

/// Diagnostic record of one iteration's trial points.
#[derive(Debug, Clone)]
pub struct IterationTrace {
    pub centroid: ParamVector,
    pub reflection: ParamVector,
    pub reflection_cost: f64,
    pub expansion: Option<ParamVector>,
    pub expansion_cost: Option<f64>,
    pub contraction: Option<ParamVector>,
    pub contraction_cost: Option<f64>,
    pub action: StepAction,
}

pub struct SimplexSearcher<C: CostFunction, R: Rng> {
    cost_fn: C,
    rng: R,

    dim: usize,
    min_init: ParamVector,
    max_init: ParamVector,

    /// Vertices sorted by ascending cost, best first.
    vertices: Vec<ParamVector>,
    costs: Vec<f64>,

    /// 1-indexed; persists across `optimize` calls within a run.
    iteration: usize,
    cost_record: Vec<f64>,

    best_solution: ParamVector,
    best_cost: f64,
    run_solutions: Vec<ParamVector>,
    run_costs: Vec<f64>,

    last_trace: Option<IterationTrace>,
    feedback_interval: usize,
}

impl<C: CostFunction, R: Rng> SimplexSearcher<C, R> {
    /// Start from a random simplex drawn uniformly inside the bounding box.
    pub fn new(
        cost_fn: C,
        min_init: ParamVector,
        max_init: ParamVector,
        rng: R,
    ) -> Result<Self, SimplexError> {
        if min_init.dim() != max_init.dim() {
            return Err(SimplexError::BoundsMismatch {
                min: min_init.dim(),
                max: max_init.dim(),
            });
        }
        if min_init.dim() == 0 {
            return Err(SimplexError::EmptyDimension);
        }
        let dim = min_init.dim();
        let mut searcher = Self {
            cost_fn,
            rng,
            dim,
            min_init,
            max_init,
            vertices: Vec::new(),
            costs: Vec::new(),
            iteration: 1,
            cost_record: Vec::new(),
            best_solution: ParamVector::zeros(dim),
            best_cost: f64::INFINITY,
            run_solutions: Vec::new(),
            run_costs: Vec::new(),
            last_trace: None,
            feedback_interval: 50,
        };
        searcher.draw_random_simplex();
        searcher.record_global_best();
        Ok(searcher)
    }

    /// Start from explicit vertices; the bounding box for later restarts
    /// is taken as the coordinate-wise extent of the given simplex.
    pub fn with_vertices(
        cost_fn: C,
        vertices: Vec<ParamVector>,
        rng: R,
    ) -> Result<Self, SimplexError> {
        let Some(first) = vertices.first() else {
            return Err(SimplexError::EmptyDimension);
        };
        let dim = first.dim();
        if dim == 0 {
            return Err(SimplexError::EmptyDimension);
        }
        if vertices.len() != dim + 1 {
            return Err(SimplexError::WrongVertexCount {
                dim,
                found: vertices.len(),
            });
        }
        for (index, v) in vertices.iter().enumerate() {
            if v.dim() != dim {
                return Err(SimplexError::VertexDimension {
                    index,
                    dim,
                    found: v.dim(),
                });
            }
        }

        let mut min_init = vertices[0].clone();
        let mut max_init = vertices[0].clone();
        for v in &vertices[1..] {
            for i in 0..dim {
                min_init[i] = min_init[i].min(v[i]);
                max_init[i] = max_init[i].max(v[i]);
            }
        }

        let mut searcher = Self {
            cost_fn,
            rng,
            dim,
            min_init,
            max_init,
            vertices,
            costs: Vec::new(),
            iteration: 1,
            cost_record: Vec::new(),
            best_solution: ParamVector::zeros(dim),
            best_cost: f64::INFINITY,
            run_solutions: Vec::new(),
            run_costs: Vec::new(),
            last_trace: None,
            feedback_interval: 50,
        };
        searcher.evaluate_all();
        searcher.sort_vertices();
        searcher.record_global_best();
        Ok(searcher)
    }

    pub fn set_feedback_interval(&mut self, interval: usize) {
        assert!(interval > 0, "feedback interval must be positive");
        self.feedback_interval = interval;
    }

    pub fn best_solution(&self) -> &ParamVector {
        &self.best_solution
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    /// Best vertex of the current simplex (not necessarily the global best).
    pub fn current_best(&self) -> (&ParamVector, f64) {
        (&self.vertices[0], self.costs[0])
    }

    pub fn vertices(&self) -> &[ParamVector] {
        &self.vertices
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    /// Best cost at entry of each iteration this run, one entry per
    /// iteration regardless of how `optimize` calls were batched.
    pub fn cost_record(&self) -> &[f64] {
        &self.cost_record
    }

    /// Best vertex of each completed run, in run order.
    pub fn run_solutions(&self) -> &[ParamVector] {
        &self.run_solutions
    }

    pub fn run_costs(&self) -> &[f64] {
        &self.run_costs
    }

    pub fn last_trace(&self) -> Option<&IterationTrace> {
        self.last_trace.as_ref()
    }

    /// Advance the search until convergence or until the 1-indexed
    /// iteration counter passes `max_iterations`. Resumable: calling
    /// `optimize(1)` then `optimize(2)` performs exactly one iteration
    /// per call.
    pub fn optimize(&mut self, max_iterations: usize) {
        let shake_every = 5 * (self.dim + 1);
        loop {
            // One record per iteration: re-entering the same iteration
            // after a break must not duplicate it.
            if self.cost_record.len() < self.iteration {
                self.cost_record.push(self.costs[0]);
            }
            if self.iteration % self.feedback_interval == 0 {
                log::info!(
                    "iteration {}: best cost {:.6}",
                    self.iteration,
                    self.costs[0]
                );
            }
            if self.iteration > max_iterations || self.is_termination_time() {
                break;
            }
            if self.iteration % shake_every == 0 {
                let noise = if self.iteration <= 3 * shake_every {
                    0.1
                } else {
                    5.0 / self.iteration as f64
                };
                self.shake_up(noise);
            }
            self.next_iteration();
            self.sort_vertices();
            self.iteration += 1;
        }
        self.record_global_best();
    }

    /// Repeat the search `runs` times, each from a fresh random simplex
    /// inside the bounding box, keeping the best solution over all runs.
    pub fn optimize_multiple_runs(&mut self, runs: usize, max_iterations: usize) {
        for run in 1..=runs {
            self.draw_random_simplex();
            self.iteration = 1;
            self.cost_record.clear();
            log::info!("starting run {run} of {runs}");
            self.optimize(max_iterations);
            self.run_solutions.push(self.vertices[0].clone());
            self.run_costs.push(self.costs[0]);
        }
    }

    fn draw_random_simplex(&mut self) {
        let mut vertices = Vec::with_capacity(self.dim + 1);
        for _ in 0..=self.dim {
            let coords = (0..self.dim)
                .map(|i| self.rng.random_range(self.min_init[i]..=self.max_init[i]))
                .collect();
            vertices.push(ParamVector::new(coords));
        }
        self.vertices = vertices;
        self.evaluate_all();
        self.sort_vertices();
    }

    fn evaluate_all(&mut self) {
        let mut costs = Vec::with_capacity(self.vertices.len());
        for v in &self.vertices {
            costs.push(self.cost_fn.evaluate(v));
        }
        self.costs = costs;
    }

    fn record_global_best(&mut self) {
        if self.costs[0] < self.best_cost {
            self.best_cost = self.costs[0];
            self.best_solution = self.vertices[0].clone();
        }
    }

    /// Point on the ray from `from` through `towards`, `factor` of the
    /// way along (factor 2 mirrors, 0.5 halves).
    fn along(from: &ParamVector, towards: &ParamVector, factor: f64) -> ParamVector {
        from + &(factor * &(towards - from))
    }

    fn next_iteration(&mut self) {
        let worst = self.dim;
        let centroid = ParamVector::mean_of(&self.vertices[..worst]);

        let reflection = Self::along(&self.vertices[worst], &centroid, REFLECT_FACTOR);
        let reflection_cost = self.cost_fn.evaluate(&reflection);

        let mut trace = IterationTrace {
            centroid,
            reflection: reflection.clone(),
            reflection_cost,
            expansion: None,
            expansion_cost: None,
            contraction: None,
            contraction_cost: None,
            action: StepAction::Reflect,
        };

        if self.costs[0] < reflection_cost && reflection_cost <= self.costs[worst - 1] {
            // Middle of the pack: keep the reflection as-is.
            self.vertices[worst] = reflection;
            self.costs[worst] = reflection_cost;
        } else if reflection_cost < self.costs[0] {
            let expansion = Self::along(&self.vertices[worst], &trace.centroid, EXPAND_FACTOR);
            let expansion_cost = self.cost_fn.evaluate(&expansion);
            trace.expansion = Some(expansion.clone());
            trace.expansion_cost = Some(expansion_cost);
            if expansion_cost < reflection_cost {
                self.vertices[worst] = expansion;
                self.costs[worst] = expansion_cost;
                trace.action = StepAction::Expand;
            } else {
                self.vertices[worst] = reflection;
                self.costs[worst] = reflection_cost;
            }
        } else {
            let contraction = Self::along(&self.vertices[worst], &trace.centroid, CONTRACT_FACTOR);
            let contraction_cost = self.cost_fn.evaluate(&contraction);
            trace.contraction = Some(contraction.clone());
            trace.contraction_cost = Some(contraction_cost);
            if contraction_cost < self.costs[worst] {
                self.vertices[worst] = contraction;
                self.costs[worst] = contraction_cost;
                trace.action = StepAction::Contract;
            } else {
                // Shrink every non-best vertex halfway toward the best.
                for i in 1..=worst {
                    let shrunk = Self::along(&self.vertices[i], &self.vertices[0], 0.5);
                    self.costs[i] = self.cost_fn.evaluate(&shrunk);
                    self.vertices[i] = shrunk;
                }
                trace.action = StepAction::Shrink;
            }
        }

        self.last_trace = Some(trace);
    }

    fn sort_vertices(&mut self) {
        let mut pairs: Vec<(f64, ParamVector)> = self
            .costs
            .drain(..)
            .zip(self.vertices.drain(..))
            .collect();
        // Stable sort: equal costs keep their current order.
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (cost, vertex) in pairs {
            self.costs.push(cost);
            self.vertices.push(vertex);
        }
    }

    /// Convergence is checked every `10 * (dim + 1)` iterations: the
    /// simplex costs must have collapsed relative to the best cost, and
    /// the best cost must have stopped improving over the same window.
    fn is_termination_time(&self) -> bool {
        let lookback = 10 * (self.dim + 1);
        if self.cost_record.len() < lookback || self.iteration % lookback != 0 {
            return false;
        }
        let spread_fraction = metrics::std_dev(&self.costs) / self.costs[0];
        let then = self.cost_record[self.cost_record.len() - lookback];
        let now = self.cost_record[self.cost_record.len() - 1];
        let improvement = 1.0 - now / then;
        spread_fraction < TERMINATION_TOLERANCE && improvement < TERMINATION_TOLERANCE
    }

    /// Nudge every coordinate of every vertex by a random relative amount
    /// up to `noise`, then re-evaluate. Pulls the simplex off local flats.
    fn shake_up(&mut self, noise: f64) {
        for vertex in &mut self.vertices {
            for i in 0..self.dim {
                let jitter: f64 = self.rng.random_range(-1.0..=1.0);
                vertex[i] += vertex[i] * jitter * noise;
            }
        }
        self.evaluate_all();
        self.sort_vertices();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    /// Quadratic with minimum -7 at (3, 2).
    fn saddle_free(v: &ParamVector) -> f64 {
        v[0] * v[0] - 4.0 * v[0] + v[1] * v[1] - v[1] - v[0] * v[1]
    }

    fn vertices(points: &[[f64; 2]]) -> Vec<ParamVector> {
        points
            .iter()
            .map(|p| ParamVector::new(p.to_vec()))
            .collect()
    }

    fn assert_simplex(s: &SimplexSearcher<impl CostFunction, impl rand::Rng>, expected: &[[f64; 2]]) {
        for (vertex, want) in s.vertices().iter().zip(expected) {
            assert_relative_eq!(vertex[0], want[0], epsilon = 1e-3);
            assert_relative_eq!(vertex[1], want[1], epsilon = 1e-3);
        }
    }

    #[test]
    fn initial_vertices_sorted_by_ascending_cost() {
        let s = SimplexSearcher::with_vertices(
            saddle_free,
            vertices(&[[0.0, 0.0], [1.2, 0.0], [0.0, 0.8]]),
            rng(),
        )
        .unwrap();
        assert_simplex(&s, &[[1.2, 0.0], [0.0, 0.8], [0.0, 0.0]]);
        assert_relative_eq!(s.costs()[0], -3.36, epsilon = 1e-9);
        assert_relative_eq!(s.costs()[1], -0.16, epsilon = 1e-9);
        assert_relative_eq!(s.costs()[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn stepwise_search_follows_known_trajectory() {
        let mut s = SimplexSearcher::with_vertices(
            saddle_free,
            vertices(&[[0.0, 0.0], [1.2, 0.0], [0.0, 0.8]]),
            rng(),
        )
        .unwrap();

        s.optimize(1);
        let trace = s.last_trace().unwrap();
        assert_relative_eq!(trace.centroid[0], 0.6, epsilon = 1e-9);
        assert_relative_eq!(trace.centroid[1], 0.4, epsilon = 1e-9);
        assert_relative_eq!(trace.reflection[0], 1.2, epsilon = 1e-9);
        assert_relative_eq!(trace.reflection[1], 0.8, epsilon = 1e-9);
        assert_relative_eq!(trace.reflection_cost, -4.48, epsilon = 1e-9);
        assert_eq!(trace.action, StepAction::Expand);
        let expansion = trace.expansion.clone().unwrap();
        assert_relative_eq!(expansion[0], 1.8, epsilon = 1e-9);
        assert_relative_eq!(expansion[1], 1.2, epsilon = 1e-9);
        assert_relative_eq!(trace.expansion_cost.unwrap(), -5.88, epsilon = 1e-9);
        assert_simplex(&s, &[[1.8, 1.2], [1.2, 0.0], [0.0, 0.8]]);

        s.optimize(2);
        assert_simplex(&s, &[[1.8, 1.2], [3.0, 0.4], [1.2, 0.0]]);

        s.optimize(3);
        assert_simplex(&s, &[[3.6, 1.6], [1.8, 1.2], [3.0, 0.4]]);

        s.optimize(4);
        assert_simplex(&s, &[[3.6, 1.6], [2.4, 2.4], [1.8, 1.2]]);

        s.optimize(5);
        assert_simplex(&s, &[[2.4, 1.6], [3.6, 1.6], [2.4, 2.4]]);

        s.optimize(6);
        assert_simplex(&s, &[[2.7, 2.0], [2.4, 1.6], [3.6, 1.6]]);

        s.optimize(7);
        assert_simplex(&s, &[[2.7, 2.0], [3.075, 1.7], [2.4, 1.6]]);

        s.optimize(8);
        assert_simplex(&s, &[[2.7, 2.0], [3.375, 2.1], [3.075, 1.7]]);

        s.optimize(9);
        assert_simplex(&s, &[[3.0562, 1.875], [2.7, 2.0], [3.375, 2.1]]);
        assert_relative_eq!(s.costs()[0], -6.97418, epsilon = 1e-3);

        s.optimize(100);
        assert_relative_eq!(s.best_solution()[0], 3.0, epsilon = 0.01);
        assert_relative_eq!(s.best_solution()[1], 2.0, epsilon = 0.01);
        assert_relative_eq!(s.best_cost(), -7.0, epsilon = 0.01);
    }

    #[test]
    fn converges_on_shifted_paraboloid() {
        let f = |v: &ParamVector| 2.0 + (v[0] - 2.0).powi(2) + (v[1] - 4.0).powi(2);
        let mut s = SimplexSearcher::new(
            f,
            ParamVector::new(vec![-10.0, -10.0]),
            ParamVector::new(vec![10.0, 10.0]),
            rng(),
        )
        .unwrap();
        s.optimize(100);
        assert!(s.best_cost() < 2.1, "cost {} did not converge", s.best_cost());
        assert_relative_eq!(s.best_solution()[0], 2.0, epsilon = 0.1);
        assert_relative_eq!(s.best_solution()[1], 4.0, epsilon = 0.1);
    }

    #[test]
    fn multiple_runs_keep_global_best() {
        let f = |v: &ParamVector| (v[0] - 1.0).powi(2) + (v[1] + 3.0).powi(2);
        let mut s = SimplexSearcher::new(
            f,
            ParamVector::new(vec![-5.0, -5.0]),
            ParamVector::new(vec![5.0, 5.0]),
            rng(),
        )
        .unwrap();
        s.optimize_multiple_runs(3, 200);
        assert_eq!(s.run_costs().len(), 3);
        let min_run = s.run_costs().iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(s.best_cost() <= min_run);
        assert!(s.best_cost() < 0.01, "best cost {}", s.best_cost());
    }

    #[test]
    fn shrinks_whole_simplex_when_nothing_improves() {
        // Scripted costs: three initial evaluations, then a bad
        // reflection and a bad contraction force a shrink.
        let script = std::cell::RefCell::new(vec![1.0, 2.0, 3.0, 10.0, 10.0, 0.0, 0.0].into_iter());
        let f = move |_: &ParamVector| script.borrow_mut().next().unwrap();
        let mut s = SimplexSearcher::with_vertices(
            f,
            vertices(&[[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]]),
            rng(),
        )
        .unwrap();

        s.optimize(1);
        let trace = s.last_trace().unwrap();
        assert_eq!(trace.action, StepAction::Shrink);
        // Non-best vertices moved halfway toward the best (0, 0).
        assert_simplex(&s, &[[2.0, 0.0], [0.0, 2.0], [0.0, 0.0]]);
    }

    #[test]
    fn shake_up_fires_on_schedule_with_decaying_noise() {
        use std::cell::RefCell;
        use std::rc::Rc;

        // Every evaluation scores better than all before it, so each
        // iteration reflects then expands (two evaluations) and the
        // search never stalls; the log exposes every point the searcher
        // scores, shaken vertices included.
        let evaluations: Rc<RefCell<Vec<Vec<f64>>>> = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&evaluations);
        let falling = move |v: &ParamVector| {
            let mut log = log.borrow_mut();
            log.push(v.as_slice().to_vec());
            1000.0 / log.len() as f64
        };
        let mut s = SimplexSearcher::with_vertices(
            falling,
            vec![ParamVector::new(vec![1.0]), ParamVector::new(vec![2.0])],
            rng(),
        )
        .unwrap();

        // One dimension: a shake every 10 iterations, none before.
        s.optimize(9);
        assert_eq!(evaluations.borrow().len(), 20);

        // Iteration 10 opens by nudging both vertices with noise 0.1 and
        // re-scoring them before the reflection step.
        let before: Vec<f64> = s.vertices().iter().map(|v| v[0]).collect();
        s.optimize(10);
        assert_eq!(evaluations.borrow().len(), 24);
        let mut twin = rng();
        for (i, &x) in before.iter().enumerate() {
            let jitter: f64 = twin.random_range(-1.0..=1.0);
            let shaken = evaluations.borrow()[20 + i][0];
            assert_relative_eq!(shaken, x + x * jitter * 0.1, max_relative = 1e-12);
        }

        // Shakes at 20 and 30 still use noise 0.1; past three shake
        // periods the amplitude decays as 5 / iteration.
        s.optimize(39);
        assert_eq!(evaluations.borrow().len(), 86);
        let before: Vec<f64> = s.vertices().iter().map(|v| v[0]).collect();
        s.optimize(40);
        assert_eq!(evaluations.borrow().len(), 90);
        for _ in 0..4 {
            let _: f64 = twin.random_range(-1.0..=1.0);
        }
        for (i, &x) in before.iter().enumerate() {
            let jitter: f64 = twin.random_range(-1.0..=1.0);
            let shaken = evaluations.borrow()[86 + i][0];
            assert_relative_eq!(shaken, x + x * jitter * (5.0 / 40.0), max_relative = 1e-12);
        }
    }

    #[test]
    fn stepwise_and_single_call_record_identical_costs() {
        let mut single = SimplexSearcher::with_vertices(
            saddle_free,
            vertices(&[[0.0, 0.0], [1.2, 0.0], [0.0, 0.8]]),
            rng(),
        )
        .unwrap();
        let mut stepwise = SimplexSearcher::with_vertices(
            saddle_free,
            vertices(&[[0.0, 0.0], [1.2, 0.0], [0.0, 0.8]]),
            rng(),
        )
        .unwrap();

        single.optimize(9);
        for max_iterations in 1..=9 {
            stepwise.optimize(max_iterations);
        }

        // Initial best plus one entry per completed iteration, however
        // the calls were batched.
        assert_eq!(single.cost_record().len(), 10);
        assert_eq!(single.cost_record(), stepwise.cost_record());
        assert_eq!(single.costs(), stepwise.costs());
    }

    #[test]
    fn rejects_mismatched_bounds() {
        let err = SimplexSearcher::new(
            saddle_free,
            ParamVector::new(vec![0.0]),
            ParamVector::new(vec![1.0, 1.0]),
            rng(),
        )
        .err()
        .unwrap();
        assert_eq!(err, SimplexError::BoundsMismatch { min: 1, max: 2 });
    }

    #[test]
    fn rejects_wrong_vertex_count() {
        let err = SimplexSearcher::with_vertices(
            saddle_free,
            vertices(&[[0.0, 0.0], [1.0, 0.0]]),
            rng(),
        )
        .err()
        .unwrap();
        assert_eq!(err, SimplexError::WrongVertexCount { dim: 2, found: 2 });
    }
}
