//! Nelder-Mead downhill simplex search.

pub mod searcher;

pub use searcher::{CostFunction, IterationTrace, SimplexError, SimplexSearcher, StepAction};
