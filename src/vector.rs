//! Fixed-dimension parameter vectors.
//!
//! `ParamVector` is the shared currency between the simplex searcher and
//! the model: an ordered sequence of reals with elementwise arithmetic.
//! All vectors participating in one search share the same dimension;
//! mixing dimensions in arithmetic is a programming error and panics.

use std::ops::{Add, Index, IndexMut, Mul, Sub};

#[derive(Debug, Clone, PartialEq)]
pub struct ParamVector(Vec<f64>);

impl ParamVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Number of coordinates.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    /// Coordinate-wise mean of a non-empty set of vectors.
    pub fn mean_of(vectors: &[ParamVector]) -> ParamVector {
        assert!(!vectors.is_empty(), "mean of zero vectors is undefined");
        let dim = vectors[0].dim();
        let mut sum = vec![0.0; dim];
        for v in vectors {
            assert_eq!(v.dim(), dim, "vectors have different dimensions");
            for (s, x) in sum.iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        let n = vectors.len() as f64;
        ParamVector(sum.into_iter().map(|s| s / n).collect())
    }
}

impl From<Vec<f64>> for ParamVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl Index<usize> for ParamVector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for ParamVector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.0[i]
    }
}

impl Add for &ParamVector {
    type Output = ParamVector;

    fn add(self, rhs: &ParamVector) -> ParamVector {
        assert_eq!(self.dim(), rhs.dim(), "vectors have different dimensions");
        ParamVector(self.iter().zip(rhs.iter()).map(|(a, b)| a + b).collect())
    }
}

impl Sub for &ParamVector {
    type Output = ParamVector;

    fn sub(self, rhs: &ParamVector) -> ParamVector {
        assert_eq!(self.dim(), rhs.dim(), "vectors have different dimensions");
        ParamVector(self.iter().zip(rhs.iter()).map(|(a, b)| a - b).collect())
    }
}

impl Mul<f64> for &ParamVector {
    type Output = ParamVector;

    fn mul(self, scalar: f64) -> ParamVector {
        ParamVector(self.iter().map(|a| a * scalar).collect())
    }
}

impl Mul<&ParamVector> for f64 {
    type Output = ParamVector;

    fn mul(self, rhs: &ParamVector) -> ParamVector {
        rhs * self
    }
}
