use serde::{Deserialize, Serialize};

use crate::basis::BasisMatrix;
use crate::error::{Result, ToneError};
use crate::solver;

/// Number of samples in a curve preview.
pub const PREVIEW_SAMPLES: usize = 256;

/// Polynomial coefficients, highest degree first.
///
/// `[c0, c1, ..., c(n-1)]` is `c0·x^(n-1) + ... + c(n-1)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f32>,
}

impl Polynomial {
    pub fn from_descending(coefficients: Vec<f32>) -> Self {
        Self { coefficients }
    }

    /// Build from lowest-degree-first coefficients, as the power basis produces them.
    pub fn from_ascending(coefficients: &[f64]) -> Self {
        Self {
            coefficients: coefficients.iter().rev().map(|&c| c as f32).collect(),
        }
    }

    /// Interpolating polynomial through `values` at the basis positions.
    pub fn fit(basis: &BasisMatrix, values: &[f32]) -> Result<Self> {
        if values.len() != basis.size() {
            return Err(ToneError::IllegalParameter { index: 7 });
        }
        let rhs: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        let ascending = solver::solve_rows(basis, &rhs)?;
        Ok(Self::from_ascending(&ascending))
    }

    /// `f(x) = x`, padded with leading zeros to `len` coefficients.
    ///
    /// A vector shorter than 2 has no linear term, so `len < 2` yields the
    /// zero polynomial instead.
    pub fn identity(len: usize) -> Self {
        let mut coefficients = vec![0.0; len];
        if len >= 2 {
            coefficients[len - 2] = 1.0;
        }
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Horner evaluation, unclamped.
    #[inline]
    pub fn eval(&self, x: f32) -> f32 {
        let Some((&first, rest)) = self.coefficients.split_first() else {
            return 0.0;
        };
        rest.iter().fold(first, |acc, &c| acc * x + c)
    }

    /// Evaluate every input into `outputs`, unclamped. Slices must match in length.
    pub fn evaluate(&self, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), outputs.len());
        for (out, &x) in outputs.iter_mut().zip(inputs) {
            *out = self.eval(x);
        }
    }

    pub fn evaluate_to_vec(&self, inputs: &[f32]) -> Vec<f32> {
        inputs.iter().map(|&x| self.eval(x)).collect()
    }

    /// Clamped curve over `samples` evenly spaced inputs in `[0, 1]`.
    pub fn sample_curve(&self, samples: usize) -> Vec<f32> {
        let inputs: Vec<f32> = match samples {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => (0..samples)
                .map(|i| i as f32 / (samples - 1) as f32)
                .collect(),
        };
        let mut curve = self.evaluate_to_vec(&inputs);
        clamp_unit(&mut curve);
        curve
    }
}

/// Clamp to the displayable range. NaN becomes 0.
#[inline]
pub fn clamp_unit_value(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

pub fn clamp_unit(values: &mut [f32]) {
    for v in values {
        *v = clamp_unit_value(*v);
    }
}
