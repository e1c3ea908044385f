use crate::error::{Result, ToneError};

/// Power-basis (Vandermonde) matrix over a fixed set of sample positions.
///
/// Stored row-major, one row per position: entry `(r, c)` is `positions[r]^c`.
/// Built once per session and shared read-only between channels.
#[derive(Clone, Debug, PartialEq)]
pub struct BasisMatrix {
    positions: Vec<f64>,
    data: Vec<f64>,
}

impl BasisMatrix {
    pub fn build(positions: &[f64]) -> Result<Self> {
        if positions.is_empty() {
            return Err(ToneError::DegenerateBasis("no basis positions".into()));
        }
        if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
            return Err(ToneError::DegenerateBasis(format!(
                "position {i} is not finite ({})",
                positions[i]
            )));
        }
        if let Some(i) = positions.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ToneError::DegenerateBasis(format!(
                "positions must be strictly increasing: [{i}]={} >= [{}]={}",
                positions[i],
                i + 1,
                positions[i + 1]
            )));
        }

        let n = positions.len();
        let mut data = Vec::with_capacity(n * n);
        for &p in positions {
            let mut power = 1.0;
            for _ in 0..n {
                data.push(power);
                power *= p;
            }
        }

        Ok(Self {
            positions: positions.to_vec(),
            data,
        })
    }

    /// Basis over `count` evenly spaced positions spanning `[0, 1]`.
    pub fn ramp(count: usize) -> Result<Self> {
        Self::build(&ramp_positions(count))
    }

    pub fn size(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size() + col]
    }

    /// Row-major entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// `count` evenly spaced values from 0 to 1 inclusive.
pub fn ramp_positions(count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let step = 1.0 / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { 1.0 } else { i as f64 * step })
                .collect()
        }
    }
}
