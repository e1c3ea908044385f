use std::fmt;

use serde::{Deserialize, Serialize};

use crate::basis::ramp_positions;
use crate::error::{Result, ToneError};

/// Number of control points per curve.
pub const DEFAULT_POINT_COUNT: usize = 5;

/// Tone-editable color channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Desired curve outputs at evenly spaced inputs `0, 1/(n-1), ..., 1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlPoints(Vec<f32>);

impl ControlPoints {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Points on the diagonal: a linear response.
    pub fn identity(count: usize) -> Self {
        Self(ramp_positions(count).into_iter().map(|p| p as f32).collect())
    }

    pub fn constant(count: usize, value: f32) -> Self {
        Self(vec![value; count])
    }

    /// `1 - v` for every point.
    pub fn inverted(&self) -> Self {
        Self(self.0.iter().map(|v| 1.0 - v).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn set(&mut self, index: usize, value: f32) -> Result<()> {
        let len = self.0.len();
        let slot = self.0.get_mut(index).ok_or_else(|| {
            ToneError::ShapeMismatch(format!("control point {index} out of range for {len} points"))
        })?;
        *slot = value;
        Ok(())
    }
}

/// Canned curve shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurvePreset {
    Identity,
    Zero,
    Invert,
    /// Gentle S-curve: shadows down, highlights up.
    Contrast,
}

impl CurvePreset {
    pub fn points(self, count: usize) -> ControlPoints {
        match self {
            Self::Identity => ControlPoints::identity(count),
            Self::Zero => ControlPoints::constant(count, 0.0),
            Self::Invert => ControlPoints::identity(count).inverted(),
            Self::Contrast => {
                let positions = ramp_positions(count);
                ControlPoints::new(
                    positions
                        .iter()
                        .map(|&x| {
                            let x = x as f32;
                            // Smoothstep pulled halfway back toward the diagonal.
                            let s = x * x * (3.0 - 2.0 * x);
                            0.5 * (x + s)
                        })
                        .collect(),
                )
            }
        }
    }
}
