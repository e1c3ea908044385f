//! Per-channel polynomial tone curves.
//!
//! A curve is a handful of control points sampled at evenly spaced inputs.
//! The points are fitted exactly by a polynomial (one coefficient per point)
//! which is then evaluated over every pixel of a colour plane.

pub mod basis;
pub mod config;
pub mod convert;
pub mod curve;
pub mod error;
pub mod image_buf;
pub mod planar;
pub mod polynomial;
pub mod render;
pub mod session;
pub mod solver;

pub use basis::BasisMatrix;
pub use config::{CurveSpec, SessionConfig, ToneSettings, Transfer};
pub use curve::{Channel, ControlPoints, CurvePreset};
pub use error::{Result, ToneError};
pub use image_buf::{BitDepth, ChannelOrder, Image, PixelFormat, PixelPlane};
pub use planar::{PlanarTransformer, SegmentedPolynomial};
pub use polynomial::Polynomial;
pub use render::{BackgroundRenderer, ChannelRender};
pub use session::{SessionEvent, SessionState, ToneSession};
