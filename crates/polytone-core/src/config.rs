use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::curve::{Channel, ControlPoints, CurvePreset, DEFAULT_POINT_COUNT};
use crate::planar::PARALLEL_THRESHOLD;
use crate::polynomial::PREVIEW_SAMPLES;

/// Longest edge an input is scaled down to before editing.
pub const DEFAULT_MAX_EDGE: u32 = 1024;

/// Fixed parameters of an editing session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Control points per curve; also the polynomial's coefficient count.
    pub point_count: usize,
    /// Planes with at least this many pixels are transformed in parallel.
    pub parallel_threshold: usize,
    /// Samples in a curve preview.
    pub preview_samples: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            point_count: DEFAULT_POINT_COUNT,
            parallel_threshold: PARALLEL_THRESHOLD,
            preview_samples: PREVIEW_SAMPLES,
        }
    }
}

/// Curve for one channel, either explicit points or a named preset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurveSpec {
    Points(ControlPoints),
    Preset(CurvePreset),
}

impl CurveSpec {
    pub fn to_points(&self, count: usize) -> ControlPoints {
        match self {
            Self::Points(points) => points.clone(),
            Self::Preset(preset) => preset.points(count),
        }
    }
}

/// Whether curves act on encoded sRGB values or on linear light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transfer {
    #[default]
    Encoded,
    Linear,
}

/// Persistable edit settings: a session config plus per-channel curves.
///
/// ```json
/// { "red": [0.0, 0.3, 0.5, 0.7, 1.0], "blue": "invert", "max_edge": 2048 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    #[serde(flatten)]
    pub session: SessionConfig,
    pub red: Option<CurveSpec>,
    pub green: Option<CurveSpec>,
    pub blue: Option<CurveSpec>,
    /// Inputs larger than this are scaled down first. `None` keeps full size.
    pub max_edge: Option<u32>,
    pub transfer: Transfer,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            red: None,
            green: None,
            blue: None,
            max_edge: Some(DEFAULT_MAX_EDGE),
            transfer: Transfer::Encoded,
        }
    }
}

impl ToneSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read settings: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parse settings: {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn curve(&self, channel: Channel) -> Option<&CurveSpec> {
        match channel {
            Channel::Red => self.red.as_ref(),
            Channel::Green => self.green.as_ref(),
            Channel::Blue => self.blue.as_ref(),
        }
    }

    pub fn set_curve(&mut self, channel: Channel, spec: CurveSpec) {
        let slot = match channel {
            Channel::Red => &mut self.red,
            Channel::Green => &mut self.green,
            Channel::Blue => &mut self.blue,
        };
        *slot = Some(spec);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_reference() {
        let settings = ToneSettings::default();
        assert_eq!(settings.session.point_count, 5);
        assert_eq!(settings.session.preview_samples, 256);
        assert_eq!(settings.max_edge, Some(1024));
        assert_eq!(settings.transfer, Transfer::Encoded);
        assert!(settings.red.is_none());
    }

    #[test]
    fn parses_points_and_presets() {
        let settings = ToneSettings::from_json(
            r#"{ "red": [0.0, 0.3, 0.5, 0.7, 1.0], "blue": "invert", "transfer": "linear" }"#,
        )
        .unwrap();
        assert_eq!(
            settings.curve(Channel::Red),
            Some(&CurveSpec::Points(ControlPoints::new(vec![0.0, 0.3, 0.5, 0.7, 1.0])))
        );
        assert_eq!(
            settings.curve(Channel::Blue),
            Some(&CurveSpec::Preset(CurvePreset::Invert))
        );
        assert!(settings.curve(Channel::Green).is_none());
        assert_eq!(settings.transfer, Transfer::Linear);
        // Unspecified fields keep their defaults.
        assert_eq!(settings.session.point_count, 5);
        assert_eq!(settings.max_edge, Some(1024));
    }

    #[test]
    fn flattened_session_fields() {
        let settings =
            ToneSettings::from_json(r#"{ "point_count": 7, "max_edge": null }"#).unwrap();
        assert_eq!(settings.session.point_count, 7);
        assert_eq!(settings.max_edge, None);
    }

    #[test]
    fn json_roundtrip() {
        let mut settings = ToneSettings::default();
        settings.set_curve(Channel::Green, CurveSpec::Preset(CurvePreset::Contrast));
        settings.set_curve(
            Channel::Red,
            CurveSpec::Points(ControlPoints::new(vec![0.0, 0.5, 1.0])),
        );
        let json = settings.to_json().unwrap();
        let back = ToneSettings::from_json(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn preset_expands_to_points() {
        let spec = CurveSpec::Preset(CurvePreset::Zero);
        assert_eq!(spec.to_points(3).values(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "green": "zero" }}"#).unwrap();
        let settings = ToneSettings::load(file.path()).unwrap();
        assert_eq!(
            settings.curve(Channel::Green),
            Some(&CurveSpec::Preset(CurvePreset::Zero))
        );
    }

    #[test]
    fn load_reports_path() {
        let err = ToneSettings::load(Path::new("/nonexistent/polytone.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/polytone.json"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(ToneSettings::from_json("{ \"red\": 12 }").is_err());
    }
}
