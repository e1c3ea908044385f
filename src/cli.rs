use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use polytone_core::config::{CurveSpec, ToneSettings, Transfer};
use polytone_core::{Channel, ControlPoints, CurvePreset};

#[derive(Parser, Debug)]
#[command(name = "polytone")]
#[command(about = "Per-channel polynomial tone curves from a handful of control points")]
pub struct Cli {
    /// Input image (JPEG, PNG or TIFF)
    pub input: PathBuf,

    /// Output image; format follows the extension
    pub output: PathBuf,

    /// JSON settings file with curves and session options
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Red control points, comma-separated (e.g. "0,0.3,0.5,0.7,1")
    #[arg(long, value_parser = parse_points)]
    pub red: Option<ControlPoints>,

    /// Green control points, comma-separated
    #[arg(long, value_parser = parse_points)]
    pub green: Option<ControlPoints>,

    /// Blue control points, comma-separated
    #[arg(long, value_parser = parse_points)]
    pub blue: Option<ControlPoints>,

    /// Apply a preset to every channel before per-channel overrides
    #[arg(long, value_enum)]
    pub preset_all: Option<PresetArg>,

    /// Scale the input down so its longest edge is at most this many pixels
    #[arg(long)]
    pub max_edge: Option<u32>,

    /// Edit linear light instead of sRGB-encoded values
    #[arg(long)]
    pub linear: bool,

    /// Write a PNG plot of the three curves
    #[arg(long)]
    pub curve_plot: Option<PathBuf>,

    /// Print each channel's coefficients, highest degree first
    #[arg(long)]
    pub print_coefficients: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    Identity,
    Zero,
    Invert,
    Contrast,
}

impl From<PresetArg> for CurvePreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Identity => CurvePreset::Identity,
            PresetArg::Zero => CurvePreset::Zero,
            PresetArg::Invert => CurvePreset::Invert,
            PresetArg::Contrast => CurvePreset::Contrast,
        }
    }
}

impl Cli {
    /// Settings file (or defaults) with command-line flags layered on top.
    pub fn settings(&self) -> Result<ToneSettings> {
        let mut settings = match &self.settings {
            Some(path) => ToneSettings::load(path)?,
            None => ToneSettings::default(),
        };

        if let Some(preset) = self.preset_all {
            for channel in Channel::ALL {
                settings.set_curve(channel, CurveSpec::Preset(preset.into()));
            }
        }
        for (channel, points) in [
            (Channel::Red, &self.red),
            (Channel::Green, &self.green),
            (Channel::Blue, &self.blue),
        ] {
            if let Some(points) = points {
                settings.set_curve(channel, CurveSpec::Points(points.clone()));
            }
        }
        if self.max_edge.is_some() {
            settings.max_edge = self.max_edge;
        }
        if self.linear {
            settings.transfer = Transfer::Linear;
        }
        Ok(settings)
    }
}

fn parse_points(s: &str) -> Result<ControlPoints> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid control point {v:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ControlPoints::new(values))
}
