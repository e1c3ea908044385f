use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{debug, info};

use polytone_core::config::{DEFAULT_MAX_EDGE, ToneSettings, Transfer};
use polytone_core::{BitDepth, ChannelOrder, Image, PixelFormat};

use crate::color::{decode_srgb, srgb_u8_to_linear};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif"];

pub fn is_supported_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    /// Longest edge after loading. Larger inputs are scaled down.
    pub max_edge: Option<u32>,
    pub transfer: Transfer,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_edge: Some(DEFAULT_MAX_EDGE),
            transfer: Transfer::Encoded,
        }
    }
}

impl From<&ToneSettings> for LoadOptions {
    fn from(settings: &ToneSettings) -> Self {
        Self {
            max_edge: settings.max_edge,
            transfer: settings.transfer,
        }
    }
}

/// Load a JPEG, PNG or TIFF as a normalized f32 `Rgb`/`Rgba` image.
///
/// Resizing happens on the decoded samples before the f32 conversion, so
/// pixels that would be thrown away are never converted.
pub fn load_image(path: &Path, options: &LoadOptions) -> Result<Image> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !is_supported_extension(ext) {
        bail!("unsupported image type: {}", path.display());
    }
    info!(?path, "loading image file");
    let t0 = Instant::now();

    let img =
        image::open(path).with_context(|| format!("failed to open image: {}", path.display()))?;
    debug!(
        elapsed_ms = t0.elapsed().as_millis(),
        width = img.width(),
        height = img.height(),
        color = ?img.color(),
        "image decode"
    );

    let img = match options.max_edge {
        Some(max) if img.width().max(img.height()) > max => {
            let t1 = Instant::now();
            let resized = img.resize(max, max, FilterType::Triangle);
            debug!(
                elapsed_ms = t1.elapsed().as_millis(),
                width = resized.width(),
                height = resized.height(),
                "resize"
            );
            resized
        }
        _ => img,
    };

    let image = from_dynamic_image(img, options.transfer)
        .with_context(|| format!("unsupported pixel layout: {}", path.display()))?;
    debug!(elapsed_ms = t0.elapsed().as_millis(), "total load_image");
    Ok(image)
}

/// Convert a decoded image, recording its bit depth for re-encoding.
pub fn from_dynamic_image(img: DynamicImage, transfer: Transfer) -> Result<Image> {
    let color = img.color();
    let depth = match color.bytes_per_pixel() / color.channel_count() {
        1 => BitDepth::U8,
        2 => BitDepth::U16,
        _ => BitDepth::F32,
    };
    let order = if color.has_alpha() {
        ChannelOrder::Rgba
    } else {
        ChannelOrder::Rgb
    };
    let (width, height) = (img.width(), img.height());

    if depth == BitDepth::U8 && transfer == Transfer::Linear {
        let data = u8_to_linear(img, order);
        return Ok(Image::from_data(width, height, PixelFormat::new(order, depth), data)?);
    }

    let data = match order {
        ChannelOrder::Rgba => img.into_rgba32f().into_raw(),
        _ => img.into_rgb32f().into_raw(),
    };
    let mut image = Image::from_data(width, height, PixelFormat::new(order, depth), data)?;
    if transfer == Transfer::Linear {
        decode_srgb(&mut image);
    }
    Ok(image)
}

fn u8_to_linear(img: DynamicImage, order: ChannelOrder) -> Vec<f32> {
    match order {
        ChannelOrder::Rgba => img
            .into_rgba8()
            .pixels()
            .flat_map(|p| {
                let [r, g, b, a] = p.0;
                [
                    srgb_u8_to_linear(r),
                    srgb_u8_to_linear(g),
                    srgb_u8_to_linear(b),
                    a as f32 / 255.0,
                ]
            })
            .collect(),
        _ => img
            .into_rgb8()
            .into_raw()
            .into_iter()
            .map(srgb_u8_to_linear)
            .collect(),
    }
}
