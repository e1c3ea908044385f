use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
use tracing::{debug, info};

use polytone_core::config::Transfer;
use polytone_core::polynomial::clamp_unit_value;
use polytone_core::{BitDepth, Channel, ChannelOrder, Image};

/// Convert to an `image` buffer at the recorded bit depth.
///
/// Channels are reordered to RGB(A); padding is dropped. Samples are clamped
/// to [0,1] and written as-is, so a linear image should be encoded first.
pub fn to_dynamic_image(image: &Image) -> Result<DynamicImage> {
    let samples = rgb_samples(image);
    let has_alpha = has_alpha(image.format.order);
    let (w, h) = (image.width, image.height);

    let dynamic = match (image.format.depth, has_alpha) {
        (BitDepth::U8, false) => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(w, h, quantize(&samples, u8::MAX as f32))
                .context("rgb8 buffer size")?,
        ),
        (BitDepth::U8, true) => DynamicImage::ImageRgba8(
            ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(w, h, quantize(&samples, u8::MAX as f32))
                .context("rgba8 buffer size")?,
        ),
        (BitDepth::U16, false) => DynamicImage::ImageRgb16(
            ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w, h, quantize(&samples, u16::MAX as f32))
                .context("rgb16 buffer size")?,
        ),
        (BitDepth::U16, true) => DynamicImage::ImageRgba16(
            ImageBuffer::<Rgba<u16>, Vec<u16>>::from_raw(w, h, quantize(&samples, u16::MAX as f32))
                .context("rgba16 buffer size")?,
        ),
        (BitDepth::F32, false) => DynamicImage::ImageRgb32F(
            ImageBuffer::<Rgb<f32>, Vec<f32>>::from_raw(w, h, samples)
                .context("rgb32f buffer size")?,
        ),
        (BitDepth::F32, true) => DynamicImage::ImageRgba32F(
            ImageBuffer::<Rgba<f32>, Vec<f32>>::from_raw(w, h, samples)
                .context("rgba32f buffer size")?,
        ),
    };
    Ok(dynamic)
}

/// Encode `image` to `path`, picking the format from the extension.
///
/// With [`Transfer::Linear`] the color channels are re-encoded to sRGB first.
/// Float images are written as 16-bit, JPEG output is always 8-bit RGB.
pub fn save_image(image: &Image, path: &Path, transfer: Transfer) -> Result<()> {
    info!(?path, "saving image");
    let t0 = Instant::now();

    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unknown output format: {}", path.display()))?;

    let dynamic = match transfer {
        Transfer::Encoded => to_dynamic_image(image)?,
        Transfer::Linear => {
            let mut encoded = image.clone();
            crate::color::encode_srgb(&mut encoded);
            to_dynamic_image(&encoded)?
        }
    };

    let dynamic = match (format, dynamic) {
        (ImageFormat::Jpeg, d) => DynamicImage::ImageRgb8(d.to_rgb8()),
        (_, d @ DynamicImage::ImageRgb32F(_)) => DynamicImage::ImageRgb16(d.to_rgb16()),
        (_, d @ DynamicImage::ImageRgba32F(_)) => DynamicImage::ImageRgba16(d.to_rgba16()),
        (_, d) => d,
    };

    dynamic
        .save_with_format(path, format)
        .with_context(|| format!("failed to write image: {}", path.display()))?;
    debug!(elapsed_ms = t0.elapsed().as_millis(), ?format, "encode");
    Ok(())
}

fn has_alpha(order: ChannelOrder) -> bool {
    matches!(
        order,
        ChannelOrder::Rgba | ChannelOrder::Bgra | ChannelOrder::Argb
    )
}

fn rgb_samples(image: &Image) -> Vec<f32> {
    let order = image.format.order;
    let slots = Channel::ALL.map(|c| order.index_of(c));
    let alpha = order.passthrough_index().filter(|_| has_alpha(order));
    let out_channels = 3 + usize::from(alpha.is_some());

    let mut out = Vec::with_capacity(image.pixel_count() * out_channels);
    for pixel in image.data.chunks_exact(image.channel_count()) {
        out.extend(slots.iter().map(|&s| clamp_unit_value(pixel[s])));
        if let Some(a) = alpha {
            out.push(clamp_unit_value(pixel[a]));
        }
    }
    out
}

fn quantize<T: FromUnit>(samples: &[f32], max: f32) -> Vec<T> {
    samples.iter().map(|&v| T::from_unit(v * max)).collect()
}

trait FromUnit {
    fn from_unit(scaled: f32) -> Self;
}

impl FromUnit for u8 {
    fn from_unit(scaled: f32) -> Self {
        scaled.round() as u8
    }
}

impl FromUnit for u16 {
    fn from_unit(scaled: f32) -> Self {
        scaled.round() as u16
    }
}

#[cfg(test)]
mod tests {
    use polytone_core::PixelFormat;

    use super::*;
    use crate::load::{LoadOptions, load_image};

    fn image(order: ChannelOrder, depth: BitDepth, data: Vec<f32>) -> Image {
        let format = PixelFormat::new(order, depth);
        let pixels = data.len() / format.channel_count();
        Image::from_data(pixels as u32, 1, format, data).unwrap()
    }

    #[test]
    fn reorders_to_rgba() {
        let img = image(ChannelOrder::Bgra, BitDepth::U8, vec![0.0, 0.5, 1.0, 1.0]);
        let DynamicImage::ImageRgba8(buf) = to_dynamic_image(&img).unwrap() else {
            panic!("expected rgba8");
        };
        assert_eq!(buf.get_pixel(0, 0).0, [255, 128, 0, 255]);
    }

    #[test]
    fn drops_padding_and_clamps() {
        let img = image(ChannelOrder::Rgbx, BitDepth::U16, vec![-0.5, 2.0, f32::NAN, 0.3]);
        let DynamicImage::ImageRgb16(buf) = to_dynamic_image(&img).unwrap() else {
            panic!("expected rgb16");
        };
        assert_eq!(buf.get_pixel(0, 0).0, [0, 65535, 0]);
    }

    #[test]
    fn argb_alpha_moves_last() {
        let img = image(ChannelOrder::Argb, BitDepth::F32, vec![0.25, 1.0, 0.5, 0.0]);
        let DynamicImage::ImageRgba32F(buf) = to_dynamic_image(&img).unwrap() else {
            panic!("expected rgba32f");
        };
        assert_eq!(buf.get_pixel(0, 0).0, [1.0, 0.5, 0.0, 0.25]);
    }

    #[test]
    fn png_u8_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let img = image(
            ChannelOrder::Rgb,
            BitDepth::U8,
            vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0],
        );
        save_image(&img, &path, Transfer::Encoded).unwrap();

        let back = load_image(&path, &LoadOptions::default()).unwrap();
        assert_eq!(back.format, img.format);
        for (a, b) in back.data.iter().zip(&img.data) {
            assert!((a - b).abs() <= 0.5 / 255.0 + 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn float_falls_back_to_u16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.png");
        let img = image(ChannelOrder::Rgb, BitDepth::F32, vec![0.1, 0.5, 0.9]);
        save_image(&img, &path, Transfer::Encoded).unwrap();

        let back = load_image(&path, &LoadOptions::default()).unwrap();
        assert_eq!(back.format.depth, BitDepth::U16);
        for (a, b) in back.data.iter().zip(&img.data) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn linear_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear.png");
        let img = image(ChannelOrder::Rgb, BitDepth::U16, vec![0.05, 0.2, 0.7]);
        save_image(&img, &path, Transfer::Linear).unwrap();

        let options = LoadOptions {
            transfer: Transfer::Linear,
            ..LoadOptions::default()
        };
        let back = load_image(&path, &options).unwrap();
        for (a, b) in back.data.iter().zip(&img.data) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let img = image(ChannelOrder::Rgba, BitDepth::U16, vec![0.5; 16]);
        save_image(&img, &path, Transfer::Encoded).unwrap();

        let back = load_image(&path, &LoadOptions::default()).unwrap();
        assert_eq!(back.format, PixelFormat::new(ChannelOrder::Rgb, BitDepth::U8));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(ChannelOrder::Rgb, BitDepth::U8, vec![0.0; 3]);
        let err = save_image(&img, &dir.path().join("out.xyz"), Transfer::Encoded).unwrap_err();
        assert!(format!("{err:#}").contains("out.xyz"));
    }
}
