use std::sync::LazyLock;

use polytone_core::{Channel, Image};

/// Inverse sRGB EOTF (IEC 61966-2-1): linear light [0,1] -> perceptual sRGB [0,1].
pub fn linear_to_srgb(x: f32) -> f32 {
    if x <= 0.0031308 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB EOTF (IEC 61966-2-1): perceptual sRGB [0,1] -> linear light [0,1].
pub fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

/// Exact 256-entry table for 8-bit sources.
static SRGB_U8_TO_LINEAR: LazyLock<[f32; 256]> = LazyLock::new(|| {
    let mut lut = [0.0f32; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = srgb_to_linear(i as f32 / 255.0);
    }
    lut
});

pub fn srgb_u8_to_linear(v: u8) -> f32 {
    SRGB_U8_TO_LINEAR[v as usize]
}

/// Decode the color channels of `image` from sRGB to linear light.
/// Alpha and padding are left alone.
pub fn decode_srgb(image: &mut Image) {
    map_color_channels(image, srgb_to_linear);
}

/// Encode the color channels of `image` from linear light to sRGB.
pub fn encode_srgb(image: &mut Image) {
    map_color_channels(image, |v| linear_to_srgb(v.clamp(0.0, 1.0)));
}

fn map_color_channels(image: &mut Image, f: impl Fn(f32) -> f32) {
    let channels = image.channel_count();
    let slots = Channel::ALL.map(|c| image.format.order.index_of(c));
    for pixel in image.data.chunks_exact_mut(channels) {
        for &slot in &slots {
            pixel[slot] = f(pixel[slot]);
        }
    }
}
