//! Interleaved <-> planar conversion.

use crate::error::{Result, ToneError};
use crate::image_buf::{Image, PixelFormat, PixelPlane};

/// Split an interleaved image into one plane per channel, in interleaved order.
pub fn deinterleave(image: &Image) -> Vec<PixelPlane> {
    let channels = image.channel_count();
    let mut planes: Vec<PixelPlane> = (0..channels)
        .map(|_| PixelPlane {
            width: image.width,
            height: image.height,
            data: Vec::with_capacity(image.pixel_count()),
        })
        .collect();

    for pixel in image.data.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(pixel) {
            plane.data.push(sample);
        }
    }
    planes
}

/// Reassemble planes into a new interleaved image of the given format.
pub fn interleave(planes: &[PixelPlane], format: PixelFormat) -> Result<Image> {
    let (width, height) = check_planes(planes, format)?;
    let mut image = Image::new(width, height, format);
    write_interleaved(planes, &mut image.data);
    Ok(image)
}

/// Reassemble planes into an existing image buffer, reusing its allocation.
///
/// On a shape mismatch `image` is left untouched.
pub fn interleave_into(planes: &[PixelPlane], image: &mut Image) -> Result<()> {
    let (width, height) = check_planes(planes, image.format)?;
    if width != image.width || height != image.height {
        return Err(ToneError::ShapeMismatch(format!(
            "planes are {width}x{height}, image is {}x{}",
            image.width, image.height
        )));
    }
    write_interleaved(planes, &mut image.data);
    Ok(())
}

fn check_planes(planes: &[PixelPlane], format: PixelFormat) -> Result<(u32, u32)> {
    if planes.len() != format.channel_count() {
        return Err(ToneError::ShapeMismatch(format!(
            "{} planes for {:?} ({} channels)",
            planes.len(),
            format.order,
            format.channel_count()
        )));
    }
    let first = &planes[0];
    for (i, plane) in planes.iter().enumerate() {
        if !plane.same_shape(first) || plane.data.len() != first.pixel_count() {
            return Err(ToneError::ShapeMismatch(format!(
                "plane {i} is {}x{}, plane 0 is {}x{}",
                plane.width, plane.height, first.width, first.height
            )));
        }
    }
    if first.data.len() != first.width as usize * first.height as usize {
        return Err(ToneError::ShapeMismatch(format!(
            "plane holds {} samples for {}x{}",
            first.data.len(),
            first.width,
            first.height
        )));
    }
    Ok((first.width, first.height))
}

fn write_interleaved(planes: &[PixelPlane], out: &mut [f32]) {
    let channels = planes.len();
    for (i, pixel) in out.chunks_exact_mut(channels).enumerate() {
        for (slot, plane) in pixel.iter_mut().zip(planes) {
            *slot = plane.data[i];
        }
    }
}
