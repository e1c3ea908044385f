use serde::{Deserialize, Serialize};

use crate::curve::Channel;
use crate::error::{Result, ToneError};

/// Order of the interleaved channels in one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOrder {
    Rgb,
    Rgba,
    /// RGB plus an unused padding channel.
    Rgbx,
    Bgra,
    Argb,
}

impl ChannelOrder {
    pub fn channel_count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba | Self::Rgbx | Self::Bgra | Self::Argb => 4,
        }
    }

    /// Interleaved slot holding a color channel.
    pub fn index_of(self, channel: Channel) -> usize {
        match (self, channel) {
            (Self::Rgb | Self::Rgba | Self::Rgbx, c) => c.index(),
            (Self::Bgra, Channel::Red) => 2,
            (Self::Bgra, Channel::Green) => 1,
            (Self::Bgra, Channel::Blue) => 0,
            (Self::Argb, c) => c.index() + 1,
        }
    }

    /// Slot of the alpha or padding channel, if any.
    pub fn passthrough_index(self) -> Option<usize> {
        match self {
            Self::Rgb => None,
            Self::Rgba | Self::Rgbx | Self::Bgra => Some(3),
            Self::Argb => Some(0),
        }
    }
}

/// Bit depth of the source the image was decoded from.
///
/// Samples are always held as normalized f32; the depth is kept so the image
/// can be re-encoded the way it arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    U8,
    U16,
    F32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelFormat {
    pub order: ChannelOrder,
    pub depth: BitDepth,
}

impl PixelFormat {
    pub fn new(order: ChannelOrder, depth: BitDepth) -> Self {
        Self { order, depth }
    }

    pub fn channel_count(&self) -> usize {
        self.order.channel_count()
    }
}

/// Interleaved multi-channel image with normalized f32 samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// `width * height * channel_count` samples, row-major, channels interleaved.
    pub data: Vec<f32>,
}

impl Image {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channel_count();
        Self {
            width,
            height,
            format,
            data: vec![0.0; len],
        }
    }

    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channel_count();
        if data.len() != expected {
            return Err(ToneError::ShapeMismatch(format!(
                "expected {expected} samples for {width}x{height} {:?}, got {}",
                format.order,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn channel_count(&self) -> usize {
        self.format.channel_count()
    }
}

/// One channel of an image as a dense row-major plane.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl PixelPlane {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ToneError::ShapeMismatch(format!(
                "expected {expected} samples for a {width}x{height} plane, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    pub fn same_shape(&self, other: &PixelPlane) -> bool {
        self.width == other.width && self.height == other.height
    }
}
