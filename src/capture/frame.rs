use std::fmt;

use v4l::format::FieldOrder;
use v4l::FourCC;

/// Negotiated frame layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub field: FieldMode,
    /// Bytes per line; zero lets the driver pick
    pub stride: u32,
}

impl FrameFormat {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat, field: FieldMode) -> Self {
        Self {
            width,
            height,
            pixel_format,
            field,
            stride: 0,
        }
    }

    /// Bytes per line, falling back to the packed YUYV pitch
    pub fn line_stride(&self) -> usize {
        if self.stride == 0 {
            packed_pitch(self.width)
        } else {
            self.stride as usize
        }
    }

    /// Bytes a complete frame occupies in the capture buffer
    pub fn frame_len(&self) -> usize {
        self.line_stride() * self.height as usize
    }
}

/// Bytes in one unpadded YUYV row; an odd trailing pixel still takes a
/// whole `Y0 U Y1 V` group
pub fn packed_pitch(width: u32) -> usize {
    (width as usize).div_ceil(2) * 4
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(640, 480, PixelFormat::Yuyv, FieldMode::Interlaced)
    }
}

/// Pixel formats the daemon recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 4:2:2, byte order Y0 U Y1 V
    Yuyv,
    /// Anything else the driver may substitute
    Other([u8; 4]),
}

impl From<FourCC> for PixelFormat {
    fn from(fourcc: FourCC) -> Self {
        if fourcc.repr == *b"YUYV" {
            PixelFormat::Yuyv
        } else {
            PixelFormat::Other(fourcc.repr)
        }
    }
}

impl From<PixelFormat> for FourCC {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Other(repr) => FourCC::new(&repr),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Yuyv => f.write_str("YUYV"),
            PixelFormat::Other(repr) => f.write_str(&String::from_utf8_lossy(repr)),
        }
    }
}

/// Field mode of the captured image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    Any,
    Progressive,
    Interlaced,
    /// Top/bottom/sequential variants we never request
    Other,
}

impl From<FieldOrder> for FieldMode {
    fn from(order: FieldOrder) -> Self {
        match order {
            FieldOrder::Any => FieldMode::Any,
            FieldOrder::Progressive => FieldMode::Progressive,
            FieldOrder::Interlaced => FieldMode::Interlaced,
            _ => FieldMode::Other,
        }
    }
}

impl From<FieldMode> for FieldOrder {
    fn from(mode: FieldMode) -> Self {
        match mode {
            FieldMode::Progressive => FieldOrder::Progressive,
            FieldMode::Interlaced => FieldOrder::Interlaced,
            FieldMode::Any | FieldMode::Other => FieldOrder::Any,
        }
    }
}

/// Location of the single capture buffer inside the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub index: u32,
    pub offset: u32,
    pub length: u32,
}

/// View of a filled capture buffer.
///
/// Borrowed from the device, so it cannot outlive the next enqueue.
#[derive(Debug)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub sequence: u32,
    pub format: FrameFormat,
}

impl RawFrame<'_> {
    /// Whether the driver filled fewer bytes than the format requires
    pub fn is_short(&self) -> bool {
        self.data.len() < self.format.frame_len()
    }
}
