use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw video pixel layouts understood by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar Y, U, V with 2x2 subsampled chroma.
    Yuv420p,
    /// Y plane followed by one interleaved UV plane.
    Nv12,
    /// Packed R, G, B, 3 bytes per pixel.
    Rgb24,
    /// Packed B, G, R, A, 4 bytes per pixel.
    Bgra,
    /// Packed A, R, G, B, 4 bytes per pixel.
    Argb,
}

/// Geometry of one image plane at alignment 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per row.
    pub stride: usize,
    pub rows: usize,
}

impl PlaneLayout {
    pub fn len(&self) -> usize {
        self.stride * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PixelFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Nv12 => "nv12",
            Self::Rgb24 => "rgb24",
            Self::Bgra => "bgra",
            Self::Argb => "argb",
        }
    }

    pub fn is_packed_rgb(&self) -> bool {
        matches!(self, Self::Rgb24 | Self::Bgra | Self::Argb)
    }

    /// Bytes per pixel for packed formats, `None` for planar YUV.
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Rgb24 => Some(3),
            Self::Bgra | Self::Argb => Some(4),
            Self::Yuv420p | Self::Nv12 => None,
        }
    }

    /// Plane layouts for a `width` x `height` image with no row padding.
    ///
    /// Odd dimensions round the chroma planes up.
    pub fn planes(&self, width: usize, height: usize) -> Vec<PlaneLayout> {
        let chroma_w = width.div_ceil(2);
        let chroma_h = height.div_ceil(2);
        match self {
            Self::Yuv420p => vec![
                PlaneLayout { stride: width, rows: height },
                PlaneLayout { stride: chroma_w, rows: chroma_h },
                PlaneLayout { stride: chroma_w, rows: chroma_h },
            ],
            Self::Nv12 => vec![
                PlaneLayout { stride: width, rows: height },
                PlaneLayout { stride: chroma_w * 2, rows: chroma_h },
            ],
            Self::Rgb24 | Self::Bgra | Self::Argb => {
                let bpp = self.packed_bytes_per_pixel().unwrap_or(4);
                vec![PlaneLayout { stride: width * bpp, rows: height }]
            }
        }
    }

    /// Total buffer size of one frame in this format.
    pub fn buffer_size(&self, width: usize, height: usize) -> usize {
        self.planes(width, height).iter().map(PlaneLayout::len).sum()
    }

    /// FourCC written into the container's colour space field.
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Yuv420p => *b"I420",
            Self::Nv12 => *b"NV12",
            Self::Rgb24 => [b'R', b'G', b'B', 24],
            Self::Bgra => *b"BGRA",
            Self::Argb => *b"ARGB",
        }
    }

    pub fn from_fourcc(fourcc: &[u8]) -> Option<Self> {
        [Self::Yuv420p, Self::Nv12, Self::Rgb24, Self::Bgra, Self::Argb]
            .into_iter()
            .find(|f| f.fourcc() == fourcc)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw audio sample layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    S16Planar,
    F32Planar,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 | Self::S16Planar => 2,
            Self::S32 | Self::F32 | Self::F32Planar => 4,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bytes_per_sample() as u16 * 8
    }

    pub fn is_planar(&self) -> bool {
        matches!(self, Self::S16Planar | Self::F32Planar)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F32Planar)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "f32",
            Self::S16Planar => "s16p",
            Self::F32Planar => "f32p",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
