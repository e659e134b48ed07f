use std::fmt;

use crate::models::formats::{PixelFormat, SampleFormat};
use crate::models::state::StreamKind;

/// Identifiers of the encoders compiled into the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// Lossless intra-only video: every frame stored verbatim as one keyframe.
    RawVideo,
    PcmU8,
    PcmS16Le,
    PcmS32Le,
    PcmF32Le,
}

impl CodecId {
    /// Matroska `CodecID` string for this codec.
    pub fn matroska_id(&self) -> &'static str {
        match self {
            Self::RawVideo => "V_UNCOMPRESSED",
            Self::PcmU8 | Self::PcmS16Le | Self::PcmS32Le => "A_PCM/INT/LIT",
            Self::PcmF32Le => "A_PCM/FLOAT/IEEE",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = find_encoder(*self).map(|d| d.name).unwrap_or("unknown");
        f.write_str(name)
    }
}

/// Static description of an encoder.
#[derive(Debug)]
pub struct CodecDescriptor {
    pub id: CodecId,
    pub name: &'static str,
    pub kind: StreamKind,
    pub pixel_formats: &'static [PixelFormat],
    pub sample_formats: &'static [SampleFormat],
    pub lossless: bool,
    pub intra_only: bool,
}

impl CodecDescriptor {
    pub fn supports_pixel_format(&self, format: PixelFormat) -> bool {
        self.pixel_formats.contains(&format)
    }

    pub fn supports_sample_format(&self, format: SampleFormat) -> bool {
        self.sample_formats.contains(&format)
    }
}

/// Encoder flags set by the container before the codec is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecFlags {
    /// Codec configuration goes into the container header instead of
    /// in-band with the first packet.
    pub global_header: bool,
}

static ENCODERS: [CodecDescriptor; 5] = [
    CodecDescriptor {
        id: CodecId::RawVideo,
        name: "rawvideo",
        kind: StreamKind::Video,
        pixel_formats: &[
            PixelFormat::Yuv420p,
            PixelFormat::Nv12,
            PixelFormat::Rgb24,
            PixelFormat::Bgra,
            PixelFormat::Argb,
        ],
        sample_formats: &[],
        lossless: true,
        intra_only: true,
    },
    CodecDescriptor {
        id: CodecId::PcmU8,
        name: "pcm_u8",
        kind: StreamKind::Audio,
        pixel_formats: &[],
        sample_formats: &[SampleFormat::U8],
        lossless: true,
        intra_only: true,
    },
    CodecDescriptor {
        id: CodecId::PcmS16Le,
        name: "pcm_s16le",
        kind: StreamKind::Audio,
        pixel_formats: &[],
        sample_formats: &[SampleFormat::S16],
        lossless: true,
        intra_only: true,
    },
    CodecDescriptor {
        id: CodecId::PcmS32Le,
        name: "pcm_s32le",
        kind: StreamKind::Audio,
        pixel_formats: &[],
        sample_formats: &[SampleFormat::S32],
        lossless: true,
        intra_only: true,
    },
    CodecDescriptor {
        id: CodecId::PcmF32Le,
        name: "pcm_f32le",
        kind: StreamKind::Audio,
        pixel_formats: &[],
        sample_formats: &[SampleFormat::F32],
        lossless: true,
        intra_only: true,
    },
];

/// Look up an encoder by id.
pub fn find_encoder(id: CodecId) -> Option<&'static CodecDescriptor> {
    ENCODERS.iter().find(|d| d.id == id)
}

/// The PCM encoder that stores `format` without conversion.
///
/// Planar layouts have no PCM encoder.
pub fn pcm_encoder_for(format: SampleFormat) -> Option<&'static CodecDescriptor> {
    ENCODERS
        .iter()
        .find(|d| d.kind == StreamKind::Audio && d.supports_sample_format(format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_encoder_is_lossless_intra() {
        let desc = find_encoder(CodecId::RawVideo).unwrap();
        assert_eq!(desc.kind, StreamKind::Video);
        assert!(desc.lossless && desc.intra_only);
        assert!(desc.supports_pixel_format(PixelFormat::Yuv420p));
    }

    #[test]
    fn pcm_lookup_by_sample_format() {
        assert_eq!(pcm_encoder_for(SampleFormat::S16).map(|d| d.id), Some(CodecId::PcmS16Le));
        assert_eq!(pcm_encoder_for(SampleFormat::F32).map(|d| d.id), Some(CodecId::PcmF32Le));
        assert!(pcm_encoder_for(SampleFormat::S16Planar).is_none());
    }

    #[test]
    fn matroska_codec_ids() {
        assert_eq!(CodecId::RawVideo.matroska_id(), "V_UNCOMPRESSED");
        assert_eq!(CodecId::PcmS16Le.matroska_id(), "A_PCM/INT/LIT");
        assert_eq!(CodecId::PcmF32Le.matroska_id(), "A_PCM/FLOAT/IEEE");
        assert_eq!(CodecId::PcmS16Le.to_string(), "pcm_s16le");
    }
}
