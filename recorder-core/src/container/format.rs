use std::path::Path;

use crate::codec::registry::CodecId;
use crate::models::formats::{PixelFormat, SampleFormat};
use crate::models::rational::Rational;
use crate::models::state::StreamKind;

/// Capabilities a container format advertises to the codecs feeding it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    /// Codec configuration must live in the container header.
    pub global_header: bool,
}

/// Output container format descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub flags: FormatFlags,
    pub video_codec: Option<CodecId>,
    pub audio_codec: Option<CodecId>,
}

impl OutputFormat {
    pub fn matroska() -> Self {
        Self {
            name: "matroska",
            extensions: &["mkv"],
            flags: FormatFlags { global_header: true },
            video_codec: None,
            audio_codec: None,
        }
    }

    /// Derive the output format from a file name's extension.
    pub fn guess(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [Self::matroska()]
            .into_iter()
            .find(|f| f.extensions.contains(&ext.as_str()))
    }

    /// Pin the codecs this output will carry.
    pub fn with_codecs(mut self, video: CodecId, audio: CodecId) -> Self {
        self.video_codec = Some(video);
        self.audio_codec = Some(audio);
        self
    }
}

/// Codec parameters of one output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamParameters {
    Video {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        frame_rate: Rational,
    },
    Audio {
        channels: u16,
        sample_rate: u32,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    },
}

/// One output stream registered with the container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: CodecId,
    pub time_base: Rational,
    pub parameters: StreamParameters,
    /// Codec configuration for the header, when the codec has any.
    pub extradata: Option<Vec<u8>>,
}

impl StreamDescriptor {
    /// Short description such as `1920x1080 yuv420p @ 30/1`.
    pub fn describe(&self) -> String {
        match &self.parameters {
            StreamParameters::Video {
                width,
                height,
                pixel_format,
                frame_rate,
            } => format!("{}x{} {} @ {}", width, height, pixel_format, frame_rate),
            StreamParameters::Audio {
                channels,
                sample_rate,
                sample_format,
                ..
            } => format!("{}ch {}Hz {}", channels, sample_rate, sample_format),
        }
    }
}
