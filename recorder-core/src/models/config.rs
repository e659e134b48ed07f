use std::time::Duration;

use super::formats::{PixelFormat, SampleFormat};
use super::rational::Rational;

/// Parameters for the video stream context.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,

    /// Layout of the buffers handed to `submit_video_frame`.
    pub input_format: PixelFormat,

    /// Layout stored in the output file.
    pub output_format: PixelFormat,

    /// Declared frame rate, e.g. `30000/1001`.
    pub fps: Rational,
}

impl VideoConfig {
    pub fn new(
        width: u32,
        height: u32,
        input_format: PixelFormat,
        fps_num: u32,
        fps_den: u32,
        output_format: PixelFormat,
    ) -> Self {
        Self {
            width,
            height,
            input_format,
            output_format,
            fps: Rational::new(fps_num as i64, fps_den as i64),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid frame size {}x{}", self.width, self.height));
        }
        if !self.fps.is_valid() {
            return Err(format!("invalid frame rate {}", self.fps));
        }
        Ok(())
    }

    /// Stream time base: one tick per frame interval.
    pub fn time_base(&self) -> Rational {
        self.fps.invert().reduced()
    }

    /// Expected byte length of one input buffer.
    pub fn input_frame_size(&self) -> usize {
        self.input_format
            .buffer_size(self.width as usize, self.height as usize)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self::new(1920, 1080, PixelFormat::Bgra, 30, 1, PixelFormat::Yuv420p)
    }
}

/// Parameters for the audio stream context.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub channels: u16,
    pub sample_rate: u32,

    /// Significant bits per sample; may be lower than the sample format width.
    pub bits_per_sample: u16,

    pub sample_format: SampleFormat,

    /// Byte alignment of one sample block (all channels of one sample).
    pub block_align: u16,
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("channel count must be positive".into());
        }
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.bits_per_sample == 0 || self.bits_per_sample > self.sample_format.bits_per_sample() {
            return Err(format!(
                "bits per sample {} does not fit sample format {}",
                self.bits_per_sample, self.sample_format
            ));
        }
        Ok(())
    }

    /// Size of one sample block in bytes, honouring `block_align`.
    pub fn block_size(&self) -> usize {
        let unaligned = self.channels as usize * self.sample_format.bytes_per_sample();
        let align = self.block_align as usize;
        if align <= 1 {
            unaligned
        } else {
            unaligned.div_ceil(align) * align
        }
    }

    pub fn bit_rate(&self) -> u64 {
        self.sample_rate as u64 * self.bits_per_sample as u64 * self.channels as u64
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::S16,
            block_align: 4,
        }
    }
}

/// Session-wide behaviour that is not tied to one stream.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound for every readiness wait (None = wait forever).
    pub ready_timeout: Option<Duration>,

    /// Longest span the interleaver buffers before forcing packets out.
    pub max_interleave_delta: Duration,

    /// Target duration of one container cluster.
    pub cluster_duration: Duration,

    /// Write a `<file>.metadata.json` sidecar on finalize.
    pub write_metadata: bool,

    /// Compute a SHA-256 checksum of the finished file.
    pub compute_checksum: bool,
}

impl SessionOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.cluster_duration.is_zero() {
            return Err("cluster duration must be positive".into());
        }
        if self.cluster_duration > Duration::from_secs(32) {
            return Err("cluster duration must not exceed 32s".into());
        }
        Ok(())
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ready_timeout: None,
            max_interleave_delta: Duration::from_secs(1),
            cluster_duration: Duration::from_secs(1),
            write_metadata: false,
            compute_checksum: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_time_base_is_inverted_frame_rate() {
        let config = VideoConfig::new(640, 480, PixelFormat::Nv12, 30000, 1001, PixelFormat::Yuv420p);
        assert_eq!(config.time_base(), Rational::new(1001, 30000));

        let config = VideoConfig::new(640, 480, PixelFormat::Nv12, 60, 2, PixelFormat::Yuv420p);
        assert_eq!(config.time_base(), Rational::new(1, 30));
    }

    #[test]
    fn video_validation() {
        assert!(VideoConfig::default().validate().is_ok());

        let zero = VideoConfig { width: 0, ..Default::default() };
        assert!(zero.validate().is_err());

        let bad_fps = VideoConfig { fps: Rational::new(30, 0), ..Default::default() };
        assert!(bad_fps.validate().is_err());
    }

    #[test]
    fn audio_block_size_respects_alignment() {
        let config = AudioConfig::default();
        assert_eq!(config.block_size(), 4);

        let padded = AudioConfig {
            channels: 3,
            block_align: 8,
            ..Default::default()
        };
        assert_eq!(padded.block_size(), 8);

        let unaligned = AudioConfig { block_align: 0, ..Default::default() };
        assert_eq!(unaligned.block_size(), 4);
    }

    #[test]
    fn audio_validation() {
        assert!(AudioConfig::default().validate().is_ok());

        let too_deep = AudioConfig { bits_per_sample: 24, ..Default::default() };
        assert!(too_deep.validate().is_err());

        let no_channels = AudioConfig { channels: 0, ..Default::default() };
        assert!(no_channels.validate().is_err());
    }

    #[test]
    fn audio_bit_rate() {
        assert_eq!(AudioConfig::default().bit_rate(), 48000 * 16 * 2);
    }

    #[test]
    fn session_options_validation() {
        assert!(SessionOptions::default().validate().is_ok());
        let zero = SessionOptions { cluster_duration: Duration::ZERO, ..Default::default() };
        assert!(zero.validate().is_err());
    }
}
