use log::warn;

use crate::codec::audio::{AudioEncoder, AudioFrame};
use crate::codec::packet::Packet;
use crate::codec::registry::CodecFlags;
use crate::codec::video::{VideoEncoder, VideoFrame};
use crate::container::format::{StreamDescriptor, StreamParameters};
use crate::models::config::{AudioConfig, VideoConfig};
use crate::models::error::RecorderError;
use crate::models::state::StreamKind;
use crate::processing::rescale::from_capture_ticks;
use crate::processing::{pcm, pixel_convert};

/// Video encoder state plus its reusable raw frame.
#[derive(Debug)]
pub struct VideoStreamContext {
    config: VideoConfig,
    encoder: VideoEncoder,
    frame: VideoFrame,
}

impl VideoStreamContext {
    /// Validate `config`, allocate the encoder and its frame buffer.
    pub fn new(config: &VideoConfig) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        let encoder = VideoEncoder::new(config)?;
        if !pixel_convert::is_supported(config.input_format, config.output_format) {
            warn!(
                "No conversion from {} to {}; every video frame will be rejected",
                config.input_format, config.output_format
            );
        }
        let frame = encoder.alloc_frame();
        Ok(Self {
            config: config.clone(),
            encoder,
            frame,
        })
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    pub fn encoder(&self) -> &VideoEncoder {
        &self.encoder
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            index: StreamKind::Video.stream_index(),
            kind: StreamKind::Video,
            codec: self.encoder.codec_id(),
            time_base: self.encoder.time_base,
            parameters: StreamParameters::Video {
                width: self.config.width,
                height: self.config.height,
                pixel_format: self.config.output_format,
                frame_rate: self.config.fps,
            },
            extradata: self.encoder.extradata(),
        }
    }

    /// Apply container flags and open the encoder.
    pub fn open(&mut self, flags: CodecFlags) -> Result<(), RecorderError> {
        self.encoder.set_flags(flags);
        self.encoder.open()
    }

    /// Validate, convert and encode one input buffer.
    ///
    /// `timestamp` is in 100 ns capture ticks and must not be negative.
    pub fn encode(&mut self, buffer: &[u8], timestamp: i64) -> Result<Option<Packet>, RecorderError> {
        let expected = self.config.input_frame_size();
        if buffer.len() != expected {
            return Err(RecorderError::BufferSizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }
        if timestamp < 0 {
            return Err(RecorderError::InvalidTimestamp(format!(
                "video timestamp {} is negative",
                timestamp
            )));
        }
        let (from, to) = (self.config.input_format, self.config.output_format);
        if !pixel_convert::is_supported(from, to) {
            return Err(RecorderError::UnsupportedPixelFormat(format!("{} -> {}", from, to)));
        }

        let converted;
        let pixels = if from == to {
            buffer
        } else {
            converted = pixel_convert::convert(
                buffer,
                from,
                to,
                self.config.width as usize,
                self.config.height as usize,
            )?;
            &converted[..]
        };
        self.frame.fill(pixels)?;
        self.frame.pts = Some(from_capture_ticks(timestamp, self.encoder.time_base));

        let packet = self.encoder.encode(&self.frame)?;
        Ok(packet.map(|mut p| {
            p.stream_index = StreamKind::Video.stream_index();
            p
        }))
    }

    pub fn close(&mut self) -> Result<(), RecorderError> {
        self.encoder.close()
    }
}

/// PCM encoder state plus its reusable raw frame.
#[derive(Debug)]
pub struct AudioStreamContext {
    config: AudioConfig,
    encoder: AudioEncoder,
    frame: AudioFrame,
}

impl AudioStreamContext {
    pub fn new(config: &AudioConfig) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        let encoder = AudioEncoder::new(config)?;
        let frame = encoder.alloc_frame();
        Ok(Self {
            config: config.clone(),
            encoder,
            frame,
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn encoder(&self) -> &AudioEncoder {
        &self.encoder
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            index: StreamKind::Audio.stream_index(),
            kind: StreamKind::Audio,
            codec: self.encoder.codec_id(),
            time_base: self.encoder.time_base,
            parameters: StreamParameters::Audio {
                channels: self.config.channels,
                sample_rate: self.config.sample_rate,
                sample_format: self.config.sample_format,
                bits_per_sample: self.config.bits_per_sample,
            },
            extradata: self.encoder.extradata(),
        }
    }

    pub fn open(&mut self, flags: CodecFlags) -> Result<(), RecorderError> {
        self.encoder.set_flags(flags);
        self.encoder.open()
    }

    /// Encode one buffer of interleaved sample blocks. Its position in the
    /// stream comes from the samples submitted before it.
    pub fn encode(&mut self, buffer: &[u8]) -> Result<Option<Packet>, RecorderError> {
        let nb_samples = pcm::sample_count(&self.config, buffer.len())?;
        self.frame.fill(buffer, nb_samples);
        self.frame.pts = None;

        let packet = self.encoder.encode(&self.frame)?;
        Ok(packet.map(|mut p| {
            p.stream_index = StreamKind::Audio.stream_index();
            p
        }))
    }

    pub fn close(&mut self) -> Result<(), RecorderError> {
        self.encoder.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::registry::CodecId;
    use crate::models::formats::{PixelFormat, SampleFormat};
    use crate::models::rational::Rational;

    fn rgb_config() -> VideoConfig {
        VideoConfig::new(4, 4, PixelFormat::Rgb24, 30, 1, PixelFormat::Yuv420p)
    }

    #[test]
    fn invalid_video_config_is_rejected() {
        let config = VideoConfig::new(0, 4, PixelFormat::Rgb24, 30, 1, PixelFormat::Yuv420p);
        assert!(matches!(
            VideoStreamContext::new(&config),
            Err(RecorderError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn video_descriptor_carries_time_base() {
        let context = VideoStreamContext::new(&VideoConfig::new(
            8,
            8,
            PixelFormat::Yuv420p,
            30000,
            1001,
            PixelFormat::Yuv420p,
        ))
        .unwrap();
        let descriptor = context.descriptor();
        assert_eq!(descriptor.index, 0);
        assert_eq!(descriptor.codec, CodecId::RawVideo);
        assert_eq!(descriptor.time_base, Rational::new(1001, 30000));
    }

    #[test]
    fn video_frame_is_converted_and_timed() {
        let mut context = VideoStreamContext::new(&rgb_config()).unwrap();
        context.open(CodecFlags { global_header: true }).unwrap();
        assert!(context.encoder().flags().global_header);

        // one second in 100 ns ticks is frame 30
        let packet = context.encode(&[255u8; 4 * 4 * 3], 10_000_000).unwrap().unwrap();
        assert_eq!(packet.stream_index, 0);
        assert_eq!(packet.pts, 30);
        assert_eq!(packet.len(), 16 + 4 + 4);
        assert!(packet.data[..16].iter().all(|&y| y == 235));
    }

    #[test]
    fn wrong_size_is_rejected_and_next_frame_succeeds() {
        let mut context = VideoStreamContext::new(&rgb_config()).unwrap();
        context.open(CodecFlags::default()).unwrap();

        let err = context.encode(&[0u8; 10], 0).unwrap_err();
        assert_eq!(err, RecorderError::BufferSizeMismatch { expected: 48, actual: 10 });
        assert!(!err.is_fatal());

        let packet = context.encode(&[0u8; 48], 333_333).unwrap().unwrap();
        assert_eq!(packet.pts, 1);
        assert!(packet.data[..16].iter().all(|&y| y == 16));
    }

    #[test]
    fn negative_timestamp_is_per_frame() {
        let mut context = VideoStreamContext::new(&rgb_config()).unwrap();
        context.open(CodecFlags::default()).unwrap();

        let err = context.encode(&[0u8; 48], -400_000_000).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidTimestamp(_)));
        assert!(!err.is_fatal());
        assert_eq!(context.encoder().frames_encoded(), 0);

        let packet = context.encode(&[0u8; 48], 0).unwrap().unwrap();
        assert_eq!(packet.pts, 0);
    }

    #[test]
    fn unsupported_conversion_is_per_frame() {
        // storable output, but no yuv420p -> bgra conversion exists
        let config = VideoConfig::new(4, 4, PixelFormat::Yuv420p, 30, 1, PixelFormat::Bgra);
        let mut context = VideoStreamContext::new(&config).unwrap();
        context.open(CodecFlags::default()).unwrap();

        let err = context.encode(&[0u8; 24], 0).unwrap_err();
        assert!(matches!(err, RecorderError::UnsupportedPixelFormat(_)));
        assert!(!err.is_fatal());
        assert_eq!(context.encoder().frames_encoded(), 0);
    }

    #[test]
    fn nv12_input_is_deinterleaved() {
        let config = VideoConfig::new(4, 4, PixelFormat::Nv12, 30, 1, PixelFormat::Yuv420p);
        let mut context = VideoStreamContext::new(&config).unwrap();
        context.open(CodecFlags::default()).unwrap();

        let mut input = vec![0u8; 24];
        input[16..].copy_from_slice(&[1, 2, 1, 2, 1, 2, 1, 2]);
        let packet = context.encode(&input, 0).unwrap().unwrap();
        assert_eq!(&packet.data[16..], &[1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn audio_blocks_and_order() {
        let mut context = AudioStreamContext::new(&AudioConfig::default()).unwrap();
        context.open(CodecFlags::default()).unwrap();

        let first = context.encode(&[0u8; 4 * 100]).unwrap().unwrap();
        let second = context.encode(&[0u8; 4 * 50]).unwrap().unwrap();
        assert_eq!((first.stream_index, first.pts, first.duration), (1, 0, 100));
        assert_eq!((second.pts, second.duration), (100, 50));
    }

    #[test]
    fn malformed_audio_length_is_per_frame() {
        let mut context = AudioStreamContext::new(&AudioConfig::default()).unwrap();
        context.open(CodecFlags::default()).unwrap();

        let err = context.encode(&[0u8; 6]).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidAudioBuffer(_)));
        assert!(!err.is_fatal());
        assert!(context.encode(&[]).is_err());

        // the rejected buffer did not advance the timeline
        let packet = context.encode(&[0u8; 8]).unwrap().unwrap();
        assert_eq!(packet.pts, 0);
    }

    #[test]
    fn planar_audio_has_no_codec() {
        let config = AudioConfig {
            sample_format: SampleFormat::S16Planar,
            ..Default::default()
        };
        assert!(matches!(
            AudioStreamContext::new(&config),
            Err(RecorderError::CodecNotFound(_))
        ));
    }
}
