use crate::models::config::AudioConfig;
use crate::models::error::RecorderError;
use crate::models::formats::SampleFormat;
use crate::models::rational::Rational;
use crate::processing::pcm;

use super::packet::Packet;
use super::registry::{pcm_encoder_for, CodecDescriptor, CodecFlags, CodecId};
use super::EncoderState;

/// Reusable raw audio frame holding interleaved sample blocks as delivered
/// by the producer, including any block-alignment padding.
#[derive(Debug)]
pub struct AudioFrame {
    pub channels: u16,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub block_align: u16,
    pub nb_samples: usize,
    data: Vec<u8>,
    pub pts: Option<i64>,
}

impl AudioFrame {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            channels: config.channels,
            sample_rate: config.sample_rate,
            format: config.sample_format,
            block_align: config.block_align,
            nb_samples: 0,
            data: Vec::new(),
            pts: None,
        }
    }

    /// Replace the frame contents with `nb_samples` blocks from `buffer`.
    ///
    /// The backing allocation is reused across calls.
    pub fn fill(&mut self, buffer: &[u8], nb_samples: usize) {
        self.data.clear();
        self.data.extend_from_slice(buffer);
        self.nb_samples = nb_samples;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Uncompressed linear PCM encoder.
#[derive(Debug)]
pub struct AudioEncoder {
    descriptor: &'static CodecDescriptor,
    config: AudioConfig,
    pub time_base: Rational,
    pub bit_rate: u64,
    flags: CodecFlags,
    state: EncoderState,
    next_pts: i64,
}

impl AudioEncoder {
    /// Allocate the PCM encoder matching `config.sample_format`.
    pub fn new(config: &AudioConfig) -> Result<Self, RecorderError> {
        let descriptor = pcm_encoder_for(config.sample_format).ok_or_else(|| {
            RecorderError::CodecNotFound(format!("no PCM encoder for sample format {}", config.sample_format))
        })?;

        Ok(Self {
            descriptor,
            config: config.clone(),
            time_base: Rational::new(1, config.sample_rate as i64),
            bit_rate: config.bit_rate(),
            flags: CodecFlags::default(),
            state: EncoderState::Allocated,
            next_pts: 0,
        })
    }

    pub fn codec_id(&self) -> CodecId {
        self.descriptor.id
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn flags(&self) -> CodecFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: CodecFlags) {
        self.flags = flags;
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Samples encoded so far, per channel.
    pub fn samples_encoded(&self) -> i64 {
        self.next_pts
    }

    pub fn extradata(&self) -> Option<Vec<u8>> {
        None
    }

    pub fn alloc_frame(&self) -> AudioFrame {
        AudioFrame::new(&self.config)
    }

    pub fn open(&mut self) -> Result<(), RecorderError> {
        match self.state {
            EncoderState::Allocated => {
                self.state = EncoderState::Open;
                Ok(())
            }
            EncoderState::Open => Ok(()),
            EncoderState::Closed => Err(RecorderError::CodecError("audio encoder already closed".into())),
        }
    }

    /// Encode one frame. A frame without a timestamp is placed right after
    /// the previous one, so timing follows submission order.
    pub fn encode(&mut self, frame: &AudioFrame) -> Result<Option<Packet>, RecorderError> {
        if self.state != EncoderState::Open {
            return Err(RecorderError::CodecError(format!(
                "audio encoder is not open ({:?})",
                self.state
            )));
        }
        if frame.nb_samples == 0 {
            return Ok(None);
        }

        let pts = frame.pts.unwrap_or(self.next_pts);
        self.next_pts = pts + frame.nb_samples as i64;

        Ok(Some(Packet {
            stream_index: 1,
            pts,
            duration: frame.nb_samples as i64,
            time_base: self.time_base,
            keyframe: true,
            data: pcm::pack_blocks(&self.config, frame.data()),
        }))
    }

    pub fn close(&mut self) -> Result<(), RecorderError> {
        match self.state {
            EncoderState::Closed => Err(RecorderError::CodecError("audio encoder already closed".into())),
            _ => {
                self.state = EncoderState::Closed;
                Ok(())
            }
        }
    }
}
