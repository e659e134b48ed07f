use crate::models::config::VideoConfig;
use crate::models::error::RecorderError;
use crate::models::formats::{PixelFormat, PlaneLayout};
use crate::models::rational::Rational;

use super::packet::Packet;
use super::registry::{find_encoder, CodecDescriptor, CodecFlags, CodecId};
use super::EncoderState;

/// Reusable raw video frame.
///
/// Holds one tightly packed image in the encoder's pixel format; the buffer
/// is allocated once and overwritten by every submission.
#[derive(Debug)]
pub struct VideoFrame {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    planes: Vec<PlaneLayout>,
    data: Vec<u8>,
    pub pts: Option<i64>,
}

impl VideoFrame {
    pub fn new(format: PixelFormat, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            format,
            planes: format.planes(width, height),
            data: vec![0; format.buffer_size(width, height)],
            pts: None,
        }
    }

    /// Copy one frame's worth of pixels into the frame buffer.
    pub fn fill(&mut self, buffer: &[u8]) -> Result<(), RecorderError> {
        if buffer.len() != self.data.len() {
            return Err(RecorderError::BufferSizeMismatch {
                expected: self.data.len(),
                actual: buffer.len(),
            });
        }
        self.data.copy_from_slice(buffer);
        Ok(())
    }

    /// Bytes per row for each plane.
    pub fn strides(&self) -> Vec<usize> {
        self.planes.iter().map(|p| p.stride).collect()
    }

    /// Pixel data of plane `index`, or `None` past the last plane.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let layout = self.planes.get(index)?;
        let offset: usize = self.planes[..index].iter().map(PlaneLayout::len).sum();
        Some(&self.data[offset..offset + layout.len()])
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Lossless intra-only video encoder.
///
/// Every frame becomes one keyframe packet carrying the planes verbatim.
#[derive(Debug)]
pub struct VideoEncoder {
    descriptor: &'static CodecDescriptor,
    pub width: usize,
    pub height: usize,
    pub pixel_format: PixelFormat,
    pub time_base: Rational,
    pub gop_size: u32,
    flags: CodecFlags,
    state: EncoderState,
    frames_encoded: u64,
}

impl VideoEncoder {
    /// Allocate an encoder for `config`. The encoder must be opened before use.
    pub fn new(config: &VideoConfig) -> Result<Self, RecorderError> {
        let descriptor = find_encoder(CodecId::RawVideo)
            .ok_or_else(|| RecorderError::CodecNotFound("no lossless video encoder".into()))?;
        if !descriptor.supports_pixel_format(config.output_format) {
            return Err(RecorderError::ConfigurationFailed(format!(
                "{} cannot store pixel format {}",
                descriptor.name, config.output_format
            )));
        }

        Ok(Self {
            descriptor,
            width: config.width as usize,
            height: config.height as usize,
            pixel_format: config.output_format,
            time_base: config.time_base(),
            gop_size: 1,
            flags: CodecFlags::default(),
            state: EncoderState::Allocated,
            frames_encoded: 0,
        })
    }

    pub fn codec_id(&self) -> CodecId {
        self.descriptor.id
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

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Codec configuration for the container header. Raw video needs none.
    pub fn extradata(&self) -> Option<Vec<u8>> {
        None
    }

    /// Allocate a frame matching this encoder's geometry.
    pub fn alloc_frame(&self) -> VideoFrame {
        VideoFrame::new(self.pixel_format, self.width, self.height)
    }

    pub fn open(&mut self) -> Result<(), RecorderError> {
        match self.state {
            EncoderState::Allocated => {
                self.state = EncoderState::Open;
                Ok(())
            }
            EncoderState::Open => Ok(()),
            EncoderState::Closed => Err(RecorderError::CodecError("video encoder already closed".into())),
        }
    }

    /// Encode one frame. Frames without a timestamp are numbered in
    /// submission order.
    pub fn encode(&mut self, frame: &VideoFrame) -> Result<Option<Packet>, RecorderError> {
        if self.state != EncoderState::Open {
            return Err(RecorderError::CodecError(format!(
                "video encoder is not open ({:?})",
                self.state
            )));
        }
        if frame.format != self.pixel_format || frame.width != self.width || frame.height != self.height {
            return Err(RecorderError::CodecError(format!(
                "frame {}x{} {} does not match encoder {}x{} {}",
                frame.width, frame.height, frame.format, self.width, self.height, self.pixel_format
            )));
        }

        let pts = frame.pts.unwrap_or(self.frames_encoded as i64);
        self.frames_encoded += 1;

        Ok(Some(Packet {
            stream_index: 0,
            pts,
            duration: 1,
            time_base: self.time_base,
            keyframe: true,
            data: frame.data().to_vec(),
        }))
    }

    pub fn close(&mut self) -> Result<(), RecorderError> {
        match self.state {
            EncoderState::Closed => Err(RecorderError::CodecError("video encoder already closed".into())),
            _ => {
                self.state = EncoderState::Closed;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> VideoConfig {
        VideoConfig::new(4, 2, PixelFormat::Rgb24, 30, 1, PixelFormat::Yuv420p)
    }

    #[test]
    fn frame_planes_and_strides() {
        let mut frame = VideoFrame::new(PixelFormat::Yuv420p, 4, 2);
        let data: Vec<u8> = (0..12).collect();
        frame.fill(&data).unwrap();

        assert_eq!(frame.strides(), vec![4, 2, 2]);
        assert_eq!(frame.plane(0).unwrap(), &data[..8]);
        assert_eq!(frame.plane(1).unwrap(), &data[8..10]);
        assert_eq!(frame.plane(2).unwrap(), &data[10..]);
        assert!(frame.plane(3).is_none());
    }

    #[test]
    fn frame_rejects_wrong_length() {
        let mut frame = VideoFrame::new(PixelFormat::Yuv420p, 4, 2);
        assert!(frame.fill(&[0u8; 11]).is_err());
    }

    #[test]
    fn encode_requires_open() {
        let mut encoder = VideoEncoder::new(&small_config()).unwrap();
        let frame = encoder.alloc_frame();
        assert!(encoder.encode(&frame).is_err());

        encoder.open().unwrap();
        assert!(encoder.encode(&frame).unwrap().is_some());

        encoder.close().unwrap();
        assert!(encoder.encode(&frame).is_err());
        assert!(encoder.close().is_err());
    }

    #[test]
    fn packets_are_keyframes_with_frame_pts() {
        let mut encoder = VideoEncoder::new(&small_config()).unwrap();
        encoder.open().unwrap();
        assert_eq!(encoder.time_base, Rational::new(1, 30));

        let mut frame = encoder.alloc_frame();
        frame.fill(&[7u8; 12]).unwrap();
        frame.pts = Some(42);

        let packet = encoder.encode(&frame).unwrap().unwrap();
        assert_eq!(packet.pts, 42);
        assert_eq!(packet.duration, 1);
        assert!(packet.keyframe);
        assert_eq!(packet.data, vec![7u8; 12]);
        assert_eq!(encoder.frames_encoded(), 1);
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let mut encoder = VideoEncoder::new(&small_config()).unwrap();
        encoder.open().unwrap();
        let frame = VideoFrame::new(PixelFormat::Nv12, 4, 2);
        assert!(matches!(encoder.encode(&frame), Err(RecorderError::CodecError(_))));
    }
}
