//! Synthetic producers standing in for real capture devices.

use std::f64::consts::TAU;

use recorder_core::PixelFormat;

/// SMPTE-style bar colours, RGB.
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// One frame of colour bars scrolling left by four pixels per frame.
pub fn test_pattern(format: PixelFormat, width: usize, height: usize, frame_index: u64) -> Vec<u8> {
    let shift = (frame_index as usize * 4) % width.max(1);
    let bar_at = |x: usize| BARS[((x + shift) % width.max(1)) * BARS.len() / width.max(1)];

    match format {
        PixelFormat::Rgb24 | PixelFormat::Bgra | PixelFormat::Argb => {
            let bpp = format.packed_bytes_per_pixel().unwrap_or(3);
            let mut frame = vec![0u8; width * height * bpp];
            for row in frame.chunks_exact_mut(width * bpp) {
                for (x, pixel) in row.chunks_exact_mut(bpp).enumerate() {
                    let [r, g, b] = bar_at(x);
                    match format {
                        PixelFormat::Rgb24 => pixel.copy_from_slice(&[r, g, b]),
                        PixelFormat::Bgra => pixel.copy_from_slice(&[b, g, r, 255]),
                        _ => pixel.copy_from_slice(&[255, r, g, b]),
                    }
                }
            }
            frame
        }
        PixelFormat::Yuv420p | PixelFormat::Nv12 => {
            // luma ramp, neutral chroma
            let mut frame = vec![128u8; format.buffer_size(width, height)];
            for (y, row) in frame[..width * height].chunks_exact_mut(width).enumerate() {
                for (x, luma) in row.iter_mut().enumerate() {
                    *luma = (16 + ((x + shift + y) * 219 / (width + height).max(1)) % 220) as u8;
                }
            }
            frame
        }
    }
}

/// Continuous sine tone rendered as interleaved signed 16-bit samples.
#[derive(Debug, Clone)]
pub struct SineTone {
    phase: f64,
    step: f64,
    channels: usize,
    amplitude: f64,
}

impl SineTone {
    pub fn new(frequency: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate.max(1) as f64,
            channels: channels as usize,
            amplitude: 0.25 * i16::MAX as f64,
        }
    }

    /// Render the next `samples` sample blocks; phase carries across calls.
    pub fn next_buffer(&mut self, samples: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples * self.channels * 2);
        for _ in 0..samples {
            let value = (self.phase.sin() * self.amplitude).round() as i16;
            for _ in 0..self.channels {
                out.extend_from_slice(&value.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % TAU;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_format_size() {
        for format in [
            PixelFormat::Rgb24,
            PixelFormat::Bgra,
            PixelFormat::Argb,
            PixelFormat::Yuv420p,
            PixelFormat::Nv12,
        ] {
            let frame = test_pattern(format, 64, 36, 3);
            assert_eq!(frame.len(), format.buffer_size(64, 36), "{}", format);
        }
    }

    #[test]
    fn pattern_scrolls() {
        let first = test_pattern(PixelFormat::Rgb24, 64, 4, 0);
        let second = test_pattern(PixelFormat::Rgb24, 64, 4, 1);
        assert_ne!(first, second);
        assert_eq!(&first[..3], &[235, 235, 235]);
    }

    #[test]
    fn tone_is_interleaved_and_continuous() {
        let mut tone = SineTone::new(1000.0, 48000, 2);
        let first = tone.next_buffer(24);
        let second = tone.next_buffer(24);
        assert_eq!(first.len(), 24 * 4);

        let sample = |buf: &[u8], i: usize| i16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]);
        // left and right carry the same value
        assert_eq!(sample(&first, 6), sample(&first, 7));
        // 24 samples is half a period at 1 kHz, so the second half mirrors the first
        assert!((sample(&first, 12) as i32 + sample(&second, 12) as i32).abs() <= 1);
        assert!(first.chunks_exact(2).all(|s| i16::from_le_bytes([s[0], s[1]]).abs() <= i16::MAX / 4 + 1));
    }
}
