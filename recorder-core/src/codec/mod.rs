//! Built-in encoders: a lossless intra-only raw video encoder and linear PCM
//! audio encoders, looked up through a small registry.

pub mod audio;
pub mod packet;
pub mod registry;
pub mod video;

/// Encoder lifecycle: allocated → open → closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Allocated,
    Open,
    Closed,
}
