//! # recorder-core
//!
//! Dual-stream recording session: raw video and raw audio from independent
//! producers, encoded losslessly and muxed into one Matroska file.
//!
//! Video setup, audio setup, container setup and frame delivery may all run
//! on different threads. The session makes them converge: the container
//! waits for both stream contexts, submissions wait for the container, and
//! the second of the two finish calls finalizes the file.
//!
//! ## Architecture
//!
//! ```text
//! recorder-core (this crate)
//! ├── models/      ← RecorderError, SessionPhase, VideoConfig, AudioConfig, Rational, etc.
//! ├── processing/  ← pixel conversion, PCM block handling, timestamp rescaling
//! ├── codec/       ← encoder registry, raw video and PCM encoders, packets
//! ├── container/   ← EBML primitives, Matroska writer, interleaver, probe
//! ├── session/     ← RecordingSession, stream/container contexts, readiness signals
//! ├── storage/     ← SHA-256 checksum, metadata sidecar
//! └── traits/      ← ContainerSink, SessionDelegate
//! ```

pub mod codec;
pub mod container;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use container::format::OutputFormat;
pub use container::probe::{probe_file, ContainerSummary, TrackSummary};
pub use models::config::{AudioConfig, SessionOptions, VideoConfig};
pub use models::diagnostics::{SessionDiagnostics, StreamCounters};
pub use models::error::RecorderError;
pub use models::formats::{PixelFormat, SampleFormat};
pub use models::rational::Rational;
pub use models::recording_result::{RecordingMetadata, RecordingResult, TrackDescription};
pub use models::state::{SessionPhase, StreamKind};
pub use processing::rescale::rescale;
pub use session::recorder::{FinishOutcome, RecordingSession};
pub use traits::container_sink::{file_sink_factory, ContainerSink, SinkFactory, SinkOptions};
pub use traits::session_delegate::SessionDelegate;
