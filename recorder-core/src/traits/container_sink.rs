use std::path::Path;
use std::sync::Arc;

use crate::codec::packet::Packet;
use crate::container::format::{OutputFormat, StreamDescriptor};
use crate::container::matroska::MatroskaWriter;
use crate::models::error::RecorderError;

/// Destination for muxed packets.
///
/// Calls arrive in a fixed order: `write_header` once, any number of
/// `write_packet`, then `write_trailer` and `close`. The session serializes
/// every call behind the container lock, so implementations need no
/// internal locking.
pub trait ContainerSink: Send {
    /// Register the output streams and write the file header.
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<(), RecorderError>;

    /// Write one packet. Its `stream_index` selects the output stream.
    fn write_packet(&mut self, packet: &Packet) -> Result<(), RecorderError>;

    /// Finish the file: indexes, duration, and any sizes left open.
    fn write_trailer(&mut self) -> Result<(), RecorderError>;

    /// Flush and release the underlying output.
    fn close(&mut self) -> Result<(), RecorderError>;

    /// Bytes written to the output so far.
    fn bytes_written(&self) -> u64;
}

/// Opens the sink for a given output path and format.
pub type SinkFactory =
    Arc<dyn Fn(&Path, &OutputFormat, &SinkOptions) -> Result<Box<dyn ContainerSink>, RecorderError> + Send + Sync>;

/// Muxer settings passed to a [`SinkFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    /// Target cluster length in milliseconds.
    pub cluster_duration_ms: i64,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self { cluster_duration_ms: 1000 }
    }
}

/// Factory writing Matroska files to disk.
pub fn file_sink_factory() -> SinkFactory {
    Arc::new(
        |path: &Path, format: &OutputFormat, options: &SinkOptions| -> Result<Box<dyn ContainerSink>, RecorderError> {
            if format.name != "matroska" {
                return Err(RecorderError::UnsupportedFormat(format.name.to_string()));
            }
            let writer = MatroskaWriter::create(path, options.cluster_duration_ms)?;
            Ok(Box::new(writer))
        },
    )
}
