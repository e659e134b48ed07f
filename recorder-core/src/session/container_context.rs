use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

use crate::codec::packet::Packet;
use crate::container::format::{OutputFormat, StreamDescriptor};
use crate::container::interleave::Interleaver;
use crate::models::error::RecorderError;
use crate::models::rational::Rational;
use crate::processing::rescale::rescale;
use crate::traits::container_sink::{ContainerSink, SinkFactory, SinkOptions};

/// A packet that reached the sink: its stream and payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenPacket {
    pub stream_index: usize,
    pub bytes: u64,
}

/// Open output file plus its format and registered streams.
pub struct ContainerContext {
    path: PathBuf,
    format: OutputFormat,
    streams: Vec<StreamDescriptor>,
    sink: Box<dyn ContainerSink>,
    interleaver: Interleaver,
    /// End of the latest written packet, per stream, in microseconds.
    end_us: Vec<i64>,
    trailer_written: bool,
}

impl ContainerContext {
    /// Open the sink for `path` and write the header for `streams`.
    pub fn open(
        path: &Path,
        format: OutputFormat,
        streams: Vec<StreamDescriptor>,
        factory: &SinkFactory,
        options: SinkOptions,
        max_interleave_delta: Duration,
    ) -> Result<Self, RecorderError> {
        let mut sink = factory(path, &format, &options)?;
        sink.write_header(&streams)?;
        info!(
            "Container header written: {} ({} streams, {} bytes)",
            path.display(),
            streams.len(),
            sink.bytes_written()
        );

        Ok(Self {
            path: path.to_path_buf(),
            interleaver: Interleaver::new(streams.len(), max_interleave_delta),
            end_us: vec![0; streams.len()],
            format,
            streams,
            sink,
            trailer_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// Queue `packet` and write whatever the interleaver releases.
    pub fn write_interleaved(&mut self, packet: Packet) -> Result<Vec<WrittenPacket>, RecorderError> {
        let ready = self.interleaver.push(packet)?;
        self.write_all(ready)
    }

    /// No more packets will arrive for `stream_index`.
    pub fn end_stream(&mut self, stream_index: usize) -> Result<Vec<WrittenPacket>, RecorderError> {
        let ready = self.interleaver.end_stream(stream_index);
        self.write_all(ready)
    }

    fn write_all(&mut self, packets: Vec<Packet>) -> Result<Vec<WrittenPacket>, RecorderError> {
        let mut written = Vec::with_capacity(packets.len());
        for packet in packets {
            self.sink.write_packet(&packet)?;
            let end = rescale(packet.pts + packet.duration, packet.time_base, Rational::new(1, 1_000_000));
            if let Some(slot) = self.end_us.get_mut(packet.stream_index) {
                *slot = (*slot).max(end);
            }
            written.push(WrittenPacket {
                stream_index: packet.stream_index,
                bytes: packet.len() as u64,
            });
        }
        Ok(written)
    }

    /// Flush queued packets and write the trailer.
    pub fn write_trailer(&mut self) -> Result<Vec<WrittenPacket>, RecorderError> {
        if self.trailer_written {
            return Ok(Vec::new());
        }
        let remaining = self.interleaver.drain();
        debug!("Draining {} queued packets before trailer", remaining.len());
        let written = self.write_all(remaining)?;
        self.sink.write_trailer()?;
        self.trailer_written = true;
        Ok(written)
    }

    pub fn close(&mut self) -> Result<(), RecorderError> {
        self.sink.close()
    }

    pub fn bytes_written(&self) -> u64 {
        self.sink.bytes_written()
    }

    /// Duration of the longest stream written so far.
    pub fn duration_secs(&self) -> f64 {
        self.end_us.iter().copied().max().unwrap_or(0) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    use crate::codec::registry::CodecId;
    use crate::container::format::StreamParameters;
    use crate::models::formats::{PixelFormat, SampleFormat};
    use crate::models::state::StreamKind;

    /// Sink that records the order of calls it receives.
    #[derive(Clone, Default)]
    struct RecordingSink {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ContainerSink for RecordingSink {
        fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<(), RecorderError> {
            self.log.lock().push(format!("header {}", streams.len()));
            Ok(())
        }

        fn write_packet(&mut self, packet: &Packet) -> Result<(), RecorderError> {
            self.log.lock().push(format!("packet {} {}", packet.stream_index, packet.pts));
            Ok(())
        }

        fn write_trailer(&mut self) -> Result<(), RecorderError> {
            self.log.lock().push("trailer".into());
            Ok(())
        }

        fn close(&mut self) -> Result<(), RecorderError> {
            self.log.lock().push("close".into());
            Ok(())
        }

        fn bytes_written(&self) -> u64 {
            0
        }
    }

    fn streams() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor {
                index: 0,
                kind: StreamKind::Video,
                codec: CodecId::RawVideo,
                time_base: Rational::new(1, 10),
                parameters: StreamParameters::Video {
                    width: 2,
                    height: 2,
                    pixel_format: PixelFormat::Yuv420p,
                    frame_rate: Rational::new(10, 1),
                },
                extradata: None,
            },
            StreamDescriptor {
                index: 1,
                kind: StreamKind::Audio,
                codec: CodecId::PcmS16Le,
                time_base: Rational::new(1, 1000),
                parameters: StreamParameters::Audio {
                    channels: 1,
                    sample_rate: 1000,
                    sample_format: SampleFormat::S16,
                    bits_per_sample: 16,
                },
                extradata: None,
            },
        ]
    }

    fn packet(stream_index: usize, pts: i64, duration: i64, time_base: Rational) -> Packet {
        Packet {
            stream_index,
            pts,
            duration,
            time_base,
            keyframe: true,
            data: vec![0; 2],
        }
    }

    fn open(sink: RecordingSink) -> ContainerContext {
        let factory: SinkFactory = Arc::new(
            move |_: &Path, _: &OutputFormat, _: &SinkOptions| -> Result<Box<dyn ContainerSink>, RecorderError> {
                Ok(Box::new(sink.clone()))
            },
        );
        ContainerContext::open(
            Path::new("test.mkv"),
            OutputFormat::matroska(),
            streams(),
            &factory,
            SinkOptions::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn packets_leave_in_time_order() {
        let sink = RecordingSink::default();
        let mut container = open(sink.clone());

        assert!(container
            .write_interleaved(packet(0, 0, 1, Rational::new(1, 10)))
            .unwrap()
            .is_empty());
        container.write_interleaved(packet(0, 1, 1, Rational::new(1, 10))).unwrap();
        let written = container
            .write_interleaved(packet(1, 50, 50, Rational::new(1, 1000)))
            .unwrap();
        assert_eq!(written.len(), 2);

        container.end_stream(1).unwrap();
        container.write_trailer().unwrap();
        container.close().unwrap();

        assert_eq!(
            *sink.log.lock(),
            vec!["header 2", "packet 0 0", "packet 1 50", "packet 0 1", "trailer", "close"]
        );
        assert_relative_eq!(container.duration_secs(), 0.2);
    }

    #[test]
    fn trailer_drains_queue_once() {
        let sink = RecordingSink::default();
        let mut container = open(sink.clone());
        container.write_interleaved(packet(1, 0, 10, Rational::new(1, 1000))).unwrap();

        let drained = container.write_trailer().unwrap();
        assert_eq!(drained, vec![WrittenPacket { stream_index: 1, bytes: 2 }]);
        assert!(container.write_trailer().unwrap().is_empty());
        assert_eq!(sink.log.lock().iter().filter(|l| *l == "trailer").count(), 1);
    }

    #[test]
    fn factory_failure_propagates() {
        let factory: SinkFactory = Arc::new(
            |_: &Path, _: &OutputFormat, _: &SinkOptions| -> Result<Box<dyn ContainerSink>, RecorderError> {
                Err(RecorderError::StorageError("disk full".into()))
            },
        );
        let result = ContainerContext::open(
            Path::new("x.mkv"),
            OutputFormat::matroska(),
            streams(),
            &factory,
            SinkOptions::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(RecorderError::StorageError(_))));
    }
}
