use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use crate::codec::packet::Packet;
use crate::models::error::RecorderError;
use crate::models::state::StreamKind;
use crate::processing::rescale::{rescale, MILLISECOND_TIME_BASE};
use crate::traits::container_sink::ContainerSink;

use super::ebml::{self, ids};
use super::format::{StreamDescriptor, StreamParameters};

/// Nanoseconds per timestamp tick; block times are in milliseconds.
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;

/// Bytes kept free after the segment header for the seek index.
const SEEK_HEAD_RESERVED: usize = 128;

const MUXING_APP: &str = concat!("recorder-core ", env!("CARGO_PKG_VERSION"));

/// Writer wrapper that answers `stream_position` from a running count
/// instead of seeking, so buffered output stays buffered.
struct PositionedWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> Write for PositionedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for PositionedWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.inner.seek(pos)?;
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

struct TrackInfo {
    number: u64,
    kind: StreamKind,
}

struct OpenCluster {
    size_pos: u64,
    timestamp: i64,
}

struct CuePoint {
    time: i64,
    track: u64,
    cluster_position: u64,
}

/// Streaming Matroska muxer.
///
/// Layout: EBML header, then one Segment holding a reserved seek index,
/// Info, Tracks, the clusters, and finally Cues. Sizes and the duration are
/// patched in place by [`ContainerSink::write_trailer`], which is why the
/// output must be seekable.
pub struct MatroskaWriter<W: Write + Seek> {
    out: Option<PositionedWriter<W>>,
    cluster_duration_ms: i64,
    tracks: Vec<TrackInfo>,
    segment_size_pos: u64,
    segment_data_start: u64,
    seek_head_pos: u64,
    info_pos: u64,
    tracks_pos: u64,
    duration_pos: u64,
    cluster: Option<OpenCluster>,
    cues: Vec<CuePoint>,
    end_ms: i64,
    bytes_written: u64,
    header_written: bool,
    trailer_written: bool,
}

impl MatroskaWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and prepare to write into it.
    pub fn create(path: &Path, cluster_duration_ms: i64) -> Result<Self, RecorderError> {
        let file = File::create(path)
            .map_err(|e| RecorderError::StorageError(format!("could not open {}: {}", path.display(), e)))?;
        info!("Opened output file {}", path.display());
        Ok(Self::new(BufWriter::new(file), cluster_duration_ms))
    }
}

impl<W: Write + Seek> MatroskaWriter<W> {
    pub fn new(out: W, cluster_duration_ms: i64) -> Self {
        Self {
            out: Some(PositionedWriter { inner: out, pos: 0 }),
            cluster_duration_ms: cluster_duration_ms.max(1),
            tracks: Vec::new(),
            segment_size_pos: 0,
            segment_data_start: 0,
            seek_head_pos: 0,
            info_pos: 0,
            tracks_pos: 0,
            duration_pos: 0,
            cluster: None,
            cues: Vec::new(),
            end_ms: 0,
            bytes_written: 0,
            header_written: false,
            trailer_written: false,
        }
    }

    /// Recover the underlying output, unless the writer was closed.
    pub fn into_inner(self) -> Option<W> {
        self.out.map(|w| w.inner)
    }

    fn out(&mut self) -> Result<&mut PositionedWriter<W>, RecorderError> {
        self.out
            .as_mut()
            .ok_or_else(|| RecorderError::StorageError("container output is closed".into()))
    }

    fn segment_offset(&self, absolute: u64) -> u64 {
        absolute - self.segment_data_start
    }

    fn track_entry(stream: &StreamDescriptor) -> io::Result<Vec<u8>> {
        let number = stream.index as u64 + 1;
        let mut entry = Vec::new();
        ebml::write_uint_element(&mut entry, ids::TRACK_NUMBER, number)?;
        ebml::write_uint_element(&mut entry, ids::TRACK_UID, number)?;
        ebml::write_uint_element(&mut entry, ids::FLAG_LACING, 0)?;
        ebml::write_string_element(&mut entry, ids::CODEC_ID, stream.codec.matroska_id())?;
        if let Some(extradata) = &stream.extradata {
            ebml::write_binary_element(&mut entry, ids::CODEC_PRIVATE, extradata)?;
        }

        match &stream.parameters {
            StreamParameters::Video {
                width,
                height,
                pixel_format,
                frame_rate,
            } => {
                ebml::write_uint_element(&mut entry, ids::TRACK_TYPE, 1)?;
                if frame_rate.is_valid() && frame_rate.num > 0 {
                    let frame_ns = 1_000_000_000u64 * frame_rate.den as u64 / frame_rate.num as u64;
                    ebml::write_uint_element(&mut entry, ids::DEFAULT_DURATION, frame_ns)?;
                }
                let mut video = Vec::new();
                ebml::write_uint_element(&mut video, ids::PIXEL_WIDTH, *width as u64)?;
                ebml::write_uint_element(&mut video, ids::PIXEL_HEIGHT, *height as u64)?;
                ebml::write_binary_element(&mut video, ids::COLOUR_SPACE, &pixel_format.fourcc())?;
                ebml::write_master(&mut entry, ids::VIDEO, &video)?;
            }
            StreamParameters::Audio {
                channels,
                sample_rate,
                sample_format,
                ..
            } => {
                ebml::write_uint_element(&mut entry, ids::TRACK_TYPE, 2)?;
                let mut audio = Vec::new();
                ebml::write_float_element(&mut audio, ids::SAMPLING_FREQUENCY, *sample_rate as f64)?;
                ebml::write_uint_element(&mut audio, ids::CHANNELS, *channels as u64)?;
                // container samples are stored at the full sample width
                ebml::write_uint_element(&mut audio, ids::BIT_DEPTH, sample_format.bits_per_sample() as u64)?;
                ebml::write_master(&mut entry, ids::AUDIO, &audio)?;
            }
        }
        Ok(entry)
    }

    fn write_header_inner(&mut self, streams: &[StreamDescriptor]) -> Result<(), RecorderError> {
        let mut header = Vec::new();
        ebml::write_uint_element(&mut header, ids::EBML_VERSION, 1)?;
        ebml::write_uint_element(&mut header, ids::EBML_READ_VERSION, 1)?;
        ebml::write_uint_element(&mut header, ids::EBML_MAX_ID_LENGTH, 4)?;
        ebml::write_uint_element(&mut header, ids::EBML_MAX_SIZE_LENGTH, 8)?;
        ebml::write_string_element(&mut header, ids::DOC_TYPE, "matroska")?;
        ebml::write_uint_element(&mut header, ids::DOC_TYPE_VERSION, 4)?;
        ebml::write_uint_element(&mut header, ids::DOC_TYPE_READ_VERSION, 2)?;

        let mut entries = Vec::new();
        for stream in streams {
            let entry = Self::track_entry(stream)?;
            ebml::write_master(&mut entries, ids::TRACK_ENTRY, &entry)?;
        }

        let out = self.out()?;
        ebml::write_master(out, ids::EBML, &header)?;

        let segment_size_pos = ebml::start_master(out, ids::SEGMENT)?;
        let segment_data_start = out.stream_position()?;

        let seek_head_pos = out.stream_position()?;
        ebml::write_void(out, SEEK_HEAD_RESERVED)?;

        let info_pos = out.stream_position()?;
        let info_size_pos = ebml::start_master(out, ids::INFO)?;
        ebml::write_uint_element(out, ids::TIMESTAMP_SCALE, TIMESTAMP_SCALE_NS)?;
        ebml::write_string_element(out, ids::MUXING_APP, MUXING_APP)?;
        ebml::write_string_element(out, ids::WRITING_APP, MUXING_APP)?;
        // payload follows a 2-byte ID and 1-byte size
        let duration_pos = out.stream_position()? + 3;
        ebml::write_float_element(out, ids::DURATION, 0.0)?;
        ebml::end_master(out, info_size_pos)?;

        let tracks_pos = out.stream_position()?;
        ebml::write_master(out, ids::TRACKS, &entries)?;
        let end = out.stream_position()?;

        self.segment_size_pos = segment_size_pos;
        self.segment_data_start = segment_data_start;
        self.seek_head_pos = seek_head_pos;
        self.info_pos = info_pos;
        self.tracks_pos = tracks_pos;
        self.duration_pos = duration_pos;
        self.bytes_written = end;
        self.tracks = streams
            .iter()
            .map(|s| TrackInfo {
                number: s.index as u64 + 1,
                kind: s.kind,
            })
            .collect();
        Ok(())
    }

    fn close_cluster(&mut self) -> Result<(), RecorderError> {
        if let Some(cluster) = self.cluster.take() {
            let out = self.out()?;
            ebml::end_master(out, cluster.size_pos)?;
        }
        Ok(())
    }

    fn open_cluster(&mut self, timestamp: i64, track: u64) -> Result<(), RecorderError> {
        self.close_cluster()?;
        let out = self.out()?;
        let start = out.stream_position()?;
        let size_pos = ebml::start_master(out, ids::CLUSTER)?;
        ebml::write_uint_element(out, ids::CLUSTER_TIMESTAMP, timestamp as u64)?;

        let cluster_position = self.segment_offset(start);
        self.cues.push(CuePoint {
            time: timestamp,
            track,
            cluster_position,
        });
        self.cluster = Some(OpenCluster { size_pos, timestamp });
        debug!("Opened cluster at {} ms", timestamp);
        Ok(())
    }

    /// Clusters start at video keyframes once the current one is long enough,
    /// or whenever a block time would not fit the 16-bit relative field.
    fn needs_new_cluster(&self, timestamp: i64, keyframe: bool, kind: StreamKind) -> bool {
        match &self.cluster {
            None => true,
            Some(cluster) => {
                let relative = timestamp - cluster.timestamp;
                i16::try_from(relative).is_err()
                    || (keyframe && kind == StreamKind::Video && relative >= self.cluster_duration_ms)
            }
        }
    }

    fn write_trailer_inner(&mut self) -> Result<(), RecorderError> {
        self.close_cluster()?;

        let cues_pos = if self.cues.is_empty() {
            None
        } else {
            let mut cues = Vec::new();
            for cue in &self.cues {
                let mut positions = Vec::new();
                ebml::write_uint_element(&mut positions, ids::CUE_TRACK, cue.track)?;
                ebml::write_uint_element(&mut positions, ids::CUE_CLUSTER_POSITION, cue.cluster_position)?;
                let mut point = Vec::new();
                ebml::write_uint_element(&mut point, ids::CUE_TIME, cue.time as u64)?;
                ebml::write_master(&mut point, ids::CUE_TRACK_POSITIONS, &positions)?;
                ebml::write_master(&mut cues, ids::CUE_POINT, &point)?;
            }
            let out = self.out()?;
            let pos = out.stream_position()?;
            ebml::write_master(out, ids::CUES, &cues)?;
            Some(pos)
        };

        let mut seeks = vec![(ids::INFO, self.info_pos), (ids::TRACKS, self.tracks_pos)];
        if let Some(pos) = cues_pos {
            seeks.push((ids::CUES, pos));
        }
        let mut index = Vec::new();
        for (id, pos) in seeks {
            let mut seek = Vec::new();
            ebml::write_binary_element(&mut seek, ids::SEEK_ID, &id.to_be_bytes()[4 - ebml::id_len(id)..])?;
            ebml::write_uint_element(&mut seek, ids::SEEK_POSITION, self.segment_offset(pos))?;
            ebml::write_master(&mut index, ids::SEEK, &seek)?;
        }
        let mut seek_head = Vec::new();
        ebml::write_master(&mut seek_head, ids::SEEK_HEAD, &index)?;
        let padding = SEEK_HEAD_RESERVED
            .checked_sub(seek_head.len())
            .filter(|&p| p != 1)
            .ok_or_else(|| RecorderError::StorageError("seek index does not fit its reserved space".into()))?;

        let duration_ms = self.end_ms as f64;
        let (seek_head_pos, duration_pos, segment_size_pos) =
            (self.seek_head_pos, self.duration_pos, self.segment_size_pos);

        let out = self.out()?;
        let end = out.stream_position()?;

        out.seek(SeekFrom::Start(duration_pos))?;
        out.write_all(&duration_ms.to_be_bytes())?;

        out.seek(SeekFrom::Start(seek_head_pos))?;
        out.write_all(&seek_head)?;
        if padding > 0 {
            ebml::write_void(out, padding)?;
        }

        out.seek(SeekFrom::Start(end))?;
        ebml::end_master(out, segment_size_pos)?;
        out.flush()?;

        self.bytes_written = end;
        Ok(())
    }
}

impl<W: Write + Seek + Send> ContainerSink for MatroskaWriter<W> {
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<(), RecorderError> {
        if self.header_written {
            return Err(RecorderError::StorageError("container header already written".into()));
        }
        if streams.is_empty() {
            return Err(RecorderError::ConfigurationFailed("container needs at least one stream".into()));
        }
        self.write_header_inner(streams)?;
        self.header_written = true;
        debug!(
            "Wrote Matroska header with {} tracks ({} bytes)",
            streams.len(),
            self.bytes_written
        );
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), RecorderError> {
        if !self.header_written || self.trailer_written {
            return Err(RecorderError::StorageError(
                "packets can only be written between header and trailer".into(),
            ));
        }
        let (track, kind) = self
            .tracks
            .get(packet.stream_index)
            .map(|t| (t.number, t.kind))
            .ok_or_else(|| RecorderError::StorageError(format!("no track for stream {}", packet.stream_index)))?;

        let timestamp = rescale(packet.pts, packet.time_base, MILLISECOND_TIME_BASE);
        if timestamp < 0 {
            return Err(RecorderError::InvalidTimestamp(format!(
                "{} ms on track {} is before the start of the file",
                timestamp, track
            )));
        }
        let end = rescale(packet.pts + packet.duration, packet.time_base, MILLISECOND_TIME_BASE);

        if self.needs_new_cluster(timestamp, packet.keyframe, kind) {
            self.open_cluster(timestamp, track)?;
        }
        let cluster_ts = self.cluster.as_ref().map(|c| c.timestamp).unwrap_or(0);
        let relative = i16::try_from(timestamp - cluster_ts).map_err(|_| {
            RecorderError::InvalidTimestamp(format!("{} ms does not fit cluster at {} ms", timestamp, cluster_ts))
        })?;
        self.end_ms = self.end_ms.max(end);

        let track_len = ebml::vint_len(track);
        let payload_len = (track_len + 3 + packet.data.len()) as u64;
        let out = self.out()?;
        ebml::write_id(out, ids::SIMPLE_BLOCK)?;
        ebml::write_size(out, payload_len)?;
        ebml::write_vint(out, track, track_len)?;
        out.write_all(&relative.to_be_bytes())?;
        out.write_all(&[if packet.keyframe { 0x80 } else { 0x00 }])?;
        out.write_all(&packet.data)?;
        let pos = out.stream_position()?;
        self.bytes_written = pos;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), RecorderError> {
        if !self.header_written {
            return Err(RecorderError::StorageError("container header was never written".into()));
        }
        if self.trailer_written {
            return Ok(());
        }
        self.write_trailer_inner()?;
        self.trailer_written = true;
        let video_tracks = self.tracks.iter().filter(|t| t.kind == StreamKind::Video).count();
        info!(
            "Finished Matroska file: {} ms, {} clusters, {} video track(s), {} bytes",
            self.end_ms,
            self.cues.len(),
            video_tracks,
            self.bytes_written
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecorderError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::codec::registry::CodecId;
    use crate::container::ebml::read_element_header;
    use crate::models::formats::{PixelFormat, SampleFormat};
    use crate::models::rational::Rational;

    fn streams() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor {
                index: 0,
                kind: StreamKind::Video,
                codec: CodecId::RawVideo,
                time_base: Rational::new(1, 30),
                parameters: StreamParameters::Video {
                    width: 4,
                    height: 2,
                    pixel_format: PixelFormat::Yuv420p,
                    frame_rate: Rational::new(30, 1),
                },
                extradata: None,
            },
            StreamDescriptor {
                index: 1,
                kind: StreamKind::Audio,
                codec: CodecId::PcmS16Le,
                time_base: Rational::new(1, 48000),
                parameters: StreamParameters::Audio {
                    channels: 2,
                    sample_rate: 48000,
                    sample_format: SampleFormat::S16,
                    bits_per_sample: 16,
                },
                extradata: None,
            },
        ]
    }

    fn video_packet(pts: i64) -> Packet {
        Packet {
            stream_index: 0,
            pts,
            duration: 1,
            time_base: Rational::new(1, 30),
            keyframe: true,
            data: vec![0x10; 12],
        }
    }

    #[test]
    fn header_starts_with_ebml_and_segment() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        writer.write_header(&streams()).unwrap();
        writer.write_trailer().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        let mut cursor = Cursor::new(&bytes[..]);
        let ebml_header = read_element_header(&mut cursor).unwrap().unwrap();
        assert_eq!(ebml_header.id, ids::EBML);
        cursor.set_position(ebml_header.header_len as u64 + ebml_header.size.unwrap());

        let segment = read_element_header(&mut cursor).unwrap().unwrap();
        assert_eq!(segment.id, ids::SEGMENT);
        let segment_end = cursor.position() + segment.size.unwrap();
        assert_eq!(segment_end, bytes.len() as u64);
    }

    #[test]
    fn header_twice_is_rejected() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        writer.write_header(&streams()).unwrap();
        assert!(writer.write_header(&streams()).is_err());
    }

    #[test]
    fn packets_require_header() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        assert!(writer.write_packet(&video_packet(0)).is_err());
    }

    #[test]
    fn unknown_stream_is_rejected() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        writer.write_header(&streams()).unwrap();
        let mut packet = video_packet(0);
        packet.stream_index = 5;
        assert!(writer.write_packet(&packet).is_err());
    }

    #[test]
    fn clusters_split_on_duration() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 100);
        writer.write_header(&streams()).unwrap();
        // 10 frames at 30 fps span ~300 ms, so at least three clusters
        for pts in 0..10 {
            writer.write_packet(&video_packet(pts)).unwrap();
        }
        writer.write_trailer().unwrap();
        assert!(writer.cues.len() >= 3);
        assert_eq!(writer.end_ms, 333);
        assert!(writer.bytes_written() > 0);
    }

    fn audio_packet(pts: i64) -> Packet {
        Packet {
            stream_index: 1,
            pts,
            duration: 4800,
            time_base: Rational::new(1, 48000),
            keyframe: true,
            data: vec![0; 16],
        }
    }

    #[test]
    fn audio_alone_does_not_split_clusters() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 100);
        writer.write_header(&streams()).unwrap();
        // 1 s of 100 ms audio packets, all flagged as keyframes
        for i in 0..10 {
            writer.write_packet(&audio_packet(i * 4800)).unwrap();
        }
        assert_eq!(writer.cues.len(), 1);

        writer.write_packet(&video_packet(30)).unwrap();
        assert_eq!(writer.cues.len(), 2);
        assert_eq!(writer.cues[1].track, 1);
    }

    #[test]
    fn long_audio_run_starts_cluster_before_relative_overflow() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        writer.write_header(&streams()).unwrap();
        writer.write_packet(&audio_packet(0)).unwrap();
        // 40 s later no longer fits a 16-bit millisecond offset
        writer.write_packet(&audio_packet(40 * 48000)).unwrap();
        assert_eq!(writer.cues.len(), 2);
        assert_eq!(writer.cues[1].time, 40_000);
    }

    #[test]
    fn negative_timestamp_is_rejected() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        writer.write_header(&streams()).unwrap();
        // -40 s at 30 fps
        let err = writer.write_packet(&video_packet(-1200)).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidTimestamp(_)));
        assert!(!err.is_fatal());
        assert!(writer.cues.is_empty());

        writer.write_packet(&video_packet(0)).unwrap();
        writer.write_trailer().unwrap();
        assert_eq!(writer.end_ms, 33);
    }

    #[test]
    fn close_releases_output() {
        let mut writer = MatroskaWriter::new(Cursor::new(Vec::new()), 1000);
        writer.write_header(&streams()).unwrap();
        writer.write_trailer().unwrap();
        writer.close().unwrap();
        assert!(writer.write_packet(&video_packet(0)).is_err());
        assert!(writer.into_inner().is_none());
    }
}
