use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use serde::Serialize;

use crate::models::error::RecorderError;

use super::ebml::{self, ids, ElementHeader};

/// What a finished Matroska file contains, as read back from disk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerSummary {
    pub doc_type: String,
    pub segment_size_known: bool,
    pub timestamp_scale: u64,
    pub duration_ms: Option<f64>,
    pub muxing_app: Option<String>,
    pub has_seek_head: bool,
    pub tracks: Vec<TrackSummary>,
    pub cluster_count: usize,
    pub cue_count: usize,
    /// Whether block timestamps never go backwards across the file.
    pub timestamps_monotonic: bool,
}

impl ContainerSummary {
    pub fn track(&self, number: u64) -> Option<&TrackSummary> {
        self.tracks.iter().find(|t| t.number == number)
    }

    pub fn track_of_type(&self, track_type: u64) -> Option<&TrackSummary> {
        self.tracks.iter().find(|t| t.track_type == track_type)
    }
}

/// One track entry plus the blocks found for it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackSummary {
    pub number: u64,
    /// 1 = video, 2 = audio.
    pub track_type: u64,
    pub codec_id: String,
    pub default_duration_ns: Option<u64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub colour_space: Option<String>,
    pub sampling_frequency: Option<f64>,
    pub channels: Option<u64>,
    pub bit_depth: Option<u64>,
    pub block_count: u64,
    pub bytes: u64,
    pub first_timestamp_ms: Option<i64>,
    pub last_timestamp_ms: Option<i64>,
}

#[derive(Default)]
struct BlockStats {
    count: u64,
    bytes: u64,
    first: Option<i64>,
    last: Option<i64>,
}

fn invalid(msg: impl Into<String>) -> RecorderError {
    RecorderError::StorageError(msg.into())
}

/// Read an element payload, refusing sizes that run past the end of the file.
fn read_payload<R: Read + Seek>(r: &mut R, header: &ElementHeader, file_len: u64) -> Result<Vec<u8>, RecorderError> {
    let size = header
        .size
        .ok_or_else(|| invalid(format!("element {:#x} has unknown size", header.id)))?;
    let remaining = file_len.saturating_sub(r.stream_position()?);
    if size > remaining {
        return Err(invalid(format!(
            "element {:#x} claims {} bytes but only {} remain",
            header.id, size, remaining
        )));
    }
    let mut buf = vec![0u8; size as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn parse_track(entry: &[u8]) -> io::Result<TrackSummary> {
    let mut track = TrackSummary::default();
    for (id, data) in ebml::children(entry)? {
        match id {
            ids::TRACK_NUMBER => track.number = ebml::parse_uint(data),
            ids::TRACK_TYPE => track.track_type = ebml::parse_uint(data),
            ids::CODEC_ID => track.codec_id = String::from_utf8_lossy(data).into_owned(),
            ids::DEFAULT_DURATION => track.default_duration_ns = Some(ebml::parse_uint(data)),
            ids::VIDEO => {
                for (id, data) in ebml::children(data)? {
                    match id {
                        ids::PIXEL_WIDTH => track.width = Some(ebml::parse_uint(data)),
                        ids::PIXEL_HEIGHT => track.height = Some(ebml::parse_uint(data)),
                        ids::COLOUR_SPACE => {
                            track.colour_space = Some(String::from_utf8_lossy(data).into_owned())
                        }
                        _ => {}
                    }
                }
            }
            ids::AUDIO => {
                for (id, data) in ebml::children(data)? {
                    match id {
                        ids::SAMPLING_FREQUENCY => track.sampling_frequency = ebml::parse_float(data),
                        ids::CHANNELS => track.channels = Some(ebml::parse_uint(data)),
                        ids::BIT_DEPTH => track.bit_depth = Some(ebml::parse_uint(data)),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    Ok(track)
}

/// Read the Matroska file at `path` and summarize its structure.
///
/// Block payloads are skipped, so probing a large recording stays cheap.
pub fn probe_file(path: &Path) -> Result<ContainerSummary, RecorderError> {
    let file = File::open(path)
        .map_err(|e| RecorderError::StorageError(format!("could not open {}: {}", path.display(), e)))?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut summary = ContainerSummary {
        timestamps_monotonic: true,
        ..Default::default()
    };

    let header = ebml::read_element_header(&mut reader)?.ok_or_else(|| invalid("empty file"))?;
    if header.id != ids::EBML {
        return Err(invalid("not an EBML file"));
    }
    for (id, data) in ebml::children(&read_payload(&mut reader, &header, file_len)?)? {
        if id == ids::DOC_TYPE {
            summary.doc_type = String::from_utf8_lossy(data).into_owned();
        }
    }

    let segment = ebml::read_element_header(&mut reader)?.ok_or_else(|| invalid("missing segment"))?;
    if segment.id != ids::SEGMENT {
        return Err(invalid(format!("expected segment, found {:#x}", segment.id)));
    }
    summary.segment_size_known = segment.size.is_some();
    let segment_end = match segment.size {
        Some(size) => reader.stream_position()? + size,
        None => file_len,
    };

    let mut blocks: HashMap<u64, BlockStats> = HashMap::new();
    let mut last_timestamp = i64::MIN;

    while reader.stream_position()? < segment_end {
        let Some(child) = ebml::read_element_header(&mut reader)? else {
            break;
        };
        match child.id {
            ids::CLUSTER => {
                summary.cluster_count += 1;
                let cluster_end = match child.size {
                    Some(size) => reader.stream_position()? + size,
                    None => segment_end,
                };
                let mut cluster_ts = 0i64;
                while reader.stream_position()? < cluster_end {
                    let Some(element) = ebml::read_element_header(&mut reader)? else {
                        break;
                    };
                    match element.id {
                        ids::CLUSTER_TIMESTAMP => {
                            cluster_ts = ebml::parse_uint(&read_payload(&mut reader, &element, file_len)?) as i64;
                        }
                        ids::SIMPLE_BLOCK => {
                            let size = element.size.ok_or_else(|| invalid("block with unknown size"))?;
                            let (track, track_len) = ebml::read_vint(&mut reader)?;
                            let mut relative = [0u8; 2];
                            reader.read_exact(&mut relative)?;
                            let mut flags = [0u8; 1];
                            reader.read_exact(&mut flags)?;
                            let data_len = size
                                .checked_sub(track_len as u64 + 3)
                                .ok_or_else(|| invalid("block shorter than its header"))?;
                            reader.seek_relative(data_len as i64)?;

                            let timestamp = cluster_ts + i16::from_be_bytes(relative) as i64;
                            if timestamp < last_timestamp {
                                summary.timestamps_monotonic = false;
                            }
                            last_timestamp = timestamp;

                            let stats = blocks.entry(track.unwrap_or(0)).or_default();
                            stats.count += 1;
                            stats.bytes += data_len;
                            stats.first.get_or_insert(timestamp);
                            stats.last = Some(timestamp);
                        }
                        ids::CLUSTER | ids::CUES => {
                            // unknown-size cluster ended at the next top-level element
                            reader.seek_relative(-(element.header_len as i64))?;
                            break;
                        }
                        _ => match element.size {
                            Some(size) => reader.seek_relative(size as i64)?,
                            None => return Err(invalid("unknown-size element inside cluster")),
                        },
                    }
                }
            }
            ids::INFO => {
                for (id, data) in ebml::children(&read_payload(&mut reader, &child, file_len)?)? {
                    match id {
                        ids::TIMESTAMP_SCALE => summary.timestamp_scale = ebml::parse_uint(data),
                        ids::DURATION => summary.duration_ms = ebml::parse_float(data),
                        ids::MUXING_APP => summary.muxing_app = Some(String::from_utf8_lossy(data).into_owned()),
                        _ => {}
                    }
                }
            }
            ids::TRACKS => {
                for (id, data) in ebml::children(&read_payload(&mut reader, &child, file_len)?)? {
                    if id == ids::TRACK_ENTRY {
                        summary.tracks.push(parse_track(data)?);
                    }
                }
            }
            ids::CUES => {
                let payload = read_payload(&mut reader, &child, file_len)?;
                summary.cue_count = ebml::children(&payload)?
                    .iter()
                    .filter(|(id, _)| *id == ids::CUE_POINT)
                    .count();
            }
            ids::SEEK_HEAD => {
                summary.has_seek_head = true;
                read_payload(&mut reader, &child, file_len)?;
            }
            _ => match child.size {
                Some(size) => reader.seek_relative(size as i64)?,
                None => return Err(invalid(format!("unknown-size element {:#x} in segment", child.id))),
            },
        }
    }

    for track in &mut summary.tracks {
        if let Some(stats) = blocks.remove(&track.number) {
            track.block_count = stats.count;
            track.bytes = stats.bytes;
            track.first_timestamp_ms = stats.first;
            track.last_timestamp_ms = stats.last;
        }
    }
    if summary.timestamp_scale == 0 {
        summary.timestamp_scale = 1_000_000;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::codec::packet::Packet;
    use crate::codec::registry::CodecId;
    use crate::container::format::{StreamDescriptor, StreamParameters};
    use crate::container::matroska::MatroskaWriter;
    use crate::models::formats::{PixelFormat, SampleFormat};
    use crate::models::rational::Rational;
    use crate::models::state::StreamKind;
    use crate::traits::container_sink::ContainerSink;

    fn streams() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor {
                index: 0,
                kind: StreamKind::Video,
                codec: CodecId::RawVideo,
                time_base: Rational::new(1, 25),
                parameters: StreamParameters::Video {
                    width: 2,
                    height: 2,
                    pixel_format: PixelFormat::Yuv420p,
                    frame_rate: Rational::new(25, 1),
                },
                extradata: None,
            },
            StreamDescriptor {
                index: 1,
                kind: StreamKind::Audio,
                codec: CodecId::PcmS16Le,
                time_base: Rational::new(1, 8000),
                parameters: StreamParameters::Audio {
                    channels: 1,
                    sample_rate: 8000,
                    sample_format: SampleFormat::S16,
                    bits_per_sample: 16,
                },
                extradata: None,
            },
        ]
    }

    #[test]
    fn reads_back_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.mkv");

        let mut writer = MatroskaWriter::create(&path, 1000).unwrap();
        writer.write_header(&streams()).unwrap();
        for i in 0..50 {
            writer
                .write_packet(&Packet {
                    stream_index: 0,
                    pts: i,
                    duration: 1,
                    time_base: Rational::new(1, 25),
                    keyframe: true,
                    data: vec![1; 6],
                })
                .unwrap();
            writer
                .write_packet(&Packet {
                    stream_index: 1,
                    pts: i * 320,
                    duration: 320,
                    time_base: Rational::new(1, 8000),
                    keyframe: true,
                    data: vec![0; 640],
                })
                .unwrap();
        }
        writer.write_trailer().unwrap();
        writer.close().unwrap();

        let summary = probe_file(&path).unwrap();
        assert_eq!(summary.doc_type, "matroska");
        assert!(summary.segment_size_known);
        assert!(summary.has_seek_head);
        assert_eq!(summary.timestamp_scale, 1_000_000);
        assert_eq!(summary.duration_ms, Some(2000.0));
        assert!(summary.muxing_app.as_deref().unwrap().starts_with("recorder-core"));
        assert!(summary.timestamps_monotonic);
        // 2 s of content at 1 s per cluster
        assert_eq!(summary.cluster_count, 2);
        assert_eq!(summary.cue_count, 2);

        let video = summary.track_of_type(1).unwrap();
        assert_eq!(video.number, 1);
        assert_eq!(video.codec_id, "V_UNCOMPRESSED");
        assert_eq!((video.width, video.height), (Some(2), Some(2)));
        assert_eq!(video.colour_space.as_deref(), Some("I420"));
        assert_eq!(video.default_duration_ns, Some(40_000_000));
        assert_eq!(video.block_count, 50);
        assert_eq!(video.bytes, 300);
        assert_eq!(video.last_timestamp_ms, Some(1960));

        let audio = summary.track(2).unwrap();
        assert_eq!(audio.codec_id, "A_PCM/INT/LIT");
        assert_eq!(audio.sampling_frequency, Some(8000.0));
        assert_eq!(audio.channels, Some(1));
        assert_eq!(audio.bit_depth, Some(16));
        assert_eq!(audio.block_count, 50);
        assert_eq!(audio.bytes, 50 * 640);
    }

    #[test]
    fn rejects_non_ebml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF....WAVE").unwrap();
        assert!(probe_file(file.path()).is_err());
    }

    #[test]
    fn oversized_element_is_rejected_without_allocating() {
        // EBML header whose 8-byte size field claims about 2^55 bytes
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x1A, 0x45, 0xDF, 0xA3, 0x01, 0x7F, 0, 0, 0, 0, 0, 0])
            .unwrap();
        let err = probe_file(file.path()).unwrap_err();
        assert!(matches!(err, RecorderError::StorageError(_)));
    }

    #[test]
    fn truncated_tracks_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.mkv");
        let mut writer = MatroskaWriter::create(&path, 1000).unwrap();
        writer.write_header(&streams()).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
        assert!(matches!(probe_file(&path), Err(RecorderError::StorageError(_))));
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe_file(&dir.path().join("absent.mkv")).unwrap_err();
        assert!(matches!(err, RecorderError::StorageError(_)));
    }
}
