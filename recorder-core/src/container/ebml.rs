//! Low-level EBML element writing and reading primitives.
//!
//! Every EBML element is:
//! - an ID of 1 to 4 bytes whose leading bits encode its own length,
//! - a variable-length size (1 to 8 bytes, same length marker scheme),
//! - `size` bytes of payload.
//!
//! Master elements whose size is not known up front are written with an
//! 8-byte size placeholder and patched once their content is complete.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Element IDs used by the Matroska writer and probe.
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_LACING: u32 = 0x9C;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const COLOUR_SPACE: u32 = 0x2E_B524;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const BIT_DEPTH: u32 = 0x6264;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const CLUSTER_TIMESTAMP: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;

    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;

    pub const VOID: u32 = 0xEC;
}

/// Length of the size placeholder used for open master elements.
pub const PLACEHOLDER_SIZE_LEN: usize = 8;

/// Largest value representable by an 8-byte size (all ones is reserved for
/// "unknown").
const MAX_SIZE: u64 = (1 << 56) - 2;

/// Number of bytes an element ID occupies.
pub fn id_len(id: u32) -> usize {
    match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Smallest vint length that can carry `value`.
pub fn vint_len(value: u64) -> usize {
    (1..=8).find(|&n| value < (1u64 << (7 * n)) - 1).unwrap_or(8)
}

/// Number of bytes needed for an unsigned integer payload (at least one).
pub fn uint_len(value: u64) -> usize {
    (1..=8).find(|&n| n == 8 || value >> (8 * n) == 0).unwrap_or(8)
}

pub fn write_id<W: Write>(w: &mut W, id: u32) -> io::Result<()> {
    w.write_uint::<BigEndian>(id as u64, id_len(id))
}

/// Write `value` as a vint of exactly `len` bytes.
pub fn write_vint<W: Write>(w: &mut W, value: u64, len: usize) -> io::Result<()> {
    if len == 0 || len > 8 || value >= (1u64 << (7 * len)) - 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("value {} does not fit a {}-byte vint", value, len),
        ));
    }
    w.write_uint::<BigEndian>(value | (1u64 << (7 * len)), len)
}

pub fn write_size<W: Write>(w: &mut W, size: u64) -> io::Result<()> {
    write_vint(w, size, vint_len(size))
}

pub fn write_uint_element<W: Write>(w: &mut W, id: u32, value: u64) -> io::Result<()> {
    let len = uint_len(value);
    write_id(w, id)?;
    write_size(w, len as u64)?;
    w.write_uint::<BigEndian>(value, len)
}

pub fn write_float_element<W: Write>(w: &mut W, id: u32, value: f64) -> io::Result<()> {
    write_id(w, id)?;
    write_size(w, 8)?;
    w.write_f64::<BigEndian>(value)
}

pub fn write_binary_element<W: Write>(w: &mut W, id: u32, data: &[u8]) -> io::Result<()> {
    write_id(w, id)?;
    write_size(w, data.len() as u64)?;
    w.write_all(data)
}

pub fn write_string_element<W: Write>(w: &mut W, id: u32, value: &str) -> io::Result<()> {
    write_binary_element(w, id, value.as_bytes())
}

/// Write a master element whose children are already serialized.
pub fn write_master<W: Write>(w: &mut W, id: u32, children: &[u8]) -> io::Result<()> {
    write_binary_element(w, id, children)
}

/// Open a master element with an 8-byte size placeholder.
///
/// Returns the position of the size field, to be passed to [`end_master`].
pub fn start_master<W: Write + Seek>(w: &mut W, id: u32) -> io::Result<u64> {
    write_id(w, id)?;
    let size_pos = w.stream_position()?;
    // unknown size until patched
    w.write_u8(0x01)?;
    w.write_uint::<BigEndian>((1u64 << 56) - 1, 7)?;
    Ok(size_pos)
}

/// Patch the size of a master opened with [`start_master`] so it ends at the
/// current position.
pub fn end_master<W: Write + Seek>(w: &mut W, size_pos: u64) -> io::Result<()> {
    let end = w.stream_position()?;
    let size = end - size_pos - PLACEHOLDER_SIZE_LEN as u64;
    if size > MAX_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("element size {} exceeds the 8-byte size limit", size),
        ));
    }
    w.seek(SeekFrom::Start(size_pos))?;
    w.write_u8(0x01)?;
    w.write_uint::<BigEndian>(size, 7)?;
    w.seek(SeekFrom::Start(end))?;
    Ok(())
}

/// Write a Void element occupying exactly `total_len` bytes (minimum 2).
pub fn write_void<W: Write>(w: &mut W, total_len: usize) -> io::Result<()> {
    if total_len < 2 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "void element needs at least 2 bytes"));
    }
    write_id(w, ids::VOID)?;
    let size_len = if total_len - 1 <= 127 { 1 } else { 8 };
    let payload = total_len - 1 - size_len;
    write_vint(w, payload as u64, size_len)?;
    w.write_all(&vec![0u8; payload])
}

/// Header of an element read back from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    /// `None` when the size field holds the reserved "unknown" value.
    pub size: Option<u64>,
    pub header_len: usize,
}

/// Read an element header, or `None` at a clean end of stream.
pub fn read_element_header<R: Read>(r: &mut R) -> io::Result<Option<ElementHeader>> {
    let first = match r.read_u8() {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let id_len = first.leading_zeros() as usize + 1;
    if id_len > 4 {
        return Err(invalid("element ID longer than 4 bytes"));
    }
    let mut id = first as u32;
    for _ in 1..id_len {
        id = (id << 8) | r.read_u8()? as u32;
    }

    let (size, size_len) = read_vint(r)?;
    Ok(Some(ElementHeader {
        id,
        size,
        header_len: id_len + size_len,
    }))
}

/// Read a vint, returning its value (`None` if unknown) and length.
pub fn read_vint<R: Read>(r: &mut R) -> io::Result<(Option<u64>, usize)> {
    let first = r.read_u8()?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return Err(invalid("vint longer than 8 bytes"));
    }
    let mut value = (first as u64) & (0xFF >> len);
    for _ in 1..len {
        value = (value << 8) | r.read_u8()? as u64;
    }
    let unknown = value == (1u64 << (7 * len)) - 1;
    Ok((if unknown { None } else { Some(value) }, len))
}

/// Decode an unsigned integer payload.
pub fn parse_uint(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Decode a 4- or 8-byte float payload.
pub fn parse_float(data: &[u8]) -> Option<f64> {
    match data.len() {
        4 => Some(f32::from_be_bytes(data.try_into().ok()?) as f64),
        8 => Some(f64::from_be_bytes(data.try_into().ok()?)),
        0 => Some(0.0),
        _ => None,
    }
}

/// Split a master element payload into `(id, payload)` children.
pub fn children(mut data: &[u8]) -> io::Result<Vec<(u32, &[u8])>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let mut cursor = data;
        let header = read_element_header(&mut cursor)?.ok_or_else(|| invalid("truncated element"))?;
        let size = header.size.ok_or_else(|| invalid("unknown size inside a sized master"))? as usize;
        let start = header.header_len;
        if size > data.len() - start {
            return Err(invalid("element overruns its parent"));
        }
        out.push((header.id, &data[start..start + size]));
        data = &data[start + size..];
    }
    Ok(out)
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn vint_lengths() {
        assert_eq!(vint_len(0), 1);
        assert_eq!(vint_len(126), 1);
        assert_eq!(vint_len(127), 2); // all-ones is reserved
        assert_eq!(vint_len(16_382), 2);
        assert_eq!(vint_len(16_383), 3);
    }

    #[test]
    fn id_and_uint_lengths() {
        assert_eq!(id_len(ids::SIMPLE_BLOCK), 1);
        assert_eq!(id_len(ids::SEEK), 2);
        assert_eq!(id_len(ids::TIMESTAMP_SCALE), 3);
        assert_eq!(id_len(ids::SEGMENT), 4);

        assert_eq!(uint_len(0), 1);
        assert_eq!(uint_len(255), 1);
        assert_eq!(uint_len(256), 2);
        assert_eq!(uint_len(u64::MAX), 8);
    }

    #[test]
    fn uint_element_bytes() {
        let mut out = Vec::new();
        write_uint_element(&mut out, ids::TIMESTAMP_SCALE, 1_000_000).unwrap();
        assert_eq!(out, vec![0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40]);
    }

    #[test]
    fn placeholder_master_is_patched() {
        let mut out = Cursor::new(Vec::new());
        let pos = start_master(&mut out, ids::CLUSTER).unwrap();
        write_uint_element(&mut out, ids::CLUSTER_TIMESTAMP, 5).unwrap();
        end_master(&mut out, pos).unwrap();

        let bytes = out.into_inner();
        assert_eq!(&bytes[..4], &[0x1F, 0x43, 0xB6, 0x75]);
        assert_eq!(&bytes[4..12], &[0x01, 0, 0, 0, 0, 0, 0, 3]);

        let mut reader = Cursor::new(&bytes);
        let header = read_element_header(&mut reader).unwrap().unwrap();
        assert_eq!(header.id, ids::CLUSTER);
        assert_eq!(header.size, Some(3));
        assert_eq!(header.header_len, 12);
    }

    #[test]
    fn unknown_size_reads_as_none() {
        let mut out = Cursor::new(Vec::new());
        start_master(&mut out, ids::SEGMENT).unwrap();
        let bytes = out.into_inner();

        let header = read_element_header(&mut Cursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(header.size, None);
    }

    #[test]
    fn void_fills_exact_length() {
        for total in [2usize, 9, 128, 129, 500] {
            let mut out = Vec::new();
            write_void(&mut out, total).unwrap();
            assert_eq!(out.len(), total, "total {}", total);

            let header = read_element_header(&mut Cursor::new(&out)).unwrap().unwrap();
            assert_eq!(header.id, ids::VOID);
            assert_eq!(header.header_len as u64 + header.size.unwrap(), total as u64);
        }
        assert!(write_void(&mut Vec::new(), 1).is_err());
    }

    #[test]
    fn children_of_master() {
        let mut payload = Vec::new();
        write_uint_element(&mut payload, ids::TRACK_NUMBER, 2).unwrap();
        write_string_element(&mut payload, ids::CODEC_ID, "A_PCM/INT/LIT").unwrap();
        write_float_element(&mut payload, ids::SAMPLING_FREQUENCY, 48000.0).unwrap();

        let kids = children(&payload).unwrap();
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0].0, ids::TRACK_NUMBER);
        assert_eq!(parse_uint(kids[0].1), 2);
        assert_eq!(kids[1].1, &b"A_PCM/INT/LIT"[..]);
        assert_eq!(parse_float(kids[2].1), Some(48000.0));
    }

    #[test]
    fn oversized_vint_value_is_rejected() {
        assert!(write_vint(&mut Vec::new(), 127, 1).is_err());
        assert!(write_vint(&mut Vec::new(), 126, 1).is_ok());
    }
}
