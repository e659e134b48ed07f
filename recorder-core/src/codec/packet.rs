use crate::models::rational::Rational;

/// One encoded unit on its way to the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Output stream index (0 = video, 1 = audio). Set when the packet is
    /// tagged for writing.
    pub stream_index: usize,
    /// Presentation timestamp in `time_base` units.
    pub pts: i64,
    /// Duration in `time_base` units.
    pub duration: i64,
    pub time_base: Rational,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
