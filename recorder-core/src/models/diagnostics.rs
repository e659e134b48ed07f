use serde::{Deserialize, Serialize};

use super::state::StreamKind;

/// Running counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCounters {
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
}

/// Diagnostics for debugging recording sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    pub video: StreamCounters,
    pub audio: StreamCounters,
}

impl SessionDiagnostics {
    pub fn stream(&self, kind: StreamKind) -> &StreamCounters {
        match kind {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
        }
    }

    pub fn stream_mut(&mut self, kind: StreamKind) -> &mut StreamCounters {
        match kind {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => &mut self.audio,
        }
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.video.bytes_written + self.audio.bytes_written
    }
}
