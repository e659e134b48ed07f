use std::fmt;

use serde::{Deserialize, Serialize};

/// The two media streams a session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// Fixed output stream index inside the container.
    pub fn stream_index(self) -> usize {
        match self {
            Self::Video => 0,
            Self::Audio => 1,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Recording session lifecycle.
///
/// State transitions:
/// ```text
/// unconfigured → video-ready ─┐
///              → audio-ready ─┴→ streams-ready → recording → finalizing → closed
/// ```
/// Every transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unconfigured,
    VideoReady,
    AudioReady,
    StreamsReady,
    Recording,
    Finalizing,
    Closed,
}

impl SessionPhase {
    /// Whether frames may currently be submitted without blocking.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether both stream contexts have been configured.
    pub fn streams_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured | Self::VideoReady | Self::AudioReady)
    }
}

/// Per-stream completion flags guarded by the finalize lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishFlags {
    pub video_finished: bool,
    pub audio_finished: bool,
    pub finalizing: bool,
    pub session_finished: bool,
}

impl FinishFlags {
    pub fn is_finished(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Video => self.video_finished,
            StreamKind::Audio => self.audio_finished,
        }
    }

    pub fn mark_finished(&mut self, kind: StreamKind) {
        match kind {
            StreamKind::Video => self.video_finished = true,
            StreamKind::Audio => self.audio_finished = true,
        }
    }

    /// The finalize gate: both streams done and teardown not yet run.
    pub fn should_finalize(&self) -> bool {
        self.video_finished && self.audio_finished && !self.session_finished && !self.finalizing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_indices_are_fixed() {
        assert_eq!(StreamKind::Video.stream_index(), 0);
        assert_eq!(StreamKind::Audio.stream_index(), 1);
    }

    #[test]
    fn finalize_gate_needs_both_flags() {
        let mut flags = FinishFlags::default();
        assert!(!flags.should_finalize());

        flags.mark_finished(StreamKind::Audio);
        assert!(!flags.should_finalize());

        flags.mark_finished(StreamKind::Video);
        assert!(flags.should_finalize());

        flags.session_finished = true;
        assert!(!flags.should_finalize());
    }

    #[test]
    fn phase_predicates() {
        assert!(!SessionPhase::AudioReady.streams_configured());
        assert!(SessionPhase::StreamsReady.streams_configured());
        assert!(SessionPhase::Recording.is_recording());
        assert!(SessionPhase::Closed.is_terminal());
    }
}
