use thiserror::Error;

use super::state::StreamKind;

/// Errors that can occur while setting up, feeding, or finalizing a
/// recording session.
///
/// Setup failures are fatal for the session; per-frame failures drop the
/// offending frame and leave the session usable. See [`RecorderError::is_fatal`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("{0} is already configured")]
    AlreadyConfigured(&'static str),

    #[error("codec not found: {0}")]
    CodecNotFound(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("codec error: {0}")]
    CodecError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("unsupported pixel conversion: {0}")]
    UnsupportedPixelFormat(String),

    #[error("invalid audio buffer: {0}")]
    InvalidAudioBuffer(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("{0} stream already finished")]
    StreamFinished(StreamKind),

    #[error("session is closed")]
    SessionClosed,
}

impl RecorderError {
    /// Whether this error leaves the session unusable.
    ///
    /// Per-frame errors (size mismatch, bad pixel conversion, malformed audio
    /// length, unusable timestamp) only drop the frame that caused them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::BufferSizeMismatch { .. }
                | Self::UnsupportedPixelFormat(_)
                | Self::InvalidAudioBuffer(_)
                | Self::InvalidTimestamp(_)
                | Self::StreamFinished(_)
        )
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(e: std::io::Error) -> Self {
        Self::StorageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_frame_errors_are_not_fatal() {
        assert!(!RecorderError::BufferSizeMismatch { expected: 4, actual: 3 }.is_fatal());
        assert!(!RecorderError::UnsupportedPixelFormat("nv12 -> bgra".into()).is_fatal());
        assert!(!RecorderError::InvalidAudioBuffer("empty".into()).is_fatal());
        assert!(!RecorderError::InvalidTimestamp("-1".into()).is_fatal());
    }

    #[test]
    fn setup_errors_are_fatal() {
        assert!(RecorderError::CodecNotFound("x".into()).is_fatal());
        assert!(RecorderError::Timeout("audio context".into()).is_fatal());
        assert!(RecorderError::AlreadyConfigured("video context").is_fatal());
    }

    #[test]
    fn display_messages() {
        let err = RecorderError::BufferSizeMismatch { expected: 8, actual: 6 };
        assert_eq!(err.to_string(), "buffer size mismatch: expected 8 bytes, got 6");
        assert_eq!(
            RecorderError::AlreadyConfigured("audio context").to_string(),
            "audio context is already configured"
        );
    }
}
