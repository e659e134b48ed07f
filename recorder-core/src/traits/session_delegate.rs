use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{SessionPhase, StreamKind};

/// Event delegate for recording session notifications.
///
/// Methods are called on whichever producer or setup thread triggered the
/// event, never while a session lock is held.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session moves to a new phase.
    fn on_phase_changed(&self, phase: SessionPhase);

    /// Called when a submitted frame is rejected and dropped.
    fn on_frame_dropped(&self, stream: StreamKind, error: &RecorderError);

    /// Called once, after the file is finalized.
    fn on_session_finished(&self, result: &RecordingResult);
}
