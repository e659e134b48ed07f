use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::diagnostics::SessionDiagnostics;
use super::state::StreamKind;

/// Result returned by the finish call that finalized the session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub diagnostics: SessionDiagnostics,
    pub metadata: RecordingMetadata,
    /// SHA-256 of the finished file, when checksumming is enabled.
    pub checksum: Option<String>,
}

/// One output track as described in the metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescription {
    #[serde(rename = "type")]
    pub kind: StreamKind,
    pub index: usize,
    pub codec: String,
    /// Human-readable parameters, e.g. `1920x1080 yuv420p @ 30/1`.
    pub parameters: String,
    pub frames: u64,
}

/// Metadata stored alongside a recording.
///
/// Serializable for JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: Option<String>,
    pub created_at: String,
    pub tracks: Vec<TrackDescription>,
}

impl RecordingMetadata {
    pub fn new(
        duration_secs: f64,
        file_path: &str,
        checksum: Option<String>,
        tracks: Vec<TrackDescription>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            duration_secs,
            file_path: file_path.to_string(),
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
            tracks,
        }
    }

    pub fn track(&self, kind: StreamKind) -> Option<&TrackDescription> {
        self.tracks.iter().find(|t| t.kind == kind)
    }
}
