use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::codec::packet::Packet;
use crate::codec::registry::CodecFlags;
use crate::container::format::{OutputFormat, StreamDescriptor};
use crate::models::config::{AudioConfig, SessionOptions, VideoConfig};
use crate::models::diagnostics::SessionDiagnostics;
use crate::models::error::RecorderError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, TrackDescription};
use crate::models::state::{FinishFlags, SessionPhase, StreamKind};
use crate::storage::{checksum, metadata};
use crate::traits::container_sink::{file_sink_factory, SinkFactory, SinkOptions};
use crate::traits::session_delegate::SessionDelegate;

use super::container_context::{ContainerContext, WrittenPacket};
use super::signal::ReadySignal;
use super::stream_context::{AudioStreamContext, VideoStreamContext};

/// What a finish call did.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// The stream is marked finished; finalization belongs to another call.
    Pending,
    /// This call tore the session down.
    Finalized(Box<RecordingResult>),
    /// The stream had already been finished; nothing changed.
    AlreadyFinished,
}

impl FinishOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    pub fn into_result(self) -> Option<RecordingResult> {
        match self {
            Self::Finalized(result) => Some(*result),
            _ => None,
        }
    }
}

/// One recording: a video stream and an audio stream muxed into one file.
///
/// Every method takes `&self`, so the session is shared between setup and
/// producer threads behind an `Arc`:
/// ```text
/// create_video_context ─┐
///                        ├→ create_container → submit_*_frame … → finish_video
/// create_audio_context ─┘                                        → finish_audio
/// ```
/// `create_container` blocks until both stream contexts exist, and every
/// submission blocks until the container header is written. Locks are taken
/// stream first, then container; teardown holds one lock at a time.
pub struct RecordingSession {
    options: SessionOptions,
    sink_factory: SinkFactory,
    delegate: Option<Arc<dyn SessionDelegate>>,

    video: Mutex<Option<VideoStreamContext>>,
    audio: Mutex<Option<AudioStreamContext>>,
    container: Mutex<Option<ContainerContext>>,

    video_ready: ReadySignal,
    audio_ready: ReadySignal,
    container_ready: ReadySignal,
    container_claimed: AtomicBool,

    finish: Mutex<FinishFlags>,
    capturing: AtomicBool,
    diagnostics: Mutex<SessionDiagnostics>,
    output_path: Mutex<Option<PathBuf>>,
    last_phase: Mutex<SessionPhase>,
}

impl RecordingSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            sink_factory: file_sink_factory(),
            delegate: None,
            video: Mutex::new(None),
            audio: Mutex::new(None),
            container: Mutex::new(None),
            video_ready: ReadySignal::new("video context"),
            audio_ready: ReadySignal::new("audio context"),
            container_ready: ReadySignal::new("container"),
            container_claimed: AtomicBool::new(false),
            finish: Mutex::new(FinishFlags::default()),
            capturing: AtomicBool::new(false),
            diagnostics: Mutex::new(SessionDiagnostics::default()),
            output_path: Mutex::new(None),
            last_phase: Mutex::new(SessionPhase::Unconfigured),
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Replace the sink used for the output file.
    pub fn set_sink_factory(&mut self, factory: SinkFactory) {
        self.sink_factory = factory;
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn phase(&self) -> SessionPhase {
        let flags = *self.finish.lock();
        if flags.session_finished {
            SessionPhase::Closed
        } else if flags.finalizing {
            SessionPhase::Finalizing
        } else if self.container_ready.is_ready() {
            SessionPhase::Recording
        } else {
            match (self.video_ready.is_ready(), self.audio_ready.is_ready()) {
                (true, true) => SessionPhase::StreamsReady,
                (true, false) => SessionPhase::VideoReady,
                (false, true) => SessionPhase::AudioReady,
                (false, false) => SessionPhase::Unconfigured,
            }
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finish.lock().session_finished
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        *self.diagnostics.lock()
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_path.lock().clone()
    }

    fn notify_phase(&self) {
        let phase = self.phase();
        {
            let mut last = self.last_phase.lock();
            if *last == phase {
                return;
            }
            *last = phase;
        }
        debug!("Session phase: {:?}", phase);
        if let Some(delegate) = &self.delegate {
            delegate.on_phase_changed(phase);
        }
    }

    fn ensure_open(&self) -> Result<(), RecorderError> {
        let flags = self.finish.lock();
        if flags.session_finished || flags.finalizing {
            return Err(RecorderError::SessionClosed);
        }
        Ok(())
    }

    // --- Setup ---

    /// Configure the video stream and wake anyone waiting for it.
    pub fn create_video_context(&self, config: &VideoConfig) -> Result<(), RecorderError> {
        self.ensure_open()?;
        let mut slot = self.video.lock();
        if slot.is_some() {
            return Err(RecorderError::AlreadyConfigured("video context"));
        }
        if let Some(reason) = self.video_ready.failure() {
            return Err(RecorderError::SetupFailed(format!("video context: {}", reason)));
        }

        match VideoStreamContext::new(config) {
            Ok(context) => {
                info!("Video context ready: {}", context.descriptor().describe());
                *slot = Some(context);
                drop(slot);
                self.video_ready.set_ready();
                self.notify_phase();
                Ok(())
            }
            Err(e) => {
                drop(slot);
                error!("Video context setup failed: {}", e);
                self.video_ready.set_failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Configure the audio stream and wake anyone waiting for it.
    pub fn create_audio_context(&self, config: &AudioConfig) -> Result<(), RecorderError> {
        self.ensure_open()?;
        let mut slot = self.audio.lock();
        if slot.is_some() {
            return Err(RecorderError::AlreadyConfigured("audio context"));
        }
        if let Some(reason) = self.audio_ready.failure() {
            return Err(RecorderError::SetupFailed(format!("audio context: {}", reason)));
        }

        match AudioStreamContext::new(config) {
            Ok(context) => {
                info!("Audio context ready: {}", context.descriptor().describe());
                *slot = Some(context);
                drop(slot);
                self.audio_ready.set_ready();
                self.notify_phase();
                Ok(())
            }
            Err(e) => {
                drop(slot);
                error!("Audio context setup failed: {}", e);
                self.audio_ready.set_failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for both stream contexts, then open `path` and write the header.
    ///
    /// Any failure marks the container as failed, which releases blocked
    /// submitters with [`RecorderError::SetupFailed`].
    pub fn create_container(&self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        if self.container_claimed.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyConfigured("container"));
        }
        let path = path.as_ref();
        match self.open_container(path) {
            Ok(()) => {
                {
                    // finalize may have claimed the session while the header was written
                    let flags = self.finish.lock();
                    if flags.finalizing || flags.session_finished {
                        warn!("Session finished while {} was being opened", path.display());
                        return Err(RecorderError::SessionClosed);
                    }
                    self.capturing.store(true, Ordering::SeqCst);
                    self.container_ready.set_ready();
                }
                info!("Recording to {}", path.display());
                self.notify_phase();
                Ok(())
            }
            Err(e) => {
                error!("Container setup failed for {}: {}", path.display(), e);
                self.container_ready.set_failed(e.to_string());
                Err(e)
            }
        }
    }

    fn open_container(&self, path: &Path) -> Result<(), RecorderError> {
        self.ensure_open()?;
        self.options.validate().map_err(RecorderError::ConfigurationFailed)?;

        debug!("Container waiting for stream contexts");
        self.video_ready.wait(self.options.ready_timeout)?;
        self.audio_ready.wait(self.options.ready_timeout)?;

        let format = OutputFormat::guess(path).ok_or_else(|| {
            RecorderError::UnsupportedFormat(format!("cannot derive an output format from {}", path.display()))
        })?;

        let mut video = self.video.lock();
        let mut audio = self.audio.lock();
        let video = video
            .as_mut()
            .ok_or_else(|| RecorderError::SetupFailed("video context was released".into()))?;
        let audio = audio
            .as_mut()
            .ok_or_else(|| RecorderError::SetupFailed("audio context was released".into()))?;

        let format = format.with_codecs(video.encoder().codec_id(), audio.encoder().codec_id());
        let flags = CodecFlags {
            global_header: format.flags.global_header,
        };
        let streams = vec![video.descriptor(), audio.descriptor()];
        video.open(flags)?;
        audio.open(flags)?;

        let sink_options = SinkOptions {
            cluster_duration_ms: self.options.cluster_duration.as_millis().max(1) as i64,
        };
        let mut slot = self.container.lock();
        self.ensure_open()?;
        let container = ContainerContext::open(
            path,
            format,
            streams,
            &self.sink_factory,
            sink_options,
            self.options.max_interleave_delta,
        )?;
        *slot = Some(container);
        *self.output_path.lock() = Some(path.to_path_buf());
        Ok(())
    }

    // --- Submission ---

    /// Submit one raw video frame. `timestamp` is in 100 ns units.
    ///
    /// Blocks until the container is ready. Size and conversion errors drop
    /// only this frame.
    pub fn submit_video_frame(&self, buffer: &[u8], timestamp: i64) -> Result<(), RecorderError> {
        self.container_ready.wait(self.options.ready_timeout)?;
        self.diagnostics.lock().video.frames_submitted += 1;

        let result = self.encode_video(buffer, timestamp);
        if let Err(e) = &result {
            self.frame_dropped(StreamKind::Video, e);
        }
        result
    }

    /// Submit one buffer of interleaved audio sample blocks.
    ///
    /// The timestamp is not used; audio timing follows submission order.
    pub fn submit_audio_frame(&self, buffer: &[u8], _timestamp: i64) -> Result<(), RecorderError> {
        self.container_ready.wait(self.options.ready_timeout)?;
        self.diagnostics.lock().audio.frames_submitted += 1;

        let result = self.encode_audio(buffer);
        if let Err(e) = &result {
            self.frame_dropped(StreamKind::Audio, e);
        }
        result
    }

    fn check_stream_open(&self, kind: StreamKind) -> Result<(), RecorderError> {
        let flags = self.finish.lock();
        if flags.session_finished || flags.finalizing {
            Err(RecorderError::SessionClosed)
        } else if flags.is_finished(kind) {
            Err(RecorderError::StreamFinished(kind))
        } else {
            Ok(())
        }
    }

    fn encode_video(&self, buffer: &[u8], timestamp: i64) -> Result<(), RecorderError> {
        let mut slot = self.video.lock();
        self.check_stream_open(StreamKind::Video)?;
        let context = slot.as_mut().ok_or(RecorderError::SessionClosed)?;
        match context.encode(buffer, timestamp)? {
            Some(packet) => self.write_packet(packet),
            None => Ok(()),
        }
    }

    fn encode_audio(&self, buffer: &[u8]) -> Result<(), RecorderError> {
        let mut slot = self.audio.lock();
        self.check_stream_open(StreamKind::Audio)?;
        let context = slot.as_mut().ok_or(RecorderError::SessionClosed)?;
        match context.encode(buffer)? {
            Some(packet) => self.write_packet(packet),
            None => Ok(()),
        }
    }

    /// Hand one tagged packet to the container under the container lock.
    fn write_packet(&self, packet: Packet) -> Result<(), RecorderError> {
        let written = {
            let mut slot = self.container.lock();
            let container = slot.as_mut().ok_or(RecorderError::SessionClosed)?;
            container.write_interleaved(packet)?
        };
        self.account(&written);
        Ok(())
    }

    fn account(&self, written: &[WrittenPacket]) {
        if written.is_empty() {
            return;
        }
        let mut diagnostics = self.diagnostics.lock();
        for packet in written {
            let kind = if packet.stream_index == StreamKind::Video.stream_index() {
                StreamKind::Video
            } else {
                StreamKind::Audio
            };
            let counters = diagnostics.stream_mut(kind);
            counters.packets_written += 1;
            counters.bytes_written += packet.bytes;
        }
    }

    fn frame_dropped(&self, kind: StreamKind, error: &RecorderError) {
        self.diagnostics.lock().stream_mut(kind).frames_dropped += 1;
        if error.is_fatal() {
            error!("Dropped {} frame: {}", kind, error);
        } else {
            warn!("Dropped {} frame: {}", kind, error);
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_frame_dropped(kind, error);
        }
    }

    // --- Finish ---

    /// Declare the video stream complete. Finalizes the session if audio is
    /// already complete.
    pub fn finish_video(&self) -> Result<FinishOutcome, RecorderError> {
        self.finish_stream(StreamKind::Video)
    }

    /// Declare the audio stream complete. Finalizes the session if video is
    /// already complete.
    pub fn finish_audio(&self) -> Result<FinishOutcome, RecorderError> {
        self.finish_stream(StreamKind::Audio)
    }

    fn finish_stream(&self, kind: StreamKind) -> Result<FinishOutcome, RecorderError> {
        // Taken under the stream lock so no submission of this stream is
        // still between its check and its container write.
        let mark = || {
            let mut flags = self.finish.lock();
            if flags.is_finished(kind) {
                false
            } else {
                flags.mark_finished(kind);
                true
            }
        };
        let newly_finished = match kind {
            StreamKind::Video => {
                let _stream = self.video.lock();
                mark()
            }
            StreamKind::Audio => {
                let _stream = self.audio.lock();
                mark()
            }
        };
        if !newly_finished {
            warn!("{} stream already finished; ignoring repeated finish", kind);
            return Ok(FinishOutcome::AlreadyFinished);
        }
        info!("{} stream finished", kind);

        let released = {
            let mut slot = self.container.lock();
            match slot.as_mut() {
                Some(container) => container.end_stream(kind.stream_index()),
                None => Ok(Vec::new()),
            }
        };
        match released {
            Ok(written) => self.account(&written),
            Err(e) => error!("Failed to flush {} packets: {}", kind, e),
        }

        self.finalize()
    }

    /// The finalize gate. Runs teardown once, for whichever call first sees
    /// both streams finished.
    fn finalize(&self) -> Result<FinishOutcome, RecorderError> {
        {
            let mut flags = self.finish.lock();
            if !flags.should_finalize() {
                return Ok(FinishOutcome::Pending);
            }
            flags.finalizing = true;
        }
        self.capturing.store(false, Ordering::SeqCst);
        self.notify_phase();
        info!("Both streams finished; finalizing session");

        let result = self.teardown();

        {
            let mut flags = self.finish.lock();
            flags.finalizing = false;
            flags.session_finished = true;
        }
        // release anyone still waiting on setup that will never happen
        self.video_ready.set_failed("session finished");
        self.audio_ready.set_failed("session finished");
        self.container_ready.set_failed("session finished");
        self.notify_phase();

        info!(
            "Session closed: {} ({:.2}s, {} bytes)",
            result.file_path.display(),
            result.duration_secs,
            result.diagnostics.total_bytes_written()
        );
        if let Some(delegate) = &self.delegate {
            delegate.on_session_finished(&result);
        }
        Ok(FinishOutcome::Finalized(Box::new(result)))
    }

    /// Best-effort teardown: every step runs even if an earlier one failed.
    fn teardown(&self) -> RecordingResult {
        let container = self.container.lock().take();
        let mut streams: Vec<StreamDescriptor> = Vec::new();
        let mut duration_secs = 0.0;
        let mut file_written = false;

        if let Some(mut container) = container {
            match container.write_trailer() {
                Ok(written) => {
                    self.account(&written);
                    file_written = true;
                }
                Err(e) => error!("Failed to write container trailer: {}", e),
            }
            if let Err(e) = container.close() {
                error!("Failed to close container output: {}", e);
            }
            duration_secs = container.duration_secs();
            streams = container.streams().to_vec();
        }

        if let Some(mut video) = self.video.lock().take() {
            if let Err(e) = video.close() {
                error!("Failed to close video encoder: {}", e);
            }
        }
        if let Some(mut audio) = self.audio.lock().take() {
            if let Err(e) = audio.close() {
                error!("Failed to close audio encoder: {}", e);
            }
        }

        let file_path = self.output_path().unwrap_or_default();
        let diagnostics = self.diagnostics();

        let checksum = if file_written && self.options.compute_checksum {
            match checksum::sha256_file(&file_path) {
                Ok(digest) => Some(digest),
                Err(e) => {
                    error!("Failed to checksum {}: {}", file_path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let tracks = streams
            .iter()
            .map(|s| TrackDescription {
                kind: s.kind,
                index: s.index,
                codec: s.codec.to_string(),
                parameters: s.describe(),
                frames: diagnostics.stream(s.kind).packets_written,
            })
            .collect();
        let metadata = RecordingMetadata::new(
            duration_secs,
            &file_path.to_string_lossy(),
            checksum.clone(),
            tracks,
        );

        if file_written && self.options.write_metadata {
            match metadata::write_metadata(&metadata, &file_path) {
                Ok(path) => debug!("Wrote metadata sidecar {}", path.display()),
                Err(e) => error!("Failed to write metadata sidecar: {}", e),
            }
        }

        RecordingResult {
            file_path,
            duration_secs,
            diagnostics,
            metadata,
            checksum,
        }
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}
