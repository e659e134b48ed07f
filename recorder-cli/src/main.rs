//! `recorder`: drive a dual-stream recording session from synthetic
//! producers, or inspect a finished file.

mod synth;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use parking_lot::Mutex;

use recorder_core::{
    probe_file, AudioConfig, FinishOutcome, PixelFormat, RecorderError, RecordingResult, RecordingSession,
    SampleFormat, SessionDelegate, SessionOptions, SessionPhase, StreamKind, VideoConfig,
};

use synth::{test_pattern, SineTone};

/// 100 ns capture ticks per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

#[derive(Parser)]
#[command(name = "recorder", author, version, about = "Record and inspect dual-stream Matroska files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a synthetic test pattern and sine tone
    Record(RecordArgs),

    /// Print the structure of a recorded file as JSON
    Probe {
        /// File to inspect
        file: PathBuf,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Output file (.mkv)
    #[arg(short, long, default_value = "out.mkv")]
    output: PathBuf,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 360)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps_num: u32,

    #[arg(long, default_value_t = 1)]
    fps_den: u32,

    /// Length of the recording in seconds
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,

    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Pixel layout the video producer submits
    #[arg(long, value_enum, default_value = "rgb24")]
    input_format: InputFormat,

    /// Length of one audio buffer in milliseconds
    #[arg(long, default_value_t = 100)]
    audio_buffer_ms: u32,

    /// Give up on setup waits after this many milliseconds
    #[arg(long)]
    ready_timeout_ms: Option<u64>,

    /// Write a metadata sidecar next to the output
    #[arg(long)]
    metadata: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    Rgb24,
    Bgra,
    Argb,
    Nv12,
    Yuv420p,
}

impl From<InputFormat> for PixelFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Rgb24 => PixelFormat::Rgb24,
            InputFormat::Bgra => PixelFormat::Bgra,
            InputFormat::Argb => PixelFormat::Argb,
            InputFormat::Nv12 => PixelFormat::Nv12,
            InputFormat::Yuv420p => PixelFormat::Yuv420p,
        }
    }
}

/// Logs session events and counts dropped frames.
#[derive(Default)]
struct ConsoleDelegate {
    dropped: AtomicU64,
    recording_since: Mutex<Option<Instant>>,
}

impl SessionDelegate for ConsoleDelegate {
    fn on_phase_changed(&self, phase: SessionPhase) {
        info!("Session phase: {:?}", phase);
        if phase == SessionPhase::Recording {
            *self.recording_since.lock() = Some(Instant::now());
        }
    }

    fn on_frame_dropped(&self, kind: StreamKind, error: &RecorderError) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("Dropped {} frame: {}", kind, error);
    }

    fn on_session_finished(&self, result: &RecordingResult) {
        let elapsed = self.recording_since.lock().map(|t| t.elapsed()).unwrap_or_default();
        info!(
            "Finished {} ({:.2}s of media in {:.2}s)",
            result.file_path.display(),
            result.duration_secs,
            elapsed.as_secs_f64()
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Record(args) => record(args),
        Commands::Probe { file } => probe(&file),
    }
}

fn record(args: RecordArgs) -> Result<()> {
    if args.fps_num == 0 || args.fps_den == 0 {
        bail!("frame rate must be positive");
    }
    if !(args.seconds > 0.0) {
        bail!("--seconds must be positive");
    }
    if args.width == 0 || args.height == 0 {
        bail!("frame size must be positive, got {}x{}", args.width, args.height);
    }
    let block_align = args
        .channels
        .checked_mul(2)
        .filter(|&align| align > 0)
        .ok_or_else(|| anyhow!("unsupported channel count {}", args.channels))?;

    let input_format = PixelFormat::from(args.input_format);
    let video = VideoConfig::new(
        args.width,
        args.height,
        input_format,
        args.fps_num,
        args.fps_den,
        PixelFormat::Yuv420p,
    );
    let audio = AudioConfig {
        channels: args.channels,
        sample_rate: args.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::S16,
        block_align,
    };
    let options = SessionOptions {
        ready_timeout: args.ready_timeout_ms.map(Duration::from_millis),
        write_metadata: args.metadata,
        ..Default::default()
    };

    let delegate = Arc::new(ConsoleDelegate::default());
    let mut session = RecordingSession::new(options);
    session.set_delegate(delegate.clone());
    let session = Arc::new(session);

    let frame_count = (args.seconds * args.fps_num as f64 / args.fps_den as f64).round() as u64;
    let samples_per_buffer = (args.sample_rate as u64 * args.audio_buffer_ms.max(1) as u64 / 1000).max(1) as usize;
    let total_samples = (args.seconds * args.sample_rate as f64).round() as usize;
    info!(
        "Recording {} video frames and {} audio samples to {}",
        frame_count,
        total_samples,
        args.output.display()
    );

    // Setup runs on independent threads in no particular order.
    let video_setup = {
        let session = session.clone();
        thread::spawn(move || session.create_video_context(&video))
    };
    let audio_setup = {
        let session = session.clone();
        thread::spawn(move || session.create_audio_context(&audio))
    };
    let container_setup = {
        let session = session.clone();
        let output = args.output.clone();
        thread::spawn(move || session.create_container(output))
    };

    let (width, height, fps_num, fps_den) = (
        args.width as usize,
        args.height as usize,
        args.fps_num as u64,
        args.fps_den as u64,
    );
    let video_producer = {
        let session = session.clone();
        thread::spawn(move || -> Result<FinishOutcome, RecorderError> {
            for index in 0..frame_count {
                let frame = test_pattern(input_format, width, height, index);
                let timestamp = (index * TICKS_PER_SECOND * fps_den / fps_num) as i64;
                submit(session.submit_video_frame(&frame, timestamp))?;
            }
            session.finish_video()
        })
    };
    let audio_producer = {
        let session = session.clone();
        let (channels, sample_rate) = (args.channels, args.sample_rate);
        thread::spawn(move || -> Result<FinishOutcome, RecorderError> {
            let mut tone = SineTone::new(440.0, sample_rate, channels);
            let mut written = 0usize;
            while written < total_samples {
                let samples = samples_per_buffer.min(total_samples - written);
                let buffer = tone.next_buffer(samples);
                let timestamp = (written as u64 * TICKS_PER_SECOND / sample_rate as u64) as i64;
                submit(session.submit_audio_frame(&buffer, timestamp))?;
                written += samples;
            }
            session.finish_audio()
        })
    };

    join(video_setup, "video setup")?.context("video context setup failed")?;
    join(audio_setup, "audio setup")?.context("audio context setup failed")?;
    join(container_setup, "container setup")?.context("container setup failed")?;

    let video_outcome = join(video_producer, "video producer")?.context("video producer failed")?;
    let audio_outcome = join(audio_producer, "audio producer")?.context("audio producer failed")?;

    let result = video_outcome
        .into_result()
        .or_else(|| audio_outcome.into_result())
        .ok_or_else(|| anyhow!("session did not finalize"))?;

    print_result(&result, delegate.dropped.load(Ordering::Relaxed))?;
    Ok(())
}

/// Dropped frames are reported through the delegate; only fatal errors stop
/// the producer.
fn submit(result: Result<(), RecorderError>) -> Result<(), RecorderError> {
    match result {
        Err(error) if error.is_fatal() => Err(error),
        _ => Ok(()),
    }
}

fn join<T>(handle: thread::JoinHandle<T>, name: &str) -> Result<T> {
    handle.join().map_err(|_| anyhow!("{} thread panicked", name))
}

fn print_result(result: &RecordingResult, dropped: u64) -> Result<()> {
    println!("Recorded {}", result.file_path.display());
    println!("  duration:   {:.3}s", result.duration_secs);
    println!("  bytes:      {}", result.diagnostics.total_bytes_written());
    println!("  dropped:    {}", dropped);
    if let Some(checksum) = &result.checksum {
        println!("  sha256:     {}", checksum);
    }
    for track in &result.metadata.tracks {
        println!("  track {}:    {} {} ({} frames)", track.index, track.codec, track.parameters, track.frames);
    }

    let summary = probe_file(&result.file_path)
        .with_context(|| format!("failed to probe {}", result.file_path.display()))?;
    println!(
        "  clusters:   {} ({} cues, monotonic: {})",
        summary.cluster_count, summary.cue_count, summary.timestamps_monotonic
    );
    Ok(())
}

fn probe(file: &Path) -> Result<()> {
    let summary = probe_file(file).with_context(|| format!("failed to probe {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
