//! vodsync command-line entry point.
//!
//! - `chat`: load a chat replay and print the window visible at a position
//! - `simulate`: run two simulated tracks through the threaded sync loop

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{debug, info, trace, warn};

use vodsync::chat::{ChatFilter, MessageType, ReplayWindow};
use vodsync::config::SyncConfig;
use vodsync::core::time::format_time;
use vodsync::core::track::TrackRole;
use vodsync::fetch::{diagnose_failure, load_chat_replay, FetchProgress, FileFetcher, ReplaySource};
use vodsync::logging;
use vodsync::media::{AutoplayPolicy, MediaTrackHandle, SharedVisibility, SimulatedTrack};
use vodsync::playback::{IntervalScheduler, MediaSync, SyncDriver, SystemTimeSource, TimeSource};
use vodsync::prefs::{JsonFileStore, PlayerPreferences};

/// Synchronized VOD playback with chat replay
#[derive(Parser)]
#[command(name = "vodsync", version, about = "Synchronized VOD playback with chat replay")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace for vodsync, -vvv trace for all)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Sync configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the chat messages visible at a playback position
    Chat(ChatArgs),
    /// Run simulated video and audio tracks through the sync loop
    Simulate(SimulateArgs),
}

#[derive(clap::Args)]
struct ChatArgs {
    /// Chat replay file (JSON array or line-delimited replay events)
    file: PathBuf,

    /// Stream metadata file, used to resolve absolute timestamps
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Playback position in seconds
    #[arg(long)]
    at: f64,

    /// Messages to show (default from config)
    #[arg(long)]
    window: Option<usize>,

    /// Only show these message types
    #[arg(long = "type", value_enum)]
    types: Vec<MessageKind>,

    /// Only show messages whose text or author contains this
    #[arg(long)]
    query: Option<String>,
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// How long to run, in seconds
    #[arg(long, default_value = "5")]
    seconds: f64,

    /// Playback rate of the simulated video track
    #[arg(long, default_value = "1.0")]
    video_rate: f64,

    /// Simulate a hidden page (reference follows the leading track)
    #[arg(long)]
    hidden: bool,

    /// Preferences file; the stored volume is applied to the tracks
    #[arg(long)]
    prefs: Option<PathBuf>,

    /// Set and persist the volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Treat autoplay as blocked; playback then never starts
    #[arg(long)]
    block_autoplay: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MessageKind {
    Text,
    Paid,
    Membership,
}

impl From<MessageKind> for MessageType {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => MessageType::Text,
            MessageKind::Paid => MessageType::Paid,
            MessageKind::Membership => MessageType::Membership,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).context("failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SyncConfig::default(),
    };

    match cli.command {
        Command::Chat(args) => run_chat(args, &config),
        Command::Simulate(args) => run_simulate(args, config),
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")
}

fn run_chat(args: ChatArgs, config: &SyncConfig) -> anyhow::Result<()> {
    let runtime = runtime()?;

    let chat_location = args.file.to_string_lossy().into_owned();
    let metadata_location = args
        .metadata
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());

    let progress = |source: ReplaySource, progress: FetchProgress| {
        trace!(
            "{:?}: {} bytes{}",
            source,
            progress.loaded,
            progress
                .fraction()
                .map(|f| format!(" ({:.0}%)", f * 100.0))
                .unwrap_or_default()
        );
    };
    let messages = runtime
        .block_on(load_chat_replay(
            &FileFetcher,
            &chat_location,
            metadata_location.as_deref(),
            &progress,
        ))
        .with_context(|| format!("failed to load chat replay {}", chat_location))?;

    let mut filter = ChatFilter::new();
    if !args.types.is_empty() {
        filter = filter.with_types(args.types.iter().copied().map(MessageType::from));
    }
    if let Some(query) = &args.query {
        filter = filter.with_query(query);
    }

    let mut window = ReplayWindow::new(messages, args.window.unwrap_or(config.chat_window_size));
    window.set_filter(filter);
    window.set_time(args.at);

    info!(
        "{} of {} messages visible at {}",
        window.visible_len(),
        window.log().len(),
        format_time(args.at)
    );
    for message in window.visible() {
        let amount = message
            .money
            .as_ref()
            .map(|money| format!(" [{}]", money.text))
            .unwrap_or_default();
        println!(
            "{:>8} {}{}: {}",
            format_time(message.time_in_seconds),
            message.author.name,
            amount,
            message.message
        );
    }
    Ok(())
}

fn run_simulate(args: SimulateArgs, config: SyncConfig) -> anyhow::Result<()> {
    let runtime = runtime()?;
    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
    let duration = args.seconds.max(1.0) * 2.0;
    let video = SimulatedTrack::new(TrackRole::Video, clock.clone())
        .with_duration(duration)
        .with_rate(args.video_rate)
        .with_source("simulated://video");
    let audio = SimulatedTrack::new(TrackRole::Audio, clock.clone())
        .with_duration(duration)
        .with_source("simulated://audio");

    let visibility = Arc::new(SharedVisibility::new(!args.hidden));
    let frame_interval = config.frame_duration();
    let mut sync = MediaSync::new(
        Box::new(video.clone()),
        Box::new(audio.clone()),
        config,
        clock,
        visibility,
    )?;

    if let Some(path) = &args.prefs {
        let mut prefs = PlayerPreferences::load(JsonFileStore::new(path));
        if let Some(volume) = args.volume {
            prefs
                .set_volume(volume)
                .with_context(|| format!("failed to save preferences {}", path.display()))?;
        }
        sync.set_volume(prefs.volume());
    } else if let Some(volume) = args.volume {
        sync.set_volume(volume);
    }

    let policy = if args.block_autoplay {
        AutoplayPolicy::Blocked
    } else {
        AutoplayPolicy::Allowed
    };
    if !sync.autoplay(&policy) {
        warn!("Autoplay blocked, tracks stay paused");
    }

    let driver = SyncDriver::spawn(sync, IntervalScheduler::new(frame_interval))?;
    info!(
        "Simulating {:.1}s, video rate {}, page {}",
        args.seconds,
        args.video_rate,
        if args.hidden { "hidden" } else { "visible" }
    );

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    let mut last_report = Instant::now();
    let mut ticks = 0u64;
    let mut desynced_ticks = 0u64;
    let mut diagnosed = None;

    while started.elapsed() < run_for {
        let snapshot = match driver.snapshots().recv_timeout(Duration::from_millis(250)) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!("No snapshot from sync thread");
                continue;
            }
        };
        ticks += 1;
        if !snapshot.is_fully_synced {
            desynced_ticks += 1;
        }
        if let Some(failure) = &snapshot.error {
            if diagnosed != Some(failure.role) {
                diagnosed = Some(failure.role);
                warn!("{} track failed: {}", failure.role, failure.message);
                if let Some(message) = runtime.block_on(diagnose_failure(&FileFetcher, failure)) {
                    info!("{} source reports: {}", failure.role, message);
                    driver.attach_diagnostic(failure.role, message)?;
                }
            }
        }
        if last_report.elapsed() >= Duration::from_millis(500) {
            last_report = Instant::now();
            info!(
                "t={} phase={:?} synced={}",
                format_time(snapshot.reference_time),
                snapshot.phase(),
                snapshot.is_fully_synced
            );
            debug!("video={:.3} audio={:.3}", video.position(), audio.position());
        }
    }

    driver.shutdown()?;
    println!(
        "ticks: {}, desynced: {}, video: {:.3}s, audio: {:.3}s, volume: {:.2}",
        ticks,
        desynced_ticks,
        video.position(),
        audio.position(),
        audio.volume()
    );
    Ok(())
}
