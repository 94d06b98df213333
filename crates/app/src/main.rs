use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{Parser, Subcommand};
use music_pulse_core::{
    AnimationScheduler, AppConfig, AudioOutput, AudioSessionManager, CoverSlot, DeviceOutput,
    FileTrackFetcher, FrequencyAnalyzer, HttpTrackFetcher, NullOutput, PlaybackOutcome,
    RasterSurface, Recorder, RecordingSettings, SessionState, SymphoniaDecoder, TrackFetcher,
    VisualizationMode, VisualizationRenderer,
};
use tracing_subscriber::EnvFilter;

/// How far playback may run ahead of the output device.
const OUTPUT_BUFFER: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> music_pulse_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Play(args) => run_play(config, args).await,
        Commands::Tracks { media_dir } => run_tracks(config, media_dir).await,
        Commands::Snapshot {
            input,
            output,
            at,
            mode,
        } => run_snapshot(config, &input, &output, at, mode),
    }
}

async fn run_play(mut config: AppConfig, args: PlayArgs) -> music_pulse_core::Result<()> {
    if let Some(mode) = args.mode {
        config.render.mode = mode;
    }
    let volume = args.volume.unwrap_or(config.audio.default_volume);

    let media_dir = args.media_dir.or(config.source.media_dir.clone());
    let fetcher: Arc<dyn TrackFetcher> = match media_dir {
        Some(dir) => Arc::new(FileTrackFetcher::new(dir)),
        None => Arc::new(HttpTrackFetcher::new(
            args.server.unwrap_or(config.source.base_url.clone()),
        )),
    };

    let output: Arc<dyn AudioOutput> = if args.headless {
        Arc::new(NullOutput)
    } else {
        Arc::new(DeviceOutput::open_default(OUTPUT_BUFFER)?)
    };

    let cover = Arc::new(CoverSlot::new());
    let manager = AudioSessionManager::new(
        fetcher,
        Arc::new(SymphoniaDecoder::with_extension_hint("mp3")),
        cover.clone(),
        output,
        config.audio.clone(),
    );
    let analyzer = manager.build_graph(volume)?.analyzer().clone();

    let surface = RasterSurface::new(config.render.width, config.render.height);
    let renderer = Arc::new(Mutex::new(VisualizationRenderer::new(
        surface,
        config.render.clone(),
        analyzer.bin_count(),
    )));

    let mut scheduler = AnimationScheduler::new(analyzer, renderer, config.render.fps);
    if let Some(output_dir) = args.record_dir {
        let mut recorder = Recorder::new(RecordingSettings {
            output_dir,
            every: args.record_every,
        });
        recorder.start()?;
        scheduler = scheduler.with_observer(move |frame, renderer| {
            // Encoding is detached; failures are logged by the recorder.
            let _ = recorder.capture(frame, renderer.surface());
        });
    }
    let animation = scheduler.spawn();

    let limit = args.switch_after.map(Duration::from_secs_f64);
    for track in &args.tracks {
        match manager.request_playback(track).await {
            Ok(PlaybackOutcome::Started(track)) => {
                tracing::info!(%track, cover = cover.is_visible(), "now playing");
            }
            Ok(PlaybackOutcome::Superseded(track)) => {
                tracing::info!(%track, "superseded");
                continue;
            }
            Err(err) => {
                tracing::error!(%track, %err, "skipping track");
                continue;
            }
        }

        tokio::select! {
            _ = wait_until_drained(&manager, limit) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    manager.stop_current();
    animation.stop();
    Ok(())
}

async fn wait_until_drained(manager: &AudioSessionManager, limit: Option<Duration>) {
    let started = tokio::time::Instant::now();
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    loop {
        poll.tick().await;
        if manager.state() != SessionState::Playing {
            return;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            return;
        }
    }
}

async fn run_tracks(
    config: AppConfig,
    media_dir: Option<PathBuf>,
) -> music_pulse_core::Result<()> {
    let dir = media_dir
        .or(config.source.media_dir)
        .ok_or("no media directory given")?;

    for track in FileTrackFetcher::new(dir).list_tracks().await? {
        println!("{track}");
    }
    Ok(())
}

fn run_snapshot(
    mut config: AppConfig,
    input: &Path,
    output: &Path,
    at: f64,
    mode: Option<VisualizationMode>,
) -> music_pulse_core::Result<()> {
    tracing::info!(?input, ?output, at, "rendering snapshot");

    let payload = std::fs::read(input)?;
    let audio = SymphoniaDecoder::new().decode_blocking(payload)?;

    config.audio.smoothing = 0.0;
    let analyzer = FrequencyAnalyzer::new(&config.audio)?;
    let end = ((at.max(0.0) * f64::from(audio.sample_rate)) as usize).min(audio.frames());
    let start = end.saturating_sub(analyzer.fft_size());
    analyzer.push_samples(&audio.downmix(start, end - start))?;
    let frame = analyzer.snapshot()?;

    if let Some(mode) = mode {
        config.render.mode = mode;
    }
    let surface = RasterSurface::new(config.render.width, config.render.height);
    let mut renderer = VisualizationRenderer::new(surface, config.render, analyzer.bin_count());
    renderer.draw(&frame);
    renderer.surface().save_png(output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Streamed music player with a live spectrum visualiser",
    long_about = None
)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play tracks in order while the visualiser runs.
    Play(PlayArgs),
    /// List the track ids available in a media directory.
    Tracks {
        #[arg(long)]
        media_dir: Option<PathBuf>,
    },
    /// Render a single visualisation frame of a local file to PNG.
    Snapshot {
        /// Audio file to analyse.
        input: PathBuf,
        /// Destination PNG.
        output: PathBuf,
        /// Position in seconds whose spectrum is drawn.
        #[arg(long, default_value_t = 10.0)]
        at: f64,
        #[arg(short, long)]
        mode: Option<VisualizationMode>,
    },
}

#[derive(clap::Args, Debug)]
struct PlayArgs {
    /// Track ids, played one after another.
    #[arg(required = true)]
    tracks: Vec<String>,
    /// Base URL of the media server.
    #[arg(long)]
    server: Option<String>,
    /// Read tracks from a local directory instead of the media server.
    #[arg(long, conflicts_with = "server")]
    media_dir: Option<PathBuf>,
    #[arg(short, long)]
    mode: Option<VisualizationMode>,
    /// Initial volume in [0, 1].
    #[arg(short, long)]
    volume: Option<f32>,
    /// Discard audio instead of opening the default output device.
    #[arg(long)]
    headless: bool,
    /// Move on to the next track after this many seconds.
    #[arg(long)]
    switch_after: Option<f64>,
    /// Save rendered frames as PNGs into this directory.
    #[arg(long)]
    record_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 60)]
    record_every: u64,
}
