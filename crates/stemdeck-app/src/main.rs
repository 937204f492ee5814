//! # stemdeck
//!
//! Play music tracks, stems and playlists from a library manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stemdeck_audio::{
    format_time, AudioBackend, FrameTime, MixerBackend, MusicPlayer, PlaybackEngine,
    VirtualBackend,
};
use stemdeck_core::{EngineTemplate, MusicSettings, TrackLibrary};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stemdeck", version, about = "Play music tracks, stems and playlists")]
struct Cli {
    /// Library manifest (JSON) listing clips, tracks and playlists
    #[arg(short, long, env = "STEMDECK_LIBRARY")]
    library: PathBuf,

    /// Music settings file. Defaults to the platform config directory.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Keep time without opening an audio device
    #[arg(long)]
    headless: bool,

    /// Engine ticks per second
    #[arg(long, default_value_t = 60)]
    tick_rate: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a music track on its own
    PlayTrack {
        name: String,
        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,
    },
    /// Play a single audio clip
    PlayFile {
        name: String,
        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,
    },
    /// Play a playlist from its first entry
    PlayPlaylist { name: String },
    /// List the library contents
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stemdeck=info,stemdeck_audio=debug,stemdeck_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting stemdeck v{}", env!("CARGO_PKG_VERSION"));

    let library = TrackLibrary::load_with(&cli.library, stemdeck_audio::decode::probe_duration)
        .with_context(|| format!("Failed to load library {}", cli.library.display()))?;

    if matches!(cli.command, Commands::List) {
        print_library(&library);
        return Ok(());
    }

    let mut settings = match &cli.settings {
        Some(path) => MusicSettings::load(path)
            .with_context(|| format!("Failed to load settings {}", path.display()))?,
        None => MusicSettings::load_default()?,
    };
    if settings.default_engine.is_none() {
        warn!("No default engine in the music settings, using built-in defaults");
        settings.default_engine = Some(EngineTemplate::default());
    }

    let backend: Arc<dyn AudioBackend> = if cli.headless {
        Arc::new(VirtualBackend::new())
    } else {
        Arc::new(MixerBackend::new().context("Failed to open audio output")?)
    };

    let library = Arc::new(library);
    let mut player = MusicPlayer::new(backend, settings).with_library(library.clone());
    player.init()?;
    let finished = player.subscribe_track_finished()?;

    match &cli.command {
        Commands::PlayTrack { name, start } => {
            player.play_track(library.track(name)?.into_shared(), *start)?;
        }
        Commands::PlayFile { name, start } => {
            player.play_file(library.clip(name)?.clone(), *start)?;
        }
        Commands::PlayPlaylist { name } => {
            player.play_playlist(library.playlist(name)?.into_shared())?;
        }
        Commands::List => {}
    }

    let period = Duration::from_secs_f64(1.0 / f64::from(cli.tick_rate.max(1)));
    let mut interval = tokio::time::interval(period);
    let mut last = Instant::now();
    let mut last_report = Instant::now();
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                player.tick(FrameTime::uniform((now - last).as_secs_f64()));
                last = now;

                while let Some(event) = finished.try_recv() {
                    info!("Finished {}", event.info);
                }

                if last_report.elapsed() >= Duration::from_secs(1) && player.is_playing() {
                    debug!("Position {}", format_time(player.current_time()));
                    last_report = Instant::now();
                }

                if is_idle(&player) {
                    break;
                }
            }
            result = tokio::signal::ctrl_c(), if !stopping => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, fading out");
                player.stop(false);
                stopping = true;
            }
        }
    }

    player.shutdown()?;
    info!("Playback finished");
    Ok(())
}

/// Nothing sounding, fading, queued or waiting for a track to end.
fn is_idle(player: &MusicPlayer) -> bool {
    !player.engine().is_some_and(PlaybackEngine::is_active)
}

fn print_library(library: &TrackLibrary) {
    println!("Clips:");
    for clip in library.clips() {
        println!("  {:<24} {}", clip.name, format_time(clip.duration));
    }

    println!("Music tracks:");
    for track in library.tracks() {
        let looping = if track.looping { ", loop" } else { "" };
        println!(
            "  {:<24} {} ({} channels{looping})",
            track.name,
            format_time(track.duration()),
            track.channels.len()
        );
    }

    println!("Playlists:");
    for playlist in library.playlists() {
        let looping = if playlist.looping { ", loop" } else { "" };
        println!("  {:<24} {} entries{looping}", playlist.name, playlist.len());
    }
}
