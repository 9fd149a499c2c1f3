//! Video Loop CLI
//!
//! Serves a looping JPEG archive over HTTP, and packs or inspects archives.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use video_loop::{
    archive::{load_default, ArchiveWriter, DirStorage, LoadLimits},
    config::FileConfig,
    consumers::Broadcaster,
    playback::{Clock, FrameStore, MonotonicClock},
    server::{AppState, HttpServer},
};

#[derive(Debug, Parser)]
#[command(name = "video-loop", version, about = "Looping JPEG frame player")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the archive and serve snapshots, streams and broadcasts.
    Serve {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory holding the archive files (overrides the config).
        #[arg(long)]
        archive_dir: Option<PathBuf>,
        /// Address to bind the HTTP server to (overrides the config).
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Pack a directory of JPEG files into an archive.
    Pack {
        /// Directory of `.jpg`/`.jpeg` files, played in file-name order.
        input: PathBuf,
        /// Output directory for the archive files.
        #[arg(short, long, default_value = "data")]
        output: PathBuf,
        /// Maximum number of frames to pack.
        #[arg(short, long)]
        max_frames: Option<usize>,
    },
    /// Load an archive and print its frame statistics.
    Inspect {
        /// Directory holding the archive files.
        #[arg(default_value = "data")]
        dir: PathBuf,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve {
            config,
            archive_dir,
            bind,
        } => serve(config, archive_dir, bind),
        Command::Pack {
            input,
            output,
            max_frames,
        } => pack(&input, &output, max_frames),
        Command::Inspect { dir } => inspect(&dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn serve(
    config_path: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
    bind: Option<SocketAddr>,
) -> Result<(), Box<dyn Error>> {
    let mut config = match config_path {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(dir) = archive_dir {
        config.archive.root = dir;
    }
    if let Some(addr) = bind {
        config.http.bind_addr = addr;
    }

    info!("Video Loop v{}", video_loop::VERSION);
    info!(
        frame_duration_ms = config.playback.frame_duration_ms,
        root = %config.archive.root.display(),
        "Initializing video provider"
    );

    let playback = FrameStore::open(
        &config.archive.storage(),
        &config.archive.paths(),
        config.archive.limits(),
    )
    .map(|store| {
        Arc::new(
            store
                .with_pacer(config.playback.pacer())
                .with_resolution(config.playback.resolution()),
        )
    });
    if let Err(e) = &playback {
        error!(error = %e, "Failed to initialize video provider; playback routes disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    })?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let store = playback.as_ref().ok().cloned();
        let mut state = AppState::new(playback, Arc::clone(&clock), &config.http, shutdown_rx.clone())?;

        let mut broadcaster_task = None;
        match store {
            Some(store) if config.broadcast.enabled => {
                let broadcaster = Broadcaster::new(store);
                state = state.with_broadcast(broadcaster.registry(), config.broadcast.port);
                info!(port = config.broadcast.port, "Broadcaster ready for streaming sessions");
                broadcaster_task = Some(tokio::spawn(broadcaster.run(
                    Arc::clone(&clock),
                    Duration::from_millis(config.broadcast.tick_ms),
                    shutdown_rx.clone(),
                )));
            }
            None if config.broadcast.enabled => {
                warn!("Not starting broadcaster: video provider not initialized");
            }
            _ => {}
        }

        HttpServer::new(config.http.bind_addr, state)
            .run(shutdown_rx)
            .await?;

        if let Some(task) = broadcaster_task {
            task.await?;
        }
        Ok::<(), Box<dyn Error>>(())
    })?;

    info!("Done");
    Ok(())
}

fn pack(input: &Path, output: &Path, max_frames: Option<usize>) -> Result<(), Box<dyn Error>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        })
        .collect();
    files.sort();
    if let Some(max) = max_frames {
        files.truncate(max);
    }
    if files.is_empty() {
        return Err(format!("no JPEG files found in {}", input.display()).into());
    }

    info!(frames = files.len(), input = %input.display(), "Packing frames");
    let mut writer = ArchiveWriter::new();
    for (i, path) in files.iter().enumerate() {
        writer.push(&std::fs::read(path)?)?;
        if (i + 1) % 10 == 0 {
            info!("Processed {}/{} frames", i + 1, files.len());
        }
    }

    let total_kb = writer.total_bytes() as f64 / 1024.0;
    writer.write_to_dir(output)?;
    info!(
        frames = files.len(),
        total_kb,
        output = %output.display(),
        "Archive written"
    );
    Ok(())
}

fn inspect(dir: &Path) -> Result<(), Box<dyn Error>> {
    let archive = load_default(&DirStorage::new(dir), LoadLimits::default())?;
    let sizes: Vec<u32> = archive.index().iter().map(|span| span.len).collect();

    let min = sizes.iter().copied().min().unwrap_or(0);
    let max = sizes.iter().copied().max().unwrap_or(0);
    let mean = archive.index().total_bytes() as f64 / sizes.len() as f64;

    println!("Frames:       {}", archive.frame_count());
    println!("Buffer bytes: {}", archive.buffer_len());
    println!("Frame bytes:  min {} / max {} / mean {:.1}", min, max, mean);
    Ok(())
}
