use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "likeness", about = "Face identity resolution against a labeled photo catalog")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a photo directory, crop faces and store them in the catalog
    Ingest {
        /// One subdirectory per person (default: LIKENESS_PHOTOS_DIR)
        #[arg(short, long)]
        photos: Option<PathBuf>,
        /// Clear the catalog first
        #[arg(long)]
        reset: bool,
    },
    /// Drop every catalog row
    Reset,
    /// List catalog labels and names
    Names,
    /// Train the recognizer from the catalog, or load the existing model
    Train {
        /// Delete any existing model and retrain
        #[arg(short, long)]
        force: bool,
    },
    /// Recognize faces frame by frame from a camera or images
    Run {
        /// Camera device or image file/directory (default: LIKENESS_SOURCE)
        #[arg(short, long)]
        source: Option<String>,
        /// Write annotated frames as PNGs into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Track the first detected face instead of detecting every frame
        #[arg(long)]
        track: bool,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Ingest { photos, reset } => {
            let photos = photos.unwrap_or_else(|| config.photos_dir.clone());
            commands::ingest(&config, &photos, reset)
        }
        Commands::Reset => commands::reset(&config),
        Commands::Names => commands::names(&config),
        Commands::Train { force } => commands::train(&config, force),
        Commands::Run {
            source,
            output,
            track,
            max_frames,
        } => commands::run(
            &config,
            commands::RunOptions {
                source: source.unwrap_or_else(|| config.source.clone()),
                output,
                track,
                max_frames,
            },
        ),
        Commands::Devices => commands::devices(),
    }
}
