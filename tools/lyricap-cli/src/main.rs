//! Lyricap CLI: inspect, preview, and export lyric-video projects.
//!
//! Usage:
//!   lyricap init <NAME>        Create an empty project
//!   lyricap info <PATH>        Show timeline, lyrics and validation results
//!   lyricap check              Show codec support and export defaults
//!   lyricap preview <PATH>     Play a project through the sync loop
//!   lyricap export <PATH>      Capture a project to a video file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lyricap_common::config::{AppConfig, LoggingConfig};
use lyricap_common::logging::init_logging;

mod commands;

#[derive(Parser)]
#[command(
    name = "lyricap",
    about = "Capture lyric videos from a song, a timeline and timed lyrics",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/lyricap/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty project
    Init {
        /// Project name
        name: String,

        /// Parent directory for the project
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show project information
    Info {
        /// Project directory or project.json
        path: PathBuf,

        /// Print the project snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show codec support and the resolved export defaults
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a project through the sync loop without recording
    Preview {
        /// Project directory or project.json
        path: PathBuf,

        /// Start position (seconds)
        #[arg(long, default_value = "0.0")]
        from: f64,

        /// Stop position (seconds); defaults to the end of the primary track
        #[arg(long)]
        to: Option<f64>,

        /// Render rate
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Capture a project to a video file
    Export {
        /// Project directory or project.json
        path: PathBuf,

        /// Output resolution: 480p, 720p, 1080p, 1440p, 2160p
        #[arg(short, long)]
        resolution: Option<String>,

        /// Aspect ratio: 16:9, 9:16, 1:1, 4:3, 4:5
        #[arg(short, long)]
        aspect: Option<String>,

        /// Target FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Quality tier: low, medium, high
        #[arg(short, long)]
        quality: Option<String>,

        /// Codec mime type, e.g. "video/webm;codecs=vp9,opus"
        #[arg(long)]
        codec: Option<String>,

        /// Output directory (defaults to the project's exports/ directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pace the capture on the wall clock instead of virtual time
        #[arg(long)]
        realtime: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    init_logging(&LoggingConfig {
        level: if cli.verbose {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        },
        ..config.logging.clone()
    });

    match cli.command {
        Commands::Init { name, output } => commands::init::run(name, output),
        Commands::Info { path, json } => commands::info::run(path, json),
        Commands::Check { json } => commands::check::run(&config, json),
        Commands::Preview { path, from, to, fps } => {
            commands::preview::run(&config, path, from, to, fps).await
        }
        Commands::Export {
            path,
            resolution,
            aspect,
            fps,
            quality,
            codec,
            output,
            realtime,
        } => {
            commands::export::run(
                &config,
                path,
                commands::export::ExportArgs {
                    resolution,
                    aspect,
                    fps,
                    quality,
                    codec,
                    output,
                    realtime,
                },
            )
            .await
        }
    }
}
