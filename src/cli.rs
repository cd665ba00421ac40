use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelcast")]
#[command(author, version, about = "Cast local media files to a network receiver")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue files and play them through the streaming server
    Play {
        /// Files to queue, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Host to bind the streaming server to
        #[arg(long)]
        host: Option<String>,

        /// Port for the streaming server (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Receiver model, e.g. "Chromecast Ultra"
        #[arg(long)]
        device_model: Option<String>,

        /// Queue index to start from
        #[arg(long, default_value = "0")]
        start: usize,
    },

    /// Probe a media file and display its streams
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a file would be transcoded for a device
    Plan {
        /// File to plan
        #[arg(required = true)]
        file: PathBuf,

        /// Audio stream index to use instead of the default one
        #[arg(long)]
        audio: Option<u32>,

        /// Receiver model, e.g. "Chromecast Ultra"
        #[arg(long)]
        device_model: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
