pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture service
    Serve {
        /// Configuration file (defaults to the per-user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the artifact output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Override the HTTP bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Submit a capture request to a running service
    Submit {
        /// URL to capture
        #[arg(required = true)]
        url: String,

        /// Label appended to artifact filenames (repeatable)
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// Correlation id embedded in artifact filenames
        #[arg(long)]
        correlation_id: Option<String>,

        /// Capture a PNG screenshot (default when no format is given)
        #[arg(long)]
        png: bool,

        /// Capture a JPEG screenshot
        #[arg(long)]
        jpeg: bool,

        /// Capture the serialized HTML
        #[arg(long)]
        html: bool,

        /// Base URL of the running service
        #[arg(short, long, default_value = "http://127.0.0.1:8090")]
        server: String,
    },

    /// Query queue and worker telemetry from a running service
    Status {
        /// Base URL of the running service
        #[arg(short, long, default_value = "http://127.0.0.1:8090")]
        server: String,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { config, output_dir, bind } => {
            info!("Starting capture service");
            commands::serve(config, output_dir, bind).await
        }
        Commands::Submit { url, labels, correlation_id, png, jpeg, html, server } => {
            commands::submit(url, labels, correlation_id, png, jpeg, html, server).await
        }
        Commands::Status { server } => commands::status(server).await,
        Commands::Config { init } => commands::show_config(init).await,
    }
}
