mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "waypoint", version, about = "Browser purchase-journey runner")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run journeys against a real browser, one isolated session each
    Run {
        /// Journey files, or directories searched for `*.yaml`
        #[arg(required = true)]
        journeys: Vec<PathBuf>,

        /// Harness configuration (default: ./waypoint.yaml, then ~/.waypoint/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Base URL for relative navigations, overriding config and environment
        #[arg(long)]
        base_url: Option<String>,

        /// Show the browser window
        #[arg(long, conflicts_with = "headless")]
        headed: bool,

        /// Hide the browser window
        #[arg(long)]
        headless: bool,

        /// Per-journey time budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Directory session artifacts are written under
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Skip screencast recording
        #[arg(long)]
        no_video: bool,

        /// Print each journey report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Parse and validate journey files without launching a browser
    Validate {
        #[arg(required = true)]
        journeys: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the reports.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let ok = match args.command {
        Command::Run {
            journeys,
            config,
            base_url,
            headed,
            headless,
            timeout_ms,
            artifacts,
            no_video,
            json,
        } => {
            let headless = match (headed, headless) {
                (true, _) => Some(false),
                (_, true) => Some(true),
                _ => None,
            };
            let options = commands::RunOptions {
                config,
                base_url,
                headless,
                timeout_ms,
                artifacts,
                record_video: !no_video,
                json,
            };
            commands::run(&journeys, options).await?
        }
        Command::Validate { journeys } => commands::validate(&journeys),
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
