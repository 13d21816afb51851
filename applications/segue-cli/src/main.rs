/// Segue - headless playback simulator
use clap::{Parser, Subcommand};
use segue_cli::{config::CliConfig, scenario, Scenario};
use segue_playback::PlaybackSource;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "segue")]
#[command(about = "Headless simulator for the Segue playback engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file and print the event report as JSON
    Simulate {
        /// Scenario file path
        scenario: PathBuf,
        /// Configuration file path
        #[arg(short, long, env = "SEGUE_CONFIG")]
        config: Option<PathBuf>,
        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
    /// Show how a list of URLs would be played
    Classify {
        /// Playlist URL, or segment URLs in playback order
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segue_cli=info,segue_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            scenario: path,
            config,
            pretty,
        } => {
            let config = CliConfig::load(config.as_deref())?;
            let scenario = Scenario::from_path(&path)?;
            let report = scenario::run(scenario, &config)?;

            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", json);
        }
        Commands::Classify { urls } => {
            let source = PlaybackSource::from_urls(urls)?;
            let json = serde_json::json!({
                "kind": source.kind(),
                "resources": source.resource_count(),
                "source": source,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
