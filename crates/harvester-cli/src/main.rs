mod harvest;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "harvester")]
#[command(about = "Harvest news feeds, Reddit and Twitter into Kafka")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, env = "HARVESTER_CONFIG", default_value = "config/harvester.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every feed linked from a feed-index page.
    Rss {
        /// Page listing the feeds to harvest.
        #[arg(long, alias = "base_url")]
        base_url: String,
    },
    /// Fetch today's top submissions of the configured subreddits.
    Reddit,
    /// Search tweets for the current trends, or follow them live.
    Twitter {
        /// Stream tweets matching the trending topics until interrupted.
        #[arg(long)]
        stream: bool,
    },
    /// List recent job runs from the database.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = harvester_core::load_app_config(&cli.config)?;

    match cli.command {
        Commands::Rss { base_url } => {
            harvest::run_batch_command(&config, harvest::Target::Rss { base_url }).await
        }
        Commands::Reddit => harvest::run_batch_command(&config, harvest::Target::Reddit).await,
        Commands::Twitter { stream: false } => {
            harvest::run_batch_command(&config, harvest::Target::Twitter).await
        }
        Commands::Twitter { stream: true } => harvest::run_stream_command(&config).await,
        Commands::Runs { limit } => harvest::list_runs(&config, limit).await,
    }
}
