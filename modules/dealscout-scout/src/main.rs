use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dealscout_common::{Config, RunMode};
use dealscout_scout::run::RunRequest;
use dealscout_scout::services::Services;

#[derive(Parser)]
#[command(name = "scout", about = "DealScout listing discovery and watchlist monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one discovery query to completion and print the result as JSON
    Run {
        query: String,
        /// Score candidates and summarize without loading any pages
        #[arg(long)]
        score_only: bool,
    },
    /// Schedule every enabled watchlist and process cycles until interrupted
    Watch {
        /// Queue one cycle for this watchlist immediately
        #[arg(long)]
        trigger: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dealscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_redacted();

    let services = Services::from_config(&config);

    match cli.command {
        Command::Run { query, score_only } => {
            let mut request = RunRequest::new(query);
            if score_only {
                request = request.with_mode(RunMode::ScoreOnly);
            }
            let result = services.controller.run_sync(request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Watch { trigger } => {
            info!("DealScout watcher starting...");
            let consumer = services.start_watching().await?;
            if let Some(id) = trigger {
                services.scheduler.trigger_now(&id);
            }
            tokio::signal::ctrl_c().await?;
            info!("Shutting down watcher");
            services.scheduler.shutdown();
            if let Some(consumer) = consumer {
                consumer.abort();
            }
        }
    }

    Ok(())
}
