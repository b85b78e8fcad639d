use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use mailfolio::config::{Config, SourceKind};
use mailfolio::refresh::{FetchOutcome, Refresher};
use mailfolio::scheduler;
use mailfolio::source::DateRange;

#[derive(Parser)]
#[command(name = "mailfolio", version, about = "Sync financial records from statement emails")]
struct Cli {
    /// Config file (defaults to ~/.mailfolio/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler: refresh everything now and every interval after.
    Serve,
    /// Run one refresh cycle over all configured units, then exit.
    Refresh,
    /// Refresh a single (source, account) unit.
    Fetch {
        #[arg(long, value_enum)]
        source: SourceKind,
        #[arg(long)]
        account: String,
        /// Window start (YYYY-MM-DD); defaults to lookback_days ago.
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Window end (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => {
            let path = Config::default_path();
            if path.exists() {
                Config::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))
            } else {
                log::warn!("no config at {}, using defaults", path.display());
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli)?);
    let refresher = Arc::new(Refresher::new(Arc::clone(&config)));

    match cli.command {
        Command::Serve => {
            let interval = Duration::from_secs(config.refresh_interval_minutes * 60);
            let handle = scheduler::start(Arc::clone(&refresher), interval);
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            handle.stop().await;
        }
        Command::Refresh => {
            refresher.run_cycle().await;
        }
        Command::Fetch {
            source,
            account,
            start,
            end,
        } => {
            let default = refresher.default_range();
            let range = DateRange {
                start: start.unwrap_or(default.start),
                end: end.unwrap_or(default.end),
            };
            match refresher.refresh_unit(source, &account, range).await? {
                FetchOutcome::Data(path) => println!("Data available at {}", path.display()),
                FetchOutcome::NoData => println!("No data found."),
            }
        }
    }

    Ok(())
}
