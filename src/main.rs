use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use epi_data_engine::config::AppConfig;
use epi_data_engine::feeds::registry;
use epi_data_engine::fetcher::HttpFetcher;
use epi_data_engine::pipeline::Pipeline;
use epi_data_engine::reader::DataReader;
use epi_data_engine::storage::DuckDbStore;
use epi_data_engine::utils::{self, SystemClock};

#[derive(Parser)]
#[command(name = "epi-etl", about = "Epidemiological dataset acquisition ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run the acquisition loop: one cycle per period, forever
    Run {
        /// Update period in seconds (default from config: 60)
        #[arg(short, long)]
        period: Option<u64>,
    },

    /// Run a single fetch→normalize→upsert cycle and exit
    Update,

    /// Show per-feed document counts
    Stats,

    /// List the registered source feeds
    Feeds,

    /// Apply schema migrations without fetching
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "epi_data_engine=info,epi_etl=info,warn",
        1 => "epi_data_engine=debug,epi_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run { period } => {
            let store = open_store(&config)?;
            let source = Arc::new(HttpFetcher::new(&config.fetcher)?);
            let period = Duration::from_secs(period.unwrap_or(config.scheduler.period_secs));
            let feeds = registry();
            info!("Starting acquisition loop: {} feeds, period {:?}", feeds.len(), period);

            Pipeline::new(source, store, feeds, period).run_forever().await;
        }

        Command::Update => {
            let _t = utils::Timer::start("Update cycle");
            let store = open_store(&config)?;
            let source = Arc::new(HttpFetcher::new(&config.fetcher)?);
            let period = Duration::from_secs(config.scheduler.period_secs);

            let report = Pipeline::new(source, store, registry(), period).run_cycle(0).await;
            let totals = report.totals();
            info!(
                "Done: {} feeds ok, {} failed, {} rows, {} inserted",
                report.succeeded(),
                report.failed(),
                totals.rows,
                totals.inserted
            );
        }

        Command::Stats => {
            let store = open_store(&config)?;
            let reader =
                DataReader::new(store, registry(), &config.cache, Arc::new(SystemClock));
            let snapshot = reader.fetch_all(false).await?;

            println!("─────────────────────────────────────────────");
            println!("  epi-etl — Store Stats");
            println!("─────────────────────────────────────────────");
            for (feed, records) in &snapshot {
                println!("  {:<22} : {}", feed, utils::fmt_number(records.len() as i64));
            }
            println!("─────────────────────────────────────────────");
        }

        Command::Feeds => {
            for feed in registry() {
                println!("{:<22} key=[{}]", feed.name, feed.natural_key.join(", "));
                println!("{:<22}      {}", "", feed.url);
            }
        }

        Command::Migrate => {
            DuckDbStore::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<Arc<DuckDbStore>> {
    let store = DuckDbStore::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        store.run_migrations()?;
    }
    Ok(Arc::new(store))
}
