use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use readlater::app::App;
use readlater::batch::{self, ImportOptions, MigrateOptions, Reconciler};
use readlater::config::Config;

#[derive(Parser, Debug)]
#[command(name = "readlater")]
#[command(about = "Save web articles for later reading")]
#[command(version)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Article database, overriding the configured path
    #[arg(long, global = true, env = "READLATER_DB")]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (and the frontend, if configured)
    Serve,

    /// Move every article to its canonical URL and merge duplicates
    Canonicalize {
        #[arg(long)]
        dry_run: bool,
    },

    /// Import saved articles from a CSV export
    Import {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        dry_run: bool,

        /// Pause between records
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },

    /// Re-extract stored contents with the in-process HTML converter
    Migrate {
        #[arg(long)]
        dry_run: bool,

        /// Process at most this many articles
        #[arg(long)]
        limit: Option<usize>,

        /// Deadline for fetching and extracting one article
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let app = App::new(config)
        .await
        .context("Failed to open article store")?;

    match args.command {
        Command::Serve => app.serve().await?,

        Command::Canonicalize { dry_run } => {
            if dry_run {
                println!("DRY RUN MODE - no changes will be made");
            }
            let report = Reconciler::new(app.store.clone(), dry_run).run().await?;
            println!("{}", report);
        }

        Command::Import {
            csv,
            dry_run,
            delay_ms,
        } => {
            let records = batch::read_csv_file(&csv)
                .with_context(|| format!("Failed to read {}", csv.display()))?;
            let service = app.service()?;
            let options = ImportOptions {
                dry_run,
                delay: Duration::from_millis(delay_ms),
            };
            let report = batch::run_import(&service, &records, options).await;
            println!("{}", report);
        }

        Command::Migrate {
            dry_run,
            limit,
            timeout_secs,
            delay_ms,
        } => {
            let service = app.migration_service();
            let options = MigrateOptions {
                dry_run,
                limit,
                timeout: Duration::from_secs(timeout_secs),
                delay: Duration::from_millis(delay_ms),
            };
            let report = batch::run_migrate(&service, options).await?;
            println!("{}", report);
        }
    }

    Ok(())
}
