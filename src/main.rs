//! Pipeline operator CLI: consolidation, remote sync, classification, and
//! company-index maintenance over the consolidated store.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bevalc_intel::config::{RemoteConfig, WorkerConfig};
use bevalc_intel::db::{self, merge, queries};
use bevalc_intel::services::acquisition::parse_month;
use bevalc_intel::services::catalog;
use bevalc_intel::services::classify;
use bevalc_intel::services::d1::D1Client;
use bevalc_intel::services::sync;

#[derive(Debug, Parser)]
#[command(name = "bevalc-intel", about = "BevAlc Intelligence pipeline operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consolidate per-worker stores into the consolidated store
    Merge {
        /// Auto-discover worker stores in the data directory
        #[arg(long, conflicts_with = "dbs")]
        auto: bool,

        /// Specific stores to merge
        #[arg(long, num_args = 1..)]
        dbs: Vec<String>,

        /// Output store path (default: <data-dir>/consolidated.db)
        #[arg(long)]
        output: Option<String>,

        /// Directory searched for worker stores
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Push the consolidated store to the remote database
    Sync {
        /// Reset the remote schema and reload everything
        #[arg(long)]
        full: bool,

        /// Limit an incremental sync to one month
        #[arg(long, value_name = "YYYY-MM", conflicts_with = "full")]
        month: Option<String>,

        /// Add and backfill the remote day column, then exit
        #[arg(long)]
        migrate_day: bool,

        /// Correct remote year/month values from approval_date, then exit
        #[arg(long)]
        fix_year_month: bool,
    },

    /// Classify the remote corpus and apply signals
    Classify {
        /// Report the current signal distribution, change nothing
        #[arg(long)]
        analyze: bool,

        /// Run all passes but apply nothing
        #[arg(long)]
        dry_run: bool,

        /// Fetch page size per (year, month) partition
        #[arg(long, default_value_t = 10_000)]
        batch_size: usize,
    },

    /// Merge case-variant duplicate companies in the alias table
    Companies {
        /// Report duplicate groups, change nothing
        #[arg(long)]
        analyze: bool,

        /// Preview the rewrites without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Report consolidated store contents
    Status {
        /// Store path (default: <data-dir>/consolidated.db)
        #[arg(long)]
        db: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = WorkerConfig::from_env()?;

    match cli.command {
        Command::Merge {
            auto,
            dbs,
            output,
            data_dir,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| config.data_dir.clone());
            let output = output.unwrap_or_else(|| db::consolidated_store_path(&data_dir));
            let sources = if auto || dbs.is_empty() {
                merge::find_databases(&data_dir)?
            } else {
                dbs
            };
            if sources.is_empty() {
                return Err("no worker stores found to merge".into());
            }

            println!("\n{}", "=".repeat(60));
            println!("MERGING STORES");
            println!("{}", "=".repeat(60));
            println!("Output: {output}");
            for source in &sources {
                println!("  - {source}");
            }

            let summary = merge::merge_databases(&sources, &output).await?;

            println!("\n{}", "=".repeat(60));
            println!("MERGE COMPLETE");
            println!("{}", "=".repeat(60));
            for source in &summary.sources {
                println!(
                    "  {}: +{} links, +{} records",
                    source.path, source.links_added, source.records_added
                );
            }
            println!("Total links:   {}", summary.total_links);
            println!("Total records: {}", summary.total_records);
            println!("{}\n", "=".repeat(60));
        }

        Command::Sync {
            full,
            month,
            migrate_day,
            fix_year_month,
        } => {
            let remote = RemoteConfig::from_env()?;
            let d1 = D1Client::new(&remote)?;

            if migrate_day {
                let changed = sync::migrate_add_day(&d1).await?;
                println!("Backfilled day on {changed} records");
                return Ok(());
            }
            if fix_year_month {
                let changed = sync::migrate_fix_year_month(&d1).await?;
                println!("Corrected {changed} year/month values");
                return Ok(());
            }

            let local = db::open_store(&db::consolidated_store_path(&config.data_dir)).await?;
            if full {
                sync::full_sync(&local, &d1).await?;
            } else {
                let scope = month.as_deref().map(parse_month).transpose()?;
                sync::incremental_sync(&local, &d1, scope).await?;
            }
        }

        Command::Classify {
            analyze,
            dry_run,
            batch_size,
        } => {
            let remote = RemoteConfig::from_env()?;
            let d1 = D1Client::new(&remote)?;
            if analyze {
                classify::analyze(&d1).await?;
            } else {
                classify::run_batch_classification(&d1, batch_size, dry_run).await?;
            }
        }

        Command::Companies { analyze, dry_run } => {
            let remote = RemoteConfig::from_env()?;
            let d1 = D1Client::new(&remote)?;
            let report = catalog::merge_duplicate_companies(&d1, analyze || dry_run).await?;
            println!(
                "Duplicate groups: {} | aliases {}: {}",
                report.groups,
                if analyze || dry_run { "to update" } else { "updated" },
                report.aliases_updated,
            );
        }

        Command::Status { db: store_path } => {
            let path =
                store_path.unwrap_or_else(|| db::consolidated_store_path(&config.data_dir));
            let store = db::open_store(&path).await?;

            println!("\n{}", "=".repeat(60));
            println!("STORE: {path}");
            println!("{}", "=".repeat(60));
            println!("\nTotals:");
            println!("  Links: {}", queries::count_links(&store).await?);
            println!("  COLAs: {}", queries::count_records(&store).await?);

            let by_year = queries::record_counts_by_year(&store).await?;
            if !by_year.is_empty() {
                println!("\nCOLAs by year:");
                for (year, count) in by_year {
                    println!("  {year}: {count}");
                }
            }
            println!("{}\n", "=".repeat(60));
        }
    }

    Ok(())
}
