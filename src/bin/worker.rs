//! Acquisition worker: scrapes assigned months into this worker's own
//! local store. Multiple workers run in parallel over disjoint month
//! sets; the merge step consolidates their stores afterwards.

use std::time::Duration;

use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

use bevalc_intel::config::WorkerConfig;
use bevalc_intel::db;
use bevalc_intel::services::acquisition::{
    month_range_inclusive, parse_flexible_date, parse_month, year_months, AcquisitionWorker,
};
use bevalc_intel::services::browser::RegistryBrowser;
use bevalc_intel::services::captcha::TerminalPrompt;

#[derive(Debug, Parser)]
#[command(
    name = "worker",
    about = "COLA acquisition worker with manual month assignment",
    after_help = "Examples:\n  \
        worker --name w1 --months 2025-01\n  \
        worker --name w1 --months 2025-01 2025-02 2025-03\n  \
        worker --name w1 --range 2025-01 2025-06\n  \
        worker --name w1 --year 2025\n  \
        worker --name w1 --months 2025-01 --links-only\n  \
        worker --name w1 --date 2026-01-05\n  \
        worker --name w1 --status"
)]
#[command(group(
    ArgGroup::new("selector")
        .args(["months", "range", "year", "date", "dates"])
        .multiple(false)
))]
struct Args {
    /// Worker name (also names the store file)
    #[arg(long)]
    name: String,

    /// Specific months to process
    #[arg(long, num_args = 1.., value_name = "YYYY-MM")]
    months: Vec<String>,

    /// Inclusive range of months
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    range: Vec<String>,

    /// Process an entire year
    #[arg(long)]
    year: Option<i64>,

    /// Single date (YYYY-MM-DD or MM/DD/YYYY)
    #[arg(long)]
    date: Option<String>,

    /// Inclusive date range
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    dates: Vec<String>,

    /// Store path (default: <data-dir>/<name>.db)
    #[arg(long)]
    db: Option<String>,

    /// Only collect links (Phase 1)
    #[arg(long)]
    links_only: bool,

    /// Only scrape details (Phase 2)
    #[arg(long)]
    details_only: bool,

    /// Non-interactive mode: CAPTCHAs are polled instead of prompted
    #[arg(long)]
    headless: bool,

    /// Show store status and exit
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = WorkerConfig::from_env().expect("Failed to load configuration");

    if let Err(e) = run(args, config).await {
        tracing::error!(error = %e, "worker failed");
        std::process::exit(1);
    }
}

async fn run(args: Args, config: WorkerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store_path = args
        .db
        .clone()
        .unwrap_or_else(|| db::worker_store_path(&config.data_dir, &args.name));

    tracing::info!(worker = %args.name, store = %store_path, "worker initialized");
    let store = db::open_store(&store_path).await?;

    let interactive = !args.headless && TerminalPrompt::is_interactive();
    let registry = RegistryBrowser::new(
        Box::new(TerminalPrompt::new()),
        interactive,
        Duration::from_millis(config.request_delay_ms),
        Duration::from_secs(config.page_timeout_secs),
        Duration::from_secs(config.captcha_timeout_secs),
    )?;
    let mut worker = AcquisitionWorker::new(args.name.clone(), registry, store);

    if args.status {
        worker.status().await?;
        return Ok(());
    }

    // Date selectors run a free-form range; month selectors run the
    // two-phase month pipeline.
    if let Some(date) = &args.date {
        let day = parse_flexible_date(date)?;
        worker
            .process_date_range(day, day, args.links_only, args.details_only)
            .await?;
        return Ok(());
    }
    if args.dates.len() == 2 {
        let start = parse_flexible_date(&args.dates[0])?;
        let end = parse_flexible_date(&args.dates[1])?;
        worker
            .process_date_range(start, end, args.links_only, args.details_only)
            .await?;
        return Ok(());
    }

    let months: Vec<(i64, i64)> = if !args.months.is_empty() {
        args.months
            .iter()
            .map(|m| parse_month(m))
            .collect::<Result<_, _>>()?
    } else if args.range.len() == 2 {
        month_range_inclusive(&args.range[0], &args.range[1])?
    } else if let Some(year) = args.year {
        year_months(year, chrono::Local::now().date_naive())
    } else {
        return Err("no months selected: use --months, --range, --year, --date, or --dates".into());
    };

    if months.is_empty() {
        println!("No months to process");
        return Ok(());
    }

    worker
        .process_months(&months, args.links_only, args.details_only)
        .await?;
    Ok(())
}
