//! Local-to-remote synchronization.
//!
//! Exports the consolidated local store into the remote D1 database,
//! either wholesale (schema reset plus chunked reload) or incrementally
//! (`INSERT OR IGNORE` for keys the remote does not have yet). All remote
//! writes are idempotent, so a retried or re-run sync converges on the
//! same row set.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::queries;
use crate::models::cola::ColaRecord;
use crate::services::catalog;
use crate::services::d1::{escape_opt_i64, escape_opt_str, escape_str, D1Client, RemoteError};

/// Local rows per full-sync data chunk.
const FULL_SYNC_CHUNK: i64 = 25_000;

/// Local rows per incremental page.
const INCREMENTAL_PAGE: i64 = 5_000;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote: {0}")]
    Remote(#[from] RemoteError),

    #[error("local store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("migration verification failed: {0}")]
    Verification(String),
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub records_uploaded: i64,
    pub brand_slugs_added: i64,
    pub companies_added: i64,
}

/// Column order shared by every remote INSERT.
const REMOTE_COLUMNS: &str = "ttb_id, status, vendor_code, serial_number, class_type_code, \
     origin_code, type_of_application, brand_name, fanciful_name, for_sale_in, \
     total_bottle_capacity, formula, qualifications, grape_varietal, wine_vintage, \
     appellation, alcohol_content, ph_level, plant_registry, company_name, street, \
     state, contact_person, phone_number, approval_date, year, month, day, category";

const REMOTE_SCHEMA: &str = "\
CREATE TABLE colas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ttb_id TEXT UNIQUE NOT NULL,
    status TEXT,
    vendor_code TEXT,
    serial_number TEXT,
    class_type_code TEXT,
    origin_code TEXT,
    type_of_application TEXT,
    brand_name TEXT,
    fanciful_name TEXT,
    for_sale_in TEXT,
    total_bottle_capacity TEXT,
    formula TEXT,
    qualifications TEXT,
    grape_varietal TEXT,
    wine_vintage TEXT,
    appellation TEXT,
    alcohol_content TEXT,
    ph_level TEXT,
    plant_registry TEXT,
    company_name TEXT,
    street TEXT,
    state TEXT,
    contact_person TEXT,
    phone_number TEXT,
    approval_date TEXT,
    year INTEGER,
    month INTEGER,
    day INTEGER,
    category TEXT,
    signal TEXT,
    refile_count INTEGER
);
CREATE INDEX idx_colas_ttb ON colas(ttb_id);
CREATE INDEX idx_colas_brand ON colas(brand_name);
CREATE INDEX idx_colas_date ON colas(approval_date);
CREATE INDEX idx_colas_class ON colas(class_type_code);
CREATE INDEX idx_colas_status ON colas(status);
CREATE INDEX idx_colas_ym ON colas(year, month);
CREATE INDEX idx_colas_ymd ON colas(year, month, day);";

/// One record's VALUES tuple in [`REMOTE_COLUMNS`] order.
fn record_values(record: &ColaRecord) -> String {
    [
        escape_str(&record.ttb_id),
        escape_opt_str(record.status.as_deref()),
        escape_opt_str(record.vendor_code.as_deref()),
        escape_opt_str(record.serial_number.as_deref()),
        escape_opt_str(record.class_type_code.as_deref()),
        escape_opt_str(record.origin_code.as_deref()),
        escape_opt_str(record.type_of_application.as_deref()),
        escape_opt_str(record.brand_name.as_deref()),
        escape_opt_str(record.fanciful_name.as_deref()),
        escape_opt_str(record.for_sale_in.as_deref()),
        escape_opt_str(record.total_bottle_capacity.as_deref()),
        escape_opt_str(record.formula.as_deref()),
        escape_opt_str(record.qualifications.as_deref()),
        escape_opt_str(record.grape_varietal.as_deref()),
        escape_opt_str(record.wine_vintage.as_deref()),
        escape_opt_str(record.appellation.as_deref()),
        escape_opt_str(record.alcohol_content.as_deref()),
        escape_opt_str(record.ph_level.as_deref()),
        escape_opt_str(record.plant_registry.as_deref()),
        escape_opt_str(record.company_name.as_deref()),
        escape_opt_str(record.street.as_deref()),
        escape_opt_str(record.state.as_deref()),
        escape_opt_str(record.contact_person.as_deref()),
        escape_opt_str(record.phone_number.as_deref()),
        escape_opt_str(record.approval_date.as_deref()),
        escape_opt_i64(record.year),
        escape_opt_i64(record.month),
        escape_opt_i64(record.day),
        escape_opt_str(record.category.as_deref()),
    ]
    .join(", ")
}

/// Build one idempotent insert statement for a record.
pub fn record_insert_sql(record: &ColaRecord) -> String {
    format!(
        "INSERT OR IGNORE INTO colas ({REMOTE_COLUMNS}) VALUES ({});",
        record_values(record)
    )
}

/// Create the catalog tables if this database has never seen them. They
/// are never dropped: aliases and slugs accumulate maintenance state.
pub async fn ensure_catalog_schema(d1: &D1Client) -> Result<(), RemoteError> {
    d1.execute(
        "CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_name TEXT NOT NULL,
            slug TEXT,
            total_filings INTEGER DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS company_aliases (
            raw_name TEXT PRIMARY KEY,
            company_id INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS brand_slugs (
            slug TEXT PRIMARY KEY,
            brand_name TEXT NOT NULL,
            filing_count INTEGER DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_aliases_company ON company_aliases(company_id);",
    )
    .await?;
    Ok(())
}

/// Schema reset plus chunked reload of every local record.
pub async fn full_sync(local: &SqlitePool, d1: &D1Client) -> Result<SyncReport, SyncError> {
    let total = queries::count_records(local).await?;
    info!(total, chunk = FULL_SYNC_CHUNK, "full sync starting");

    ensure_catalog_schema(d1).await?;
    d1.execute(&format!("DROP TABLE IF EXISTS colas;\n{REMOTE_SCHEMA}"))
        .await?;
    info!("remote schema reset");

    let mut report = SyncReport::default();
    let mut cursor: Option<String> = None;
    let mut chunk_no = 0;

    loop {
        let page = queries::records_page(local, cursor.as_deref(), FULL_SYNC_CHUNK).await?;
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(|r| r.ttb_id.clone());
        chunk_no += 1;

        let statements = page.iter().map(record_insert_sql);
        let inserted = d1.execute_batched(statements.collect::<Vec<_>>()).await?;
        report.records_uploaded += inserted;

        info!(
            chunk = chunk_no,
            rows = page.len(),
            uploaded = report.records_uploaded,
            total,
            "chunk uploaded"
        );
    }

    println!("\n{}", "=".repeat(60));
    println!("FULL SYNC COMPLETE");
    println!("{}", "=".repeat(60));
    println!("Records uploaded: {}", report.records_uploaded);
    println!("{}\n", "=".repeat(60));
    Ok(report)
}

/// Upload records the remote is missing, then maintain the brand and
/// company indexes for whatever this pass touched. Scoped to one month
/// when `month` is given.
pub async fn incremental_sync(
    local: &SqlitePool,
    d1: &D1Client,
    month: Option<(i64, i64)>,
) -> Result<SyncReport, SyncError> {
    ensure_catalog_schema(d1).await?;

    let mut report = SyncReport::default();
    let mut brands: Vec<String> = Vec::new();
    let mut companies: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut scanned = 0usize;

    loop {
        let page = match month {
            Some((year, m)) => {
                queries::month_records_page(local, year, m, cursor.as_deref(), INCREMENTAL_PAGE)
                    .await?
            }
            None => queries::records_page(local, cursor.as_deref(), INCREMENTAL_PAGE).await?,
        };
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(|r| r.ttb_id.clone());
        scanned += page.len();

        for record in &page {
            if let Some(brand) = record.brand_name.as_deref() {
                if !brand.is_empty() {
                    brands.push(brand.to_string());
                }
            }
            if let Some(company) = record.company_name.as_deref() {
                if !company.is_empty() {
                    companies.push(company.to_string());
                }
            }
        }

        let statements: Vec<String> = page.iter().map(record_insert_sql).collect();
        report.records_uploaded += d1.execute_batched(statements).await?;
        info!(scanned, uploaded = report.records_uploaded, "incremental progress");
    }

    brands.sort();
    brands.dedup();
    companies.sort();
    companies.dedup();

    report.brand_slugs_added = catalog::update_brand_slugs(d1, &brands).await?;
    report.companies_added = catalog::add_new_companies(d1, &companies).await?.len() as i64;

    println!("\n{}", "=".repeat(60));
    println!("INCREMENTAL SYNC COMPLETE");
    println!("{}", "=".repeat(60));
    println!("Records scanned:  {scanned}");
    println!("Records uploaded: {}", report.records_uploaded);
    println!("Brand slugs:      +{}", report.brand_slugs_added);
    println!("Companies:        +{}", report.companies_added);
    println!("{}\n", "=".repeat(60));
    Ok(report)
}

/// Add and backfill the `day` column on a remote store that predates it.
pub async fn migrate_add_day(d1: &D1Client) -> Result<i64, SyncError> {
    let columns = d1.fetch_rows("PRAGMA table_info(colas)").await?;
    let has_day = columns
        .iter()
        .any(|row| row["name"].as_str() == Some("day"));

    if has_day {
        info!("day column already present");
    } else {
        info!("adding day column");
        d1.execute("ALTER TABLE colas ADD COLUMN day INTEGER").await?;
    }

    // substr is 1-indexed: positions 4-5 of MM/DD/YYYY are the day.
    let changed = d1
        .execute_counting(
            "UPDATE colas SET day = CAST(substr(approval_date, 4, 2) AS INTEGER) \
             WHERE day IS NULL AND approval_date IS NOT NULL \
             AND length(approval_date) >= 10",
        )
        .await?;
    info!(changed, "day values backfilled");

    let remaining = d1
        .fetch_rows(
            "SELECT COUNT(*) as cnt FROM colas \
             WHERE day IS NULL AND approval_date IS NOT NULL \
             AND length(approval_date) >= 10",
        )
        .await?
        .first()
        .and_then(|row| row["cnt"].as_i64())
        .unwrap_or(0);

    if remaining > 0 {
        return Err(SyncError::Verification(format!(
            "{remaining} records still have NULL day"
        )));
    }
    Ok(changed)
}

/// Correct year/month values that disagree with approval_date (early
/// scrapes stamped them with the scrape date).
pub async fn migrate_fix_year_month(d1: &D1Client) -> Result<i64, SyncError> {
    let year_fixed = d1
        .execute_counting(
            "UPDATE colas SET year = CAST(substr(approval_date, 7, 4) AS INTEGER) \
             WHERE approval_date IS NOT NULL AND length(approval_date) >= 10 \
             AND CAST(substr(approval_date, 7, 4) AS INTEGER) != year",
        )
        .await?;
    let month_fixed = d1
        .execute_counting(
            "UPDATE colas SET month = CAST(substr(approval_date, 1, 2) AS INTEGER) \
             WHERE approval_date IS NOT NULL AND length(approval_date) >= 10 \
             AND CAST(substr(approval_date, 1, 2) AS INTEGER) != month",
        )
        .await?;
    info!(year_fixed, month_fixed, "year/month corrected");

    let remaining = d1
        .fetch_rows(
            "SELECT COUNT(*) as cnt FROM colas \
             WHERE approval_date IS NOT NULL AND length(approval_date) >= 10 \
             AND (CAST(substr(approval_date, 7, 4) AS INTEGER) != year \
               OR CAST(substr(approval_date, 1, 2) AS INTEGER) != month)",
        )
        .await?
        .first()
        .and_then(|row| row["cnt"].as_i64())
        .unwrap_or(0);

    if remaining > 0 {
        warn!(remaining, "year/month mismatches persist");
        return Err(SyncError::Verification(format!(
            "{remaining} records still mismatch approval_date"
        )));
    }
    Ok(year_fixed + month_fixed)
}
