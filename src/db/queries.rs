use sqlx::SqlitePool;

use crate::models::cola::ColaRecord;
use crate::models::link::CollectedLink;
use crate::models::progress::MonthProgress;

const COLA_COLUMNS: &str = "ttb_id, status, vendor_code, serial_number, class_type_code, \
     origin_code, type_of_application, brand_name, fanciful_name, for_sale_in, \
     total_bottle_capacity, formula, qualifications, grape_varietal, wine_vintage, \
     appellation, alcohol_content, ph_level, plant_registry, company_name, street, \
     state, contact_person, phone_number, approval_date, year, month, day, category";

/// Insert discovered links, ignoring duplicates by ttb_id.
/// Returns how many rows were actually inserted.
pub async fn insert_links(
    pool: &SqlitePool,
    links: &[(String, String)],
    year: i64,
    month: i64,
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for (ttb_id, url) in links {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO collected_links (ttb_id, detail_url, year, month) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(ttb_id)
        .bind(url)
        .bind(year)
        .bind(month)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn count_links_for_month(
    pool: &SqlitePool,
    year: i64,
    month: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM collected_links WHERE year = ? AND month = ?")
        .bind(year)
        .bind(month)
        .fetch_one(pool)
        .await
}

pub async fn count_links(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM collected_links")
        .fetch_one(pool)
        .await
}

/// Links not yet scraped for a month, oldest first.
pub async fn unscraped_links(
    pool: &SqlitePool,
    year: i64,
    month: i64,
) -> Result<Vec<CollectedLink>, sqlx::Error> {
    sqlx::query_as(
        "SELECT ttb_id, detail_url, year, month, scraped FROM collected_links \
         WHERE year = ? AND month = ? AND scraped = 0 ORDER BY id",
    )
    .bind(year)
    .bind(month)
    .fetch_all(pool)
    .await
}

/// Keyset page over all links, for store consolidation.
pub async fn links_page(
    pool: &SqlitePool,
    after_ttb_id: Option<&str>,
    limit: i64,
) -> Result<Vec<CollectedLink>, sqlx::Error> {
    sqlx::query_as(
        "SELECT ttb_id, detail_url, year, month, scraped FROM collected_links \
         WHERE ttb_id > ? ORDER BY ttb_id LIMIT ?",
    )
    .bind(after_ttb_id.unwrap_or(""))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Insert a link row preserving its scraped flag (consolidation path).
pub async fn insert_link_row(
    pool: &SqlitePool,
    link: &CollectedLink,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO collected_links (ttb_id, detail_url, year, month, scraped) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&link.ttb_id)
    .bind(&link.detail_url)
    .bind(link.year)
    .bind(link.month)
    .bind(link.scraped)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    record: &'q ColaRecord,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&record.ttb_id)
        .bind(&record.status)
        .bind(&record.vendor_code)
        .bind(&record.serial_number)
        .bind(&record.class_type_code)
        .bind(&record.origin_code)
        .bind(&record.type_of_application)
        .bind(&record.brand_name)
        .bind(&record.fanciful_name)
        .bind(&record.for_sale_in)
        .bind(&record.total_bottle_capacity)
        .bind(&record.formula)
        .bind(&record.qualifications)
        .bind(&record.grape_varietal)
        .bind(&record.wine_vintage)
        .bind(&record.appellation)
        .bind(&record.alcohol_content)
        .bind(&record.ph_level)
        .bind(&record.plant_registry)
        .bind(&record.company_name)
        .bind(&record.street)
        .bind(&record.state)
        .bind(&record.contact_person)
        .bind(&record.phone_number)
        .bind(&record.approval_date)
        .bind(record.year)
        .bind(record.month)
        .bind(record.day)
        .bind(&record.category)
}

/// Persist a scraped record and flip its link's scraped flag in one
/// transaction, so an interrupt can never leave a scraped link without its
/// record.
pub async fn upsert_record_mark_scraped(
    pool: &SqlitePool,
    record: &ColaRecord,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT OR REPLACE INTO colas ({COLA_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );

    let mut tx = pool.begin().await?;
    bind_record(sqlx::query(&sql), record).execute(&mut *tx).await?;
    sqlx::query("UPDATE collected_links SET scraped = 1 WHERE ttb_id = ?")
        .bind(&record.ttb_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Insert a record only if its key is new (consolidation path).
pub async fn insert_record_ignore(
    pool: &SqlitePool,
    record: &ColaRecord,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        "INSERT OR IGNORE INTO colas ({COLA_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    let result = bind_record(sqlx::query(&sql), record).execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn count_records_for_month(
    pool: &SqlitePool,
    year: i64,
    month: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM colas WHERE year = ? AND month = ?")
        .bind(year)
        .bind(month)
        .fetch_one(pool)
        .await
}

pub async fn count_records(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM colas")
        .fetch_one(pool)
        .await
}

/// Keyset page over all records in ttb_id order.
pub async fn records_page(
    pool: &SqlitePool,
    after_ttb_id: Option<&str>,
    limit: i64,
) -> Result<Vec<ColaRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLA_COLUMNS} FROM colas WHERE ttb_id > ? ORDER BY ttb_id LIMIT ?"
    );
    sqlx::query_as(&sql)
        .bind(after_ttb_id.unwrap_or(""))
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Keyset page over one month's records.
pub async fn month_records_page(
    pool: &SqlitePool,
    year: i64,
    month: i64,
    after_ttb_id: Option<&str>,
    limit: i64,
) -> Result<Vec<ColaRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLA_COLUMNS} FROM colas \
         WHERE year = ? AND month = ? AND ttb_id > ? ORDER BY ttb_id LIMIT ?"
    );
    sqlx::query_as(&sql)
        .bind(year)
        .bind(month)
        .bind(after_ttb_id.unwrap_or(""))
        .bind(limit)
        .fetch_all(pool)
        .await
}

pub async fn get_progress(
    pool: &SqlitePool,
    year: i64,
    month: i64,
) -> Result<Option<MonthProgress>, sqlx::Error> {
    sqlx::query_as(
        "SELECT year, month, expected_links, collected_links, links_verified, \
         scraped_details, details_verified, error \
         FROM month_progress WHERE year = ? AND month = ?",
    )
    .bind(year)
    .bind(month)
    .fetch_optional(pool)
    .await
}

pub async fn save_progress(
    pool: &SqlitePool,
    progress: &MonthProgress,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO month_progress \
         (year, month, expected_links, collected_links, links_verified, \
          scraped_details, details_verified, error, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP) \
         ON CONFLICT(year, month) DO UPDATE SET \
          expected_links = excluded.expected_links, \
          collected_links = excluded.collected_links, \
          links_verified = excluded.links_verified, \
          scraped_details = excluded.scraped_details, \
          details_verified = excluded.details_verified, \
          error = excluded.error, \
          updated_at = CURRENT_TIMESTAMP",
    )
    .bind(progress.year)
    .bind(progress.month)
    .bind(progress.expected_links)
    .bind(progress.collected_links)
    .bind(progress.links_verified)
    .bind(progress.scraped_details)
    .bind(progress.details_verified)
    .bind(&progress.error)
    .execute(pool)
    .await?;
    Ok(())
}

/// All month ledgers, newest first, for the status report.
pub async fn all_progress(pool: &SqlitePool) -> Result<Vec<MonthProgress>, sqlx::Error> {
    sqlx::query_as(
        "SELECT year, month, expected_links, collected_links, links_verified, \
         scraped_details, details_verified, error \
         FROM month_progress ORDER BY year DESC, month DESC",
    )
    .fetch_all(pool)
    .await
}

/// Record counts grouped by year, newest first.
pub async fn record_counts_by_year(
    pool: &SqlitePool,
) -> Result<Vec<(i64, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT year, COUNT(*) FROM colas WHERE year IS NOT NULL \
         GROUP BY year ORDER BY year DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn distinct_brand_names(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT brand_name FROM colas \
         WHERE brand_name IS NOT NULL AND brand_name != ''",
    )
    .fetch_all(pool)
    .await
}

pub async fn distinct_company_names(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT company_name FROM colas \
         WHERE company_name IS NOT NULL AND company_name != ''",
    )
    .fetch_all(pool)
    .await
}
