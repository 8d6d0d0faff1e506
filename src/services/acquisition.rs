//! Two-phase acquisition engine.
//!
//! Phase 1 discovers every record identifier in a month by recursive date
//! bisection under the registry's 1,000-row query cap; Phase 2 loads each
//! discovered detail page and extracts the record. Both phases commit after
//! every unit of work and verify themselves against the registry's declared
//! totals, so a worker killed at any point resumes where it stopped.

use chrono::{Datelike, NaiveDate};
use futures::future::BoxFuture;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db::queries;
use crate::models::progress::MonthProgress;
use crate::services::browser::{
    extract_result_links, ClassCodeRange, Registry, RegistryError, TTB_BASE_URL,
};
use crate::services::extract;

/// The registry truncates any query's results at this count.
pub const MAX_RESULTS_PER_QUERY: u64 = 1000;

/// Pagination safety: abort a single query's page walk after this many pages.
const MAX_RESULT_PAGES: u32 = 100;

/// Fraction of the registry's declared total a month must reach to verify.
const VERIFICATION_TOLERANCE: f64 = 1.0;

/// Class/type code slices that partition the registry's product-code space.
/// Used when a single day alone exceeds the query cap: whiskies are 1xx,
/// gin 2xx, vodka 3xx, rum 4xx, brandy 5xx, cordials 6xx, cocktails 7xx,
/// wine 8x, malt 9xx.
pub const CLASS_TYPE_RANGES: [ClassCodeRange; 5] = [
    ClassCodeRange { from: "0", to: "2zzz", label: "Whisky/Gin (0-2xx)" },
    ClassCodeRange { from: "3", to: "4zzz", label: "Vodka/Rum (3-4xx)" },
    ClassCodeRange { from: "5", to: "6zzz", label: "Brandy/Cordials (5-6xx)" },
    ClassCodeRange { from: "7", to: "8zzz", label: "Cocktails/Wine (7-8xx)" },
    ClassCodeRange { from: "9", to: "9zzz", label: "Beer/Other (9xx)" },
];

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("local store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("invalid calendar month {0}-{1:02}")]
    BadMonth(i64, i64),
}

impl AcquireError {
    /// Whether the operator asked the worker to stop.
    pub fn is_quit(&self) -> bool {
        matches!(self, AcquireError::Registry(RegistryError::Quit))
    }
}

/// Outcome of a free-form date range run (`--date` / `--dates`).
#[derive(Debug, Clone)]
pub struct DateRangeSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub expected_links: i64,
    pub collected_links: i64,
    pub scraped_details: i64,
    pub links_verified: bool,
    pub details_verified: bool,
    pub error: Option<String>,
}

/// One acquisition worker: a registry session plus its private local store.
pub struct AcquisitionWorker<R: Registry> {
    name: String,
    registry: R,
    store: SqlitePool,
}

impl<R: Registry> AcquisitionWorker<R> {
    pub fn new(name: impl Into<String>, registry: R, store: SqlitePool) -> Self {
        Self {
            name: name.into(),
            registry,
            store,
        }
    }

    pub fn store(&self) -> &SqlitePool {
        &self.store
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    // ── Phase 1: link collection ─────────────────────────────────────

    /// Collect all detail links for a month and verify the count against
    /// the registry's declared total. Idempotent: re-running inserts only
    /// missing links, and a month already at the threshold short-circuits.
    pub async fn collect_links(
        &mut self,
        year: i64,
        month: i64,
    ) -> Result<MonthProgress, AcquireError> {
        let mut progress = MonthProgress::new(year, month);

        println!("\n{}", "=".repeat(60));
        println!("PHASE 1: Collecting links for {}", progress.month_str());
        println!("{}", "=".repeat(60));

        match self.collect_links_inner(&mut progress).await {
            Ok(()) => {}
            Err(e) if e.is_quit() => return Err(e),
            Err(e) => {
                error!(month = %progress.month_str(), error = %e, "link collection failed");
                progress.error = Some(e.to_string());
            }
        }

        queries::save_progress(&self.store, &progress).await?;
        Ok(progress)
    }

    async fn collect_links_inner(
        &mut self,
        progress: &mut MonthProgress,
    ) -> Result<(), AcquireError> {
        self.registry.ensure_ready().await?;

        let (start_date, end_date) = month_bounds(progress.year, progress.month)
            .ok_or(AcquireError::BadMonth(progress.year, progress.month))?;

        let existing = queries::count_links_for_month(&self.store, progress.year, progress.month)
            .await?;

        let start = self.registry.submit_search(start_date, end_date, None).await?;
        let total = start.total;
        progress.expected_links = total as i64;

        info!(
            month = %progress.month_str(),
            registry_total = total,
            existing_links = existing,
            "phase 1 starting"
        );

        if total == 0 {
            progress.links_verified = true;
            info!(month = %progress.month_str(), "no records for this month");
            return Ok(());
        }

        // Smart resume: skip collection entirely when the store already
        // holds enough links for this month.
        if meets_threshold(existing, total as i64) {
            progress.collected_links = existing;
            progress.links_verified = true;
            info!(
                month = %progress.month_str(),
                links = existing,
                "links already complete"
            );
            return Ok(());
        }

        self.collect_range(start_date, end_date, progress.year, progress.month, None)
            .await?;

        // Verify against the unique-key count actually stored, not the sum
        // of per-query page counts.
        let actual = queries::count_links_for_month(&self.store, progress.year, progress.month)
            .await?;
        progress.collected_links = actual;

        if meets_threshold(actual, total as i64) {
            progress.links_verified = true;
            info!(
                month = %progress.month_str(),
                collected = actual,
                expected = total,
                "links verified"
            );
        } else {
            let missing = total as i64 - actual;
            progress.error = Some(format!(
                "Links mismatch: {actual} vs {total} (missing {missing})"
            ));
            error!(
                month = %progress.month_str(),
                collected = actual,
                expected = total,
                missing,
                "links mismatch"
            );
        }
        Ok(())
    }

    /// Collect a date range, recursively splitting while the registry
    /// reports more rows than one query can return: first by bisecting the
    /// date span, then (for an overflowing single day) by class/type code
    /// slices, and finally capping with a warning when even a single
    /// day-and-slice query overflows.
    fn collect_range(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        year: i64,
        month: i64,
        class_range: Option<ClassCodeRange>,
    ) -> BoxFuture<'_, Result<(u64, u64), AcquireError>> {
        Box::pin(async move {
            match class_range {
                Some(range) => info!(
                    from = %date_from, to = %date_to, slice = range.label, "searching"
                ),
                None => info!(from = %date_from, to = %date_to, "searching"),
            }

            let start = self
                .registry
                .submit_search(date_from, date_to, class_range)
                .await?;
            let expected = start.total;

            if expected == 0 {
                return Ok((0, 0));
            }
            info!(total = expected, "registry reports");

            if expected >= MAX_RESULTS_PER_QUERY {
                let total_days = (date_to - date_from).num_days();

                if total_days <= 0 {
                    if class_range.is_none() {
                        info!(date = %date_from, "single day exceeds query cap, splitting by product type");
                        let mut expected_sum = 0;
                        let mut collected_sum = 0;
                        for range in CLASS_TYPE_RANGES {
                            let (exp, col) = self
                                .collect_range(date_from, date_to, year, month, Some(range))
                                .await?;
                            expected_sum += exp;
                            collected_sum += col;
                        }
                        return Ok((expected_sum, collected_sum));
                    }

                    // Already down to one day and one slice; take what the
                    // registry will give and flag the shortfall upstream.
                    warn!(
                        date = %date_from,
                        slice = class_range.map(|r| r.label).unwrap_or(""),
                        total = expected,
                        "single day and class slice still exceed query cap, collecting first {MAX_RESULTS_PER_QUERY}"
                    );
                    let collected = self
                        .collect_all_pages(&start.first_page, year, month)
                        .await?;
                    return Ok((expected, collected.min(MAX_RESULTS_PER_QUERY)));
                }

                let mid = date_from + chrono::Duration::days(total_days / 2);
                info!(
                    left_to = %mid,
                    right_from = %(mid + chrono::Duration::days(1)),
                    "splitting date range"
                );
                let (exp1, col1) = self
                    .collect_range(date_from, mid, year, month, class_range)
                    .await?;
                let (exp2, col2) = self
                    .collect_range(
                        mid + chrono::Duration::days(1),
                        date_to,
                        year,
                        month,
                        class_range,
                    )
                    .await?;
                return Ok((exp1 + exp2, col1 + col2));
            }

            let collected = self
                .collect_all_pages(&start.first_page, year, month)
                .await?;
            Ok((expected, collected))
        })
    }

    /// Walk every page of the current search result, inserting links as
    /// they are found. Each page's inserts commit before the next page
    /// loads.
    async fn collect_all_pages(
        &mut self,
        first_page: &str,
        year: i64,
        month: i64,
    ) -> Result<u64, AcquireError> {
        let mut collected = 0u64;
        let mut page_no = 1u32;
        let mut html = first_page.to_string();

        loop {
            let links = extract_result_links(&html, TTB_BASE_URL);
            if links.is_empty() {
                info!(page = page_no, "no links on page, stopping");
                break;
            }

            let inserted = queries::insert_links(&self.store, &links, year, month).await?;
            collected += links.len() as u64;
            info!(
                page = page_no,
                links = links.len(),
                inserted,
                running_total = collected,
                "page collected"
            );

            if page_no >= MAX_RESULT_PAGES {
                warn!("hit {MAX_RESULT_PAGES} page safety limit");
                break;
            }

            match self.registry.next_page().await? {
                Some(next) => html = next,
                None => break,
            }
            page_no += 1;
        }

        Ok(collected)
    }

    // ── Phase 2: detail scraping ─────────────────────────────────────

    /// Scrape detail pages for every unscraped link in a month. Each
    /// record insert flips its link's scraped flag in the same
    /// transaction, so restarts pick up exactly the remaining links.
    pub async fn scrape_details(
        &mut self,
        year: i64,
        month: i64,
    ) -> Result<MonthProgress, AcquireError> {
        let mut progress = queries::get_progress(&self.store, year, month)
            .await?
            .unwrap_or_else(|| MonthProgress::new(year, month));

        println!("\n{}", "=".repeat(60));
        println!("PHASE 2: Scraping details for {}", progress.month_str());
        println!("{}", "=".repeat(60));

        match self.scrape_details_inner(&mut progress).await {
            Ok(()) => {}
            Err(e) if e.is_quit() => return Err(e),
            Err(e) => {
                error!(month = %progress.month_str(), error = %e, "detail scraping failed");
                progress.error = Some(e.to_string());
            }
        }

        queries::save_progress(&self.store, &progress).await?;
        Ok(progress)
    }

    async fn scrape_details_inner(
        &mut self,
        progress: &mut MonthProgress,
    ) -> Result<(), AcquireError> {
        let (year, month) = (progress.year, progress.month);

        let total_links = queries::count_links_for_month(&self.store, year, month).await?;
        if total_links == 0 {
            progress.error = Some("No links - run Phase 1 first".to_string());
            error!(month = %progress.month_str(), "no links collected, run Phase 1 first");
            return Ok(());
        }
        progress.collected_links = total_links;

        let links = queries::unscraped_links(&self.store, year, month).await?;
        let to_scrape = links.len() as i64;
        let already_done = total_links - to_scrape;

        info!(
            month = %progress.month_str(),
            total_links,
            already_scraped = already_done,
            remaining = to_scrape,
            "phase 2 starting"
        );

        if to_scrape == 0 {
            let scraped = queries::count_records_for_month(&self.store, year, month).await?;
            progress.scraped_details = scraped;
            if meets_threshold(scraped, total_links) {
                progress.details_verified = true;
                info!(month = %progress.month_str(), scraped, "details already complete");
            }
            return Ok(());
        }

        self.registry.ensure_ready().await?;

        let mut ok = 0i64;
        let mut failed = 0i64;

        for (i, link) in links.iter().enumerate() {
            let position = i as i64 + 1 + already_done;
            info!(
                ttb_id = %link.ttb_id,
                position,
                total = total_links,
                "scraping"
            );

            match self.scrape_one(&link.ttb_id, &link.detail_url).await {
                Ok(()) => ok += 1,
                Err(e) if e.is_quit() => return Err(e),
                Err(e) => {
                    warn!(ttb_id = %link.ttb_id, error = %e, "detail scrape failed, link stays pending");
                    failed += 1;
                }
            }

            if (i + 1) % 100 == 0 {
                info!(
                    month = %progress.month_str(),
                    position,
                    total = total_links,
                    ok,
                    failed,
                    "progress"
                );
            }
        }

        let scraped = queries::count_records_for_month(&self.store, year, month).await?;
        progress.scraped_details = scraped;

        if meets_threshold(scraped, total_links) {
            progress.details_verified = true;
            info!(
                month = %progress.month_str(),
                scraped,
                expected = total_links,
                "details verified"
            );
        } else {
            let missing = total_links - scraped;
            progress.error = Some(format!(
                "Details mismatch: {scraped} vs {total_links} (missing {missing})"
            ));
            error!(
                month = %progress.month_str(),
                scraped,
                expected = total_links,
                missing,
                "details mismatch"
            );
        }
        Ok(())
    }

    async fn scrape_one(&mut self, ttb_id: &str, url: &str) -> Result<(), AcquireError> {
        let html = self.registry.load_detail(url).await?;
        let record = extract::parse_record(ttb_id, &html);
        queries::upsert_record_mark_scraped(&self.store, &record).await?;
        Ok(())
    }

    // ── Orchestration ────────────────────────────────────────────────

    /// Run Phase 1 and Phase 2 for one month, skipping any phase that has
    /// already verified.
    pub async fn process_month(
        &mut self,
        year: i64,
        month: i64,
        links_only: bool,
        details_only: bool,
    ) -> Result<MonthProgress, AcquireError> {
        let mut progress = queries::get_progress(&self.store, year, month)
            .await?
            .unwrap_or_else(|| MonthProgress::new(year, month));

        if !details_only {
            if progress.links_verified {
                info!(month = %progress.month_str(), "links already verified, skipping phase 1");
            } else {
                progress = self.collect_links(year, month).await?;
                if !progress.links_verified && progress.expected_links > 0 {
                    error!(month = %progress.month_str(), "link collection incomplete");
                    return Ok(progress);
                }
            }
        }

        if !links_only {
            if progress.details_verified {
                info!(month = %progress.month_str(), "details already verified, skipping phase 2");
            } else {
                progress = self.scrape_details(year, month).await?;
            }
        }

        Ok(progress)
    }

    /// Process an assigned month set in order, stopping after a month whose
    /// Phase 1 failed outright.
    pub async fn process_months(
        &mut self,
        months: &[(i64, i64)],
        links_only: bool,
        details_only: bool,
    ) -> Result<Vec<MonthProgress>, AcquireError> {
        println!("\n{}", "#".repeat(60));
        println!("WORKER: {}", self.name);
        println!("Months to process: {}", months.len());
        for (year, month) in months {
            println!("  - {year}-{month:02}");
        }
        println!("{}", "#".repeat(60));

        let mut results = Vec::new();
        for &(year, month) in months {
            let progress = self
                .process_month(year, month, links_only, details_only)
                .await?;

            let failed = progress.error.is_some()
                && !progress.links_verified
                && progress.expected_links > 0;
            results.push(progress);

            if failed {
                warn!(
                    month = %format!("{year}-{month:02}"),
                    "stopping after failed month"
                );
                break;
            }
        }

        self.print_summary(&results);
        Ok(results)
    }

    /// Process an explicit date range (a single day or a span). Links and
    /// records are filed under the start date's (year, month).
    pub async fn process_date_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        links_only: bool,
        details_only: bool,
    ) -> Result<DateRangeSummary, AcquireError> {
        let year = i64::from(start.year());
        let month = i64::from(start.month());

        println!("\n{}", "#".repeat(60));
        println!("WORKER: {}", self.name);
        if start == end {
            println!("Date: {start}");
        } else {
            println!("Date range: {start} to {end}");
        }
        println!("{}", "#".repeat(60));

        let mut summary = DateRangeSummary {
            start,
            end,
            expected_links: 0,
            collected_links: 0,
            scraped_details: 0,
            links_verified: false,
            details_verified: false,
            error: None,
        };

        if !details_only {
            self.registry.ensure_ready().await?;
            match self.collect_range(start, end, year, month, None).await {
                Ok((expected, _)) => {
                    let actual =
                        queries::count_links_for_month(&self.store, year, month).await?;
                    summary.expected_links = expected as i64;
                    summary.collected_links = actual;
                    if meets_threshold(actual, expected as i64) {
                        summary.links_verified = true;
                        info!(collected = actual, expected, "links verified");
                    } else {
                        summary.error =
                            Some(format!("Links mismatch: {actual} vs {expected}"));
                        error!(collected = actual, expected, "links mismatch");
                    }
                }
                Err(e) if e.is_quit() => return Err(e),
                Err(e) => {
                    summary.error = Some(e.to_string());
                    error!(error = %e, "date range collection failed");
                }
            }
        }

        if !links_only
            && (details_only || summary.links_verified || summary.expected_links == 0)
        {
            let progress = self.scrape_details(year, month).await?;
            summary.scraped_details = progress.scraped_details;
            summary.details_verified = progress.details_verified;
            if let Some(error) = progress.error {
                summary.error = Some(error);
            }
        }

        self.print_date_summary(&summary);
        Ok(summary)
    }

    // ── Reporting ────────────────────────────────────────────────────

    fn print_summary(&self, results: &[MonthProgress]) {
        println!("\n{}", "=".repeat(60));
        println!("SUMMARY - {}", self.name);
        println!("{}", "=".repeat(60));

        let mut total_expected = 0;
        let mut total_collected = 0;
        let mut total_scraped = 0;

        for progress in results {
            println!(
                "  {}: Links {} {}/{} | Details {} {}",
                progress.month_str(),
                pass_marker(progress.links_verified),
                progress.collected_links,
                progress.expected_links,
                pass_marker(progress.details_verified),
                progress.scraped_details,
            );
            total_expected += progress.expected_links;
            total_collected += progress.collected_links;
            total_scraped += progress.scraped_details;
        }

        println!();
        println!("  Total Expected:  {total_expected}");
        println!("  Total Collected: {total_collected}");
        println!("  Total Scraped:   {total_scraped}");
        println!("{}\n", "=".repeat(60));
    }

    fn print_date_summary(&self, summary: &DateRangeSummary) {
        println!("\n{}", "=".repeat(60));
        println!("SUMMARY - {}", self.name);
        println!("{}", "=".repeat(60));

        if summary.start == summary.end {
            println!("  Date: {}", summary.start);
        } else {
            println!("  Date: {} to {}", summary.start, summary.end);
        }
        println!(
            "  Links:   {} {} / {}",
            pass_marker(summary.links_verified),
            summary.collected_links,
            summary.expected_links,
        );
        println!(
            "  Details: {} {}",
            pass_marker(summary.details_verified),
            summary.scraped_details,
        );
        if let Some(error) = &summary.error {
            println!("  Error: {error}");
        }
        println!("{}\n", "=".repeat(60));
    }

    /// Print the store's month ledgers and totals.
    pub async fn status(&self) -> Result<(), AcquireError> {
        println!("\n{}", "=".repeat(60));
        println!("STATUS - {}", self.name);
        println!("{}", "=".repeat(60));

        let rows = queries::all_progress(&self.store).await?;
        if rows.is_empty() {
            println!("\nNo month progress yet.");
        } else {
            println!("\nMonth Progress:");
            for progress in &rows {
                let error = progress
                    .error
                    .as_deref()
                    .map(|e| format!(" ERR: {}", truncate(e, 40)))
                    .unwrap_or_default();
                println!(
                    "  {}: Links {} {}/{} | Details {} {}{}",
                    progress.month_str(),
                    pass_marker(progress.links_verified),
                    progress.collected_links,
                    progress.expected_links,
                    pass_marker(progress.details_verified),
                    progress.scraped_details,
                    error,
                );
            }
        }

        let links = queries::count_links(&self.store).await?;
        let records = queries::count_records(&self.store).await?;
        println!("\nTotals:");
        println!("  Links: {links}");
        println!("  COLAs: {records}");
        println!("{}\n", "=".repeat(60));
        Ok(())
    }
}

fn meets_threshold(actual: i64, expected: i64) -> bool {
    actual as f64 >= expected as f64 * VERIFICATION_TOLERANCE
}

fn pass_marker(verified: bool) -> &'static str {
    if verified {
        "[OK]"
    } else {
        "[FAIL]"
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let cut = s
            .char_indices()
            .take_while(|(i, _)| *i < limit)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}

/// Parse a "YYYY-MM" month selector.
pub fn parse_month(s: &str) -> Result<(i64, i64), String> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 2 {
        return Err(format!("invalid month format: {s}. Use YYYY-MM"));
    }
    let year: i64 = parts[0]
        .parse()
        .map_err(|_| format!("invalid year in {s}"))?;
    let month: i64 = parts[1]
        .parse()
        .map_err(|_| format!("invalid month in {s}"))?;
    if !(1..=12).contains(&month) {
        return Err(format!("month out of range in {s}"));
    }
    Ok((year, month))
}

/// Inclusive list of months between two "YYYY-MM" selectors.
pub fn month_range_inclusive(start: &str, end: &str) -> Result<Vec<(i64, i64)>, String> {
    let (start_year, start_month) = parse_month(start)?;
    let (end_year, end_month) = parse_month(end)?;

    let mut months = Vec::new();
    let (mut year, mut month) = (start_year, start_month);
    while (year, month) <= (end_year, end_month) {
        months.push((year, month));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    Ok(months)
}

/// All months of a year, truncated at `today` for the current year.
pub fn year_months(year: i64, today: NaiveDate) -> Vec<(i64, i64)> {
    (1..=12)
        .filter(|&month| {
            if year > i64::from(today.year()) {
                return false;
            }
            year < i64::from(today.year()) || month <= i64::from(today.month())
        })
        .map(|month| (year, month))
        .collect()
}

/// Parse a date in YYYY-MM-DD, MM/DD/YYYY, or MM-DD-YYYY form.
pub fn parse_flexible_date(s: &str) -> Result<NaiveDate, String> {
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    Err(format!(
        "invalid date format: {s}. Use YYYY-MM-DD or MM/DD/YYYY"
    ))
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i64, month: i64) -> Option<(NaiveDate, NaiveDate)> {
    let year = i32::try_from(year).ok()?;
    let month = u32::try_from(month).ok()?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_month - chrono::Duration::days(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2013, 1).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2013, 1, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2013, 1, 31).unwrap());

        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, last) = month_bounds(2024, 12).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        assert!(month_bounds(2024, 13).is_none());
    }

    #[test]
    fn test_class_ranges_partition_code_space() {
        // Five disjoint slices covering leading digits 0 through 9.
        assert_eq!(CLASS_TYPE_RANGES.len(), 5);
        assert_eq!(CLASS_TYPE_RANGES[0].from, "0");
        assert_eq!(CLASS_TYPE_RANGES[4].to, "9zzz");
        for window in CLASS_TYPE_RANGES.windows(2) {
            assert!(window[0].to.chars().next() < window[1].from.chars().next());
        }
    }

    #[test]
    fn test_meets_threshold() {
        assert!(meets_threshold(100, 100));
        assert!(meets_threshold(101, 100));
        assert!(!meets_threshold(99, 100));
        assert!(meets_threshold(0, 0));
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2025-01").unwrap(), (2025, 1));
        assert!(parse_month("2025").is_err());
        assert!(parse_month("2025-13").is_err());
        assert!(parse_month("jan-2025").is_err());
    }

    #[test]
    fn test_month_range_inclusive() {
        let months = month_range_inclusive("2024-11", "2025-02").unwrap();
        assert_eq!(
            months,
            vec![(2024, 11), (2024, 12), (2025, 1), (2025, 2)]
        );
        assert_eq!(month_range_inclusive("2025-03", "2025-03").unwrap().len(), 1);
    }

    #[test]
    fn test_year_months_truncates_current_year() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(year_months(2024, today).len(), 12);
        assert_eq!(year_months(2025, today).len(), 3);
        assert!(year_months(2026, today).is_empty());
    }

    #[test]
    fn test_parse_flexible_date() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(parse_flexible_date("2026-01-05").unwrap(), expected);
        assert_eq!(parse_flexible_date("01/05/2026").unwrap(), expected);
        assert_eq!(parse_flexible_date("01-05-2026").unwrap(), expected);
        assert!(parse_flexible_date("Jan 5 2026").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 40), "short");
        let long = "x".repeat(50);
        assert_eq!(truncate(&long, 40).len(), 43);
    }
}
