//! Two-pass chronological classifier.
//!
//! Walks the whole remote corpus in approval order and assigns each record
//! its first-observation signal, then computes how many future refilings
//! each SKU's first record will see. Company identity is resolved through
//! the alias map; spellings with no alias fall back to their upper-cased
//! raw name so orphaned companies still classify consistently.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::models::cola::Signal;
use crate::services::catalog;
use crate::services::d1::{escape_str, D1Client, RemoteError};

/// Keys per UPDATE statement's IN-list.
const UPDATE_CHUNK_SIZE: usize = 500;

/// Hard cap on the per-partition fetch page; the endpoint's memory limit
/// starts failing scans well above this.
const MAX_FETCH_PAGE: usize = 50_000;

/// Classifier's view of one record.
#[derive(Debug, Clone)]
pub struct ClassifyRow {
    pub ttb_id: String,
    pub company_name: String,
    pub brand_name: String,
    pub fanciful_name: String,
    /// Resolved through the alias map; `None` marks an orphaned company.
    pub company_id: Option<i64>,
}

/// Company identity for seen-set keys: resolved id when an alias exists,
/// otherwise the upper-cased raw spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompanyKey {
    Id(i64),
    Raw(String),
}

pub type SkuKey = (CompanyKey, String, String);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassifyStats {
    pub new_companies: usize,
    pub new_brands: usize,
    pub new_skus: usize,
    pub refiles: usize,
    pub legacy: usize,
    pub orphaned: usize,
}

#[derive(Debug, Default)]
pub struct Classification {
    /// ttb_id -> signal, exhaustive over the input.
    pub signals: HashMap<String, Signal>,
    /// SKU key -> ttb_id of its first observation.
    pub first_instance: HashMap<SkuKey, String>,
    pub stats: ClassifyStats,
}

impl ClassifyRow {
    fn company_key(&self) -> CompanyKey {
        match self.company_id {
            Some(id) => CompanyKey::Id(id),
            None => CompanyKey::Raw(self.company_name.trim().to_uppercase()),
        }
    }

    fn sku_key(&self) -> SkuKey {
        (
            self.company_key(),
            self.brand_name.trim().to_lowercase(),
            self.fanciful_name.trim().to_lowercase(),
        )
    }

    fn is_legacy(&self) -> bool {
        self.company_name.trim().is_empty() || self.brand_name.trim().is_empty()
    }
}

/// Pass 1: assign signals in chronological order. The caller must supply
/// records already sorted; within a day the tie-break is ascending ttb_id,
/// which makes the whole pass deterministic for a fixed corpus.
pub fn classify_records(records: &[ClassifyRow]) -> Classification {
    let mut seen_companies: HashSet<i64> = HashSet::new();
    let mut seen_companies_raw: HashSet<String> = HashSet::new();
    let mut seen_brands: HashSet<(CompanyKey, String)> = HashSet::new();
    let mut seen_skus: HashSet<SkuKey> = HashSet::new();

    let mut result = Classification::default();

    for record in records {
        if record.is_legacy() {
            result.signals.insert(record.ttb_id.clone(), Signal::Legacy);
            result.stats.legacy += 1;
            continue;
        }

        let company_key = record.company_key();
        let brand = record.brand_name.trim().to_lowercase();
        let sku_key = record.sku_key();
        let brand_key = (company_key.clone(), brand);

        let company_is_new = match &company_key {
            CompanyKey::Id(id) => !seen_companies.contains(id),
            CompanyKey::Raw(raw) => {
                result.stats.orphaned += 1;
                !seen_companies_raw.contains(raw)
            }
        };

        let signal = if company_is_new {
            match &company_key {
                CompanyKey::Id(id) => {
                    seen_companies.insert(*id);
                }
                CompanyKey::Raw(raw) => {
                    seen_companies_raw.insert(raw.clone());
                }
            }
            seen_brands.insert(brand_key);
            seen_skus.insert(sku_key.clone());
            result
                .first_instance
                .insert(sku_key, record.ttb_id.clone());
            result.stats.new_companies += 1;
            Signal::NewCompany
        } else if !seen_brands.contains(&brand_key) {
            seen_brands.insert(brand_key);
            seen_skus.insert(sku_key.clone());
            result
                .first_instance
                .insert(sku_key, record.ttb_id.clone());
            result.stats.new_brands += 1;
            Signal::NewBrand
        } else if !seen_skus.contains(&sku_key) {
            seen_skus.insert(sku_key.clone());
            result
                .first_instance
                .insert(sku_key, record.ttb_id.clone());
            result.stats.new_skus += 1;
            Signal::NewSku
        } else {
            result.stats.refiles += 1;
            Signal::Refile
        };

        result.signals.insert(record.ttb_id.clone(), signal);
    }

    result
}

/// Pass 2: per-SKU occurrence counts; each first instance gets
/// `total - 1` as its future-refile count. Legacy records carry no SKU
/// identity and are skipped.
pub fn count_refiles(
    records: &[ClassifyRow],
    first_instance: &HashMap<SkuKey, String>,
) -> HashMap<String, i64> {
    let mut sku_counts: HashMap<SkuKey, i64> = HashMap::new();
    for record in records {
        if record.is_legacy() {
            continue;
        }
        *sku_counts.entry(record.sku_key()).or_insert(0) += 1;
    }

    let mut refile_counts = HashMap::new();
    for (sku_key, first_ttb_id) in first_instance {
        let total = sku_counts.get(sku_key).copied().unwrap_or(1);
        refile_counts.insert(first_ttb_id.clone(), total - 1);
    }
    refile_counts
}

/// Pass 3 statement builder: group keys by (signal, refile_count), one
/// UPDATE per chunk of at most [`UPDATE_CHUNK_SIZE`] ids. Deterministic
/// output order for a fixed input.
pub fn build_update_statements(
    signals: &HashMap<String, Signal>,
    refile_counts: &HashMap<String, i64>,
) -> Vec<String> {
    let mut groups: HashMap<(Signal, i64), Vec<&str>> = HashMap::new();
    for (ttb_id, signal) in signals {
        let refile_count = refile_counts.get(ttb_id).copied().unwrap_or(0);
        groups
            .entry((*signal, refile_count))
            .or_default()
            .push(ttb_id.as_str());
    }

    let mut ordered: Vec<((Signal, i64), Vec<&str>)> = groups.into_iter().collect();
    ordered.sort_by(|a, b| (a.0 .0.to_string(), a.0 .1).cmp(&(b.0 .0.to_string(), b.0 .1)));

    let mut statements = Vec::new();
    for ((signal, refile_count), mut ttb_ids) in ordered {
        ttb_ids.sort_unstable();
        for chunk in ttb_ids.chunks(UPDATE_CHUNK_SIZE) {
            let id_list = chunk
                .iter()
                .map(|id| escape_str(id))
                .collect::<Vec<_>>()
                .join(",");
            statements.push(format!(
                "UPDATE colas SET signal = {}, refile_count = {refile_count} \
                 WHERE ttb_id IN ({id_list});",
                escape_str(&signal.to_string()),
            ));
        }
    }
    statements
}

/// Fetch the whole corpus in chronological order, partitioned by
/// (year, month) to stay inside the endpoint's memory limit, and annotate
/// each row with its alias-resolved company id.
pub async fn fetch_records_chronological(
    d1: &D1Client,
    alias_map: &HashMap<String, i64>,
    page_size: usize,
) -> Result<Vec<ClassifyRow>, RemoteError> {
    let page_size = page_size.clamp(1, MAX_FETCH_PAGE);

    let year_months = d1
        .fetch_rows(
            "SELECT DISTINCT year, month FROM colas \
             WHERE year IS NOT NULL AND month IS NOT NULL \
             ORDER BY year ASC, month ASC",
        )
        .await?;
    info!(partitions = year_months.len(), "fetching corpus by (year, month)");

    let mut records = Vec::new();
    for (index, partition) in year_months.iter().enumerate() {
        let (Some(year), Some(month)) = (partition["year"].as_i64(), partition["month"].as_i64())
        else {
            continue;
        };

        let mut offset = 0usize;
        loop {
            // Within a partition: day ascending (falling back to the day
            // column, then 1 for malformed dates), ttb_id as tie-break.
            let rows = d1
                .fetch_rows(&format!(
                    "SELECT ttb_id, company_name, brand_name, fanciful_name \
                     FROM colas WHERE year = {year} AND month = {month} \
                     ORDER BY COALESCE(CAST(SUBSTR(approval_date, 4, 2) AS INTEGER), day, 1) ASC, \
                              ttb_id ASC \
                     LIMIT {page_size} OFFSET {offset}"
                ))
                .await?;
            let page_len = rows.len();

            for row in rows {
                let company_name = row["company_name"].as_str().unwrap_or_default().to_string();
                let company_id = alias_map.get(&company_name.to_uppercase()).copied();
                records.push(ClassifyRow {
                    ttb_id: row["ttb_id"].as_str().unwrap_or_default().to_string(),
                    company_name,
                    brand_name: row["brand_name"].as_str().unwrap_or_default().to_string(),
                    fanciful_name: row["fanciful_name"].as_str().unwrap_or_default().to_string(),
                    company_id,
                });
            }

            if page_len < page_size {
                break;
            }
            offset += page_size;
        }

        if (index + 1) % 12 == 0 || index + 1 == year_months.len() {
            info!(
                fetched = records.len(),
                through = %format!("{year}-{month:02}"),
                "fetch progress"
            );
        }
    }

    Ok(records)
}

/// Run all three passes against the remote store.
pub async fn run_batch_classification(
    d1: &D1Client,
    page_size: usize,
    dry_run: bool,
) -> Result<ClassifyStats, RemoteError> {
    let alias_map = catalog::load_alias_map(d1).await?;
    let records = fetch_records_chronological(d1, &alias_map, page_size).await?;
    info!(records = records.len(), "corpus fetched");

    info!("[pass 1] classifying chronologically");
    let classification = classify_records(&records);
    let stats = classification.stats.clone();
    info!(
        new_companies = stats.new_companies,
        new_brands = stats.new_brands,
        new_skus = stats.new_skus,
        refiles = stats.refiles,
        legacy = stats.legacy,
        "pass 1 complete"
    );
    if stats.orphaned > 0 {
        warn!(
            orphaned = stats.orphaned,
            "records with no company alias, classified by raw name"
        );
    }

    info!("[pass 2] counting refiles per SKU");
    let refile_counts = count_refiles(&records, &classification.first_instance);
    let with_refilings = refile_counts.values().filter(|c| **c > 0).count();
    info!(skus_with_refilings = with_refilings, "pass 2 complete");

    info!("[pass 3] applying updates");
    let statements = build_update_statements(&classification.signals, &refile_counts);
    info!(
        records = classification.signals.len(),
        statements = statements.len(),
        "update statements built"
    );

    if dry_run {
        info!("dry run, no changes applied");
        return Ok(stats);
    }

    let updated = d1.execute_batched(statements).await?;

    println!("\n{}", "=".repeat(60));
    println!("CLASSIFICATION COMPLETE");
    println!("{}", "=".repeat(60));
    println!("Total records processed: {}", records.len());
    println!("  NEW_COMPANY: {}", stats.new_companies);
    println!("  NEW_BRAND:   {}", stats.new_brands);
    println!("  NEW_SKU:     {}", stats.new_skus);
    println!("  REFILE:      {}", stats.refiles);
    println!("  LEGACY:      {}", stats.legacy);
    println!("SKUs with future refilings: {with_refilings}");
    println!("Rows updated: {updated}");
    println!("{}\n", "=".repeat(60));

    Ok(stats)
}

/// Report the current signal distribution without touching anything.
pub async fn analyze(d1: &D1Client) -> Result<(), RemoteError> {
    let total = d1
        .fetch_rows("SELECT COUNT(*) as total FROM colas")
        .await?
        .first()
        .and_then(|row| row["total"].as_i64())
        .unwrap_or(0);

    let distribution = d1
        .fetch_rows(
            "SELECT COALESCE(signal, 'NULL') as signal_type, COUNT(*) as count \
             FROM colas GROUP BY signal ORDER BY count DESC",
        )
        .await?;

    let unclassified = d1
        .fetch_rows("SELECT COUNT(*) as count FROM colas WHERE signal IS NULL")
        .await?
        .first()
        .and_then(|row| row["count"].as_i64())
        .unwrap_or(0);

    println!("\nTotal records: {total}");
    println!("\nSignal distribution:");
    for row in &distribution {
        println!(
            "  {}: {}",
            row["signal_type"].as_str().unwrap_or("?"),
            row["count"].as_i64().unwrap_or(0)
        );
    }
    println!("\nRecords needing classification: {unclassified}\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ttb_id: &str, company: &str, brand: &str, fanciful: &str) -> ClassifyRow {
        ClassifyRow {
            ttb_id: ttb_id.to_string(),
            company_name: company.to_string(),
            brand_name: brand.to_string(),
            fanciful_name: fanciful.to_string(),
            company_id: None,
        }
    }

    fn row_with_id(
        ttb_id: &str,
        company: &str,
        brand: &str,
        fanciful: &str,
        company_id: i64,
    ) -> ClassifyRow {
        ClassifyRow {
            company_id: Some(company_id),
            ..row(ttb_id, company, brand, fanciful)
        }
    }

    /// Same company across two brands, one SKU filed three times.
    fn acme_corpus() -> Vec<ClassifyRow> {
        vec![
            row("10000000000001", "ACME LLC", "Alpha", "Standard"),
            row("10000000000002", "ACME LLC", "Beta", "Reserve"),
            row("10000000000003", "ACME LLC", "Alpha", "Standard"),
            row("10000000000004", "ACME LLC", "Alpha", "Standard"),
        ]
    }

    #[test]
    fn test_classification_ladder() {
        let records = acme_corpus();
        let classification = classify_records(&records);

        assert_eq!(
            classification.signals["10000000000001"],
            Signal::NewCompany
        );
        assert_eq!(classification.signals["10000000000002"], Signal::NewBrand);
        assert_eq!(classification.signals["10000000000003"], Signal::Refile);
        assert_eq!(classification.signals["10000000000004"], Signal::Refile);

        // Every record got exactly one signal.
        assert_eq!(classification.signals.len(), records.len());
    }

    #[test]
    fn test_refile_counts() {
        let records = acme_corpus();
        let classification = classify_records(&records);
        let refiles = count_refiles(&records, &classification.first_instance);

        // Alpha/Standard filed three times: its first record sees 2 future
        // refilings. Beta/Reserve filed once: 0.
        assert_eq!(refiles["10000000000001"], 2);
        assert_eq!(refiles["10000000000002"], 0);
        assert_eq!(refiles.len(), 2);
    }

    #[test]
    fn test_new_sku_within_known_brand() {
        let records = vec![
            row("10000000000001", "ACME LLC", "Alpha", "Standard"),
            row("10000000000002", "ACME LLC", "Alpha", "Cask Proof"),
        ];
        let classification = classify_records(&records);
        assert_eq!(classification.signals["10000000000002"], Signal::NewSku);
    }

    #[test]
    fn test_alias_case_folding_not_new_company() {
        // Two spellings, both alias-resolved to company 17: the second
        // record is a refile of the same SKU, not a new company.
        let records = vec![
            row_with_id("10000000000001", "Acme, LLC", "Alpha", "", 17),
            row_with_id("10000000000002", "ACME, LLC", "Alpha", "", 17),
        ];
        let classification = classify_records(&records);
        assert_eq!(
            classification.signals["10000000000001"],
            Signal::NewCompany
        );
        assert_eq!(classification.signals["10000000000002"], Signal::Refile);
    }

    #[test]
    fn test_orphan_keys_fold_case() {
        let records = vec![
            row("10000000000001", "Lone Pine", "Ghost", ""),
            row("10000000000002", "LONE PINE", "Ghost", ""),
        ];
        let classification = classify_records(&records);
        assert_eq!(classification.signals["10000000000002"], Signal::Refile);
        assert_eq!(classification.stats.orphaned, 2);
    }

    #[test]
    fn test_legacy_never_enters_seen_sets() {
        let records = vec![
            row("10000000000001", "", "Ghost", ""),
            row("10000000000002", "ACME LLC", "", ""),
            row("10000000000003", "ACME LLC", "Ghost", ""),
        ];
        let classification = classify_records(&records);

        assert_eq!(classification.signals["10000000000001"], Signal::Legacy);
        assert_eq!(classification.signals["10000000000002"], Signal::Legacy);
        // The legacy "Ghost" record did not claim the brand.
        assert_eq!(
            classification.signals["10000000000003"],
            Signal::NewCompany
        );
        assert_eq!(classification.stats.legacy, 2);
    }

    #[test]
    fn test_first_instance_unique_per_sku() {
        let records = acme_corpus();
        let classification = classify_records(&records);
        // Two SKUs, two first instances; signals NEW_* count equals SKUs.
        assert_eq!(classification.first_instance.len(), 2);
        let firsts = classification
            .signals
            .values()
            .filter(|s| matches!(s, Signal::NewCompany | Signal::NewBrand | Signal::NewSku))
            .count();
        assert_eq!(firsts, 2);
    }

    #[test]
    fn test_refile_count_conservation() {
        let records = acme_corpus();
        let classification = classify_records(&records);
        let refiles = count_refiles(&records, &classification.first_instance);

        // Sum over SKUs of (refile_count + 1) equals non-legacy corpus size.
        let total: i64 = refiles.values().map(|c| c + 1).sum();
        assert_eq!(total, records.len() as i64);
    }

    #[test]
    fn test_classification_idempotent() {
        let records = acme_corpus();
        let first = classify_records(&records);
        let second = classify_records(&records);
        assert_eq!(first.signals, second.signals);
        assert_eq!(first.stats, second.stats);

        let counts_a = count_refiles(&records, &first.first_instance);
        let counts_b = count_refiles(&records, &second.first_instance);
        assert_eq!(counts_a, counts_b);
    }

    #[test]
    fn test_build_update_statements_groups_and_chunks() {
        let records = acme_corpus();
        let classification = classify_records(&records);
        let refiles = count_refiles(&records, &classification.first_instance);
        let statements = build_update_statements(&classification.signals, &refiles);

        // Groups: (NEW_COMPANY, 2), (NEW_BRAND, 0), (REFILE, 0) x2 ids.
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("'NEW_BRAND'"));
        assert!(statements[0].contains("refile_count = 0"));
        assert!(statements[1].contains("'NEW_COMPANY'"));
        assert!(statements[1].contains("refile_count = 2"));
        assert!(statements[2].contains("'REFILE'"));
        assert!(statements[2].contains("'10000000000003','10000000000004'"));
    }

    #[test]
    fn test_build_update_statements_chunk_limit() {
        let mut signals = HashMap::new();
        for i in 0..1101 {
            signals.insert(format!("{i:014}"), Signal::Refile);
        }
        let statements = build_update_statements(&signals, &HashMap::new());
        // 1101 ids in one group: 500 + 500 + 101.
        assert_eq!(statements.len(), 3);
    }
}
