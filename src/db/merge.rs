use std::path::Path;

use chrono::Local;
use tracing::{info, warn};

use crate::db::{open_store, queries};

const COPY_PAGE_SIZE: i64 = 10_000;

/// Output-store names that must never be picked up as merge sources.
const OUTPUT_MARKERS: &[&str] = &["consolidated", "merged", "final"];

#[derive(Debug, Default)]
pub struct MergeSummary {
    pub sources: Vec<SourceSummary>,
    pub total_links: u64,
    pub total_records: u64,
}

#[derive(Debug)]
pub struct SourceSummary {
    pub path: String,
    pub links_added: u64,
    pub records_added: u64,
}

/// Find worker store files under the data directory, skipping merge outputs.
pub fn find_databases(data_dir: &str) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".db") {
            continue;
        }
        if OUTPUT_MARKERS.iter().any(|m| name.contains(m)) {
            continue;
        }
        found.push(path.to_string_lossy().into_owned());
    }
    found.sort();
    Ok(found)
}

/// Consolidate per-worker stores into a single store, insert-or-ignore by
/// ttb_id. First writer wins for each key; the step is commutative across
/// sources up to which duplicate row survives.
pub async fn merge_databases(
    sources: &[String],
    output_path: &str,
) -> Result<MergeSummary, sqlx::Error> {
    backup_existing(output_path).map_err(sqlx::Error::Io)?;

    let output = open_store(output_path).await?;
    let mut summary = MergeSummary::default();

    for source_path in sources {
        if !Path::new(source_path).exists() {
            warn!(source = %source_path, "skipping missing source store");
            continue;
        }
        info!(source = %source_path, "merging");

        let source = open_store(source_path).await?;
        let mut links_added = 0u64;
        let mut records_added = 0u64;

        let mut cursor: Option<String> = None;
        loop {
            let page = queries::links_page(&source, cursor.as_deref(), COPY_PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|l| l.ttb_id.clone());
            for link in &page {
                links_added += queries::insert_link_row(&output, link).await?;
            }
        }

        let mut cursor: Option<String> = None;
        loop {
            let page = queries::records_page(&source, cursor.as_deref(), COPY_PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|r| r.ttb_id.clone());
            for record in &page {
                records_added += queries::insert_record_ignore(&output, record).await?;
            }
        }

        source.close().await;
        info!(
            source = %source_path,
            links_added,
            records_added,
            "source merged"
        );

        summary.total_links += links_added;
        summary.total_records += records_added;
        summary.sources.push(SourceSummary {
            path: source_path.clone(),
            links_added,
            records_added,
        });
    }

    output.close().await;
    Ok(summary)
}

/// Rename an existing output store aside instead of merging into it, so a
/// fresh merge always starts from an empty consolidated store.
fn backup_existing(output_path: &str) -> std::io::Result<()> {
    if Path::new(output_path).exists() {
        let backup = format!(
            "{output_path}.bak.{}",
            Local::now().format("%Y%m%d_%H%M%S")
        );
        info!(backup = %backup, "backing up existing consolidated store");
        std::fs::rename(output_path, backup)?;
    }
    Ok(())
}
