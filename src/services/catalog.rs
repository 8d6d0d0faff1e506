//! Company and brand index maintenance in the remote store.
//!
//! Keeps three lookup tables alongside the record corpus: `brand_slugs`
//! (URL slug per brand), `companies` (canonical entities), and
//! `company_aliases` (every verbatim spelling seen, mapped to its
//! company). Aliases are stored with their original case; all matching is
//! upper-cased.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{info, warn};

use crate::models::company::{BrandSlug, Company, CompanyAlias};
use crate::services::d1::{escape_str, D1Client, RemoteError};

/// Alias preload page size; the endpoint chokes on unbounded scans.
const ALIAS_PAGE_SIZE: usize = 10_000;

/// Brand-slug insert batch: values per INSERT OR IGNORE statement.
const SLUG_BATCH_SIZE: usize = 1000;

/// Lowercased alphanumeric-plus-hyphen slug with hyphen runs collapsed.
pub fn make_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_hyphen = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Load the full alias table into memory as `upper(raw_name) -> company_id`.
pub async fn load_alias_map(d1: &D1Client) -> Result<HashMap<String, i64>, RemoteError> {
    info!("loading company alias map");
    let mut map = HashMap::new();
    let mut offset = 0usize;

    loop {
        let rows = d1
            .fetch_rows(&format!(
                "SELECT raw_name, company_id FROM company_aliases \
                 LIMIT {ALIAS_PAGE_SIZE} OFFSET {offset}"
            ))
            .await?;
        let page_len = rows.len();

        for row in rows {
            let raw = row["raw_name"].as_str().unwrap_or_default();
            let company_id = row["company_id"].as_i64().unwrap_or(0);
            if !raw.is_empty() && company_id > 0 {
                map.insert(raw.to_uppercase(), company_id);
            }
        }

        if page_len < ALIAS_PAGE_SIZE {
            break;
        }
        offset += ALIAS_PAGE_SIZE;
    }

    info!(aliases = map.len(), "alias map loaded");
    Ok(map)
}

/// Pick the winning brand name for each slug. Longer names win collisions;
/// ties go to the lexicographically smaller name.
pub fn resolve_slug_winners(brand_names: &[String]) -> Vec<BrandSlug> {
    let mut winners: HashMap<String, &str> = HashMap::new();
    for name in brand_names {
        let slug = make_slug(name);
        if slug.is_empty() {
            continue;
        }
        match winners.entry(slug) {
            Entry::Vacant(entry) => {
                entry.insert(name.as_str());
            }
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                let better = name.len() > current.len()
                    || (name.len() == current.len() && name.as_str() < current);
                if better {
                    entry.insert(name.as_str());
                }
            }
        }
    }

    let mut slugs: Vec<BrandSlug> = winners
        .into_iter()
        .map(|(slug, brand_name)| BrandSlug {
            slug,
            brand_name: brand_name.to_string(),
            filing_count: 1,
        })
        .collect();
    slugs.sort_by(|a, b| a.slug.cmp(&b.slug));
    slugs
}

/// Insert slugs for newly seen brand names. Existing slugs are left
/// untouched (`INSERT OR IGNORE`); returns how many were new.
pub async fn update_brand_slugs(
    d1: &D1Client,
    brand_names: &[String],
) -> Result<i64, RemoteError> {
    let winners = resolve_slug_winners(brand_names);
    if winners.is_empty() {
        return Ok(0);
    }

    let values: Vec<String> = winners
        .iter()
        .map(|entry| {
            format!(
                "({}, {}, {})",
                escape_str(&entry.slug),
                escape_str(&entry.brand_name),
                entry.filing_count
            )
        })
        .collect();

    let mut inserted = 0;
    for chunk in values.chunks(SLUG_BATCH_SIZE) {
        let sql = format!(
            "INSERT OR IGNORE INTO brand_slugs (slug, brand_name, filing_count) VALUES {}",
            chunk.join(",")
        );
        inserted += d1.execute_counting(&sql).await?;
    }

    info!(candidates = values.len(), inserted, "brand slugs updated");
    Ok(inserted)
}

/// Register companies whose raw name has no alias yet: one `companies` row
/// with the registry spelling as canonical, plus the alias row pointing at
/// it. Returns the companies that were added.
pub async fn add_new_companies(
    d1: &D1Client,
    company_names: &[String],
) -> Result<Vec<Company>, RemoteError> {
    let aliases = load_alias_map(d1).await?;

    // Dedupe case variants within the batch itself; first spelling wins.
    let mut fresh: Vec<&str> = Vec::new();
    let mut seen: HashMap<String, ()> = HashMap::new();
    for name in company_names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let upper = name.to_uppercase();
        if aliases.contains_key(&upper) || seen.contains_key(&upper) {
            continue;
        }
        seen.insert(upper, ());
        fresh.push(name);
    }

    if fresh.is_empty() {
        return Ok(Vec::new());
    }

    let mut added = Vec::new();
    for name in fresh {
        let slug = make_slug(name);
        let insert = format!(
            "INSERT INTO companies (canonical_name, slug, total_filings) VALUES ({}, {}, 1)",
            escape_str(name),
            escape_str(&slug),
        );
        let results = d1.execute(&insert).await?;
        let Some(company_id) = results.first().map(|r| r.meta.last_row_id).filter(|id| *id > 0)
        else {
            warn!(company = name, "no row id returned for new company");
            continue;
        };

        let alias = format!(
            "INSERT OR IGNORE INTO company_aliases (raw_name, company_id) VALUES ({}, {})",
            escape_str(name),
            company_id,
        );
        d1.execute(&alias).await?;
        added.push(Company {
            id: company_id,
            canonical_name: name.to_string(),
            slug,
            total_filings: 1,
        });
    }

    info!(added = added.len(), "new companies registered");
    Ok(added)
}

/// Outcome of a duplicate-company sweep.
#[derive(Debug, Default)]
pub struct DuplicateReport {
    pub groups: usize,
    pub aliases_updated: i64,
}

/// Group alias rows by upper-cased raw name, keeping only the groups that
/// span multiple company ids.
pub fn find_duplicate_groups(aliases: &[CompanyAlias]) -> HashMap<String, Vec<CompanyAlias>> {
    let mut groups: HashMap<String, Vec<CompanyAlias>> = HashMap::new();
    for alias in aliases {
        groups
            .entry(alias.raw_name.to_uppercase())
            .or_default()
            .push(alias.clone());
    }
    groups.retain(|_, entries| {
        let mut ids: Vec<i64> = entries.iter().map(|a| a.company_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len() > 1
    });
    groups
}

/// Rewrite case-variant alias groups to their minimum company id. These
/// accumulate when two spellings of one company were first seen in
/// different sync runs.
pub async fn merge_duplicate_companies(
    d1: &D1Client,
    dry_run: bool,
) -> Result<DuplicateReport, RemoteError> {
    let mut aliases: Vec<CompanyAlias> = Vec::new();
    let mut offset = 0usize;
    loop {
        let rows = d1
            .fetch_rows(&format!(
                "SELECT raw_name, company_id FROM company_aliases \
                 ORDER BY company_id LIMIT {ALIAS_PAGE_SIZE} OFFSET {offset}"
            ))
            .await?;
        let page_len = rows.len();
        for row in rows {
            if let (Some(raw), Some(id)) = (row["raw_name"].as_str(), row["company_id"].as_i64())
            {
                aliases.push(CompanyAlias {
                    raw_name: raw.to_string(),
                    company_id: id,
                });
            }
        }
        if page_len < ALIAS_PAGE_SIZE {
            break;
        }
        offset += ALIAS_PAGE_SIZE;
    }

    let groups = find_duplicate_groups(&aliases);
    info!(
        total_aliases = aliases.len(),
        duplicate_groups = groups.len(),
        "duplicate sweep"
    );

    let mut report = DuplicateReport {
        groups: groups.len(),
        aliases_updated: 0,
    };
    if groups.is_empty() {
        return Ok(report);
    }

    let mut statements = Vec::new();
    for entries in groups.values() {
        let canonical = entries.iter().map(|a| a.company_id).min().unwrap_or(0);
        for alias in entries {
            if alias.company_id != canonical {
                statements.push(format!(
                    "UPDATE company_aliases SET company_id = {canonical} \
                     WHERE raw_name = {};",
                    escape_str(&alias.raw_name)
                ));
            }
        }
    }

    if dry_run {
        info!(pending_updates = statements.len(), "dry run, no changes made");
        report.aliases_updated = statements.len() as i64;
        return Ok(report);
    }

    report.aliases_updated = d1.execute_batched(statements).await?;
    info!(aliases_updated = report.aliases_updated, "duplicates merged");
    Ok(report)
}
