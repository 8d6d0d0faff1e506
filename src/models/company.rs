use serde::{Deserialize, Serialize};

/// Canonical company entity in the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub canonical_name: String,
    pub slug: String,
    pub total_filings: i64,
}

/// One verbatim spelling of a company name as seen on a record.
/// Stored with original case; all matching is upper-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyAlias {
    pub raw_name: String,
    pub company_id: i64,
}

/// URL slug for a brand name. `slug` is unique in the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandSlug {
    pub slug: String,
    pub brand_name: String,
    pub filing_count: i64,
}
