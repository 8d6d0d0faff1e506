use serde::{Deserialize, Serialize};

/// A detail-page link discovered during Phase 1.
///
/// Deduplicated by `ttb_id`; `scraped` flips to true exactly once, in the
/// same transaction that inserts the scraped record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectedLink {
    pub ttb_id: String,
    pub detail_url: String,
    pub year: i64,
    pub month: i64,
    pub scraped: bool,
}
