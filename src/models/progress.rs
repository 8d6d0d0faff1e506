use serde::{Deserialize, Serialize};

/// Per-month acquisition ledger. Sole writer is the acquisition engine;
/// the verified flags are the operator's contract for deciding re-runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonthProgress {
    pub year: i64,
    pub month: i64,

    // Phase 1
    pub expected_links: i64,
    pub collected_links: i64,
    pub links_verified: bool,

    // Phase 2
    pub scraped_details: i64,
    pub details_verified: bool,

    pub error: Option<String>,
}

impl MonthProgress {
    pub fn new(year: i64, month: i64) -> Self {
        Self {
            year,
            month,
            ..Default::default()
        }
    }

    /// "YYYY-MM"
    pub fn month_str(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }

    pub fn fully_complete(&self) -> bool {
        self.links_verified && self.details_verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_str() {
        assert_eq!(MonthProgress::new(2013, 1).month_str(), "2013-01");
        assert_eq!(MonthProgress::new(2024, 11).month_str(), "2024-11");
    }

    #[test]
    fn test_fully_complete() {
        let mut p = MonthProgress::new(2013, 1);
        assert!(!p.fully_complete());
        p.links_verified = true;
        assert!(!p.fully_complete());
        p.details_verified = true;
        assert!(p.fully_complete());
    }
}
