use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// First-observation classification of a record.
///
/// Assigned chronologically over the whole corpus: the first filing ever seen
/// from a company is NEW_COMPANY, the first filing of a brand under a known
/// company is NEW_BRAND, the first filing of a (brand, fanciful) pair is
/// NEW_SKU, and everything after that is a REFILE. Records missing company or
/// brand data entirely are LEGACY and never enter the comparison sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    NewCompany,
    NewBrand,
    NewSku,
    Refile,
    Legacy,
}

/// A single COLA record scraped from the registry's detail page.
///
/// `ttb_id` is the registry-assigned 14-digit key and is unique across the
/// entire corpus. All other fields are verbatim registry text; `year`,
/// `month`, `day` are derived from `approval_date` when it matches
/// MM/DD/YYYY and are left unset otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct ColaRecord {
    pub ttb_id: String,

    // Registry classification
    pub status: Option<String>,
    pub vendor_code: Option<String>,
    pub serial_number: Option<String>,
    pub class_type_code: Option<String>,
    pub origin_code: Option<String>,
    pub type_of_application: Option<String>,

    // Descriptive
    pub brand_name: Option<String>,
    pub fanciful_name: Option<String>,
    pub for_sale_in: Option<String>,
    pub total_bottle_capacity: Option<String>,
    pub formula: Option<String>,
    pub qualifications: Option<String>,

    // Wine-specific
    pub grape_varietal: Option<String>,
    pub wine_vintage: Option<String>,
    pub appellation: Option<String>,

    // Other product fields
    pub alcohol_content: Option<String>,
    pub ph_level: Option<String>,

    // Applicant
    pub plant_registry: Option<String>,
    pub company_name: Option<String>,
    pub street: Option<String>,
    pub state: Option<String>,
    pub contact_person: Option<String>,
    pub phone_number: Option<String>,

    // Temporal
    pub approval_date: Option<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,

    // Derived
    pub category: Option<String>,
}

impl ColaRecord {
    /// Derive `year`/`month`/`day` from an MM/DD/YYYY approval date.
    /// Dates in any other shape leave all three unset.
    pub fn derive_date_parts(&mut self) {
        let Some(date) = self.approval_date.as_deref() else {
            return;
        };
        if let Some((y, m, d)) = parse_approval_date(date) {
            self.year = Some(y);
            self.month = Some(m);
            self.day = Some(d);
        }
    }
}

/// Parse an MM/DD/YYYY date string into (year, month, day).
pub fn parse_approval_date(date: &str) -> Option<(i64, i64, i64)> {
    let mut parts = date.trim().split('/');
    let month: i64 = parts.next()?.parse().ok()?;
    let day: i64 = parts.next()?.parse().ok()?;
    let year: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || !(1000..=9999).contains(&year) {
        return None;
    }
    Some((year, month, day))
}
