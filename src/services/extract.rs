//! Detail-page field extraction.
//!
//! The registry renders each record as label/value pairs inside table
//! cells, with labels in `<strong>` tags. Extraction is label-anchored:
//! find the label element, read the enclosing cell, strip the label
//! prefix. Labels vary slightly between record vintages (plural vs
//! singular, a stray space before the colon), so each field carries an
//! ordered list of candidate labels.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use crate::models::cola::ColaRecord;

/// Parse one record's detail page into a [`ColaRecord`].
pub fn parse_record(ttb_id: &str, html: &str) -> ColaRecord {
    let document = Html::parse_document(html);

    let mut record = ColaRecord {
        ttb_id: ttb_id.to_string(),
        status: extract_field(&document, &["Status:"]),
        vendor_code: extract_field(&document, &["Vendor Code:"]),
        serial_number: extract_field(&document, &["Serial #:"]),
        class_type_code: extract_field(&document, &["Class/Type Code:"]),
        origin_code: extract_field(&document, &["Origin Code:"]),
        type_of_application: extract_field(&document, &["Type of Application:"]),
        brand_name: extract_field(&document, &["Brand Name:"]),
        fanciful_name: extract_field(&document, &["Fanciful Name:"]),
        for_sale_in: extract_field(&document, &["For Sale In:"]),
        total_bottle_capacity: extract_field(&document, &["Total Bottle Capacity:"]),
        // The registry renders this label with a space before the colon.
        formula: extract_field(&document, &["Formula :", "Formula:"]),
        approval_date: extract_field(&document, &["Approval Date:"]),
        qualifications: extract_field(&document, &["Qualifications:"]),
        grape_varietal: extract_field(&document, &["Grape Varietal(s):", "Grape Varietal:"]),
        wine_vintage: extract_field(&document, &["Vintage Date:", "Wine Vintage:"]),
        appellation: extract_field(&document, &["Appellation:"]),
        alcohol_content: extract_field(&document, &["Alcohol Content:"]),
        ph_level: extract_field(&document, &["pH Level:"]),
        ..Default::default()
    };

    let company = extract_company_details(&document);
    record.plant_registry = company.plant_registry;
    record.company_name = company.company_name;
    record.street = company.street;
    record.state = company.state;
    record.contact_person = company.contact_person;
    record.phone_number = company.phone_number;

    record.derive_date_parts();
    record.category = record
        .class_type_code
        .as_deref()
        .map(|code| category_for_class_code(code).to_string());

    record
}

/// Extract a labelled value, trying each candidate label in order.
pub fn extract_field(document: &Html, labels: &[&str]) -> Option<String> {
    for label in labels {
        if let Some(value) = extract_single_label(document, label) {
            return Some(value);
        }
    }
    None
}

fn extract_single_label(document: &Html, label: &str) -> Option<String> {
    let strong_sel = Selector::parse("strong").expect("valid selector");
    let label_lower = label.trim_end_matches(':').trim().to_lowercase();

    // Exact containment first, then case-insensitive.
    let mut found = None;
    for strong in document.select(&strong_sel) {
        let text: String = strong.text().collect();
        if text.contains(label) {
            found = Some(strong);
            break;
        }
    }
    if found.is_none() {
        for strong in document.select(&strong_sel) {
            let text: String = strong.text().collect::<String>().to_lowercase();
            if text.contains(&label_lower) {
                found = Some(strong);
                break;
            }
        }
    }

    let strong = found?;
    let cell = parent_cell(strong)?;
    let full_text = cell_text(cell);
    let stripped = strip_label_prefix(&full_text, label);
    let value = stripped.trim_start_matches(':').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parent_cell(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.ancestors().find_map(|node| {
        ElementRef::wrap(node).filter(|el| el.value().name() == "td")
    })
}

/// Collect a cell's text, collapsing internal whitespace.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove the leading label (with or without its colon, in any case) from
/// the cell text.
fn strip_label_prefix<'a>(text: &'a str, label: &str) -> &'a str {
    let trimmed = text.trim();
    for candidate in [label, label.trim_end_matches(':')] {
        let candidate = candidate.trim();
        if trimmed.len() >= candidate.len()
            && trimmed.is_char_boundary(candidate.len())
            && trimmed[..candidate.len()].eq_ignore_ascii_case(candidate)
        {
            return trimmed[candidate.len()..].trim();
        }
    }
    trimmed
}

#[derive(Debug, Default)]
struct CompanyDetails {
    plant_registry: Option<String>,
    company_name: Option<String>,
    street: Option<String>,
    state: Option<String>,
    contact_person: Option<String>,
    phone_number: Option<String>,
}

/// The applicant block is the second `div.box`: a fixed-position table
/// (rows 2-5 hold plant registry, company name, street, state) followed by
/// a labelled contact section.
fn extract_company_details(document: &Html) -> CompanyDetails {
    let box_sel = Selector::parse("div.box").expect("valid selector");
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let td_sel = Selector::parse("td").expect("valid selector");

    let mut details = CompanyDetails::default();
    let Some(company_box) = document.select(&box_sel).nth(1) else {
        return details;
    };

    let rows: Vec<_> = company_box.select(&tr_sel).collect();
    if rows.len() > 5 {
        let row_value = |idx: usize| -> Option<String> {
            let text = cell_text(rows[idx].select(&td_sel).next()?);
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        };
        details.plant_registry = row_value(2);
        details.company_name = row_value(3);
        details.street = row_value(4);
        details.state = row_value(5);
    }

    for (i, row) in rows.iter().enumerate() {
        let text: String = row.text().collect();
        if !text.contains("Contact Information:") {
            continue;
        }
        if let Some(person_row) = rows.get(i + 1) {
            if let Some(td) = person_row.select(&td_sel).next() {
                let person = cell_text(td);
                if !person.is_empty() {
                    details.contact_person = Some(person);
                }
            }
        }
        if let Some(phone_row) = rows.get(i + 2) {
            if let Some(td) = phone_row.select(&td_sel).next() {
                let phone_cell = cell_text(td);
                let phone = phone_prefix_regex().replace(&phone_cell, "");
                let phone = phone.trim();
                if !phone.is_empty() {
                    details.phone_number = Some(phone.to_string());
                }
            }
        }
        break;
    }

    details
}

fn phone_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Phone Number:\s*").expect("valid regex"))
}

/// Broad product family from the class/type code's leading digit: the
/// registry assigns 1xx to whiskies, 2xx gin, 3xx vodka, 4xx rum, 5xx
/// brandy, 6xx cordials, 7xx cocktails, 8x wine, 9xx malt beverages.
pub fn category_for_class_code(code: &str) -> &'static str {
    match code.trim().chars().next() {
        Some('1') => "Whiskey",
        Some('2') => "Gin",
        Some('3') => "Vodka",
        Some('4') => "Rum",
        Some('5') => "Brandy",
        Some('6') => "Cordials",
        Some('7') => "Cocktails",
        Some('8') => "Wine",
        Some('9') => "Beer",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_HTML: &str = r#"
    <html><body>
    <div class="box">
      <table>
        <tr><td><strong>TTB ID:</strong> 13001001000001</td></tr>
        <tr><td><strong>Status:</strong> APPROVED</td></tr>
        <tr><td><strong>Vendor Code:</strong> 12345</td></tr>
        <tr><td><strong>Serial #:</strong> 130001</td></tr>
        <tr><td><strong>Class/Type Code:</strong> 170</td></tr>
        <tr><td><strong>Origin Code:</strong> 06</td></tr>
        <tr><td><strong>Brand Name:</strong> OLD TOM</td></tr>
        <tr><td><strong>Fanciful Name:</strong> Barrel Strength</td></tr>
        <tr><td><strong>Type of Application:</strong> CERTIFICATE OF LABEL APPROVAL</td></tr>
        <tr><td><strong>For Sale In:</strong> ALL STATES</td></tr>
        <tr><td><strong>Total Bottle Capacity:</strong> 750 ml</td></tr>
        <tr><td><strong>Formula :</strong> F-2013-01</td></tr>
        <tr><td><strong>Approval Date:</strong> 01/15/2013</td></tr>
        <tr><td><strong>Qualifications:</strong> None</td></tr>
        <tr><td><strong>Grape Varietal:</strong> N/A GRAPE</td></tr>
        <tr><td><strong>Alcohol Content:</strong> 45%</td></tr>
      </table>
    </div>
    <div class="box">
      <table>
        <tr><td>APPLICANT INFORMATION</td></tr>
        <tr><td>header</td></tr>
        <tr><td>DSP-KY-123</td></tr>
        <tr><td>ACME DISTILLING LLC</td></tr>
        <tr><td>100 MAIN ST</td></tr>
        <tr><td>LOUISVILLE, KY 40202</td></tr>
        <tr><td><strong>Contact Information:</strong></td></tr>
        <tr><td>JANE
            DOE</td></tr>
        <tr><td>Phone Number: (502) 555-0100</td></tr>
      </table>
    </div>
    </body></html>
    "#;

    #[test]
    fn test_parse_record_core_fields() {
        let record = parse_record("13001001000001", DETAIL_HTML);
        assert_eq!(record.status.as_deref(), Some("APPROVED"));
        assert_eq!(record.serial_number.as_deref(), Some("130001"));
        assert_eq!(record.class_type_code.as_deref(), Some("170"));
        assert_eq!(record.brand_name.as_deref(), Some("OLD TOM"));
        assert_eq!(record.fanciful_name.as_deref(), Some("Barrel Strength"));
        assert_eq!(record.formula.as_deref(), Some("F-2013-01"));
        assert_eq!(record.approval_date.as_deref(), Some("01/15/2013"));
        assert_eq!(record.alcohol_content.as_deref(), Some("45%"));
    }

    #[test]
    fn test_parse_record_label_fallback() {
        // Page uses the singular "Grape Varietal:" spelling.
        let record = parse_record("13001001000001", DETAIL_HTML);
        assert_eq!(record.grape_varietal.as_deref(), Some("N/A GRAPE"));
    }

    #[test]
    fn test_parse_record_company_block() {
        let record = parse_record("13001001000001", DETAIL_HTML);
        assert_eq!(record.plant_registry.as_deref(), Some("DSP-KY-123"));
        assert_eq!(record.company_name.as_deref(), Some("ACME DISTILLING LLC"));
        assert_eq!(record.street.as_deref(), Some("100 MAIN ST"));
        assert_eq!(record.state.as_deref(), Some("LOUISVILLE, KY 40202"));
        assert_eq!(record.contact_person.as_deref(), Some("JANE DOE"));
        assert_eq!(record.phone_number.as_deref(), Some("(502) 555-0100"));
    }

    #[test]
    fn test_parse_record_date_and_category() {
        let record = parse_record("13001001000001", DETAIL_HTML);
        assert_eq!(record.year, Some(2013));
        assert_eq!(record.month, Some(1));
        assert_eq!(record.day, Some(15));
        assert_eq!(record.category.as_deref(), Some("Whiskey"));
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let record = parse_record("13001001000001", "<html><body></body></html>");
        assert_eq!(record.brand_name, None);
        assert_eq!(record.company_name, None);
        assert_eq!(record.year, None);
        assert_eq!(record.category, None);
    }

    #[test]
    fn test_strip_label_prefix_case_insensitive() {
        assert_eq!(
            strip_label_prefix("BRAND NAME: OLD TOM", "Brand Name:"),
            "OLD TOM"
        );
        assert_eq!(strip_label_prefix("Brand Name OLD TOM", "Brand Name:"), "OLD TOM");
    }

    #[test]
    fn test_category_for_class_code() {
        assert_eq!(category_for_class_code("170"), "Whiskey");
        assert_eq!(category_for_class_code("345"), "Vodka");
        assert_eq!(category_for_class_code("80"), "Wine");
        assert_eq!(category_for_class_code("901"), "Beer");
        assert_eq!(category_for_class_code(""), "Other");
        assert_eq!(category_for_class_code("X"), "Other");
    }
}
