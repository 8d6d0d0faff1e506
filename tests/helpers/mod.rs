//! Scripted registry stand-in for acquisition tests.
//!
//! Serves a fixed record set the way the live registry does: declared
//! totals per query, results truncated at the 1,000-row cap, paginated
//! link tables, and per-record detail pages.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::NaiveDate;

use bevalc_intel::services::browser::{
    ClassCodeRange, Registry, RegistryError, SearchStart,
};

/// Registry-side truncation cap.
const QUERY_CAP: usize = 1000;

/// Links per results page.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct FakeRecord {
    pub ttb_id: String,
    pub date: NaiveDate,
    pub class_code: String,
    pub brand: String,
    pub fanciful: String,
    pub company: String,
}

impl FakeRecord {
    pub fn new(seq: u64, date: NaiveDate, class_code: &str) -> Self {
        Self {
            ttb_id: format!("{:04}{:010}", date.format("%y%m"), seq),
            date,
            class_code: class_code.to_string(),
            brand: format!("BRAND {}", seq % 7),
            fanciful: format!("Fanciful {}", seq % 3),
            company: format!("COMPANY {}", seq % 5),
        }
    }
}

pub struct FakeRegistry {
    records: Vec<FakeRecord>,
    pending_pages: VecDeque<String>,
    pub search_calls: usize,
    pub details_served: usize,
    /// Detail loads start failing once this many have been served.
    pub fail_details_after: Option<usize>,
}

impl FakeRegistry {
    pub fn new(mut records: Vec<FakeRecord>) -> Self {
        records.sort_by(|a, b| a.ttb_id.cmp(&b.ttb_id));
        Self {
            records,
            pending_pages: VecDeque::new(),
            search_calls: 0,
            details_served: 0,
            fail_details_after: None,
        }
    }

    fn matches(
        record: &FakeRecord,
        from: NaiveDate,
        to: NaiveDate,
        class_range: Option<ClassCodeRange>,
    ) -> bool {
        if record.date < from || record.date > to {
            return false;
        }
        let Some(range) = class_range else {
            return true;
        };
        let digit = record.class_code.chars().next().unwrap_or('0');
        let lo = range.from.chars().next().unwrap_or('0');
        let hi = range.to.chars().next().unwrap_or('9');
        digit >= lo && digit <= hi
    }

    fn result_page(total: usize, chunk: &[&FakeRecord]) -> String {
        let mut rows = String::new();
        for (i, record) in chunk.iter().enumerate() {
            let class = if i % 2 == 0 { "lt" } else { "dk" };
            rows.push_str(&format!(
                "<tr class=\"{class}\"><td><a href=\"viewColaDetails.do?action=publicDisplaySearchBasic&ttbid={id}\">{id}</a></td></tr>\n",
                id = record.ttb_id
            ));
        }
        format!(
            "<html><body>Total Matching Records: {total}<table>{rows}</table></body></html>"
        )
    }

    fn detail_page(record: &FakeRecord) -> String {
        format!(
            r#"<html><body>
            <div class="box"><table>
              <tr><td><strong>Status:</strong> APPROVED</td></tr>
              <tr><td><strong>Serial #:</strong> {serial}</td></tr>
              <tr><td><strong>Class/Type Code:</strong> {class}</td></tr>
              <tr><td><strong>Brand Name:</strong> {brand}</td></tr>
              <tr><td><strong>Fanciful Name:</strong> {fanciful}</td></tr>
              <tr><td><strong>Approval Date:</strong> {date}</td></tr>
            </table></div>
            <div class="box"><table>
              <tr><td>APPLICANT</td></tr>
              <tr><td>header</td></tr>
              <tr><td>PLANT-1</td></tr>
              <tr><td>{company}</td></tr>
              <tr><td>1 MAIN ST</td></tr>
              <tr><td>PORTLAND, OR</td></tr>
            </table></div>
            </body></html>"#,
            serial = &record.ttb_id[4..],
            class = record.class_code,
            brand = record.brand,
            fanciful = record.fanciful,
            date = record.date.format("%m/%d/%Y"),
            company = record.company,
        )
    }

    fn find(&self, ttb_id: &str) -> Option<&FakeRecord> {
        self.records.iter().find(|r| r.ttb_id == ttb_id)
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn ensure_ready(&mut self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn submit_search(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        class_range: Option<ClassCodeRange>,
    ) -> Result<SearchStart, RegistryError> {
        self.search_calls += 1;
        self.pending_pages.clear();

        let matching: Vec<&FakeRecord> = self
            .records
            .iter()
            .filter(|r| Self::matches(r, date_from, date_to, class_range))
            .collect();
        let total = matching.len();

        if total == 0 {
            return Ok(SearchStart {
                total: 0,
                first_page: "<html><body>No records were found.</body></html>".to_string(),
            });
        }

        // The registry serves at most QUERY_CAP rows regardless of total.
        let served = &matching[..total.min(QUERY_CAP)];
        let mut pages: Vec<String> = served
            .chunks(PAGE_SIZE)
            .map(|chunk| Self::result_page(total, chunk))
            .collect();
        let first_page = pages.remove(0);
        self.pending_pages = pages.into();

        Ok(SearchStart {
            total: total as u64,
            first_page,
        })
    }

    async fn next_page(&mut self) -> Result<Option<String>, RegistryError> {
        Ok(self.pending_pages.pop_front())
    }

    async fn load_detail(&mut self, url: &str) -> Result<String, RegistryError> {
        if let Some(limit) = self.fail_details_after {
            if self.details_served >= limit {
                return Err(RegistryError::StructureChanged(
                    "injected detail failure".to_string(),
                ));
            }
        }

        let ttb_id = url
            .rsplit("ttbid=")
            .next()
            .ok_or_else(|| RegistryError::StructureChanged("no ttbid in url".to_string()))?;
        let record = self
            .find(ttb_id)
            .ok_or_else(|| RegistryError::StructureChanged(format!("unknown record {ttb_id}")))?;
        let page = Self::detail_page(record);

        self.details_served += 1;
        Ok(page)
    }
}

/// `count` records spread across the days of a month.
pub fn month_of_records(year: i32, month: u32, count: u64, days: u32) -> Vec<FakeRecord> {
    (0..count)
        .map(|seq| {
            let day = (seq as u32 % days) + 1;
            let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid date");
            let class_digit = (seq % 9) + 1;
            FakeRecord::new(seq, date, &format!("{class_digit}70"))
        })
        .collect()
}
