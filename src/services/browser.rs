//! Registry session driver.
//!
//! Drives the TTB COLA public search UI over a cookie-retaining HTTP
//! session: submits the search form, walks paginated result tables, and
//! loads per-record detail pages. The registry has no API; everything here
//! speaks the HTML the search UI serves, and every page may turn out to be
//! a CAPTCHA instead.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::services::captcha::{detect_captcha, CaptchaPrompt, PromptChoice};

pub const TTB_BASE_URL: &str = "https://ttbonline.gov/colasonline";

/// Detail-page load attempts before a link is left for the next run.
const DETAIL_MAX_RETRIES: u32 = 3;
const DETAIL_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Session restart backoffs: 5 s, 10 s, 15 s.
const SESSION_RESTART_ATTEMPTS: u32 = 3;

/// Non-interactive CAPTCHA poll cadence.
const CAPTCHA_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("HTTP request to registry failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry page structure changed: {0}")]
    StructureChanged(String),

    #[error("CAPTCHA unresolved: {0}")]
    Captcha(String),

    #[error("operator quit at CAPTCHA prompt")]
    Quit,

    #[error("registry session unavailable after restarts: {0}")]
    SessionDead(String),
}

/// Inclusive class/type code range filter for the registry search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCodeRange {
    pub from: &'static str,
    pub to: &'static str,
    pub label: &'static str,
}

/// A submitted search: the registry's declared total plus the first
/// results page.
#[derive(Debug, Clone)]
pub struct SearchStart {
    pub total: u64,
    pub first_page: String,
}

/// The registry as the acquisition engine sees it. The production
/// implementation is [`RegistryBrowser`]; tests drive the engine with a
/// scripted stand-in.
#[async_trait]
pub trait Registry: Send {
    /// Verify the session is healthy, restarting it if needed.
    async fn ensure_ready(&mut self) -> Result<(), RegistryError>;

    /// Fill and submit the search form; leaves the session on the first
    /// results page.
    async fn submit_search(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        class_range: Option<ClassCodeRange>,
    ) -> Result<SearchStart, RegistryError>;

    /// Advance to the next results page; `None` when there is no next-page
    /// anchor.
    async fn next_page(&mut self) -> Result<Option<String>, RegistryError>;

    /// Load one record's detail page.
    async fn load_detail(&mut self, url: &str) -> Result<String, RegistryError>;
}

/// Cookie-session driver for the live registry.
pub struct RegistryBrowser {
    http: reqwest::Client,
    base_url: String,
    prompt: Box<dyn CaptchaPrompt>,
    interactive: bool,
    request_delay: Duration,
    page_timeout: Duration,
    captcha_timeout: Duration,
    current_url: Option<String>,
    current_page: Option<String>,
}

impl RegistryBrowser {
    pub fn new(
        prompt: Box<dyn CaptchaPrompt>,
        interactive: bool,
        request_delay: Duration,
        page_timeout: Duration,
        captcha_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            http: build_client(page_timeout)?,
            base_url: TTB_BASE_URL.to_string(),
            prompt,
            interactive,
            request_delay,
            page_timeout,
            captcha_timeout,
            current_url: None,
            current_page: None,
        })
    }

    fn search_form_url(&self) -> String {
        format!("{}/publicSearchColasBasic.do", self.base_url)
    }

    fn search_submit_url(&self) -> String {
        format!("{}/publicSearchColasBasicProcess.do?action=search", self.base_url)
    }

    async fn delay(&self, multiplier: f64) {
        let millis = (self.request_delay.as_millis() as f64 * multiplier) as u64;
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    async fn get_page(&mut self, url: &str) -> Result<String, RegistryError> {
        let response = self.http.get(url).send().await?;
        let html = response.text().await?;
        self.current_url = Some(url.to_string());
        self.current_page = Some(html.clone());
        Ok(html)
    }

    /// Re-fetch the page we are currently on, refreshing the cached copy.
    async fn refetch_current(&mut self) -> Result<String, RegistryError> {
        let url = self
            .current_url
            .clone()
            .unwrap_or_else(|| self.search_form_url());
        self.get_page(&url).await
    }

    /// Resolve a CAPTCHA on the current page. Returns true when clear and
    /// the caller may continue, false when the operator chose to skip.
    async fn handle_captcha(&mut self) -> Result<bool, RegistryError> {
        let Some(html) = self.current_page.as_deref() else {
            return Ok(true);
        };
        if !detect_captcha(html) {
            return Ok(true);
        }

        if self.interactive {
            loop {
                let choice = self
                    .prompt
                    .prompt("CAPTCHA detected - solve it in the browser, then choose");
                match choice {
                    PromptChoice::Quit => return Err(RegistryError::Quit),
                    PromptChoice::Skip => return Ok(false),
                    PromptChoice::Continue => {
                        let html = self.refetch_current().await?;
                        if !detect_captcha(&html) {
                            info!("CAPTCHA cleared");
                            return Ok(true);
                        }
                        warn!("CAPTCHA still present");
                    }
                }
            }
        } else {
            // Unattended run: poll until the challenge goes away or the
            // timeout expires.
            let deadline = tokio::time::Instant::now() + self.captcha_timeout;
            warn!(
                timeout_secs = self.captcha_timeout.as_secs(),
                "CAPTCHA detected in non-interactive mode, polling"
            );
            while tokio::time::Instant::now() < deadline {
                tokio::time::sleep(CAPTCHA_POLL_INTERVAL).await;
                let html = self.refetch_current().await?;
                if !detect_captcha(&html) {
                    info!("CAPTCHA cleared");
                    return Ok(true);
                }
            }
            Err(RegistryError::Captcha(format!(
                "still present after {} s",
                self.captcha_timeout.as_secs()
            )))
        }
    }

    /// handle_captcha, with "skip" escalated to an error. Used on pages the
    /// engine cannot proceed without (the search form itself).
    async fn require_captcha_clear(&mut self) -> Result<(), RegistryError> {
        if self.handle_captcha().await? {
            Ok(())
        } else {
            Err(RegistryError::Captcha("skipped by operator".to_string()))
        }
    }
}

#[async_trait]
impl Registry for RegistryBrowser {
    async fn ensure_ready(&mut self) -> Result<(), RegistryError> {
        let form_url = self.search_form_url();
        let mut last_error = String::new();
        for attempt in 1..=SESSION_RESTART_ATTEMPTS {
            match self.get_page(&form_url).await {
                Ok(html) => {
                    if detect_captcha(&html) {
                        self.require_captcha_clear().await?;
                    }
                    if has_search_form(self.current_page.as_deref().unwrap_or("")) {
                        return Ok(());
                    }
                    last_error = "search form fields missing".to_string();
                }
                Err(RegistryError::Quit) => return Err(RegistryError::Quit),
                Err(e) => last_error = e.to_string(),
            }

            warn!(attempt, error = %last_error, "registry session unhealthy, restarting");
            self.http = build_client(self.page_timeout)?;
            tokio::time::sleep(Duration::from_secs(5 * u64::from(attempt))).await;
        }
        Err(RegistryError::SessionDead(last_error))
    }

    async fn submit_search(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        class_range: Option<ClassCodeRange>,
    ) -> Result<SearchStart, RegistryError> {
        let form_url = self.search_form_url();
        let html = self.get_page(&form_url).await?;
        self.delay(1.0).await;
        self.require_captcha_clear().await?;

        if !has_search_form(self.current_page.as_deref().unwrap_or(&html)) {
            return Err(RegistryError::StructureChanged(
                "search form fields missing".to_string(),
            ));
        }

        let mut params: Vec<(&str, String)> = vec![
            (
                "searchCriteria.dateCompletedFrom",
                date_from.format("%m/%d/%Y").to_string(),
            ),
            (
                "searchCriteria.dateCompletedTo",
                date_to.format("%m/%d/%Y").to_string(),
            ),
        ];
        if let Some(range) = class_range {
            params.push(("searchCriteria.classTypeFrom", range.from.to_string()));
            params.push(("searchCriteria.classTypeTo", range.to.to_string()));
        }

        let submit_url = self.search_submit_url();
        let response = self.http.post(&submit_url).form(&params).send().await?;
        let html = response.text().await?;
        self.current_url = Some(submit_url);
        self.current_page = Some(html);

        self.delay(1.0).await;
        self.require_captcha_clear().await?;

        let html = self.current_page.clone().unwrap_or_default();
        let total = match parse_total_count(&html) {
            Some(total) => total,
            None if is_no_results_page(&html) => 0,
            None => {
                return Err(RegistryError::StructureChanged(
                    "total-matching-records line not found".to_string(),
                ))
            }
        };

        Ok(SearchStart {
            total,
            first_page: html,
        })
    }

    async fn next_page(&mut self) -> Result<Option<String>, RegistryError> {
        let Some(current) = self.current_page.as_deref() else {
            return Ok(None);
        };
        let Some(href) = find_next_page_href(current) else {
            return Ok(None);
        };

        let url = absolute_url(&self.base_url, &href);
        self.delay(0.5).await;
        let html = self.get_page(&url).await?;

        if detect_captcha(&html) && !self.handle_captcha().await? {
            return Ok(None);
        }

        Ok(self.current_page.clone())
    }

    async fn load_detail(&mut self, url: &str) -> Result<String, RegistryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_page(url).await {
                Ok(html) => {
                    if detect_captcha(&html) && !self.handle_captcha().await? {
                        return Err(RegistryError::Captcha(
                            "skipped by operator".to_string(),
                        ));
                    }
                    return Ok(self.current_page.clone().unwrap_or(html));
                }
                Err(RegistryError::Http(e)) if e.is_timeout() && attempt < DETAIL_MAX_RETRIES => {
                    warn!(attempt, url, "detail page timed out, retrying");
                    tokio::time::sleep(DETAIL_RETRY_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// The registry's TLS chain is routinely broken, hence the invalid-cert
/// acceptance; cookies carry the logical search session across pages.
fn build_client(page_timeout: Duration) -> Result<reqwest::Client, RegistryError> {
    Ok(reqwest::Client::builder()
        .cookie_store(true)
        .danger_accept_invalid_certs(true)
        .user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
        )
        .timeout(page_timeout)
        .gzip(true)
        .build()?)
}

fn ttb_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ttbid=(\d{14})").expect("valid regex"))
}

/// Whether the search form is present on a page. Its absence on the form
/// URL means the registry changed its page structure.
pub fn has_search_form(html: &str) -> bool {
    html.contains("searchCriteria.dateCompletedFrom")
        && html.contains("searchCriteria.dateCompletedTo")
}

/// Extract the declared total-matching-records count. The registry has
/// shipped three different phrasings over the years; they are tried in
/// order.
pub fn parse_total_count(html: &str) -> Option<u64> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"Total Matching Records:\s*([\d,]+)").expect("valid regex"),
            Regex::new(r"of\s+([\d,]+)\s*\(Total").expect("valid regex"),
            Regex::new(r"\d+\s+to\s+\d+\s+of\s+([\d,]+)").expect("valid regex"),
        ]
    });

    for pattern in patterns {
        if let Some(caps) = pattern.captures(html) {
            let digits = caps[1].replace(',', "");
            if let Ok(total) = digits.parse() {
                return Some(total);
            }
        }
    }
    None
}

pub fn is_no_results_page(html: &str) -> bool {
    html.contains("No records were found") || html.contains("No results were found")
}

/// Pull (ttb_id, detail_url) pairs out of a results page. Result rows carry
/// the `lt`/`dk` CSS classes; each row's anchor points at the record's
/// detail view.
pub fn extract_result_links(html: &str, base_url: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("tr.lt, tr.dk").expect("valid selector");
    let a_sel = Selector::parse("a").expect("valid selector");

    let mut links = Vec::new();
    for row in document.select(&row_sel) {
        for anchor in row.select(&a_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !href.contains("viewColaDetails") {
                continue;
            }
            if let Some(caps) = ttb_id_regex().captures(href) {
                links.push((caps[1].to_string(), absolute_url(base_url, href)));
                break;
            }
        }
    }
    links
}

/// Find the href of the next-results-page anchor, if any.
pub fn find_next_page_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let a_sel = Selector::parse("a").expect("valid selector");

    for anchor in document.select(&a_sel) {
        if let Some(href) = anchor.value().attr("href") {
            if href.contains("pgfcn=nextset") {
                return Some(href.to_string());
            }
        }
    }
    // Older result pages label the anchor instead of the href.
    for anchor in document.select(&a_sel) {
        let text: String = anchor.text().collect();
        if text.trim().eq_ignore_ascii_case("next") {
            if let Some(href) = anchor.value().attr("href") {
                return Some(href.to_string());
            }
        }
    }
    None
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}/{}", base_url, href.trim_start_matches('/'))
    }
}
