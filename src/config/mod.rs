use serde::Deserialize;

/// Settings for an acquisition worker process.
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    /// Directory holding per-worker store files (e.g. "data/w1.db").
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Pause between registry requests, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Registry page load timeout, in seconds.
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,

    /// How long a non-interactive run waits for a CAPTCHA to clear.
    #[serde(default = "default_captcha_timeout_secs")]
    pub captcha_timeout_secs: u64,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_request_delay_ms() -> u64 {
    1500
}

fn default_page_timeout_secs() -> u64 {
    30
}

fn default_captcha_timeout_secs() -> u64 {
    300
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            request_delay_ms: default_request_delay_ms(),
            page_timeout_secs: default_page_timeout_secs(),
            captcha_timeout_secs: default_captcha_timeout_secs(),
        }
    }
}

/// Credentials for the remote D1 database. Required only by operations that
/// touch the remote store; constructed once at startup and passed explicitly
/// to every client that issues HTTP calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Cloudflare account ID
    pub cloudflare_account_id: String,

    /// Cloudflare D1 database ID
    pub cloudflare_d1_database_id: String,

    /// Cloudflare API token with D1 edit access
    pub cloudflare_api_token: String,
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
