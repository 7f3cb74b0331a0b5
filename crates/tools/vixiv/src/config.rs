use crate::types::{Result, VixivError};
use std::env;
use std::time::Duration;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "VOXELIZE_API_KEY";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "VOXELIZE_BASE_URL";

/// Default base URL (local development server)
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/v1";

/// Default timeout for processing requests (10 minutes)
/// Voxelizing large skins at fine sampling resolutions can take several minutes
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for status requests (10 seconds)
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retry attempts for transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Configuration for a [`VoxelizeClient`](crate::VoxelizeClient).
///
/// Fields are private so a configuration cannot change after it is built.
#[derive(Clone)]
pub struct ClientConfig {
    api_key: String,
    base_url: String,
    request_timeout: Duration,
    status_timeout: Duration,
    max_retries: u32,
    base_delay_ms: u64,
}

impl ClientConfig {
    /// Builds a configuration from an explicit key, falling back to
    /// `VOXELIZE_API_KEY` when the key is absent or blank.
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or(VixivError::MissingApiKey)?;

        Ok(Self {
            api_key: api_key.trim().to_string(),
            base_url: normalize_base_url(base_url.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        })
    }

    /// Builds a configuration purely from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url = env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(None, base_url)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_delay_ms = delay_ms;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn status_timeout(&self) -> Duration {
        self.status_timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    /// Full URL for an endpoint relative to the base URL
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("status_timeout", &self.status_timeout)
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .finish()
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
