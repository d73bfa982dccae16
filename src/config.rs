use once_cell::sync::Lazy;
use std::{env, time::Duration};

/// Shared secret for `/metrics`. Unset leaves the endpoint open.
pub static METRICS_KEY: Lazy<Option<String>> = Lazy::new(|| non_empty_var("METRICS_KEY"));

/// Shared secret for `/openapi.json`. Unset leaves the document open.
pub static OPENAPI_KEY: Lazy<Option<String>> = Lazy::new(|| non_empty_var("OPENAPI_KEY"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(120),
            connect: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Base URL of the scrape/generate collaborator. `None` selects the
    /// offline demo collaborator.
    pub content_service_url: Option<String>,
    pub timeouts: Timeouts,
    pub wizard_ttl: Duration,
    pub request_max_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            content_service_url: None,
            timeouts: Timeouts::default(),
            wizard_ttl: Duration::from_secs(2 * 60 * 60),
            request_max_bytes: 256 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            content_service_url: non_empty_var("CONTENT_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            timeouts: Timeouts {
                request: parsed_var("HTTP_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeouts.request),
                connect: parsed_var("HTTP_CONNECT_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeouts.connect),
            },
            wizard_ttl: parsed_var("WIZARD_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.wizard_ttl),
            request_max_bytes: parsed_var::<usize>("REQUEST_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.request_max_bytes),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_var(key).and_then(|v| v.parse::<T>().ok())
}
