//! Clients for the scrape and generate collaborators.
//!
//! The wizard core never talks to these directly; the session registry issues
//! the calls and feeds the results back with their request tokens.

pub mod demo;
pub mod http;

pub use demo::DemoContentService;
pub use http::HttpContentService;

use crate::config::AppConfig;
use crate::models::{GenerateRequest, GenerateResponse, ScrapeRequest, ScrapeResponse};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },
    #[error("request failed: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            detail: Some(detail.into()),
        }
    }

    /// Message shown to the user. Collaborator details are passed through
    /// verbatim; `fallback` covers rejections that carried none.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            TransportError::Rejected {
                detail: Some(detail),
                ..
            } => detail.clone(),
            TransportError::Rejected { detail: None, .. } => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait ContentService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, TransportError>;

    async fn generate(&self, request: &GenerateRequest)
    -> Result<GenerateResponse, TransportError>;

    /// Frees collaborator-side resources held for a scrape session.
    async fn release(&self, session_id: &str) -> Result<(), TransportError>;
}

pub fn from_config(config: &AppConfig) -> Arc<dyn ContentService> {
    match &config.content_service_url {
        Some(base_url) => Arc::new(HttpContentService::new(base_url, config.timeouts)),
        None => Arc::new(DemoContentService::new()),
    }
}
