use super::{Delivery, RequestToken, StepKind, WizardError};
use crate::collaborator::TransportError;
use crate::models::{ImageRef, ScrapeRequest, ScrapeResponse};
use serde::Serialize;
use std::collections::HashSet;

const LISTING_DOMAIN: &str = "aryeo.com";
const SCRAPE_FALLBACK: &str = "Failed to scrape listing";

/// Checks a listing URL before it is sent to the scrape collaborator and
/// returns the trimmed form.
pub fn validate_listing_url(raw: &str) -> Result<String, WizardError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WizardError::invalid_input(
            StepKind::Intake,
            "listing URL is required",
        ));
    }
    let parsed = reqwest::Url::parse(trimmed).map_err(|_| {
        WizardError::invalid_input(StepKind::Intake, format!("invalid listing URL: {trimmed}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(WizardError::invalid_input(
            StepKind::Intake,
            format!("unsupported_url_scheme: {}", parsed.scheme()),
        ));
    }
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let on_domain = host == LISTING_DOMAIN || host.ends_with(&format!(".{LISTING_DOMAIN}"));
    if !on_domain {
        return Err(WizardError::invalid_input(
            StepKind::Intake,
            "URL must be from aryeo.com domain",
        ));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntakeStatus {
    Idle,
    Loading { token: RequestToken },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeStep {
    pub listing_url: String,
    pub status: IntakeStatus,
}

/// What a scrape response amounted to once checked against the pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Stale,
    Failed(String),
    Ready {
        session_id: String,
        images: Vec<ImageRef>,
    },
}

impl IntakeStep {
    pub fn new(listing_url: impl Into<String>) -> Self {
        Self {
            listing_url: listing_url.into(),
            status: IntakeStatus::Idle,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, IntakeStatus::Loading { .. })
    }

    pub fn begin(&mut self, listing_url: String, token: RequestToken) -> ScrapeRequest {
        self.listing_url = listing_url.clone();
        self.status = IntakeStatus::Loading { token };
        ScrapeRequest { listing_url }
    }

    pub fn accept(
        &mut self,
        token: RequestToken,
        result: Result<ScrapeResponse, TransportError>,
    ) -> IntakeOutcome {
        if self.status != (IntakeStatus::Loading { token }) {
            return IntakeOutcome::Stale;
        }
        let outcome = match result {
            Ok(response) => check_response(response),
            Err(err) => IntakeOutcome::Failed(err.user_message(SCRAPE_FALLBACK)),
        };
        self.status = match &outcome {
            IntakeOutcome::Failed(message) => IntakeStatus::Failed {
                message: message.clone(),
            },
            _ => IntakeStatus::Idle,
        };
        outcome
    }
}

impl IntakeOutcome {
    pub fn delivery(&self) -> Delivery {
        match self {
            IntakeOutcome::Stale => Delivery::Stale,
            _ => Delivery::Applied,
        }
    }
}

fn check_response(response: ScrapeResponse) -> IntakeOutcome {
    let session_id = response.session_id.trim().to_string();
    if session_id.is_empty() {
        return IntakeOutcome::Failed("invalid response: missing session_id".into());
    }
    let images = normalize_images(response.images);
    if images.is_empty() {
        return IntakeOutcome::Failed("No images found in listing".into());
    }
    if let Some(total) = response.total_found
        && total > images.len()
    {
        tracing::debug!(
            target = "realtypost.intake",
            returned = images.len(),
            total_found = total,
            "collaborator truncated image list"
        );
    }
    IntakeOutcome::Ready { session_id, images }
}

/// Trims entries, drops blanks and repeats, keeps first-seen order.
pub fn normalize_images(raw: Vec<String>) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(entry.clone()))
        .map(ImageRef::from)
        .collect()
}
