pub mod controller;
pub mod curation;
pub mod generation;
pub mod intake;
pub mod property;

pub use controller::{Issued, WizardController, WizardView};
pub use curation::{ClickOutcome, SelectionMode};
pub use property::PropertyDraft;

use property::FieldError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The four wizard steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Intake,
    Curation,
    Form,
    Generation,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::Intake,
        StepKind::Curation,
        StepKind::Form,
        StepKind::Generation,
    ];

    pub fn number(self) -> u8 {
        match self {
            StepKind::Intake => 1,
            StepKind::Curation => 2,
            StepKind::Form => 3,
            StepKind::Generation => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StepKind::Intake => "Scrape Listing",
            StepKind::Curation => "Select Images",
            StepKind::Form => "Property Details",
            StepKind::Generation => "Generate Post",
        }
    }

    pub fn previous(self) -> Option<StepKind> {
        match self {
            StepKind::Intake => None,
            StepKind::Curation => Some(StepKind::Intake),
            StepKind::Form => Some(StepKind::Curation),
            StepKind::Generation => Some(StepKind::Form),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            StepKind::Intake => "intake",
            StepKind::Curation => "curation",
            StepKind::Form => "form",
            StepKind::Generation => "generation",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlates an issued collaborator request with its response. Tokens only
/// ever increase for the lifetime of a controller, resets included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestToken(u64);

impl RequestToken {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Whether a collaborator response was applied or ignored as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Stale,
}

#[derive(Debug, Error)]
#[error("step `{step}` rejected: {message}")]
pub struct WizardError {
    step: StepKind,
    message: String,
    kind: WizardErrorKind,
    fields: Vec<FieldError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardErrorKind {
    InvalidInput,
    Validation,
    InvalidTransition,
}

impl WizardError {
    pub fn invalid_input(step: StepKind, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            kind: WizardErrorKind::InvalidInput,
            fields: Vec::new(),
        }
    }

    pub fn validation(fields: Vec<FieldError>) -> Self {
        Self {
            step: StepKind::Form,
            message: format!("{} field(s) need attention", fields.len()),
            kind: WizardErrorKind::Validation,
            fields,
        }
    }

    pub fn invalid_transition(step: StepKind, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            kind: WizardErrorKind::InvalidTransition,
            fields: Vec::new(),
        }
    }

    pub fn step(&self) -> StepKind {
        self.step
    }

    pub fn kind(&self) -> WizardErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.fields
    }
}
