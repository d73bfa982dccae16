use crate::wizard::property::{FieldError, PropertyRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::fmt;

/// Opaque reference to one candidate image, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeRequest {
    pub listing_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeResponse {
    pub session_id: String,
    pub images: Vec<String>,
    #[serde(default)]
    pub total_found: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub session_id: String,
    pub hero_image_url: ImageRef,
    pub detail_images: Vec<ImageRef>,
    pub property_info: PropertyRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub image_base64: String,
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Failure payload returned by the collaborators. `detail` is either a plain
/// message or a list of validation entries carrying a `msg` field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollaboratorError {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl CollaboratorError {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::String(text) => Some(text.clone()).filter(|s| !s.trim().is_empty()),
            Value::Array(entries) => {
                let joined = entries
                    .iter()
                    .filter_map(|entry| match entry {
                        Value::String(text) => Some(text.clone()),
                        other => other.get("msg").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                Some(joined).filter(|s| !s.is_empty())
            }
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: Option<String>,
    pub fields: Option<Vec<FieldError>>,
}
