use super::{Delivery, RequestToken, StepKind, WizardError};
use crate::collaborator::TransportError;
use crate::models::{GenerateRequest, GenerateResponse};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Serialize;

const GENERATE_FALLBACK: &str = "Failed to generate content";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifact {
    pub image_base64: String,
    pub caption: String,
    pub hashtags: Vec<String>,
}

impl TryFrom<GenerateResponse> for GeneratedArtifact {
    type Error = TransportError;

    fn try_from(response: GenerateResponse) -> Result<Self, Self::Error> {
        let image_base64 = response.image_base64.trim().to_string();
        if image_base64.is_empty() {
            return Err(TransportError::InvalidResponse("empty image payload".into()));
        }
        STANDARD
            .decode(&image_base64)
            .map_err(|err| TransportError::InvalidResponse(format!("image payload: {err}")))?;
        Ok(Self {
            image_base64,
            caption: response.caption,
            hashtags: response.hashtags,
        })
    }
}

impl GeneratedArtifact {
    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.image_base64)
    }

    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.image_base64)
    }

    /// Caption plus hashtags, ready to paste into a post.
    pub fn share_text(&self) -> String {
        format!("{}\n\n{}", self.caption, self.hashtags.join(" "))
    }

    pub fn download_name(&self, now: DateTime<Utc>) -> String {
        format!("realty-post-{}.jpg", now.timestamp_millis())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerationState {
    Loading { token: RequestToken },
    Success { artifact: GeneratedArtifact },
    Failed { message: String },
}

/// One generate request and the outcome of its latest attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationLifecycle {
    request: GenerateRequest,
    state: GenerationState,
    attempts: u32,
}

impl GenerationLifecycle {
    pub fn start(request: GenerateRequest, token: RequestToken) -> Self {
        Self {
            request,
            state: GenerationState::Loading { token },
            attempts: 1,
        }
    }

    pub fn request(&self) -> &GenerateRequest {
        &self.request
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn artifact(&self) -> Option<&GeneratedArtifact> {
        match &self.state {
            GenerationState::Success { artifact } => Some(artifact),
            _ => None,
        }
    }

    /// Re-issues the identical request. Only a failed attempt can be retried.
    pub fn retry(&mut self, token: RequestToken) -> Result<GenerateRequest, WizardError> {
        match self.state {
            GenerationState::Failed { .. } => {
                self.state = GenerationState::Loading { token };
                self.attempts += 1;
                Ok(self.request.clone())
            }
            GenerationState::Loading { .. } => Err(WizardError::invalid_transition(
                StepKind::Generation,
                "generation is already in progress",
            )),
            GenerationState::Success { .. } => Err(WizardError::invalid_transition(
                StepKind::Generation,
                "generation already succeeded",
            )),
        }
    }

    pub fn complete(
        &mut self,
        token: RequestToken,
        result: Result<GenerateResponse, TransportError>,
    ) -> Delivery {
        if self.state != (GenerationState::Loading { token }) {
            return Delivery::Stale;
        }
        self.state = match result.and_then(GeneratedArtifact::try_from) {
            Ok(artifact) => GenerationState::Success { artifact },
            Err(err) => GenerationState::Failed {
                message: err.user_message(GENERATE_FALLBACK),
            },
        };
        Delivery::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::WizardErrorKind;
    use crate::wizard::property::PropertyDraft;
    use chrono::TimeZone;

    fn request() -> GenerateRequest {
        let record = PropertyDraft {
            price: "$450,000".into(),
            bedrooms: "3".into(),
            bathrooms: "2".into(),
            square_feet: "1800".into(),
            address: "1 Elm St".into(),
            city: "Austin".into(),
            state: "TX".into(),
            zip_code: "73301".into(),
            ..PropertyDraft::default()
        }
        .validate(2025)
        .unwrap();
        GenerateRequest {
            session_id: "s1".into(),
            hero_image_url: "a.jpg".into(),
            detail_images: vec!["b.jpg".into(), "c.jpg".into(), "d.jpg".into()],
            property_info: record,
        }
    }

    fn response(caption: &str) -> GenerateResponse {
        GenerateResponse {
            image_base64: STANDARD.encode([0xFF, 0xD8, 0xFF, 0xD9]),
            caption: caption.into(),
            hashtags: vec!["#realestate".into(), "#austin".into()],
        }
    }

    #[test]
    fn failure_then_retry_success() {
        let first = RequestToken::first();
        let mut lifecycle = GenerationLifecycle::start(request(), first);
        let delivery = lifecycle.complete(
            first,
            Err(TransportError::rejected(503, "AI service unavailable")),
        );
        assert_eq!(delivery, Delivery::Applied);
        assert_eq!(
            lifecycle.state(),
            &GenerationState::Failed {
                message: "AI service unavailable".into()
            }
        );

        let second = first.next();
        let reissued = lifecycle.retry(second).expect("retry from failed");
        assert_eq!(&reissued, lifecycle.request());
        assert_eq!(lifecycle.attempts(), 2);

        lifecycle.complete(second, Ok(response("Just listed")));
        let artifact = lifecycle.artifact().expect("success");
        assert_eq!(artifact.caption, "Just listed");
        assert!(matches!(lifecycle.state(), GenerationState::Success { .. }));
    }

    #[test]
    fn retry_requires_failed_state() {
        let token = RequestToken::first();
        let mut lifecycle = GenerationLifecycle::start(request(), token);
        let err = lifecycle.retry(token.next()).expect_err("loading");
        assert_eq!(err.kind(), WizardErrorKind::InvalidTransition);
        lifecycle.complete(token, Ok(response("ok")));
        assert!(lifecycle.retry(token.next()).is_err());
        assert_eq!(lifecycle.attempts(), 1);
    }

    #[test]
    fn responses_for_other_tokens_are_stale() {
        let first = RequestToken::first();
        let mut lifecycle = GenerationLifecycle::start(request(), first);
        lifecycle.complete(first, Err(TransportError::Http("timeout".into())));
        let second = first.next();
        lifecycle.retry(second).unwrap();
        assert_eq!(
            lifecycle.complete(first, Ok(response("late"))),
            Delivery::Stale
        );
        assert_eq!(lifecycle.state(), &GenerationState::Loading { token: second });
    }

    #[test]
    fn undecodable_image_is_a_failure() {
        let token = RequestToken::first();
        let mut lifecycle = GenerationLifecycle::start(request(), token);
        let mut bad = response("caption");
        bad.image_base64 = "not base64!!".into();
        lifecycle.complete(token, Ok(bad));
        match lifecycle.state() {
            GenerationState::Failed { message } => {
                assert!(message.starts_with("invalid response: image payload"))
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn artifact_helpers() {
        let artifact = GeneratedArtifact::try_from(response("Just listed")).unwrap();
        assert_eq!(artifact.share_text(), "Just listed\n\n#realestate #austin");
        assert!(artifact.data_uri().starts_with("data:image/jpeg;base64,/9j/"));
        assert_eq!(artifact.image_bytes().unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(artifact.download_name(now), "realty-post-1700000000123.jpg");
    }
}
