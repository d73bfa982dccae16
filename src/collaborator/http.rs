use super::{ContentService, TransportError};
use crate::config::Timeouts;
use crate::http::build_client;
use crate::models::{
    CollaboratorError, GenerateRequest, GenerateResponse, ScrapeRequest, ScrapeResponse,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

/// Talks to a remote scrape/generate service over JSON.
pub struct HttpContentService {
    base_url: String,
    http: Client,
}

impl HttpContentService {
    pub fn new(base_url: &str, timeouts: Timeouts) -> Self {
        Self::with_client(base_url, build_client(timeouts))
    }

    pub fn with_client(base_url: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let result = async {
            let response = self
                .http
                .post(format!("{}{path}", self.base_url))
                .json(body)
                .send()
                .await
                .map_err(|err| TransportError::Http(err.to_string()))?;
            let response = reject_failures(response).await?;
            response
                .json::<T>()
                .await
                .map_err(|err| TransportError::InvalidResponse(err.to_string()))
        }
        .await;
        if let Err(err) = &result {
            debug!(target = "realtypost.collaborator", path = path, error = %err, "collaborator call failed");
        }
        result
    }
}

/// Turns a non-2xx response into `Rejected`, keeping whatever `detail` the
/// body carried.
async fn reject_failures(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<CollaboratorError>(&body)
        .ok()
        .and_then(|payload| payload.message());
    Err(TransportError::Rejected {
        status: status.as_u16(),
        detail,
    })
}

#[async_trait]
impl ContentService for HttpContentService {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, TransportError> {
        self.post_json("/scrape", request).await
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError> {
        self.post_json("/generate", request).await
    }

    async fn release(&self, session_id: &str) -> Result<(), TransportError> {
        let url = format!(
            "{}/session/{}",
            self.base_url,
            urlencoding::encode(session_id)
        );
        match self.http.delete(url).send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => Ok(()),
            Ok(response) => reject_failures(response).await.map(|_| ()),
            Err(err) => Err(TransportError::Http(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;
    use crate::wizard::property::PropertyDraft;
    use axum::{
        Json, Router,
        extract::Path,
        http::StatusCode as AxumStatus,
        routing::{delete, post},
    };
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn fake_collaborator() -> Router {
        Router::new()
            .route(
                "/scrape",
                post(|Json(body): Json<Value>| async move {
                    let url = body["listing_url"].as_str().unwrap_or_default().to_string();
                    if url.contains("empty") {
                        return (
                            AxumStatus::NOT_FOUND,
                            Json(json!({"detail": "No images found in listing"})),
                        );
                    }
                    (
                        AxumStatus::OK,
                        Json(json!({
                            "session_id": "session_1_2",
                            "images": ["a.jpg", "b.jpg"],
                            "listing_url": url,
                            "total_found": 2
                        })),
                    )
                }),
            )
            .route(
                "/generate",
                post(|Json(_): Json<Value>| async {
                    (
                        AxumStatus::UNPROCESSABLE_ENTITY,
                        Json(json!({"detail": [{"loc": ["body"], "msg": "field required"}]})),
                    )
                }),
            )
            .route(
                "/session/{id}",
                delete(|Path(id): Path<String>| async move {
                    if id == "a b" {
                        AxumStatus::OK
                    } else {
                        AxumStatus::INTERNAL_SERVER_ERROR
                    }
                }),
            )
    }

    fn generate_request() -> GenerateRequest {
        GenerateRequest {
            session_id: "session_1_2".into(),
            hero_image_url: ImageRef::from("a.jpg"),
            detail_images: vec!["b.jpg".into(), "c.jpg".into(), "d.jpg".into()],
            property_info: PropertyDraft {
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
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn scrape_parses_success_body() {
        let base = serve(fake_collaborator()).await;
        let service = HttpContentService::with_client(&base, Client::new());
        let response = service
            .scrape(&ScrapeRequest {
                listing_url: "https://x.aryeo.com/listings/1".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.session_id, "session_1_2");
        assert_eq!(response.images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(response.total_found, Some(2));
    }

    #[tokio::test]
    async fn scrape_rejection_keeps_detail() {
        let base = serve(fake_collaborator()).await;
        let service = HttpContentService::with_client(&base, Client::new());
        let err = service
            .scrape(&ScrapeRequest {
                listing_url: "https://x.aryeo.com/listings/empty".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::rejected(404, "No images found in listing"));
    }

    #[tokio::test]
    async fn generate_rejection_joins_validation_messages() {
        let base = serve(fake_collaborator()).await;
        let service = HttpContentService::with_client(&base, Client::new());
        let err = service.generate(&generate_request()).await.unwrap_err();
        assert_eq!(err, TransportError::rejected(422, "field required"));
    }

    #[tokio::test]
    async fn release_encodes_session_id() {
        let base = serve(fake_collaborator()).await;
        let service = HttpContentService::with_client(&base, Client::new());
        assert!(service.release("a b").await.is_ok());
        let err = service.release("other").await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                status: 500,
                detail: None
            }
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_http_error() {
        let service = HttpContentService::with_client("http://127.0.0.1:9", Client::new());
        let err = service
            .scrape(&ScrapeRequest {
                listing_url: "https://x.aryeo.com/listings/1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
