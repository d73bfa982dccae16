mod collaborator;
mod config;
mod http;
mod metrics;
mod models;
mod sessions;
mod wizard;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use config::{AppConfig, METRICS_KEY, OPENAPI_KEY};
use eyre::WrapErr;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ImageRef};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sessions::{Dispatched, RegistryError, SessionView, WizardRegistry};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;
use wizard::{ClickOutcome, PropertyDraft, SelectionMode, WizardErrorKind};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "realtypost.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let config = AppConfig::from_env();
    init_tracing();

    let service = collaborator::from_config(&config);
    info!(
        target = "realtypost.api",
        collaborator = service.name(),
        wizard_ttl_secs = config.wizard_ttl.as_secs(),
        "content collaborator selected"
    );
    let registry = WizardRegistry::new(service, config.wizard_ttl);
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("installing prometheus recorder")?;
    let state = AppState::new(registry, Some(prometheus_handle));
    let app = router(state, config.request_max_bytes);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "realtypost.api", "listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    registry: WizardRegistry,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    fn new(registry: WizardRegistry, prometheus_handle: Option<PrometheusHandle>) -> Self {
        let openapi = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
            .unwrap_or_else(|_| json!({"openapi": "3.0.3"}));
        Self {
            registry,
            openapi: Arc::new(openapi),
            prometheus_handle,
        }
    }
}

fn router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let wizards = Router::new()
        .route("/", post(create_wizard))
        .route("/{id}", get(get_wizard).delete(delete_wizard))
        .route("/{id}/listing", post(submit_listing))
        .route("/{id}/curation/mode", put(set_mode))
        .route("/{id}/curation/click", post(click_image))
        .route("/{id}/curation/continue", post(continue_to_form))
        .route("/{id}/property", post(submit_property))
        .route("/{id}/generation/retry", post(retry_generation))
        .route("/{id}/back", post(go_back))
        .route("/{id}/reset", post(reset_wizard));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/wizards", wizards)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Reports the collaborator in use and how many wizards are live.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "realtypost",
        "collaborator": state.registry.service_name(),
        "active_wizards": state.registry.len().await,
    }))
}

fn presented_key<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn openapi_json(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(key) = OPENAPI_KEY.as_deref()
        && presented_key(&headers, "X-Docs-Key") != key
    {
        return AppError::Unauthorized("docs").into_response();
    }
    Json((*state.openapi).clone()).into_response()
}

async fn swagger_ui() -> impl IntoResponse {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>RealtyPost API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    ([("Content-Type", "text/html; charset=utf-8")], html)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = METRICS_KEY.as_deref()
        && presented_key(&headers, "X-Metrics-Key") != secret
    {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let body = state
        .prometheus_handle
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Start a wizard at the listing step.
///
/// - Method: `POST`
/// - Path: `/wizards`
/// - Response: `201` with the wizard snapshot
async fn create_wizard(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    crate::metrics::inc_requests("/wizards");
    (StatusCode::CREATED, Json(state.registry.create().await))
}

async fn get_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.registry.view(id).await?))
}

async fn delete_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/wizards/{id}");
    state.registry.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ListingBody {
    listing_url: String,
}

/// Scrape a listing and move on to image curation.
///
/// - Method: `POST`
/// - Path: `/wizards/{id}/listing`
/// - Body: `{ "listing_url": "https://<name>.aryeo.com/..." }`
///
/// An unusable URL is a `400`. Collaborator failures are reported inside the
/// returned snapshot, which stays on the listing step.
async fn submit_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ListingBody>,
) -> Result<Json<SessionView>, AppError> {
    crate::metrics::inc_requests("/wizards/{id}/listing");
    Ok(Json(
        state.registry.submit_listing(id, &body.listing_url).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ModeBody {
    mode: SelectionMode,
}

async fn set_mode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ModeBody>,
) -> Result<Json<SessionView>, AppError> {
    crate::metrics::inc_requests("/wizards/{id}/curation/mode");
    Ok(Json(state.registry.set_mode(id, body.mode).await?))
}

#[derive(Debug, Deserialize)]
struct ClickBody {
    image: ImageRef,
}

#[derive(Debug, Serialize)]
struct ClickResponse {
    click: ClickOutcome,
    wizard: SessionView,
}

async fn click_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ClickBody>,
) -> Result<Json<ClickResponse>, AppError> {
    crate::metrics::inc_requests("/wizards/{id}/curation/click");
    let (click, wizard) = state.registry.click_image(id, &body.image).await?;
    Ok(Json(ClickResponse { click, wizard }))
}

async fn continue_to_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    crate::metrics::inc_requests("/wizards/{id}/curation/continue");
    Ok(Json(state.registry.continue_to_form(id).await?))
}

/// Validate the property form and start generation.
///
/// - Method: `POST`
/// - Path: `/wizards/{id}/property`
/// - Body: `PropertyDraft` (all fields as typed strings)
/// - Response: `202` with the snapshot; poll `GET /wizards/{id}` for the result
///
/// Field problems come back as `422` with a `fields` list.
async fn submit_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<PropertyDraft>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    crate::metrics::inc_requests("/wizards/{id}/property");
    let Dispatched { view, .. } = state.registry.submit_property(id, draft).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

async fn retry_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    crate::metrics::inc_requests("/wizards/{id}/generation/retry");
    let Dispatched { view, .. } = state.registry.retry_generation(id).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

async fn go_back(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    crate::metrics::inc_requests("/wizards/{id}/back");
    Ok(Json(state.registry.go_back(id).await?))
}

async fn reset_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    crate::metrics::inc_requests("/wizards/{id}/reset");
    Ok(Json(state.registry.reset(id).await?))
}

#[derive(Debug)]
enum AppError {
    Registry(RegistryError),
    Unauthorized(&'static str),
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::Registry(RegistryError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: "wizard".into(),
                    detail: Some(format!("wizard {id} not found")),
                    fields: None,
                },
            ),
            AppError::Registry(RegistryError::Wizard(err)) => {
                let status = match err.kind() {
                    WizardErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    WizardErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    WizardErrorKind::InvalidTransition => StatusCode::CONFLICT,
                };
                let fields = Some(err.fields().to_vec()).filter(|f| !f.is_empty());
                (
                    status,
                    ApiError {
                        error: err.step().to_string(),
                        detail: Some(err.detail().to_string()),
                        fields,
                    },
                )
            }
            AppError::Unauthorized(area) => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: area.into(),
                    detail: Some("unauthorized".into()),
                    fields: None,
                },
            ),
        };
        if status.is_server_error() {
            error!(target = "realtypost.api", status = status.as_u16(), "request failed");
        }
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use collaborator::DemoContentService;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const LISTING: &str = "https://example.aryeo.com/listings/harbor-view";

    fn app() -> Router {
        let registry = WizardRegistry::new(
            Arc::new(DemoContentService::new()),
            Duration::from_secs(60),
        );
        router(AppState::new(registry, None), 64 * 1024)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router) -> String {
        let (status, body) = call(app, "POST", "/wizards", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    fn property() -> Value {
        json!({
            "price": "$450,000",
            "bedrooms": "3",
            "bathrooms": "2",
            "square_feet": "1800",
            "address": "1 Elm St",
            "city": "Austin",
            "state": "tx",
            "zip_code": "73301",
            "property_type": "Condo"
        })
    }

    #[tokio::test]
    async fn health_reports_collaborator() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collaborator"], "demo");
        assert_eq!(body["active_wizards"], 0);
    }

    #[tokio::test]
    async fn new_wizard_starts_at_listing_step() {
        let app = app();
        let id = create(&app).await;
        let (status, body) = call(&app, "GET", &format!("/wizards/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_step"], 1);
        assert_eq!(body["step_label"], "Scrape Listing");
        assert_eq!(body["step"]["kind"], "intake");
        assert_eq!(body["progress"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unknown_wizard_is_404() {
        let app = app();
        let uri = format!("/wizards/{}", Uuid::new_v4());
        let (status, body) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "wizard");
    }

    #[tokio::test]
    async fn foreign_listing_url_is_400() {
        let app = app();
        let id = create(&app).await;
        let (status, body) = call(
            &app,
            "POST",
            &format!("/wizards/{id}/listing"),
            Some(json!({"listing_url": "https://zillow.com/homes/1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "intake");
        assert_eq!(body["detail"], "URL must be from aryeo.com domain");
    }

    #[tokio::test]
    async fn continue_without_selection_is_409() {
        let app = app();
        let id = create(&app).await;
        call(
            &app,
            "POST",
            &format!("/wizards/{id}/listing"),
            Some(json!({"listing_url": LISTING})),
        )
        .await;
        let (status, body) =
            call(&app, "POST", &format!("/wizards/{id}/curation/continue"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "curation");
    }

    #[tokio::test]
    async fn whole_wizard_over_http() {
        let app = app();
        let id = create(&app).await;
        let (status, body) = call(
            &app,
            "POST",
            &format!("/wizards/{id}/listing"),
            Some(json!({"listing_url": LISTING})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_step"], 2);
        let images: Vec<String> = body["images"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();

        let click_uri = format!("/wizards/{id}/curation/click");
        let (_, body) = call(&app, "POST", &click_uri, Some(json!({"image": images[0]}))).await;
        assert_eq!(body["click"]["outcome"], "hero_set");
        let (status, body) = call(
            &app,
            "PUT",
            &format!("/wizards/{id}/curation/mode"),
            Some(json!({"mode": "details"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"]["mode"], "details");
        for (n, image) in images[1..4].iter().enumerate() {
            let (_, body) = call(&app, "POST", &click_uri, Some(json!({"image": image}))).await;
            assert_eq!(body["click"]["outcome"], "detail_added");
            assert_eq!(body["click"]["position"], n + 1);
        }
        let (_, body) = call(&app, "POST", &click_uri, Some(json!({"image": images[4]}))).await;
        assert_eq!(body["click"]["outcome"], "cap_reached");

        let (status, body) =
            call(&app, "POST", &format!("/wizards/{id}/curation/continue"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_step"], 3);

        let mut bad = property();
        bad["square_feet"] = json!("12");
        let property_uri = format!("/wizards/{id}/property");
        let (status, body) = call(&app, "POST", &property_uri, Some(bad)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "square_feet");

        let (status, body) = call(&app, "POST", &property_uri, Some(property())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["current_step"], 4);
        assert_eq!(body["property"]["state"], "TX");

        let mut finished = Value::Null;
        for _ in 0..50 {
            let (_, body) = call(&app, "GET", &format!("/wizards/{id}"), None).await;
            if body["step"]["status"]["state"] != "loading" {
                finished = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(finished["step"]["status"]["state"], "success");
        let caption = finished["step"]["status"]["artifact"]["caption"]
            .as_str()
            .unwrap();
        assert!(caption.contains("This stunning condo offers"));

        let (status, _) =
            call(&app, "POST", &format!("/wizards/{id}/generation/retry"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "POST", &format!("/wizards/{id}/back"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_step"], 3);
        assert_eq!(body["step"]["draft"]["city"], "Austin");

        let (status, body) = call(&app, "POST", &format!("/wizards/{id}/reset"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_step"], 1);
        assert!(body.get("session_id").is_none());

        let (status, _) = call(&app, "DELETE", &format!("/wizards/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = app();
        let (status, body) = call(&app, "GET", "/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/wizards"].is_object());
    }
}
