use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use safewatch_hub::{AlertResult, HubStats, SafetyHub, TrackingSession, User};
use safewatch_shared::constants::{APP_NAME, WS_PATH};
use safewatch_shared::views::{ContactView, PublicUserView};
use safewatch_shared::{Location, UserId};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::publisher::ChannelPublisher;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::ws::ws_upgrade;

pub type Hub = SafetyHub<Arc<ChannelPublisher>>;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub publisher: Arc<ChannelPublisher>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let publisher = Arc::new(ChannelPublisher::new());
        Self {
            hub: Arc::new(SafetyHub::new(publisher.clone())),
            publisher,
            rate_limiter: RateLimiter::from_config(&config),
            config: Arc::new(config),
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/users", post(register_user))
        .route("/api/users/:user_id", get(get_user))
        .route(
            "/api/users/:user_id/contacts",
            get(list_contacts).post(add_contact),
        )
        .route("/api/tracking/start", post(start_tracking))
        .route("/api/tracking/stop", post(stop_tracking))
        .route("/api/alert", post(raise_alert))
        .route("/admin/status", get(admin_status))
        .route(WS_PATH, get(ws_upgrade))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request / response bodies ───

// Missing fields deserialize to empty values so the hub reports them as
// invalid input rather than axum rejecting the body outright.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddContactRequest {
    #[serde(default)]
    contact_user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTrackingRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    location: Option<Location>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest {
    #[serde(default)]
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    location: Option<Location>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    app: &'static str,
    name: String,
    version: &'static str,
    ws_path: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackingResponse {
    success: bool,
    session: TrackingSession,
    ends_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StopTrackingResponse {
    success: bool,
    was_active: bool,
}

#[derive(Serialize)]
struct AlertResponse {
    success: bool,
    #[serde(flatten)]
    result: AlertResult,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminStatusResponse {
    name: String,
    uptime_secs: u64,
    started_at: DateTime<Utc>,
    open_connections: usize,
    #[serde(flatten)]
    hub: HubStats,
}

// ─── Handlers ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        app: APP_NAME,
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        ws_path: WS_PATH,
    })
}

async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    let user = state.hub.register(UserId(req.user_id), req.name).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PublicUserView>, ServerError> {
    Ok(Json(state.hub.public_user(&UserId(user_id)).await?))
}

async fn add_contact(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<AddContactRequest>,
) -> Result<(StatusCode, Json<ContactView>), ServerError> {
    if req.contact_user_id.trim().is_empty() {
        return Err(ServerError::BadRequest("contactUserId is required".into()));
    }
    let view = state
        .hub
        .add_contact(&UserId(user_id), &UserId(req.contact_user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_contacts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<ContactView>> {
    Json(state.hub.list_contacts(&UserId(user_id)).await)
}

async fn start_tracking(
    State(state): State<AppState>,
    Json(req): Json<StartTrackingRequest>,
) -> Result<Json<TrackingResponse>, ServerError> {
    let session = state
        .hub
        .start_tracking(&UserId(req.user_id), req.duration, req.location)
        .await?;
    let ends_at = session.ends_at();
    Ok(Json(TrackingResponse {
        success: true,
        session,
        ends_at,
    }))
}

async fn stop_tracking(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Json<StopTrackingResponse> {
    let was_active = state
        .hub
        .stop_tracking(&UserId(req.user_id))
        .await
        .is_some();
    Json(StopTrackingResponse {
        success: true,
        was_active,
    })
}

async fn raise_alert(
    State(state): State<AppState>,
    Json(req): Json<AlertRequest>,
) -> Result<Json<AlertResponse>, ServerError> {
    let result = state
        .hub
        .raise_alert(&UserId(req.user_id), req.location)
        .await?;
    Ok(Json(AlertResponse {
        success: true,
        result,
    }))
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let (token, expected) = (token.as_bytes(), expected.as_bytes());
    if token.len() != expected.len() || token.ct_eq(expected).unwrap_u8() != 1 {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

async fn admin_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    Ok(Json(AdminStatusResponse {
        name: state.config.instance_name.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        started_at: state.started_at_utc,
        open_connections: state.publisher.connection_count(),
        hub: state.hub.stats().await,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        AppState::new(ServerConfig {
            admin_token: Some("letmein".into()),
            ..ServerConfig::default()
        })
    }

    async fn call(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let response = build_router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(state: &AppState, id: &str, name: &str) {
        let (status, _) = call(
            state,
            Method::POST,
            "/api/users",
            Some(json!({ "name": name, "userId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let state = test_state();
        register(&state, "alice", "Alice").await;

        let (status, body) = call(&state, Method::GET, "/api/users/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], "alice");
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["isOnline"], false);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/users",
            Some(json!({ "name": "Again", "userId": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&state, Method::GET, "/api/users/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_info() {
        let state = test_state();
        let (status, body) = call(&state, Method::GET, "/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["app"], "SafeWatch");
        assert_eq!(body["name"], state.config.instance_name.as_str());
        assert_eq!(body["wsPath"], "/ws");
    }

    #[tokio::test]
    async fn test_register_missing_field() {
        let state = test_state();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/users",
            Some(json!({ "userId": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("name"));
    }

    #[tokio::test]
    async fn test_contacts_endpoints() {
        let state = test_state();
        register(&state, "alice", "Alice").await;
        register(&state, "bob", "Bob").await;

        let uri = "/api/users/alice/contacts";
        let (status, body) = call(
            &state,
            Method::POST,
            uri,
            Some(json!({ "contactUserId": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Bob");

        let (status, _) = call(
            &state,
            Method::POST,
            uri,
            Some(json!({ "contactUserId": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&state, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = call(&state, Method::GET, "/api/users/ghost/contacts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_tracking_and_alert() {
        let state = test_state();
        register(&state, "alice", "Alice").await;
        register(&state, "bob", "Bob").await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/tracking/start",
            Some(json!({ "userId": "alice", "duration": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/tracking/start",
            Some(json!({ "userId": "alice", "duration": 300 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["durationSeconds"], 300);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/alert",
            Some(json!({ "userId": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(
            &state,
            Method::POST,
            "/api/users/alice/contacts",
            Some(json!({ "contactUserId": "bob" })),
        )
        .await;
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/alert",
            Some(json!({ "userId": "alice", "location": { "lat": 1.0, "lng": 2.0 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["contactsTotal"], 1);
        assert_eq!(body["contactsDelivered"], 0);
        assert_eq!(body["trackingStopped"], true);

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/tracking/stop",
            Some(json!({ "userId": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wasActive"], false);
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let state = test_state();
        let (status, _) = call(&state, Method::GET, "/admin/status", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::builder()
            .uri("/admin/status")
            .header("authorization", "Bearer letmein")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
