//! HTTP routes: health, login, room lookup, and router assembly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{Credentials, TokenSigner};
use crate::config::Config;
use crate::room::{RoomRegistry, RoomSnapshot};
use crate::ws::connection::ws_handler;
use crate::ws::gateway::ConnectionGateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ConnectionGateway>,
    pub signer: TokenSigner,
    pub users: Arc<Credentials>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        Self {
            gateway: Arc::new(ConnectionGateway::new(registry)),
            signer: TokenSigner::new(config.hmac_key, config.token_max_age),
            users: Arc::new(config.users.clone()),
        }
    }
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/test", get(server_test))
        .route("/api/auth/login", post(login))
        .route("/api/rooms/:room_id", get(view_room))
        .route("/ws", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origin(&config.client_origin))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn allowed_origin(origin: &str) -> AllowOrigin {
    match origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(%origin, "unparseable CLIENT_ORIGIN, allowing any origin");
            AllowOrigin::any()
        }
    }
}

async fn healthz() -> &'static str { "ok" }

#[derive(Serialize)]
struct ServerStatus { message: &'static str }

async fn server_test() -> Json<ServerStatus> {
    Json(ServerStatus { message: "Server is running!" })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Default)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Json(LoginRequest { username, password }): Json<LoginRequest>,
) -> impl IntoResponse {
    if !state.users.check(&username, &password) {
        tracing::warn!(%username, "login rejected");
        let body = LoginResponse { message: Some("Invalid credentials".into()), ..Default::default() };
        return (StatusCode::UNAUTHORIZED, Json(body));
    }
    tracing::info!(%username, "login");
    let token = state.signer.issue(&username);
    let body = LoginResponse { success: true, username: Some(username), token: Some(token), message: None };
    (StatusCode::OK, Json(body))
}

async fn view_room(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoomSnapshot>, (StatusCode, &'static str)> {
    state
        .gateway
        .registry()
        .snapshot(&room_id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Room not found"))
}
