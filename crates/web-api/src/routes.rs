use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    routing::get,
    Json, Router,
};
use domain::Username;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{auth::bearer_token, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<Username>,
    pub count: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/online", get(online_users))
        .route("/ws", get(websocket_upgrade))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.router.connection_count().await,
    })
}

async fn online_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OnlineUsersResponse>, ApiError> {
    state.jwt_service.extract_user_from_headers(&headers)?;

    let users: Vec<Username> = state
        .chat_service
        .presence()
        .online_identities()
        .await
        .into_iter()
        .collect();
    Ok(Json(OnlineUsersResponse {
        count: users.len(),
        users,
    }))
}

/// 升级前完成认证：令牌无效或用户未知时直接拒绝，不会建立连接
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("missing token"))?;

    let claims = state.jwt_service.verify_token(token).map_err(|err| {
        tracing::warn!("WebSocket upgrade rejected: invalid token");
        err
    })?;
    let username = state
        .chat_service
        .resolve_identity(&claims.sub)
        .await
        .map_err(|err| {
            tracing::warn!(sub = %claims.sub, error = %err, "WebSocket upgrade rejected");
            ApiError::from(err)
        })?;

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(socket, state, username).run().await;
    }))
}
