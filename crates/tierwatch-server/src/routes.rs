use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tierwatch_core::traits::CharacterStore;

use crate::dto::{
    CharacterQuery, CharacterResponse, ErrorResponse, HealthResponse, HistoryQuery,
    HistoryResponse, RankingQuery, RankingResponse, ServerListResponse, ServerResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;
const DEFAULT_RANKING_LIMIT: usize = 100;
const MAX_RANKING_LIMIT: usize = 1000;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/servers", get(list_servers))
        .route("/v1/characters/{server}/{name}", get(get_character))
        .route("/v1/characters/{server}/{name}/history", get(get_history))
        .route("/v1/rankings/{scope}", get(get_ranking))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Characters
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/characters/{server}/{name}",
    params(
        ("server" = String, Path, description = "Server name"),
        ("name" = String, Path, description = "Character name"),
        CharacterQuery,
    ),
    responses(
        (status = 200, description = "Resolved character", body = CharacterResponse),
        (status = 429, description = "Requested again inside the cooldown window", body = ErrorResponse),
    ),
    tag = "characters"
)]
pub async fn get_character(
    State(state): State<Arc<AppState>>,
    Path((server, name)): Path<(String, String)>,
    Query(query): Query<CharacterQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let resolved = state
        .resolver
        .resolve(&server, &name, query.refresh.unwrap_or(false))
        .await?;

    Ok(axum::Json(CharacterResponse::from(resolved)))
}

#[utoipa::path(
    get,
    path = "/v1/characters/{server}/{name}/history",
    params(
        ("server" = String, Path, description = "Server name"),
        ("name" = String, Path, description = "Character name"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "Stat snapshots, newest first", body = HistoryResponse),
    ),
    tag = "characters"
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path((server, name)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let snapshots = state
        .db
        .character_repo()
        .stat_history(&server, &name, limit)
        .await?;

    let total = snapshots.len();
    Ok(axum::Json(HistoryResponse {
        snapshots: snapshots.into_iter().map(Into::into).collect(),
        total,
    }))
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/rankings/{scope}",
    params(
        ("scope" = String, Path, description = "Server name, or `all` for the global ranking"),
        RankingQuery,
    ),
    responses(
        (status = 200, description = "Ranking snapshot", body = RankingResponse),
        (status = 404, description = "No snapshot for this scope yet", body = ErrorResponse),
    ),
    tag = "rankings"
)]
pub async fn get_ranking(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
    Query(query): Query<RankingQuery>,
) -> Result<Response, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RANKING_LIMIT)
        .clamp(1, MAX_RANKING_LIMIT);

    match state.db.character_repo().ranking_snapshot(&scope).await? {
        Some(snapshot) => {
            Ok(axum::Json(RankingResponse::from_snapshot(snapshot, limit)).into_response())
        }
        None => {
            let body = ErrorResponse {
                error: "not_found".to_string(),
                message: format!("No ranking for scope '{scope}'"),
            };
            Ok((StatusCode::NOT_FOUND, axum::Json(body)).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/servers",
    responses(
        (status = 200, description = "Known servers", body = ServerListResponse),
    ),
    tag = "system"
)]
pub async fn list_servers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let servers = state
        .servers
        .names()
        .filter_map(|name| {
            state.servers.get(name).map(|entry| ServerResponse {
                name: name.to_string(),
                upstream_id: entry.upstream_id.clone(),
                local_label: entry.local_label.clone(),
            })
        })
        .collect();

    axum::Json(ServerListResponse { servers })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
    };

    (status, axum::Json(response))
}
