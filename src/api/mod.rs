//! JSON HTTP API over [`ArticleService`].

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::{Article, ArticleSummary};
use crate::services::ArticleService;

const DEFAULT_COUNT: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ArticleService>,
}

/// Build the API router. When `frontend` is given, unmatched paths are
/// served from that directory with `index.html` as the fallback page.
pub fn build_router(state: AppState, frontend: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/api/summarize", post(summarize))
        .route("/api/recents", get(recents))
        .route("/api/archive", get(archive))
        .route("/api/search", get(search))
        .route("/api/setArchive", put(set_archive))
        .route("/api/markRead", post(mark_read))
        .with_state(state);

    let router = match frontend {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub kind: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    App(AppError),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::InvalidUrl { .. } | AppError::SearchQueryInvalid { .. } => {
            StatusCode::BAD_REQUEST
        }
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::StoreConflict(_) => StatusCode::CONFLICT,
        AppError::FetchFailed { .. } | AppError::ExtractFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message,
                    kind: "BadRequest".to_string(),
                },
            ),
            ApiError::App(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", err);
                } else {
                    tracing::debug!("Request rejected: {}", err);
                }
                (
                    status,
                    ErrorBody {
                        message: err.to_string(),
                        kind: err.kind().to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub url: String,
    #[serde(default)]
    pub title_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    count: Option<String>,
}

impl CountQuery {
    fn count(&self) -> std::result::Result<usize, ApiError> {
        match self.count.as_deref() {
            None => Ok(DEFAULT_COUNT),
            Some(raw) => raw.trim().parse().map_err(|_| {
                ApiError::BadRequest(format!("Invalid count specification: {}", raw))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetArchiveQuery {
    url: Option<String>,
    set_archive: Option<String>,
}

async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> ApiResult<Article> {
    let article = state
        .service
        .read(&request.url, request.title_hint.as_deref())
        .await?;
    Ok(Json(article))
}

async fn recents(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> ApiResult<Vec<ArticleSummary>> {
    let count = query.count()?;
    Ok(Json(state.service.store().list_recent(count).await?))
}

async fn archive(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> ApiResult<Vec<ArticleSummary>> {
    let count = query.count()?;
    Ok(Json(state.service.store().list_archive_feed(count).await?))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<ArticleSummary>> {
    let q = query
        .q
        .ok_or_else(|| ApiError::BadRequest("No search terms provided".to_string()))?;
    Ok(Json(state.service.store().search(&q).await?))
}

async fn set_archive(
    State(state): State<AppState>,
    Query(query): Query<SetArchiveQuery>,
) -> std::result::Result<StatusCode, ApiError> {
    let url = query
        .url
        .ok_or_else(|| ApiError::BadRequest("No URL provided".to_string()))?;
    let archived = query.set_archive.as_deref() == Some("true");
    state.service.store().set_archived(&url, archived).await?;
    Ok(StatusCode::OK)
}

async fn mark_read(
    State(state): State<AppState>,
    Json(request): Json<MarkReadRequest>,
) -> std::result::Result<StatusCode, ApiError> {
    state.service.store().mark_read(&request.url).await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_and_gateway_statuses() {
        assert_eq!(
            status_for(&AppError::invalid_url("x", "relative URL")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AppError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&AppError::StoreConflict("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&AppError::ExtractFailed("boom".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AppError::Timeout("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn count_defaults_and_rejects_garbage() {
        assert_eq!(CountQuery { count: None }.count().unwrap(), 5);
        assert_eq!(CountQuery { count: Some("12".to_string()) }.count().unwrap(), 12);
        assert!(CountQuery { count: Some("lots".to_string()) }.count().is_err());
    }
}
