//! HTTP surface: route handlers and the error-to-response mapping.

use crate::orchestrator::{self, AppState, DemographicsReport, PostsOutcome};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ig_graph::GraphError;
use ig_storage::StorageError;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Graph(GraphError),
    Storage(StorageError),
    MissingSnapshot,
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        ApiError::Graph(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingSnapshot => (
                StatusCode::NOT_FOUND,
                "No account snapshot found for today. Fetch account insights first.".to_string(),
            ),
            // Provider rejections keep their status; an unmappable code
            // degrades to 502.
            ApiError::Graph(GraphError::Upstream { status, detail }) => {
                error!(event = "upstream_rejection", status, detail = %detail);
                (
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                    detail,
                )
            }
            ApiError::Graph(GraphError::Token(detail)) => {
                error!(event = "token_failure", detail = %detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to obtain a valid access token: {detail}"),
                )
            }
            ApiError::Graph(err @ (GraphError::Transport { .. } | GraphError::Malformed(_))) => {
                error!(event = "fetch_failure", error = %err);
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            // Client setup and persistence faults are internal; the payload
            // stays generic and the diagnostics go to the log.
            ApiError::Graph(err) => {
                error!(event = "graph_failure", error = %err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error.".to_string(),
                )
            }
            ApiError::Storage(err) => {
                error!(event = "storage_failure", error = %err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal storage error.".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn account_insights(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let observed = orchestrator::collect_account_insights(&state).await?;
    Ok(Json(json!({
        "username": observed.username,
        "followers_count": observed.followers,
        "reach": observed.reach,
        "accounts_engaged": observed.accounts_engaged,
        "website_clicks": observed.website_clicks,
    }))
    .into_response())
}

pub async fn demographics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DemographicsReport>, ApiError> {
    let report = orchestrator::collect_demographics(&state).await?;
    Ok(Json(report))
}

pub async fn posts(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = match orchestrator::collect_posts(&state).await? {
        PostsOutcome::Empty => json!({ "message": "No posts found." }),
        PostsOutcome::Collected { posts } => json!({
            "message": "Post metrics fetched and reconciled.",
            "posts": posts,
        }),
    };
    Ok(Json(body).into_response())
}

pub async fn health() -> &'static str {
    "ok"
}
