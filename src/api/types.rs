use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mirror::{Artifact, MirrorItem};

/// Envelope for worker and admin writes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn accepted() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiResponse::<()>::fail(self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub worker_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRefreshRequest {
    #[serde(default)]
    pub mirror_id: String,
}

/// Body of `POST /webhook/reload`.
#[derive(Debug, Serialize)]
pub struct ReloadSummary {
    pub pending: usize,
    pub syncing: usize,
    pub data: Vec<MirrorItem>,
}

/// Public view of one mirror. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorItemDto {
    pub id: String,
    pub url: String,
    pub name: String,
    pub desc: String,
    pub upstream: String,
    pub size: i64,
    pub status: String,
    pub last_updated: i64,
    pub next_scheduled: i64,
    pub last_success: i64,
    pub artifacts: Vec<Artifact>,
}

impl From<&MirrorItem> for MirrorItemDto {
    fn from(item: &MirrorItem) -> Self {
        let info = &item.config.info;
        Self {
            id: item.config.id.clone(),
            url: info.url.clone(),
            name: info.name.clone(),
            desc: info.description.clone(),
            upstream: info.upstream.clone(),
            size: item.saved.size,
            status: item.saved.status.as_str().to_string(),
            last_updated: item.saved.last_sync_at.timestamp(),
            next_scheduled: item.next_sync_at().timestamp(),
            last_success: item.saved.last_success_at.timestamp(),
            artifacts: item.saved.artifacts.clone(),
        }
    }
}

