use axum::{
    Json,
    extract::{Multipart, Query, State, rejection::QueryRejection},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use mailtally_core::{IngestionError, IngestionReport, SenderMetrics};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
    spool::spool_archive,
};

#[derive(Debug, Deserialize)]
pub struct TopSendersQuery {
    pub limit: Option<usize>,
}

/// Accepts a `.tar.gz` upload and starts ingesting it in the background.
///
/// Responds `202 Accepted` as soon as the run is claimed; progress is
/// observed through [`ingestion_status`].
pub async fn start_ingestion(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<StatusCode> {
    // Reject before spooling; `start` still makes the claim.
    if state.ingestion.is_running() {
        return Err(IngestionError::AlreadyRunning.into());
    }

    let upload = spool_archive(
        &mut multipart,
        state.config().ingestion.spool_dir.as_deref(),
    )
    .await?;
    info!(
        bytes = upload.len(),
        file_name = upload.file_name().unwrap_or("<unnamed>"),
        "archive upload spooled"
    );

    // The ticket is dropped; the run continues detached.
    state.ingestion.start(upload.into_file())?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn ingestion_status(
    State(state): State<AppState>,
) -> Json<IngestionReport> {
    Json(state.reporting.status())
}

pub async fn top_senders(
    State(state): State<AppState>,
    query: Result<Query<TopSendersQuery>, QueryRejection>,
) -> AppResult<Json<Vec<SenderMetrics>>> {
    let Query(query) =
        query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let limit = query.limit.unwrap_or_else(|| state.reporting.default_limit());
    Ok(Json(state.reporting.top_senders(limit)?))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "ingestionRunning": state.ingestion.is_running(),
    }))
}
