use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::db::stats_repo::{self, InboxSummary};
use crate::report::{self, LatestReport};
use crate::scan::{ScanRequest, ScanStatus};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub app: String,
    pub owner: String,
}

pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        app: state.app_name.clone(),
        owner: state.scans.owner().to_string(),
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanParams {
    pub days: Option<u32>,
    pub limit: Option<usize>,
}

impl ScanParams {
    fn into_request(self) -> ScanRequest {
        let defaults = ScanRequest::default();
        ScanRequest {
            days: self.days.unwrap_or(defaults.days),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub status: ScanStatus,
    pub messages_processed: usize,
}

pub async fn scan(
    State(state): State<AppState>,
    params: Result<Query<ScanParams>, QueryRejection>,
) -> Result<Json<ScanResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let report = state.scans.run(params.into_request()).await?;
    Ok(Json(ScanResponse {
        status: report.status,
        messages_processed: report.processed,
    }))
}

pub async fn cancel_scan(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "cancelled": state.scans.cancel() }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<InboxSummary>, ApiError> {
    state.scans.require_credentials().await?;
    let summary = stats_repo::summary(state.scans.store().database())?;
    Ok(Json(summary))
}

pub async fn latest_report() -> Json<LatestReport> {
    Json(LatestReport::stub(Utc::now()))
}

pub async fn latest_report_pdf(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let title = report::report_title(&state.app_name, Utc::now());
    let pdf = report::render_pdf(&title)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"latest.pdf\""),
        ],
        pdf,
    ))
}
