use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentinel_core::{TenantContext, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::repositories::{ScanRecord, ScanStatusRecord};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StartScanRequest {
    pub tenant_id: String,
    pub connector_name: String,
}

#[derive(Deserialize)]
pub struct CancelScanRequest {
    pub tenant_id: String,
    pub connector_name: String,
}

#[derive(Serialize)]
pub struct CancelScanResponse {
    pub cancelled: bool,
}

#[derive(Serialize)]
pub struct StartScanResponse {
    pub scan_id: String,
}

#[derive(Serialize)]
pub struct ScanStatusResponse {
    pub scan_id: String,
    pub tenant_id: String,
    pub connector_name: String,
    pub status: &'static str,
    pub nodes_found: u64,
    pub resources_failed: u64,
}

impl From<ScanRecord> for ScanStatusResponse {
    fn from(record: ScanRecord) -> Self {
        let status = match record.status {
            ScanStatusRecord::Running => "running",
            ScanStatusRecord::Success => "completed",
            ScanStatusRecord::Partial => "partial",
            ScanStatusRecord::Failed => "failed",
            ScanStatusRecord::Cancelled => "cancelled",
        };
        Self {
            scan_id: record.scan_id,
            tenant_id: record.tenant_id,
            connector_name: record.connector_name,
            status,
            nodes_found: record.nodes_found,
            resources_failed: record.resources_failed,
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestratorError::AlreadyRunning => StatusCode::CONFLICT,
            OrchestratorError::ScanNotFound(_) | OrchestratorError::UnknownConnector(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::Config(_) | OrchestratorError::Credential(_) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::Cancelled => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// POST /api/v1/scans — start a scan on explicit request (spec §4.7).
/// Rejects with 409 if this `(tenant, connector)` pair is already running.
pub async fn handle_start_scan(
    State(state): State<AppState>,
    Json(request): Json<StartScanRequest>,
) -> Result<Json<StartScanResponse>, OrchestratorError> {
    let connector = state
        .connector_registry
        .get(&request.connector_name)
        .ok_or_else(|| OrchestratorError::UnknownConnector(request.connector_name.clone()))?;

    let ctx = TenantContext::new(TenantId::new(request.tenant_id));
    let scan_id = state.scan_runner.run(&ctx, connector.as_ref()).await?;

    Ok(Json(StartScanResponse { scan_id }))
}

/// POST /api/v1/scans/cancel — asks the in-flight run for this
/// `(tenant, connector)` pair to stop cooperatively (spec §4.4 step 7,
/// scenario S6). A `false` result means nothing was running to cancel,
/// which is not itself an error: the caller may simply have lost the race
/// with the run finishing on its own.
pub async fn handle_cancel_scan(
    State(state): State<AppState>,
    Json(request): Json<CancelScanRequest>,
) -> Result<Json<CancelScanResponse>, OrchestratorError> {
    let cancelled = state
        .run_guard
        .cancel(&request.tenant_id, &request.connector_name);
    Ok(Json(CancelScanResponse { cancelled }))
}

/// GET /api/v1/scans/:scan_id
pub async fn handle_get_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<ScanStatusResponse>, OrchestratorError> {
    let record = state
        .repository
        .get_scan(&scan_id)
        .await
        .map_err(|_| OrchestratorError::ScanNotFound(scan_id))?;

    Ok(Json(record.into()))
}
