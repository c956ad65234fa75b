//! Committed record collection endpoints
//!
//! Reads normalize every stored record and group the result; records that
//! cannot be normalized are skipped and counted, never fatal.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use qit_common::grouping::{group_rows, BatchGroup};
use qit_common::layout::layout_groups;
use qit_common::model::RawRecord;
use qit_common::normalize::{normalize_records, NormalizedBatch};
use qit_common::RecordId;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath};
use crate::error::{ApiError, ApiResult};
use crate::store::{prepare_update, RecordKey};
use crate::AppState;

/// Load and normalize the whole collection
pub(crate) async fn load_rows(state: &AppState) -> ApiResult<NormalizedBatch> {
    let records = state.store.list().await?;
    Ok(normalize_records(&records))
}

/// Grouped view of the committed collection
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub batches: Vec<BatchGroup>,
    pub total: usize,
    /// Records that could not be normalized
    pub skipped: usize,
}

/// GET /api/records
pub async fn list_records(State(state): State<AppState>) -> ApiResult<Json<RecordsResponse>> {
    let normalized = load_rows(&state).await?;
    Ok(Json(RecordsResponse {
        batches: group_rows(&normalized.rows),
        total: normalized.rows.len(),
        skipped: normalized.skipped.len(),
    }))
}

/// GET /api/records/layout
///
/// Flat table rows, each carrying only the merged cells it starts.
pub async fn records_layout(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let normalized = load_rows(&state).await?;
    let groups = group_rows(&normalized.rows);
    let rows = serde_json::to_value(layout_groups(&groups))
        .map_err(|e| ApiError::Internal(format!("Layout serialization failed: {}", e)))?;

    let mut body = serde_json::Map::new();
    body.insert("rows".to_string(), rows);
    body.insert("skipped".to_string(), Value::from(normalized.skipped.len()));
    Ok(Json(Value::Object(body)))
}

async fn update(state: &AppState, key: RecordKey, fields: RawRecord) -> ApiResult<StatusCode> {
    let prepared = prepare_update(&fields)?;
    state.store.update(key, &prepared).await?;
    info!(key = %key, fields = prepared.len(), "Record updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete(state: &AppState, key: RecordKey) -> ApiResult<StatusCode> {
    state.store.delete(key).await?;
    info!(key = %key, "Record deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/records/:id
pub async fn update_record(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(fields): ApiJson<RawRecord>,
) -> ApiResult<StatusCode> {
    update(&state, RecordKey::Id(RecordId::from(id)), fields).await
}

/// DELETE /api/records/:id
pub async fn delete_record(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    delete(&state, RecordKey::Id(RecordId::from(id))).await
}

/// PATCH /api/records/row/:n
///
/// Legacy positional addressing: row `n` is the n-th record (1-based).
pub async fn update_record_by_row(
    State(state): State<AppState>,
    ApiPath(n): ApiPath<usize>,
    ApiJson(fields): ApiJson<RawRecord>,
) -> ApiResult<StatusCode> {
    update(&state, RecordKey::row(n)?, fields).await
}

/// DELETE /api/records/row/:n
pub async fn delete_record_by_row(
    State(state): State<AppState>,
    ApiPath(n): ApiPath<usize>,
) -> ApiResult<StatusCode> {
    delete(&state, RecordKey::row(n)?).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    /// 1-based row in the sheet
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub source: String,
    pub sheet: String,
    pub imported: Vec<RecordId>,
    pub skipped: Vec<SkippedRecord>,
}

/// POST /api/records/import
///
/// Loads the configured workbook sheet and creates every usable record,
/// one at a time. A store failure stops the import; records already
/// created stay committed and are reported with the failing position.
pub async fn import_records(State(state): State<AppState>) -> ApiResult<Json<ImportResponse>> {
    let workbook = state
        .workbook
        .clone()
        .ok_or_else(|| ApiError::BadRequest("No workbook source is configured".to_string()))?;

    let records = workbook.load_records().await?;
    let normalized = normalize_records(&records);

    let mut imported = Vec::with_capacity(normalized.rows.len());
    for (position, row) in normalized.rows.iter().enumerate() {
        match state.store.create(row).await {
            Ok(id) => imported.push(id),
            Err(e) => {
                warn!(
                    committed = imported.len(),
                    failed_at = position + 1,
                    error = %e,
                    "Import stopped"
                );
                return Err(ApiError::PartialCommit {
                    committed: imported,
                    failed_at: position + 1,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        source = %workbook.source(),
        imported = imported.len(),
        skipped = normalized.skipped.len(),
        "Workbook import complete"
    );

    Ok(Json(ImportResponse {
        source: workbook.source().to_string(),
        sheet: workbook.sheet().to_string(),
        imported,
        skipped: normalized
            .skipped
            .iter()
            .map(|(position, reason)| SkippedRecord {
                row: position + 1,
                reason: reason.to_string(),
            })
            .collect(),
    }))
}
