//! Draft batch workflow
//!
//! A draft lives in memory from the moment its header is submitted until
//! it is committed or discarded. Every unit-level change answers with the
//! updated row and whether the batch can be submitted yet.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qit_common::draft::{BatchHeader, DefectAnnotation, DraftBatch, DraftRow, FollowUp};
use qit_common::{InspectionResult, RecordId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::analysis::ImageUpload;
use super::extract::{ApiJson, ApiPath};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Draft batch with its submit readiness
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView<'a> {
    #[serde(flatten)]
    pub batch: &'a DraftBatch,
    pub missing_manual: Vec<&'a str>,
    pub submittable: bool,
}

impl<'a> BatchView<'a> {
    fn of(batch: &'a DraftBatch) -> Self {
        Self {
            batch,
            missing_manual: batch.missing_manual(),
            submittable: batch.is_submittable(),
        }
    }
}

/// One changed unit
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdate {
    pub row: DraftRow,
    pub missing_manual: usize,
    pub submittable: bool,
}

fn batch_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Batch {}", id))
}

/// Apply a unit-level change to a draft under the write lock
async fn update_row<F>(state: &AppState, id: Uuid, change: F) -> ApiResult<Json<RowUpdate>>
where
    F: FnOnce(&mut DraftBatch) -> qit_common::Result<DraftRow>,
{
    let mut drafts = state.drafts.write().await;
    let batch = drafts.get_mut(&id).ok_or_else(|| batch_not_found(id))?;
    let row = change(batch)?;
    Ok(Json(RowUpdate {
        row,
        missing_manual: batch.missing_manual().len(),
        submittable: batch.is_submittable(),
    }))
}

/// POST /api/batches
///
/// Opens a draft with one row per catalog serial of the carton.
pub async fn open_batch(
    State(state): State<AppState>,
    ApiJson(header): ApiJson<BatchHeader>,
) -> ApiResult<Response> {
    let batch = DraftBatch::open(header, &state.catalog)?;
    info!(
        batch = %batch.id,
        carton = %batch.header.carton_id,
        units = batch.rows.len(),
        "Draft batch opened"
    );

    let mut drafts = state.drafts.write().await;
    let batch = drafts.entry(batch.id).or_insert(batch);
    Ok((StatusCode::CREATED, Json(BatchView::of(batch))).into_response())
}

/// GET /api/batches/:id
pub async fn get_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    let drafts = state.drafts.read().await;
    let batch = drafts.get(&id).ok_or_else(|| batch_not_found(id))?;
    Ok(Json(BatchView::of(batch)).into_response())
}

/// DELETE /api/batches/:id
pub async fn discard_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .drafts
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| batch_not_found(id))?;
    info!(batch = %id, "Draft batch discarded");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SerialRequest {
    pub serial: String,
}

/// POST /api/batches/:id/scan
///
/// Matches a scanned serial against the carton's units.
pub async fn scan_serial(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<SerialRequest>,
) -> ApiResult<Json<RowUpdate>> {
    let result = update_row(&state, id, |batch| {
        batch.record_scan(&request.serial).cloned()
    })
    .await;
    if let Err(ApiError::Common(qit_common::Error::UnmatchedSerial(serial))) = &result {
        warn!(batch = %id, serial = %serial, "Scanned serial not in carton");
    }
    result
}

/// PUT /api/batches/:id/rows/:usn/manual
pub async fn enter_manual_serial(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
    ApiJson(request): ApiJson<SerialRequest>,
) -> ApiResult<Json<RowUpdate>> {
    update_row(&state, id, |batch| {
        batch.enter_manual_usn(&usn, &request.serial).cloned()
    })
    .await
}

/// POST /api/batches/:id/rows/:usn/not-available
pub async fn mark_not_available(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
) -> ApiResult<Json<RowUpdate>> {
    update_row(&state, id, |batch| batch.mark_not_available(&usn).cloned()).await
}

/// PUT /api/batches/:id/rows/:usn/defect
pub async fn annotate_row(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
    ApiJson(annotation): ApiJson<DefectAnnotation>,
) -> ApiResult<Json<RowUpdate>> {
    update_row(&state, id, |batch| batch.annotate(&usn, annotation).cloned()).await
}

/// PUT /api/batches/:id/rows/:usn/image
pub async fn attach_image(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
    ApiJson(upload): ApiJson<ImageUpload>,
) -> ApiResult<Json<RowUpdate>> {
    let reference = upload.into_reference()?;
    update_row(&state, id, |batch| batch.attach_image(&usn, reference).cloned()).await
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    /// `null` clears the override
    #[serde(default)]
    pub result: Option<InspectionResult>,
}

/// PUT /api/batches/:id/rows/:usn/result
pub async fn override_result(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
    ApiJson(request): ApiJson<ResultRequest>,
) -> ApiResult<Json<RowUpdate>> {
    update_row(&state, id, |batch| {
        batch.override_result(&usn, request.result).cloned()
    })
    .await
}

/// PUT /api/batches/:id/rows/:usn/follow-up
pub async fn set_follow_up(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
    ApiJson(follow_up): ApiJson<FollowUp>,
) -> ApiResult<Json<RowUpdate>> {
    update_row(&state, id, |batch| batch.set_follow_up(&usn, follow_up).cloned()).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub batch_id: Uuid,
    pub committed: Vec<RecordId>,
}

/// POST /api/batches/:id/submit
///
/// Writes the batch to the record store one row at a time. On success the
/// draft is discarded. If a write fails, earlier rows stay committed and
/// are removed from the draft, so a retry only sends what is left.
///
/// The draft is taken out of the map for the duration of the writes, so
/// other batches stay usable and this one answers 404 until the submit
/// settles.
pub async fn submit_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<SubmitResponse>> {
    let (mut batch, rows) = {
        let mut drafts = state.drafts.write().await;
        let rows = drafts
            .get(&id)
            .ok_or_else(|| batch_not_found(id))?
            .commit_rows()?;
        let batch = drafts.remove(&id).ok_or_else(|| batch_not_found(id))?;
        (batch, rows)
    };

    let mut committed = Vec::with_capacity(rows.len());
    let mut committed_usns = Vec::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        match state.store.create(row).await {
            Ok(record_id) => {
                committed.push(record_id);
                committed_usns.push(row.auto_usn.clone());
            }
            Err(e) => {
                batch.remove_rows(&committed_usns);
                state.drafts.write().await.insert(id, batch);
                warn!(
                    batch = %id,
                    committed = committed.len(),
                    failed_at = position + 1,
                    error = %e,
                    "Batch submit stopped"
                );
                return Err(ApiError::PartialCommit {
                    committed,
                    failed_at: position + 1,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(batch = %id, records = committed.len(), "Batch committed");
    Ok(Json(SubmitResponse {
        batch_id: id,
        committed,
    }))
}
