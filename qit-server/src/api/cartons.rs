//! Carton catalog lookup

use axum::{extract::State, Json};
use serde::Serialize;

use super::extract::ApiPath;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartonResponse {
    pub carton_id: String,
    pub serials: Vec<String>,
}

/// GET /api/cartons/:id
///
/// Serials packed in a carton, in packing order.
pub async fn get_carton(
    State(state): State<AppState>,
    ApiPath(carton_id): ApiPath<String>,
) -> ApiResult<Json<CartonResponse>> {
    let serials = state
        .catalog
        .serials(&carton_id)
        .ok_or_else(|| ApiError::NotFound(format!("Carton {}", carton_id)))?;
    Ok(Json(CartonResponse {
        carton_id: carton_id.trim().to_string(),
        serials: serials.to_vec(),
    }))
}
