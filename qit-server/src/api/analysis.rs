//! Image upload and defect analysis
//!
//! Images arrive already captured, either as a reference (`data:` URI or
//! http(s) URL) or as a media type plus base64 payload.

use axum::{extract::State, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qit_common::defect::symptom_for_label;
use qit_common::draft::DraftRow;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath};
use crate::classifier::Classification;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Uploaded image: either `url`, or `mediaType` with base64 `data`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl ImageUpload {
    /// Validate the upload and turn it into a storable reference
    pub fn into_reference(self) -> ApiResult<String> {
        if let Some(url) = self.url {
            let url = url.trim().to_string();
            if url.starts_with("data:") {
                check_data_uri(&url)?;
                return Ok(url);
            }
            if url.starts_with("http://") || url.starts_with("https://") {
                return Ok(url);
            }
            return Err(ApiError::BadRequest(
                "Image url must be a data: URI or an http(s) URL".to_string(),
            ));
        }

        match (self.media_type, self.data) {
            (Some(media_type), Some(data)) => {
                let media_type = media_type.trim();
                check_media_type(media_type)?;
                let data = data.trim();
                decode_payload(data)?;
                Ok(format!("data:{};base64,{}", media_type, data))
            }
            _ => Err(ApiError::BadRequest(
                "Image needs either url, or mediaType and data".to_string(),
            )),
        }
    }
}

fn check_media_type(media_type: &str) -> ApiResult<()> {
    if media_type.starts_with("image/") && media_type.len() > "image/".len() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Unsupported media type '{}'",
            media_type
        )))
    }
}

fn decode_payload(data: &str) -> ApiResult<Vec<u8>> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| ApiError::BadRequest(format!("Image data is not base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Image data is empty".to_string()));
    }
    Ok(bytes)
}

/// Accepts `data:image/<kind>;base64,<payload>`
fn check_data_uri(uri: &str) -> ApiResult<()> {
    let malformed = || ApiError::BadRequest("Malformed data: URI".to_string());
    let rest = uri.strip_prefix("data:").ok_or_else(malformed)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(malformed)?;
    let media_type = meta.strip_suffix(";base64").ok_or_else(malformed)?;
    check_media_type(media_type)?;
    decode_payload(payload)?;
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub classification: Classification,
    /// Symptom the label maps to on a row
    pub symptom: String,
}

impl From<Classification> for AnalysisResponse {
    fn from(classification: Classification) -> Self {
        let symptom = symptom_for_label(&classification.label).to_string();
        Self {
            classification,
            symptom,
        }
    }
}

/// POST /api/analysis
///
/// Classify an image without touching any batch.
pub async fn analyze_image(
    State(state): State<AppState>,
    ApiJson(upload): ApiJson<ImageUpload>,
) -> ApiResult<Json<AnalysisResponse>> {
    let reference = upload.into_reference()?;
    let classification = state.classifier.classify(&reference).await?;
    info!(label = %classification.label, "Image analyzed");
    Ok(Json(classification.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowAnalysisResponse {
    pub analysis: AnalysisResponse,
    pub row: DraftRow,
}

/// POST /api/batches/:id/rows/:usn/analyze
///
/// Classifies the unit's attached photo and applies the label. The batch
/// lock is not held while the classifier runs.
pub async fn analyze_row(
    State(state): State<AppState>,
    ApiPath((id, usn)): ApiPath<(Uuid, String)>,
) -> ApiResult<Json<RowAnalysisResponse>> {
    let image = {
        let drafts = state.drafts.read().await;
        let batch = drafts
            .get(&id)
            .ok_or_else(|| ApiError::NotFound(format!("Batch {}", id)))?;
        batch.image_of(&usn)?.to_string()
    };

    let classification = state.classifier.classify(&image).await?;

    let mut drafts = state.drafts.write().await;
    let batch = drafts
        .get_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Batch {}", id)))?;
    let row = batch
        .apply_classification(&usn, &classification.label)?
        .clone();
    info!(batch = %id, auto_usn = %usn, label = %classification.label, "Unit analyzed");

    Ok(Json(RowAnalysisResponse {
        analysis: classification.into(),
        row,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(url: Option<&str>, media_type: Option<&str>, data: Option<&str>) -> ImageUpload {
        ImageUpload {
            url: url.map(String::from),
            media_type: media_type.map(String::from),
            data: data.map(String::from),
        }
    }

    #[test]
    fn test_payload_becomes_data_uri() {
        let reference = upload(None, Some("image/jpeg"), Some("/9j/4AAQ"))
            .into_reference()
            .unwrap();
        assert_eq!(reference, "data:image/jpeg;base64,/9j/4AAQ");
    }

    #[test]
    fn test_url_forms() {
        assert!(upload(Some("https://cdn.example.com/a.jpg"), None, None)
            .into_reference()
            .is_ok());
        assert!(upload(Some("data:image/png;base64,iVBORw0K"), None, None)
            .into_reference()
            .is_ok());
        assert!(upload(Some("file:///tmp/a.jpg"), None, None)
            .into_reference()
            .is_err());
        assert!(upload(Some("data:text/plain;base64,aGVsbG8="), None, None)
            .into_reference()
            .is_err());
        assert!(upload(Some("data:image/png,raw"), None, None)
            .into_reference()
            .is_err());
    }

    #[test]
    fn test_rejects_bad_payloads() {
        assert!(upload(None, Some("image/png"), Some("not base64!"))
            .into_reference()
            .is_err());
        assert!(upload(None, Some("image/png"), Some(""))
            .into_reference()
            .is_err());
        assert!(upload(None, None, Some("AAAA")).into_reference().is_err());
    }

    #[test]
    fn test_no_visible_defect_maps_to_no_defect() {
        let response = AnalysisResponse::from(Classification {
            label: "No Visible Defect".into(),
            raw_text: "clean".into(),
        });
        assert_eq!(response.symptom, "No Defect");
    }
}
