//! Committed record collection
//!
//! Records travel in their flat wire form (display header → text) so the
//! local SQLite backend and the remote sheet API behave the same way:
//! reads return raw records which the caller normalizes.

use std::fmt;

use async_trait::async_trait;
use qit_common::model::{headers, FinalResult, FourM, InspectionDate, RawRecord, PLACEHOLDER};
use qit_common::normalize::resolve_header;
use qit_common::{InspectionResult, InspectionRow, RecordId};
use serde_json::Value;
use thiserror::Error;

pub mod sheet_api;
pub mod sqlite;

pub use sheet_api::SheetApiStore;
pub use sqlite::SqliteStore;

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote store returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Malformed record data: {0}")]
    Malformed(String),
}

/// Address of a committed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey {
    /// Stable identifier assigned at creation
    Id(RecordId),
    /// Legacy 1-based displayed row number
    Row(usize),
}

impl RecordKey {
    /// Legacy row key; row numbers start at 1
    pub fn row(n: usize) -> Result<Self, StoreError> {
        if n == 0 {
            return Err(StoreError::InvalidKey("row numbers start at 1".to_string()));
        }
        Ok(RecordKey::Row(n))
    }

    /// Zero-based collection position of a row key
    pub fn position(&self) -> Option<usize> {
        match self {
            RecordKey::Row(n) => n.checked_sub(1),
            RecordKey::Id(_) => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "id {}", id),
            RecordKey::Row(n) => write!(f, "row {}", n),
        }
    }
}

/// Storage backend for committed inspection records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Every record, in insertion order
    async fn list(&self) -> Result<Vec<RawRecord>, StoreError>;

    /// Append one record, returning its identifier
    async fn create(&self, row: &InspectionRow) -> Result<RecordId, StoreError>;

    /// Overwrite named fields of one record
    ///
    /// `fields` must already be checked with [`prepare_update`].
    async fn update(&self, key: RecordKey, fields: &RawRecord) -> Result<(), StoreError>;

    async fn delete(&self, key: RecordKey) -> Result<(), StoreError>;
}

/// Validate a field update and rewrite it onto display headers
///
/// Header spellings are resolved the same way the normalizer resolves
/// them. Unknown and fixed fields are rejected, as are values that the
/// normalizer would not read back.
pub fn prepare_update(fields: &RawRecord) -> Result<RawRecord, StoreError> {
    if fields.is_empty() {
        return Err(StoreError::InvalidUpdate("no fields given".to_string()));
    }

    let mut prepared = RawRecord::new();
    for (name, value) in fields {
        let header = resolve_header(name)
            .ok_or_else(|| StoreError::InvalidUpdate(format!("unknown field '{}'", name)))?;
        if !headers::is_updatable(header) {
            return Err(StoreError::InvalidUpdate(format!(
                "field '{}' cannot be changed",
                header
            )));
        }

        let text = match value {
            Value::Null => PLACEHOLDER.to_string(),
            Value::String(s) if s.trim().is_empty() => PLACEHOLDER.to_string(),
            Value::String(s) => s.trim().to_string(),
            other => {
                return Err(StoreError::InvalidUpdate(format!(
                    "field '{}' must be text, got {}",
                    header, other
                )))
            }
        };
        check_value(header, &text)?;

        if prepared.insert(header.to_string(), Value::String(text)).is_some() {
            return Err(StoreError::InvalidUpdate(format!(
                "field '{}' given twice",
                header
            )));
        }
    }
    Ok(prepared)
}

fn check_value(header: &str, text: &str) -> Result<(), StoreError> {
    let blank = text == PLACEHOLDER;
    let valid = match header {
        headers::INSPECTION_DATE => matches!(
            text.parse::<InspectionDate>(),
            Ok(InspectionDate::Valid(_))
        ),
        headers::PROJECT
        | headers::STAGE
        | headers::LINE
        | headers::SHIFT
        | headers::CARTON_ID
        | headers::MANUAL_USN => !blank,
        headers::RESULT => InspectionResult::parse(text).is_some(),
        headers::FOUR_M => blank || FourM::parse(text).is_some(),
        headers::FINAL_RESULT => blank || FinalResult::parse(text).is_some(),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidUpdate(format!(
            "'{}' is not a valid {}",
            text, header
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn test_row_key() {
        assert!(matches!(RecordKey::row(0), Err(StoreError::InvalidKey(_))));
        assert_eq!(RecordKey::row(7).unwrap().position(), Some(6));
        assert_eq!(RecordKey::Id(RecordId::new()).position(), None);
        assert_eq!(RecordKey::Row(3).to_string(), "row 3");
    }

    #[test]
    fn test_prepare_update_resolves_headers() {
        let prepared = prepare_update(&fields(json!({
            "defectSymptom": "Dent",
            "result": "ng",
            "root_cause": "",
            "4M": null
        })))
        .unwrap();
        assert_eq!(prepared["Defect Symptom"], "Dent");
        assert_eq!(prepared["Result"], "ng");
        assert_eq!(prepared["Root Cause"], PLACEHOLDER);
        assert_eq!(prepared["4M"], PLACEHOLDER);
    }

    #[test]
    fn test_prepare_update_rejects_unknown_and_fixed_fields() {
        let err = prepare_update(&fields(json!({"Colour": "red"}))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate(msg) if msg.contains("unknown")));

        let err = prepare_update(&fields(json!({"Auto USN": "X"}))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate(msg) if msg.contains("cannot be changed")));

        let err = prepare_update(&fields(json!({"ID": "X"}))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate(_)));

        assert!(prepare_update(&RawRecord::new()).is_err());
    }

    #[test]
    fn test_prepare_update_checks_values() {
        assert!(prepare_update(&fields(json!({"Result": "maybe"}))).is_err());
        assert!(prepare_update(&fields(json!({"Inspection Date": "21/03/2025"}))).is_err());
        assert!(prepare_update(&fields(json!({"Project": ""}))).is_err());
        assert!(prepare_update(&fields(json!({"Final Result": "Closed"}))).is_ok());
        assert!(prepare_update(&fields(json!({"Spec": 3}))).is_err());
        assert!(prepare_update(&fields(json!({"Shift": "Night", "shift": "Day"}))).is_err());
    }
}
