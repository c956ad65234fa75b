//! Row normalizer
//!
//! Maps a raw record with unpredictable key presence (spreadsheet exports,
//! remote sheet APIs) onto the fixed [`InspectionRow`] shape.
//!
//! Headers are matched after lower-casing and stripping everything that is
//! not alphanumeric, so `"Carton ID"`, `"carton_id"` and `"cartonId"` all
//! name the same column. Blank fields become the placeholder, except the
//! six group-key fields which are required.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::model::{
    headers, FinalResult, FourM, InspectionDate, InspectionResult, InspectionRow, RawRecord,
    RecordId, INVALID_DATE, NOT_AVAILABLE, PLACEHOLDER,
};
use crate::time::date_from_spreadsheet_serial;

/// Record-level normalization failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Accepted header spellings per field, already in canonical form
const FIELD_ALIASES: [(&str, &[&str]); 23] = [
    (headers::ID, &["id", "recordid"]),
    (headers::INSPECTION_DATE, &["inspectiondate", "date"]),
    (headers::PROJECT, &["project"]),
    (headers::STAGE, &["stage", "station", "stagestation"]),
    (headers::LINE, &["line"]),
    (headers::SHIFT, &["shift"]),
    (headers::CARTON_ID, &["cartonid", "carton"]),
    (headers::AUTO_USN, &["autousn", "usn"]),
    (headers::MANUAL_USN, &["manualusn", "scannedusn"]),
    (headers::CATEGORY, &["category"]),
    (headers::DEFECT_LOCATION, &["defectlocation", "location"]),
    (headers::DEFECT_SYMPTOM, &["defectsymptom", "symptom"]),
    (headers::ERROR_CODE, &["errorcode"]),
    (headers::SPEC, &["spec"]),
    (headers::ACTUAL, &["actual"]),
    (headers::DEFECT_IMAGE, &["defectimage", "image"]),
    (headers::RESULT, &["result"]),
    (headers::CONTAINMENT_ACTION, &["containmentaction", "containment"]),
    (headers::ROOT_CAUSE, &["rootcause"]),
    (headers::CORRECTIVE_ACTION, &["correctiveaction"]),
    (headers::FOUR_M, &["4m", "fourm"]),
    (headers::ESTIMATED_COMPLETION, &["estimatedcompletion", "eta"]),
    (headers::FINAL_RESULT, &["finalresult"]),
];

/// Canonical form of a header: lower-case alphanumerics only
pub fn canonical_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Resolve a loosely-spelled header to its display header, if known
pub fn resolve_header(header: &str) -> Option<&'static str> {
    let canonical = canonical_header(header);
    FIELD_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&canonical.as_str()))
        .map(|(display, _)| *display)
}

/// Text content of a cell; `None` for blank or placeholder cells
fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() || text == PLACEHOLDER {
        None
    } else {
        Some(text)
    }
}

/// Convert a date cell given as ISO text, ISO datetime or spreadsheet serial
///
/// Returns `None` for a blank cell and `Some(InspectionDate::Invalid)` when
/// the value is present but cannot be turned into a calendar date.
pub fn normalize_date(value: &Value) -> Option<InspectionDate> {
    if let Value::Number(n) = value {
        return Some(serial_to_date(n.as_f64().unwrap_or(f64::NAN)));
    }
    let text = cell_text(value)?;
    if text == INVALID_DATE {
        return Some(InspectionDate::Invalid);
    }
    if let Ok(date) = text.parse::<InspectionDate>() {
        return Some(date);
    }
    if let Ok(serial) = text.parse::<f64>() {
        return Some(serial_to_date(serial));
    }
    // ISO datetime: keep the date part
    let date_part = text
        .split_once(|c: char| c == 'T' || c == ' ')
        .map(|(date, _)| date)
        .unwrap_or(text.as_str());
    Some(date_part.parse().unwrap_or(InspectionDate::Invalid))
}

fn serial_to_date(serial: f64) -> InspectionDate {
    date_from_spreadsheet_serial(serial)
        .map(InspectionDate::Valid)
        .unwrap_or(InspectionDate::Invalid)
}

/// Date cell rendered as `YYYY-MM-DD`, `Invalid Date`, or the placeholder when blank
///
/// # Examples
///
/// ```
/// use qit_common::normalize::normalize_date_text;
/// use serde_json::json;
///
/// assert_eq!(normalize_date_text(&json!("2025-03-21")), "2025-03-21");
/// assert_eq!(normalize_date_text(&json!(45000)), "2023-03-15");
/// assert_eq!(normalize_date_text(&json!(1e12)), "Invalid Date");
/// ```
pub fn normalize_date_text(value: &Value) -> String {
    normalize_date(value)
        .map(|date| date.to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Cells of one record, addressed by display header
struct Cells<'a> {
    by_header: HashMap<&'static str, &'a Value>,
}

impl<'a> Cells<'a> {
    fn new(record: &'a RawRecord) -> Self {
        let mut by_header = HashMap::new();
        for (key, value) in record {
            if let Some(header) = resolve_header(key) {
                // A later alias never displaces a non-blank earlier cell
                let keep_existing = by_header
                    .get(header)
                    .map(|existing: &&Value| cell_text(existing).is_some())
                    .unwrap_or(false);
                if !keep_existing {
                    by_header.insert(header, value);
                }
            }
        }
        Self { by_header }
    }

    fn raw(&self, header: &'static str) -> Option<&'a Value> {
        self.by_header.get(header).copied()
    }

    fn text(&self, header: &'static str) -> Option<String> {
        self.raw(header).and_then(cell_text)
    }

    fn required(&self, header: &'static str) -> Result<String, NormalizeError> {
        self.text(header).ok_or(NormalizeError::MissingField(header))
    }

    fn or_placeholder(&self, header: &'static str) -> String {
        self.text(header).unwrap_or_else(|| PLACEHOLDER.to_string())
    }
}

/// Normalize one raw record
pub fn normalize_record(record: &RawRecord) -> Result<InspectionRow, NormalizeError> {
    let cells = Cells::new(record);

    let id = match cells.text(headers::ID) {
        Some(text) => text.parse::<RecordId>().unwrap_or_else(|_| {
            warn!(id = %text, "Record id is not a UUID, assigning a new one");
            RecordId::new()
        }),
        None => RecordId::new(),
    };

    let inspection_date = cells
        .raw(headers::INSPECTION_DATE)
        .and_then(normalize_date)
        .ok_or(NormalizeError::MissingField(headers::INSPECTION_DATE))?;

    let result = match cells.text(headers::RESULT) {
        Some(text) => InspectionResult::parse(&text).unwrap_or_else(|| {
            warn!(result = %text, "Unrecognised result value, leaving unset");
            InspectionResult::Unset
        }),
        None => InspectionResult::Unset,
    };

    let estimated_completion = cells
        .raw(headers::ESTIMATED_COMPLETION)
        .map(normalize_date_text)
        .unwrap_or_else(|| PLACEHOLDER.to_string());

    Ok(InspectionRow {
        id,
        inspection_date,
        project: cells.required(headers::PROJECT)?,
        stage: cells.required(headers::STAGE)?,
        line: cells.required(headers::LINE)?,
        shift: cells.required(headers::SHIFT)?,
        carton_id: cells.required(headers::CARTON_ID)?,
        auto_usn: cells.or_placeholder(headers::AUTO_USN),
        manual_usn: cells
            .text(headers::MANUAL_USN)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        category: cells.or_placeholder(headers::CATEGORY),
        defect_location: cells.or_placeholder(headers::DEFECT_LOCATION),
        defect_symptom: cells.or_placeholder(headers::DEFECT_SYMPTOM),
        error_code: cells.or_placeholder(headers::ERROR_CODE),
        spec: cells.or_placeholder(headers::SPEC),
        actual: cells.or_placeholder(headers::ACTUAL),
        defect_image: cells.text(headers::DEFECT_IMAGE),
        result,
        containment_action: cells.or_placeholder(headers::CONTAINMENT_ACTION),
        root_cause: cells.or_placeholder(headers::ROOT_CAUSE),
        corrective_action: cells.or_placeholder(headers::CORRECTIVE_ACTION),
        four_m: cells.text(headers::FOUR_M).and_then(|t| FourM::parse(&t)),
        estimated_completion,
        final_result: cells
            .text(headers::FINAL_RESULT)
            .and_then(|t| FinalResult::parse(&t)),
    })
}

/// Rows normalized from a batch of records, with the records that were skipped
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub rows: Vec<InspectionRow>,
    /// (zero-based record position, reason)
    pub skipped: Vec<(usize, NormalizeError)>,
}

/// Normalize a sequence of records, skipping (and logging) unusable ones
///
/// A bad record never fails the whole batch.
pub fn normalize_records<'a, I>(records: I) -> NormalizedBatch
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut batch = NormalizedBatch::default();
    for (position, record) in records.into_iter().enumerate() {
        match normalize_record(record) {
            Ok(row) => batch.rows.push(row),
            Err(e) => {
                warn!(position, error = %e, "Skipping record");
                batch.skipped.push((position, e));
            }
        }
    }
    batch
}
