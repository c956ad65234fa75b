//! Draft inspection batch
//!
//! A draft is opened for one carton and holds one row per catalog serial.
//! Operators scan or type manual serials, annotate defects and attach
//! photos; the draft becomes committable once every row has a manual
//! serial (matched, or marked "Not Available").

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CartonCatalog;
use crate::defect::{derive_error_code, derive_result, is_no_defect, is_other, symptom_for_label};
use crate::model::{
    FinalResult, FourM, InspectionDate, InspectionResult, InspectionRow, RecordId, NOT_AVAILABLE,
    NO_DEFECT, PLACEHOLDER,
};
use crate::{time, Error, Result};

/// Batch-level fields entered when a draft is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHeader {
    pub inspection_date: NaiveDate,
    pub project: String,
    pub stage: String,
    pub line: String,
    pub shift: String,
    pub carton_id: String,
}

impl BatchHeader {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("project", &self.project),
            ("stage", &self.stage),
            ("line", &self.line),
            ("shift", &self.shift),
            ("cartonId", &self.carton_id),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{} is required", name)));
            }
        }
        Ok(())
    }
}

/// Defect fields entered for one unit
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectAnnotation {
    #[serde(default)]
    pub category: Option<String>,
    pub location: String,
    /// Free text, required when `location` is "Other"
    #[serde(default)]
    pub location_other: Option<String>,
    pub symptom: String,
    /// Free text, required when `symptom` is "Other"
    #[serde(default)]
    pub symptom_other: Option<String>,
    /// Overrides the derived error code
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub actual: Option<String>,
}

/// Root-cause and follow-up fields for one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    #[serde(default)]
    pub containment_action: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub corrective_action: Option<String>,
    #[serde(default)]
    pub four_m: Option<FourM>,
    #[serde(default)]
    pub estimated_completion: Option<NaiveDate>,
    #[serde(default)]
    pub final_result: Option<FinalResult>,
}

/// One unit in a draft batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRow {
    pub auto_usn: String,
    pub manual_usn: Option<String>,
    pub category: String,
    pub defect_location: String,
    pub defect_symptom: String,
    pub error_code: String,
    pub spec: String,
    pub actual: String,
    pub defect_image: Option<String>,
    /// Effective result: the override when set, otherwise derived
    pub result: InspectionResult,
    pub result_overridden: bool,
    pub follow_up: FollowUp,
}

impl DraftRow {
    fn new(auto_usn: &str) -> Self {
        Self {
            auto_usn: auto_usn.to_string(),
            manual_usn: None,
            category: PLACEHOLDER.to_string(),
            defect_location: NO_DEFECT.to_string(),
            defect_symptom: NO_DEFECT.to_string(),
            error_code: PLACEHOLDER.to_string(),
            spec: PLACEHOLDER.to_string(),
            actual: PLACEHOLDER.to_string(),
            defect_image: None,
            result: InspectionResult::Ok,
            result_overridden: false,
            follow_up: FollowUp::default(),
        }
    }

    /// Manual serial equals the catalog serial; the manual serial is now fixed
    pub fn is_matched(&self) -> bool {
        self.manual_usn.as_deref() == Some(self.auto_usn.as_str())
    }

    fn refresh_result(&mut self) {
        if !self.result_overridden {
            self.result = derive_result(&self.defect_location, &self.defect_symptom);
        }
    }
}

fn text_or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Resolve an open-vocabulary value, replacing "Other" with its free text
fn resolve_open_value(field: &str, value: &str, other: Option<&str>) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    if is_other(value) {
        return match other.map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(Error::InvalidInput(format!(
                "{} is \"Other\" but no description was given",
                field
            ))),
        };
    }
    Ok(value.to_string())
}

/// In-progress inspection of one carton
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftBatch {
    pub id: Uuid,
    pub header: BatchHeader,
    pub rows: Vec<DraftRow>,
    pub created_at: DateTime<Utc>,
}

impl DraftBatch {
    /// Open a draft with one row per catalog serial of the carton
    pub fn open(mut header: BatchHeader, catalog: &CartonCatalog) -> Result<Self> {
        header.validate()?;
        header.carton_id = header.carton_id.trim().to_string();
        let serials = catalog.serials(&header.carton_id).ok_or_else(|| {
            Error::InvalidInput(format!("Unknown carton {}", header.carton_id))
        })?;
        let rows = serials.iter().map(|usn| DraftRow::new(usn)).collect();
        Ok(Self {
            id: Uuid::new_v4(),
            header,
            rows,
            created_at: time::now(),
        })
    }

    pub fn row(&self, auto_usn: &str) -> Option<&DraftRow> {
        self.rows.iter().find(|r| r.auto_usn == auto_usn)
    }

    fn row_mut(&mut self, auto_usn: &str) -> Result<&mut DraftRow> {
        self.rows
            .iter_mut()
            .find(|r| r.auto_usn == auto_usn)
            .ok_or_else(|| Error::NotFound(format!("Unit {} is not in this batch", auto_usn)))
    }

    /// Match a scanned serial against the carton and record it
    ///
    /// Scanning an already-matched serial again is a no-op.
    pub fn record_scan(&mut self, scanned: &str) -> Result<&DraftRow> {
        let scanned = scanned.trim();
        if scanned.is_empty() {
            return Err(Error::InvalidInput("Scanned serial is empty".to_string()));
        }
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.auto_usn.eq_ignore_ascii_case(scanned))
            .ok_or_else(|| Error::UnmatchedSerial(scanned.to_string()))?;
        row.manual_usn = Some(row.auto_usn.clone());
        Ok(&*row)
    }

    /// Record a typed serial for a specific unit
    pub fn enter_manual_usn(&mut self, auto_usn: &str, typed: &str) -> Result<&DraftRow> {
        let typed = typed.trim();
        let row = self.row_mut(auto_usn)?;
        if !row.auto_usn.eq_ignore_ascii_case(typed) {
            if row.is_matched() {
                return Err(Error::InvalidInput(format!(
                    "Unit {} is already matched",
                    row.auto_usn
                )));
            }
            return Err(Error::UnmatchedSerial(typed.to_string()));
        }
        row.manual_usn = Some(row.auto_usn.clone());
        Ok(&*row)
    }

    /// Mark a unit whose serial cannot be read
    pub fn mark_not_available(&mut self, auto_usn: &str) -> Result<&DraftRow> {
        let row = self.row_mut(auto_usn)?;
        if row.is_matched() {
            return Err(Error::InvalidInput(format!(
                "Unit {} is already matched",
                row.auto_usn
            )));
        }
        row.manual_usn = Some(NOT_AVAILABLE.to_string());
        Ok(&*row)
    }

    /// Record defect fields; the result is re-derived unless overridden
    pub fn annotate(&mut self, auto_usn: &str, annotation: DefectAnnotation) -> Result<&DraftRow> {
        let location = resolve_open_value(
            "location",
            &annotation.location,
            annotation.location_other.as_deref(),
        )?;
        let symptom_is_other = is_other(&annotation.symptom);
        let symptom = resolve_open_value(
            "symptom",
            &annotation.symptom,
            annotation.symptom_other.as_deref(),
        )?;
        let error_code = match annotation.error_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ if symptom_is_other => symptom.clone(),
            _ => derive_error_code(&symptom),
        };

        let row = self.row_mut(auto_usn)?;
        row.category = text_or_placeholder(annotation.category.as_deref());
        row.defect_location = location;
        row.defect_symptom = symptom;
        row.error_code = error_code;
        row.spec = text_or_placeholder(annotation.spec.as_deref());
        row.actual = text_or_placeholder(annotation.actual.as_deref());
        row.refresh_result();
        Ok(&*row)
    }

    /// Attach a photo reference (URL or data URI)
    pub fn attach_image(&mut self, auto_usn: &str, reference: String) -> Result<&DraftRow> {
        if reference.trim().is_empty() {
            return Err(Error::InvalidInput("Image is empty".to_string()));
        }
        let row = self.row_mut(auto_usn)?;
        row.defect_image = Some(reference);
        Ok(&*row)
    }

    /// Photo attached to a unit; an error when there is none
    pub fn image_of(&self, auto_usn: &str) -> Result<&str> {
        let row = self
            .row(auto_usn)
            .ok_or_else(|| Error::NotFound(format!("Unit {} is not in this batch", auto_usn)))?;
        row.defect_image
            .as_deref()
            .ok_or_else(|| Error::MissingImage(auto_usn.to_string()))
    }

    /// Apply a classifier label to a unit that has a photo
    ///
    /// A detected defect clears a "No Defect" location to the placeholder so
    /// the operator is prompted to fill it in.
    pub fn apply_classification(&mut self, auto_usn: &str, label: &str) -> Result<&DraftRow> {
        self.image_of(auto_usn)?;
        let symptom = symptom_for_label(label).to_string();
        let row = self.row_mut(auto_usn)?;
        if !is_no_defect(&symptom) && is_no_defect(&row.defect_location) {
            row.defect_location = PLACEHOLDER.to_string();
        }
        row.error_code = derive_error_code(&symptom);
        row.defect_symptom = symptom;
        row.refresh_result();
        Ok(&*row)
    }

    /// Set or clear a manual result override
    pub fn override_result(
        &mut self,
        auto_usn: &str,
        result: Option<InspectionResult>,
    ) -> Result<&DraftRow> {
        let row = self.row_mut(auto_usn)?;
        match result {
            Some(result) => {
                row.result = result;
                row.result_overridden = true;
            }
            None => {
                row.result_overridden = false;
                row.refresh_result();
            }
        }
        Ok(&*row)
    }

    /// Replace the follow-up fields of a unit
    pub fn set_follow_up(&mut self, auto_usn: &str, follow_up: FollowUp) -> Result<&DraftRow> {
        let row = self.row_mut(auto_usn)?;
        row.follow_up = follow_up;
        Ok(&*row)
    }

    /// Catalog serials still lacking a manual serial
    pub fn missing_manual(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| r.manual_usn.is_none())
            .map(|r| r.auto_usn.as_str())
            .collect()
    }

    pub fn is_submittable(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.manual_usn.is_some())
    }

    /// Convert the draft into records ready for the store, with fresh ids
    pub fn commit_rows(&self) -> Result<Vec<InspectionRow>> {
        let missing = self.missing_manual().len();
        if missing > 0 {
            return Err(Error::IncompleteBatch { missing });
        }
        if self.rows.is_empty() {
            return Err(Error::InvalidInput("Batch has no rows left to submit".to_string()));
        }
        let header = &self.header;
        self.rows
            .iter()
            .map(|row| {
                let manual_usn = row
                    .manual_usn
                    .clone()
                    .ok_or(Error::IncompleteBatch { missing: 1 })?;
                Ok(InspectionRow {
                    id: RecordId::new(),
                    inspection_date: InspectionDate::Valid(header.inspection_date),
                    project: header.project.trim().to_string(),
                    stage: header.stage.trim().to_string(),
                    line: header.line.trim().to_string(),
                    shift: header.shift.trim().to_string(),
                    carton_id: header.carton_id.clone(),
                    auto_usn: row.auto_usn.clone(),
                    manual_usn,
                    category: row.category.clone(),
                    defect_location: row.defect_location.clone(),
                    defect_symptom: row.defect_symptom.clone(),
                    error_code: row.error_code.clone(),
                    spec: row.spec.clone(),
                    actual: row.actual.clone(),
                    defect_image: row.defect_image.clone(),
                    result: row.result,
                    containment_action: text_or_placeholder(
                        row.follow_up.containment_action.as_deref(),
                    ),
                    root_cause: text_or_placeholder(row.follow_up.root_cause.as_deref()),
                    corrective_action: text_or_placeholder(
                        row.follow_up.corrective_action.as_deref(),
                    ),
                    four_m: row.follow_up.four_m,
                    estimated_completion: row
                        .follow_up
                        .estimated_completion
                        .map(|d| InspectionDate::Valid(d).to_string())
                        .unwrap_or_else(|| PLACEHOLDER.to_string()),
                    final_result: row.follow_up.final_result,
                })
            })
            .collect()
    }

    /// Drop rows that were written to the store, leaving the rest for a retry
    pub fn remove_rows(&mut self, auto_usns: &[String]) {
        self.rows.retain(|r| !auto_usns.contains(&r.auto_usn));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DEMO_CARTON_ID;

    fn header(carton: &str) -> BatchHeader {
        BatchHeader {
            inspection_date: NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
            project: "PX1".into(),
            stage: "FQC".into(),
            line: "L2".into(),
            shift: "Day".into(),
            carton_id: carton.into(),
        }
    }

    fn demo() -> DraftBatch {
        DraftBatch::open(header(DEMO_CARTON_ID), &CartonCatalog::builtin()).unwrap()
    }

    fn first_serial(batch: &DraftBatch) -> String {
        batch.rows[0].auto_usn.clone()
    }

    #[test]
    fn test_open_creates_one_row_per_serial() {
        let batch = demo();
        assert_eq!(batch.rows.len(), 5);
        assert!(batch.rows.iter().all(|r| r.manual_usn.is_none()));
        assert_eq!(batch.missing_manual().len(), 5);
        assert!(!batch.is_submittable());
        assert!(matches!(
            batch.commit_rows(),
            Err(Error::IncompleteBatch { missing: 5 })
        ));
    }

    #[test]
    fn test_open_validates_header() {
        let catalog = CartonCatalog::builtin();
        let mut h = header(DEMO_CARTON_ID);
        h.shift = "  ".into();
        assert!(matches!(DraftBatch::open(h, &catalog), Err(Error::InvalidInput(_))));
        assert!(matches!(
            DraftBatch::open(header("999"), &catalog),
            Err(Error::InvalidInput(msg)) if msg.contains("Unknown carton")
        ));
    }

    #[test]
    fn test_scan_matches_and_is_idempotent() {
        let mut batch = demo();
        let serial = first_serial(&batch);
        let row = batch.record_scan(&format!(" {} ", serial.to_lowercase())).unwrap();
        assert_eq!(row.manual_usn.as_deref(), Some(serial.as_str()));
        assert!(row.is_matched());
        batch.record_scan(&serial).unwrap();
        assert_eq!(batch.missing_manual().len(), 4);
    }

    #[test]
    fn test_scan_unmatched() {
        let mut batch = demo();
        assert!(matches!(
            batch.record_scan("NOT-IN-CARTON"),
            Err(Error::UnmatchedSerial(s)) if s == "NOT-IN-CARTON"
        ));
        assert!(matches!(batch.record_scan("  "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_manual_entry_rules() {
        let mut batch = demo();
        let serial = first_serial(&batch);
        assert!(matches!(
            batch.enter_manual_usn(&serial, "WRONG"),
            Err(Error::UnmatchedSerial(_))
        ));
        batch.mark_not_available(&serial).unwrap();
        assert_eq!(batch.rows[0].manual_usn.as_deref(), Some(NOT_AVAILABLE));
        // still writable: not matched yet
        batch.enter_manual_usn(&serial, &serial).unwrap();
        assert!(batch.rows[0].is_matched());
        // locked once matched
        assert!(matches!(
            batch.enter_manual_usn(&serial, "OTHER"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(batch.mark_not_available(&serial), Err(Error::InvalidInput(_))));
        assert!(matches!(
            batch.enter_manual_usn("NOPE", "NOPE"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_annotation_derives_result_and_code() {
        let mut batch = demo();
        let serial = first_serial(&batch);
        assert_eq!(batch.rows[0].result, InspectionResult::Ok);

        let row = batch
            .annotate(
                &serial,
                DefectAnnotation {
                    location: "Screen".into(),
                    symptom: "Cracked Screen".into(),
                    spec: Some("0 cracks".into()),
                    actual: Some("1 crack".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(row.result, InspectionResult::Ng);
        assert_eq!(row.error_code, "CS");
        assert_eq!(row.category, PLACEHOLDER);

        let row = batch
            .annotate(
                &serial,
                DefectAnnotation {
                    location: NO_DEFECT.into(),
                    symptom: NO_DEFECT.into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(row.result, InspectionResult::Ok);
        assert_eq!(row.error_code, PLACEHOLDER);
    }

    #[test]
    fn test_annotation_other_escape() {
        let mut batch = demo();
        let serial = first_serial(&batch);
        let missing = batch.annotate(
            &serial,
            DefectAnnotation {
                location: "Other".into(),
                symptom: "Dent".into(),
                ..Default::default()
            },
        );
        assert!(matches!(missing, Err(Error::InvalidInput(_))));

        let row = batch
            .annotate(
                &serial,
                DefectAnnotation {
                    location: "Other".into(),
                    location_other: Some("Hinge".into()),
                    symptom: "other".into(),
                    symptom_other: Some("Loose hinge".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(row.defect_location, "Hinge");
        assert_eq!(row.defect_symptom, "Loose hinge");
        assert_eq!(row.error_code, "Loose hinge");
    }

    #[test]
    fn test_override_is_sticky_until_cleared() {
        let mut batch = demo();
        let serial = first_serial(&batch);
        batch
            .override_result(&serial, Some(InspectionResult::Observing))
            .unwrap();
        let row = batch
            .annotate(
                &serial,
                DefectAnnotation {
                    location: "Back".into(),
                    symptom: "Dent".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(row.result, InspectionResult::Observing);

        let row = batch.override_result(&serial, None).unwrap();
        assert_eq!(row.result, InspectionResult::Ng);
        assert!(!row.result_overridden);
    }

    #[test]
    fn test_classification_needs_image() {
        let mut batch = demo();
        let serial = first_serial(&batch);
        assert!(matches!(
            batch.apply_classification(&serial, "Dent"),
            Err(Error::MissingImage(_))
        ));

        batch
            .attach_image(&serial, "data:image/png;base64,AAAA".into())
            .unwrap();
        let row = batch.apply_classification(&serial, "Dent").unwrap();
        assert_eq!(row.defect_symptom, "Dent");
        assert_eq!(row.defect_location, PLACEHOLDER);
        assert_eq!(row.result, InspectionResult::Ng);

        let row = batch
            .apply_classification(&serial, crate::defect::NO_VISIBLE_DEFECT)
            .unwrap();
        assert_eq!(row.defect_symptom, NO_DEFECT);
    }

    #[test]
    fn test_commit_rows() {
        let mut batch = demo();
        let serials: Vec<String> = batch.rows.iter().map(|r| r.auto_usn.clone()).collect();
        for s in &serials[..4] {
            batch.record_scan(s).unwrap();
        }
        batch.mark_not_available(&serials[4]).unwrap();
        batch
            .set_follow_up(
                &serials[0],
                FollowUp {
                    root_cause: Some("Fixture wear".into()),
                    four_m: Some(FourM::Machine),
                    estimated_completion: NaiveDate::from_ymd_opt(2025, 4, 1),
                    final_result: Some(FinalResult::OnGoing),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(batch.is_submittable());

        let rows = batch.commit_rows().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].inspection_date.to_string(), "2025-03-21");
        assert_eq!(rows[0].root_cause, "Fixture wear");
        assert_eq!(rows[0].estimated_completion, "2025-04-01");
        assert_eq!(rows[0].containment_action, PLACEHOLDER);
        assert_eq!(rows[4].manual_usn, NOT_AVAILABLE);
        assert_ne!(rows[0].id, rows[1].id);
    }

    #[test]
    fn test_remove_rows() {
        let mut batch = demo();
        let first = first_serial(&batch);
        batch.remove_rows(&[first.clone()]);
        assert_eq!(batch.rows.len(), 4);
        assert!(batch.row(&first).is_none());
    }
}
