//! Inspection record model
//!
//! One [`InspectionRow`] per inspected unit. Rows travel between the server
//! and record stores as flat JSON objects keyed by the display headers in
//! [`headers`]; see [`InspectionRow::to_record`] and
//! [`crate::normalize::normalize_record`] for the two directions.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Placeholder for an absent or blank field
pub const PLACEHOLDER: &str = "-";

/// Manual serial sentinel for a unit that could not be scanned
pub const NOT_AVAILABLE: &str = "Not Available";

/// Location/symptom sentinel meaning the unit passed inspection
pub const NO_DEFECT: &str = "No Defect";

/// Escape value for open-vocabulary location and symptom fields
pub const OTHER: &str = "Other";

/// Marker rendered for dates that could not be converted
pub const INVALID_DATE: &str = "Invalid Date";

/// Raw string-keyed record as produced by a tabular source or remote store
pub type RawRecord = Map<String, Value>;

/// Display headers used as keys of the record wire form
pub mod headers {
    pub const ID: &str = "ID";
    pub const INSPECTION_DATE: &str = "Inspection Date";
    pub const PROJECT: &str = "Project";
    pub const STAGE: &str = "Stage";
    pub const LINE: &str = "Line";
    pub const SHIFT: &str = "Shift";
    pub const CARTON_ID: &str = "Carton ID";
    pub const AUTO_USN: &str = "Auto USN";
    pub const MANUAL_USN: &str = "Manual USN";
    pub const CATEGORY: &str = "Category";
    pub const DEFECT_LOCATION: &str = "Defect Location";
    pub const DEFECT_SYMPTOM: &str = "Defect Symptom";
    pub const ERROR_CODE: &str = "Error Code";
    pub const SPEC: &str = "Spec";
    pub const ACTUAL: &str = "Actual";
    pub const DEFECT_IMAGE: &str = "Defect Image";
    pub const RESULT: &str = "Result";
    pub const CONTAINMENT_ACTION: &str = "Containment Action";
    pub const ROOT_CAUSE: &str = "Root Cause";
    pub const CORRECTIVE_ACTION: &str = "Corrective Action";
    pub const FOUR_M: &str = "4M";
    pub const ESTIMATED_COMPLETION: &str = "Estimated Completion";
    pub const FINAL_RESULT: &str = "Final Result";

    /// Every header in record column order
    pub const ALL: [&str; 23] = [
        ID,
        INSPECTION_DATE,
        PROJECT,
        STAGE,
        LINE,
        SHIFT,
        CARTON_ID,
        AUTO_USN,
        MANUAL_USN,
        CATEGORY,
        DEFECT_LOCATION,
        DEFECT_SYMPTOM,
        ERROR_CODE,
        SPEC,
        ACTUAL,
        DEFECT_IMAGE,
        RESULT,
        CONTAINMENT_ACTION,
        ROOT_CAUSE,
        CORRECTIVE_ACTION,
        FOUR_M,
        ESTIMATED_COMPLETION,
        FINAL_RESULT,
    ];

    /// Headers that may be changed on a committed record
    ///
    /// The identifier and the serial assigned from the carton catalog are
    /// fixed once written.
    pub fn is_updatable(header: &str) -> bool {
        ALL.contains(&header) && header != ID && header != AUTO_USN
    }
}

/// Stable record identifier, assigned when a record is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Inspection date: a calendar date, or the marker for an unconvertible value
///
/// Orders chronologically, with `Invalid` before every valid date so a
/// descending sort places unreadable batches last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InspectionDate {
    Valid(NaiveDate),
    Invalid,
}

impl InspectionDate {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            InspectionDate::Valid(date) => Some(*date),
            InspectionDate::Invalid => None,
        }
    }
}

impl From<NaiveDate> for InspectionDate {
    fn from(date: NaiveDate) -> Self {
        InspectionDate::Valid(date)
    }
}

impl Ord for InspectionDate {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (InspectionDate::Valid(a), InspectionDate::Valid(b)) => a.cmp(b),
            (InspectionDate::Valid(_), InspectionDate::Invalid) => Ordering::Greater,
            (InspectionDate::Invalid, InspectionDate::Valid(_)) => Ordering::Less,
            (InspectionDate::Invalid, InspectionDate::Invalid) => Ordering::Equal,
        }
    }
}

impl PartialOrd for InspectionDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InspectionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectionDate::Valid(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            InspectionDate::Invalid => f.write_str(INVALID_DATE),
        }
    }
}

impl FromStr for InspectionDate {
    type Err = chrono::ParseError;

    /// Parses `YYYY-MM-DD`; the `Invalid Date` marker parses to `Invalid`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == INVALID_DATE {
            return Ok(InspectionDate::Invalid);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(InspectionDate::Valid)
    }
}

impl Serialize for InspectionDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InspectionDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Inspection outcome of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InspectionResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NG")]
    Ng,
    Observing,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl InspectionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionResult::Ok => "OK",
            InspectionResult::Ng => "NG",
            InspectionResult::Observing => "Observing",
            InspectionResult::Unset => "",
        }
    }

    /// Case-insensitive parse; blank and placeholder text mean `Unset`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || text == PLACEHOLDER {
            return Some(InspectionResult::Unset);
        }
        match text.to_ascii_lowercase().as_str() {
            "ok" => Some(InspectionResult::Ok),
            "ng" => Some(InspectionResult::Ng),
            "observing" => Some(InspectionResult::Observing),
            _ => None,
        }
    }
}

/// Root-cause classification axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FourM {
    Man,
    Material,
    Method,
    Machine,
}

impl FourM {
    pub fn as_str(&self) -> &'static str {
        match self {
            FourM::Man => "Man",
            FourM::Material => "Material",
            FourM::Method => "Method",
            FourM::Machine => "Machine",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "man" => Some(FourM::Man),
            "material" => Some(FourM::Material),
            "method" => Some(FourM::Method),
            "machine" => Some(FourM::Machine),
            _ => None,
        }
    }
}

/// Follow-up status of a defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalResult {
    #[serde(rename = "On going")]
    OnGoing,
    Monitoring,
    Closed,
}

impl FinalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalResult::OnGoing => "On going",
            FinalResult::Monitoring => "Monitoring",
            FinalResult::Closed => "Closed",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "on going" | "ongoing" | "on-going" => Some(FinalResult::OnGoing),
            "monitoring" => Some(FinalResult::Monitoring),
            "closed" => Some(FinalResult::Closed),
            _ => None,
        }
    }
}

/// One inspected-unit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRow {
    pub id: RecordId,
    pub inspection_date: InspectionDate,
    pub project: String,
    pub stage: String,
    pub line: String,
    pub shift: String,
    pub carton_id: String,
    pub auto_usn: String,
    pub manual_usn: String,
    pub category: String,
    pub defect_location: String,
    pub defect_symptom: String,
    pub error_code: String,
    pub spec: String,
    pub actual: String,
    pub defect_image: Option<String>,
    pub result: InspectionResult,
    pub containment_action: String,
    pub root_cause: String,
    pub corrective_action: String,
    pub four_m: Option<FourM>,
    pub estimated_completion: String,
    pub final_result: Option<FinalResult>,
}

impl InspectionRow {
    /// Serialize to the flat record wire form keyed by display headers
    pub fn to_record(&self) -> RawRecord {
        fn text(value: &str) -> Value {
            if value.trim().is_empty() {
                Value::String(PLACEHOLDER.to_string())
            } else {
                Value::String(value.to_string())
            }
        }

        let mut record = Map::new();
        record.insert(headers::ID.into(), Value::String(self.id.to_string()));
        record.insert(
            headers::INSPECTION_DATE.into(),
            Value::String(self.inspection_date.to_string()),
        );
        record.insert(headers::PROJECT.into(), text(&self.project));
        record.insert(headers::STAGE.into(), text(&self.stage));
        record.insert(headers::LINE.into(), text(&self.line));
        record.insert(headers::SHIFT.into(), text(&self.shift));
        record.insert(headers::CARTON_ID.into(), text(&self.carton_id));
        record.insert(headers::AUTO_USN.into(), text(&self.auto_usn));
        record.insert(headers::MANUAL_USN.into(), text(&self.manual_usn));
        record.insert(headers::CATEGORY.into(), text(&self.category));
        record.insert(headers::DEFECT_LOCATION.into(), text(&self.defect_location));
        record.insert(headers::DEFECT_SYMPTOM.into(), text(&self.defect_symptom));
        record.insert(headers::ERROR_CODE.into(), text(&self.error_code));
        record.insert(headers::SPEC.into(), text(&self.spec));
        record.insert(headers::ACTUAL.into(), text(&self.actual));
        record.insert(
            headers::DEFECT_IMAGE.into(),
            text(self.defect_image.as_deref().unwrap_or_default()),
        );
        record.insert(headers::RESULT.into(), text(self.result.as_str()));
        record.insert(headers::CONTAINMENT_ACTION.into(), text(&self.containment_action));
        record.insert(headers::ROOT_CAUSE.into(), text(&self.root_cause));
        record.insert(headers::CORRECTIVE_ACTION.into(), text(&self.corrective_action));
        record.insert(
            headers::FOUR_M.into(),
            text(self.four_m.map(|m| m.as_str()).unwrap_or_default()),
        );
        record.insert(
            headers::ESTIMATED_COMPLETION.into(),
            text(&self.estimated_completion),
        );
        record.insert(
            headers::FINAL_RESULT.into(),
            text(self.final_result.map(|r| r.as_str()).unwrap_or_default()),
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> InspectionDate {
        InspectionDate::Valid(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_invalid_date_sorts_before_valid() {
        assert!(InspectionDate::Invalid < date(1900, 1, 1));
        assert!(date(2025, 3, 21) > date(2025, 3, 20));
    }

    #[test]
    fn test_date_display_and_parse() {
        assert_eq!(date(2025, 3, 21).to_string(), "2025-03-21");
        assert_eq!(InspectionDate::Invalid.to_string(), "Invalid Date");
        assert_eq!("2025-03-21".parse::<InspectionDate>().unwrap(), date(2025, 3, 21));
        assert_eq!(
            "Invalid Date".parse::<InspectionDate>().unwrap(),
            InspectionDate::Invalid
        );
        assert!("21/03/2025".parse::<InspectionDate>().is_err());
    }

    #[test]
    fn test_result_parse() {
        assert_eq!(InspectionResult::parse("ok"), Some(InspectionResult::Ok));
        assert_eq!(InspectionResult::parse(" NG "), Some(InspectionResult::Ng));
        assert_eq!(InspectionResult::parse("-"), Some(InspectionResult::Unset));
        assert_eq!(InspectionResult::parse("maybe"), None);
    }

    #[test]
    fn test_result_serde_names() {
        let json = serde_json::to_string(&InspectionResult::Ng).unwrap();
        assert_eq!(json, "\"NG\"");
        let unset: InspectionResult = serde_json::from_str("\"\"").unwrap();
        assert_eq!(unset, InspectionResult::Unset);
    }

    #[test]
    fn test_final_result_parse() {
        assert_eq!(FinalResult::parse("On going"), Some(FinalResult::OnGoing));
        assert_eq!(FinalResult::parse("closed"), Some(FinalResult::Closed));
        assert_eq!(FinalResult::parse("done"), None);
    }

    #[test]
    fn test_updatable_headers() {
        assert!(headers::is_updatable(headers::MANUAL_USN));
        assert!(headers::is_updatable(headers::ROOT_CAUSE));
        assert!(!headers::is_updatable(headers::ID));
        assert!(!headers::is_updatable(headers::AUTO_USN));
        assert!(!headers::is_updatable("Colour"));
    }
}
