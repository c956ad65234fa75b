//! Grouping engine
//!
//! Folds flat inspection rows into batch → auto serial → manual serial →
//! defect item. Sub-groups keep the order in which their key was first
//! seen; only the top level is re-ordered (newest batch first, stable).

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{
    FinalResult, FourM, InspectionDate, InspectionResult, InspectionRow, RecordId,
};

/// Composite key identifying one physical inspection batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    pub inspection_date: InspectionDate,
    pub line: String,
    pub stage: String,
    pub shift: String,
    pub project: String,
    pub carton_id: String,
}

impl GroupKey {
    pub fn of(row: &InspectionRow) -> Self {
        Self {
            inspection_date: row.inspection_date,
            line: row.line.clone(),
            stage: row.stage.clone(),
            shift: row.shift.clone(),
            project: row.project.clone(),
            carton_id: row.carton_id.clone(),
        }
    }
}

/// The non-identifying part of a row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectItem {
    pub id: RecordId,
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

impl From<&InspectionRow> for DefectItem {
    fn from(row: &InspectionRow) -> Self {
        Self {
            id: row.id,
            category: row.category.clone(),
            defect_location: row.defect_location.clone(),
            defect_symptom: row.defect_symptom.clone(),
            error_code: row.error_code.clone(),
            spec: row.spec.clone(),
            actual: row.actual.clone(),
            defect_image: row.defect_image.clone(),
            result: row.result,
            containment_action: row.containment_action.clone(),
            root_cause: row.root_cause.clone(),
            corrective_action: row.corrective_action.clone(),
            four_m: row.four_m,
            estimated_completion: row.estimated_completion.clone(),
            final_result: row.final_result,
        }
    }
}

/// Items recorded under one manually-entered serial
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSerialGroup {
    pub manual_usn: String,
    pub items: Vec<DefectItem>,
}

impl ManualSerialGroup {
    pub fn leaf_count(&self) -> usize {
        self.items.len()
    }
}

/// Manual-serial groups recorded under one catalog serial
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSerialGroup {
    pub auto_usn: String,
    pub manual_groups: Vec<ManualSerialGroup>,
}

impl AutoSerialGroup {
    pub fn leaf_count(&self) -> usize {
        self.manual_groups.iter().map(ManualSerialGroup::leaf_count).sum()
    }
}

/// One displayed inspection batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGroup {
    pub key: GroupKey,
    pub auto_groups: Vec<AutoSerialGroup>,
}

impl BatchGroup {
    pub fn leaf_count(&self) -> usize {
        self.auto_groups.iter().map(AutoSerialGroup::leaf_count).sum()
    }
}

/// Group rows into batches, newest batch first
///
/// Sentinel serials ("-", "Not Available") are ordinary keys scoped to
/// their parent group, so they are never merged across auto serials.
pub fn group_rows(rows: &[InspectionRow]) -> Vec<BatchGroup> {
    let mut batches: Vec<BatchGroup> = Vec::new();
    let mut batch_index: HashMap<GroupKey, usize> = HashMap::new();
    let mut auto_index: HashMap<(usize, &str), usize> = HashMap::new();
    let mut manual_index: HashMap<(usize, usize, &str), usize> = HashMap::new();

    for row in rows {
        let key = GroupKey::of(row);
        let b = match batch_index.get(&key) {
            Some(&b) => b,
            None => {
                batches.push(BatchGroup {
                    key: key.clone(),
                    auto_groups: Vec::new(),
                });
                batch_index.insert(key, batches.len() - 1);
                batches.len() - 1
            }
        };
        let batch = &mut batches[b];

        let a = *auto_index.entry((b, row.auto_usn.as_str())).or_insert_with(|| {
            batch.auto_groups.push(AutoSerialGroup {
                auto_usn: row.auto_usn.clone(),
                manual_groups: Vec::new(),
            });
            batch.auto_groups.len() - 1
        });
        let auto = &mut batch.auto_groups[a];

        let m = *manual_index
            .entry((b, a, row.manual_usn.as_str()))
            .or_insert_with(|| {
                auto.manual_groups.push(ManualSerialGroup {
                    manual_usn: row.manual_usn.clone(),
                    items: Vec::new(),
                });
                auto.manual_groups.len() - 1
            });
        auto.manual_groups[m].items.push(DefectItem::from(row));
    }

    // sort_by is stable: equal dates keep input order
    batches.sort_by(|x, y| y.key.inspection_date.cmp(&x.key.inspection_date));
    batches
}
