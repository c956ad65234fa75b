//! Rowspan layout for the merged-cell inspection table
//!
//! Each physical table row shows one defect item. Batch, auto-serial and
//! manual-serial cells are merged vertically: only the first row of a
//! group carries the cell (with its rowspan), later rows omit it.

use serde::Serialize;

use crate::grouping::{BatchGroup, DefectItem, GroupKey};
use crate::model::headers;

/// Batch-level display columns, all spanning the whole batch
pub const BATCH_COLUMNS: [&str; 6] = [
    headers::INSPECTION_DATE,
    headers::LINE,
    headers::STAGE,
    headers::SHIFT,
    headers::PROJECT,
    headers::CARTON_ID,
];

/// Batch cells of the first row in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCells<'a> {
    pub key: &'a GroupKey,
    pub rowspan: usize,
}

impl BatchCells<'_> {
    /// Cell values in [`BATCH_COLUMNS`] order
    pub fn values(&self) -> [String; 6] {
        [
            self.key.inspection_date.to_string(),
            self.key.line.clone(),
            self.key.stage.clone(),
            self.key.shift.clone(),
            self.key.project.clone(),
            self.key.carton_id.clone(),
        ]
    }
}

/// A serial cell on the first row of its group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanCell<'a> {
    pub value: &'a str,
    pub rowspan: usize,
}

/// One physical table row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRow<'a> {
    pub batch: Option<BatchCells<'a>>,
    pub auto_usn: Option<SpanCell<'a>>,
    pub manual_usn: Option<SpanCell<'a>>,
    pub item: &'a DefectItem,
}

/// Lay out one batch group
///
/// A batch, auto-serial or manual-serial group without leaf items produces
/// no rows, so no cell is ever emitted with a zero rowspan.
pub fn layout_batch(group: &BatchGroup) -> Vec<LayoutRow<'_>> {
    let total = group.leaf_count();
    let mut rows = Vec::with_capacity(total);
    if total == 0 {
        return rows;
    }

    let mut batch_started = false;
    for auto in &group.auto_groups {
        let auto_leaves = auto.leaf_count();
        if auto_leaves == 0 {
            continue;
        }
        let mut auto_started = false;
        for manual in &auto.manual_groups {
            for (i, item) in manual.items.iter().enumerate() {
                rows.push(LayoutRow {
                    batch: (!batch_started).then(|| BatchCells {
                        key: &group.key,
                        rowspan: total,
                    }),
                    auto_usn: (!auto_started).then(|| SpanCell {
                        value: &auto.auto_usn,
                        rowspan: auto_leaves,
                    }),
                    manual_usn: (i == 0).then(|| SpanCell {
                        value: &manual.manual_usn,
                        rowspan: manual.leaf_count(),
                    }),
                    item,
                });
                batch_started = true;
                auto_started = true;
            }
        }
    }
    rows
}

/// Lay out every batch, in group order
pub fn layout_groups(groups: &[BatchGroup]) -> Vec<LayoutRow<'_>> {
    groups.iter().flat_map(layout_batch).collect()
}
