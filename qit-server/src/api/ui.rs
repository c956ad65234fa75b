//! Server-rendered inspection table
//!
//! Batch, auto-serial and manual-serial cells are merged vertically with
//! `rowspan`, one physical row per defect item.

use std::fmt::Write;

use axum::{extract::State, response::Html};
use qit_common::grouping::{group_rows, DefectItem};
use qit_common::layout::{layout_groups, LayoutRow, BATCH_COLUMNS};
use qit_common::model::headers;

use super::records::load_rows;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const ITEM_COLUMNS: [&str; 14] = [
    headers::CATEGORY,
    headers::DEFECT_LOCATION,
    headers::DEFECT_SYMPTOM,
    headers::ERROR_CODE,
    headers::SPEC,
    headers::ACTUAL,
    headers::DEFECT_IMAGE,
    headers::RESULT,
    headers::CONTAINMENT_ACTION,
    headers::ROOT_CAUSE,
    headers::CORRECTIVE_ACTION,
    headers::FOUR_M,
    headers::ESTIMATED_COMPLETION,
    headers::FINAL_RESULT,
];

const STYLE: &str = "table{border-collapse:collapse}\
th,td{border:1px solid #999;padding:2px 6px;vertical-align:top}\
td.ng{color:#b00}";

/// Escape text for an HTML text node or quoted attribute
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn cell(out: &mut String, text: &str, rowspan: usize) -> std::fmt::Result {
    if rowspan > 1 {
        write!(out, "<td rowspan=\"{}\">{}</td>", rowspan, escape(text))
    } else {
        write!(out, "<td>{}</td>", escape(text))
    }
}

fn item_cells(out: &mut String, item: &DefectItem) -> std::fmt::Result {
    let plain = [
        &item.category,
        &item.defect_location,
        &item.defect_symptom,
        &item.error_code,
        &item.spec,
        &item.actual,
    ];
    for text in plain {
        cell(out, text, 1)?;
    }

    match &item.defect_image {
        Some(image) if image.starts_with("http://") || image.starts_with("https://") => {
            write!(out, "<td><a href=\"{}\">image</a></td>", escape(image))?
        }
        Some(_) => out.push_str("<td>attached</td>"),
        None => out.push_str("<td>-</td>"),
    }

    let result = item.result.as_str();
    if result == "NG" {
        write!(out, "<td class=\"ng\">{}</td>", result)?;
    } else {
        cell(out, result, 1)?;
    }

    let rest = [
        item.containment_action.as_str(),
        item.root_cause.as_str(),
        item.corrective_action.as_str(),
        item.four_m.map(|m| m.as_str()).unwrap_or("-"),
        item.estimated_completion.as_str(),
        item.final_result.map(|r| r.as_str()).unwrap_or("-"),
    ];
    for text in rest {
        cell(out, text, 1)?;
    }
    Ok(())
}

/// Render the table body rows
pub fn render_rows(out: &mut String, rows: &[LayoutRow<'_>]) -> std::fmt::Result {
    for row in rows {
        out.push_str("<tr>");
        if let Some(batch) = &row.batch {
            for value in batch.values() {
                cell(out, &value, batch.rowspan)?;
            }
        }
        if let Some(auto) = &row.auto_usn {
            cell(out, auto.value, auto.rowspan)?;
        }
        if let Some(manual) = &row.manual_usn {
            cell(out, manual.value, manual.rowspan)?;
        }
        item_cells(out, row.item)?;
        out.push_str("</tr>\n");
    }
    Ok(())
}

/// GET /
pub async fn serve_index(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let normalized = load_rows(&state).await?;
    let groups = group_rows(&normalized.rows);
    let rows = layout_groups(&groups);

    let render = || -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        write!(
            out,
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
             <title>Carton Inspection</title><style>{}</style></head><body>\n\
             <h1>Carton Inspection</h1>\n<p>{} batch(es), {} record(s)",
            STYLE,
            groups.len(),
            normalized.rows.len()
        )?;
        if !normalized.skipped.is_empty() {
            write!(out, ", {} unreadable record(s) skipped", normalized.skipped.len())?;
        }
        out.push_str("</p>\n<table>\n<thead><tr>");

        let columns = BATCH_COLUMNS
            .iter()
            .chain([headers::AUTO_USN, headers::MANUAL_USN].iter())
            .chain(ITEM_COLUMNS.iter());
        for column in columns {
            write!(out, "<th>{}</th>", escape(column))?;
        }
        out.push_str("</tr></thead>\n<tbody>\n");
        render_rows(&mut out, &rows)?;
        out.push_str("</tbody>\n</table>\n</body></html>\n");
        Ok(out)
    };

    let page = render().map_err(|e| ApiError::Internal(format!("Render failed: {}", e)))?;
    Ok(Html(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_cell_rowspan() {
        let mut out = String::new();
        cell(&mut out, "A1", 3).unwrap();
        cell(&mut out, "x", 1).unwrap();
        assert_eq!(out, "<td rowspan=\"3\">A1</td><td>x</td>");
    }
}
