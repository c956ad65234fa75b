//! Tabular batch-load source
//!
//! Reads a JSON workbook export, `{ "<sheet name>": [ {record}, ... ] }`,
//! from a local file or an http(s) URL and returns one sheet's records in
//! order. Every failure is a single load error; nothing is retried.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use qit_common::model::RawRecord;
use qit_common::{Error, Result};
use serde_json::Value;
use tracing::{debug, info};

/// Where the workbook lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkbookSource {
    Path(PathBuf),
    Url(String),
}

impl WorkbookSource {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            WorkbookSource::Url(source.to_string())
        } else {
            WorkbookSource::Path(PathBuf::from(source))
        }
    }
}

impl fmt::Display for WorkbookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkbookSource::Path(path) => write!(f, "{}", path.display()),
            WorkbookSource::Url(url) => f.write_str(url),
        }
    }
}

/// A configured workbook sheet
pub struct Workbook {
    source: WorkbookSource,
    sheet: String,
    http_client: reqwest::Client,
}

impl Workbook {
    pub fn new(source: &str, sheet: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            source: WorkbookSource::parse(source),
            sheet: sheet.to_string(),
            http_client,
        })
    }

    pub fn source(&self) -> &WorkbookSource {
        &self.source
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    /// Records of the configured sheet, in workbook order
    pub async fn load_records(&self) -> Result<Vec<RawRecord>> {
        let body = match &self.source {
            WorkbookSource::Path(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Load(format!("Cannot read workbook {}: {}", path.display(), e))
                })?;
                serde_json::from_str::<Value>(&text)
                    .map_err(|e| Error::Load(format!("Workbook {} is not JSON: {}", path.display(), e)))?
            }
            WorkbookSource::Url(url) => self.fetch(url).await?,
        };

        let records = sheet_records(body, &self.sheet)?;
        info!(
            source = %self.source,
            sheet = %self.sheet,
            records = records.len(),
            "Loaded workbook sheet"
        );
        Ok(records)
    }

    async fn fetch(&self, url: &str) -> Result<Value> {
        debug!(url = %url, "Fetching workbook");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Load(format!("Cannot fetch workbook {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Load(format!(
                "Workbook {} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Load(format!("Workbook {} is not JSON: {}", url, e)))
    }
}

/// Pull one sheet's rows out of a parsed workbook
pub fn sheet_records(workbook: Value, sheet: &str) -> Result<Vec<RawRecord>> {
    let mut sheets = match workbook {
        Value::Object(sheets) => sheets,
        _ => return Err(Error::Load("Workbook must be an object of sheets".to_string())),
    };
    let rows = match sheets.remove(sheet) {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(Error::Load(format!("Sheet {} is not a list of rows", sheet))),
        None => return Err(Error::Load(format!("Sheet {} not found in workbook", sheet))),
    };
    rows.into_iter()
        .enumerate()
        .map(|(position, row)| match row {
            Value::Object(record) => Ok(record),
            _ => Err(Error::Load(format!(
                "Row {} of sheet {} is not an object",
                position + 1,
                sheet
            ))),
        })
        .collect()
}
