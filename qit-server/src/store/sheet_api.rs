//! Remote "sheet as a database" record store
//!
//! Talks to a generic REST collection:
//! - `GET {base}` returns a JSON array of records
//! - `POST {base}` appends one record object
//! - `PATCH|DELETE {base}/{index}` address a zero-based position
//! - `PATCH|DELETE {base}/id/{uuid}` address a stable id

use std::time::Duration;

use async_trait::async_trait;
use qit_common::model::RawRecord;
use qit_common::{InspectionRow, RecordId};
use serde_json::Value;

use super::{RecordKey, RecordStore, StoreError};

const USER_AGENT: &str = concat!("qit-server/", env!("CARGO_PKG_VERSION"));

pub struct SheetApiStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl SheetApiStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StoreError::InvalidKey(format!(
                "sheet API URL must be http(s): {}",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL addressing one record
    pub fn record_url(&self, key: RecordKey) -> Result<String, StoreError> {
        match key {
            RecordKey::Id(id) => Ok(format!("{}/id/{}", self.base_url, id)),
            RecordKey::Row(_) => {
                let position = key
                    .position()
                    .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
                Ok(format!("{}/{}", self.base_url, position))
            }
        }
    }

    /// Send a request and turn a non-2xx status into an error
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        key: Option<RecordKey>,
    ) -> Result<reqwest::Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(key) = key {
                return Err(StoreError::NotFound(key.to_string()));
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RecordStore for SheetApiStore {
    fn backend(&self) -> &'static str {
        "sheet_api"
    }

    async fn list(&self) -> Result<Vec<RawRecord>, StoreError> {
        tracing::debug!(url = %self.base_url, "Fetching sheet records");
        let response = self
            .send(self.http_client.get(&self.base_url), None)
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let items = match body {
            Value::Array(items) => items,
            other => {
                return Err(StoreError::Malformed(format!(
                    "expected an array of records, found {}",
                    other
                )))
            }
        };
        items
            .into_iter()
            .enumerate()
            .map(|(position, item)| match item {
                Value::Object(record) => Ok(record),
                _ => Err(StoreError::Malformed(format!(
                    "record {} is not an object",
                    position
                ))),
            })
            .collect()
    }

    async fn create(&self, row: &InspectionRow) -> Result<RecordId, StoreError> {
        tracing::debug!(url = %self.base_url, id = %row.id, "Appending sheet record");
        self.send(
            self.http_client.post(&self.base_url).json(&row.to_record()),
            None,
        )
        .await?;
        Ok(row.id)
    }

    async fn update(&self, key: RecordKey, fields: &RawRecord) -> Result<(), StoreError> {
        let url = self.record_url(key)?;
        tracing::debug!(url = %url, fields = fields.len(), "Updating sheet record");
        self.send(self.http_client.patch(&url).json(fields), Some(key))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: RecordKey) -> Result<(), StoreError> {
        let url = self.record_url(key)?;
        tracing::debug!(url = %url, "Deleting sheet record");
        self.send(self.http_client.delete(&url), Some(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SheetApiStore {
        SheetApiStore::new("https://sheets.example.com/api/v1/abc/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_is_trimmed() {
        assert_eq!(store().base_url(), "https://sheets.example.com/api/v1/abc");
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(SheetApiStore::new("ftp://example.com", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_record_urls() {
        let store = store();
        assert_eq!(
            store.record_url(RecordKey::Row(7)).unwrap(),
            "https://sheets.example.com/api/v1/abc/6"
        );
        let id: RecordId = "6f1c2a56-1d1e-4d8b-9a4c-0e5f3b7f9a10".parse().unwrap();
        assert_eq!(
            store.record_url(RecordKey::Id(id)).unwrap(),
            "https://sheets.example.com/api/v1/abc/id/6f1c2a56-1d1e-4d8b-9a4c-0e5f3b7f9a10"
        );
        assert!(store.record_url(RecordKey::Row(0)).is_err());
    }
}
