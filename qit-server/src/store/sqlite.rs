//! SQLite record store
//!
//! One table holds each record's wire form as JSON text, keyed by its
//! stable id and ordered by an insertion sequence. Legacy row numbers
//! resolve against that sequence.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use qit_common::model::RawRecord;
use qit_common::{time, InspectionRow, RecordId};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::{RecordKey, RecordStore, StoreError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS inspection_records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        record TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file, or an in-memory database
    pub async fn connect(path: Option<&Path>) -> Result<Self, StoreError> {
        let options = match path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            None => SqliteConnectOptions::from_str("sqlite::memory:")?,
        };

        // A single long-lived connection keeps an in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        match path {
            Some(path) => info!("Record store: SQLite at {}", path.display()),
            None => info!("Record store: in-memory SQLite"),
        }
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(None).await
    }

    /// Wrap an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Sequence number of the addressed record
    async fn resolve(&self, key: RecordKey) -> Result<i64, StoreError> {
        let row = match key {
            RecordKey::Id(id) => {
                sqlx::query("SELECT seq FROM inspection_records WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await?
            }
            RecordKey::Row(_) => {
                let position = key
                    .position()
                    .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
                // past i64::MAX no row can exist
                let offset = i64::try_from(position)
                    .map_err(|_| StoreError::NotFound(key.to_string()))?;
                sqlx::query("SELECT seq FROM inspection_records ORDER BY seq LIMIT 1 OFFSET ?")
                    .bind(offset)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        let row = row.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(row.try_get("seq")?)
    }
}

fn parse_record(text: &str) -> Result<RawRecord, StoreError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Malformed(format!(
            "expected an object, found {}",
            other
        ))),
        Err(e) => Err(StoreError::Malformed(e.to_string())),
    }
}

fn record_text(record: &RawRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Malformed(e.to_string()))
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn list(&self) -> Result<Vec<RawRecord>, StoreError> {
        let rows = sqlx::query("SELECT record FROM inspection_records ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<RawRecord, StoreError> {
                let text: String = row.try_get("record")?;
                parse_record(&text)
            })
            .collect()
    }

    async fn create(&self, row: &InspectionRow) -> Result<RecordId, StoreError> {
        let text = record_text(&row.to_record())?;
        sqlx::query("INSERT INTO inspection_records (id, record, created_at) VALUES (?, ?, ?)")
            .bind(row.id.to_string())
            .bind(text)
            .bind(time::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        debug!(id = %row.id, auto_usn = %row.auto_usn, "Inserted record");
        Ok(row.id)
    }

    async fn update(&self, key: RecordKey, fields: &RawRecord) -> Result<(), StoreError> {
        let seq = self.resolve(key).await?;
        let mut tx = self.pool.begin().await?;

        let text: String = sqlx::query("SELECT record FROM inspection_records WHERE seq = ?")
            .bind(seq)
            .fetch_one(&mut *tx)
            .await?
            .try_get("record")?;
        let mut record = parse_record(&text)?;
        for (header, value) in fields {
            record.insert(header.clone(), value.clone());
        }

        sqlx::query("UPDATE inspection_records SET record = ? WHERE seq = ?")
            .bind(record_text(&record)?)
            .bind(seq)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(key = %key, fields = fields.len(), "Updated record");
        Ok(())
    }

    async fn delete(&self, key: RecordKey) -> Result<(), StoreError> {
        let seq = self.resolve(key).await?;
        sqlx::query("DELETE FROM inspection_records WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        debug!(key = %key, "Deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qit_common::model::{headers, PLACEHOLDER};
    use qit_common::normalize::normalize_record;
    use qit_common::InspectionResult;
    use serde_json::json;

    fn row(auto: &str) -> InspectionRow {
        InspectionRow {
            id: RecordId::new(),
            inspection_date: "2025-03-21".parse().unwrap(),
            project: "PX1".into(),
            stage: "FQC".into(),
            line: "L1".into(),
            shift: "Day".into(),
            carton_id: "C1".into(),
            auto_usn: auto.into(),
            manual_usn: auto.into(),
            category: PLACEHOLDER.into(),
            defect_location: "No Defect".into(),
            defect_symptom: "No Defect".into(),
            error_code: PLACEHOLDER.into(),
            spec: PLACEHOLDER.into(),
            actual: PLACEHOLDER.into(),
            defect_image: None,
            result: InspectionResult::Ok,
            containment_action: PLACEHOLDER.into(),
            root_cause: PLACEHOLDER.into(),
            corrective_action: PLACEHOLDER.into(),
            four_m: None,
            estimated_completion: PLACEHOLDER.into(),
            final_result: None,
        }
    }

    async fn store_with(autos: &[&str]) -> (SqliteStore, Vec<RecordId>) {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for auto in autos {
            ids.push(store.create(&row(auto)).await.unwrap());
        }
        (store, ids)
    }

    fn autos(records: &[RawRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r[headers::AUTO_USN].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let (store, ids) = store_with(&["A1", "A2", "A3"]).await;
        let records = store.list().await.unwrap();
        assert_eq!(autos(&records), vec!["A1", "A2", "A3"]);

        let first = normalize_record(&records[0]).unwrap();
        assert_eq!(first.id, ids[0]);
        assert_eq!(first.result, InspectionResult::Ok);
    }

    #[tokio::test]
    async fn test_update_by_id_merges_fields() {
        let (store, ids) = store_with(&["A1", "A2"]).await;
        let mut fields = RawRecord::new();
        fields.insert(headers::DEFECT_SYMPTOM.into(), json!("Dent"));
        fields.insert(headers::RESULT.into(), json!("NG"));
        store.update(RecordKey::Id(ids[1]), &fields).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records[1][headers::DEFECT_SYMPTOM], "Dent");
        assert_eq!(records[1][headers::RESULT], "NG");
        assert_eq!(records[1][headers::AUTO_USN], "A2");
        assert_eq!(records[0][headers::DEFECT_SYMPTOM], "No Defect");
    }

    #[tokio::test]
    async fn test_delete_by_row_number() {
        let (store, _) = store_with(&["A1", "A2", "A3"]).await;
        store.delete(RecordKey::row(2).unwrap()).await.unwrap();
        assert_eq!(autos(&store.list().await.unwrap()), vec!["A1", "A3"]);

        // row numbers follow the remaining order
        store.delete(RecordKey::row(2).unwrap()).await.unwrap();
        assert_eq!(autos(&store.list().await.unwrap()), vec!["A1"]);
    }

    #[tokio::test]
    async fn test_missing_keys() {
        let (store, _) = store_with(&["A1"]).await;
        assert!(matches!(
            store.delete(RecordKey::Row(5)).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(RecordKey::Id(RecordId::new())).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.update(RecordKey::Row(0), &RawRecord::new()).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_huge_row_number_touches_nothing() {
        let (store, _) = store_with(&["A1", "A2", "A3"]).await;
        assert!(matches!(
            store.delete(RecordKey::Row(usize::MAX)).await,
            Err(StoreError::NotFound(_))
        ));

        let mut fields = RawRecord::new();
        fields.insert(headers::RESULT.into(), json!("NG"));
        assert!(matches!(
            store.update(RecordKey::Row(usize::MAX), &fields).await,
            Err(StoreError::NotFound(_))
        ));

        let records = store.list().await.unwrap();
        assert_eq!(autos(&records), vec!["A1", "A2", "A3"]);
        assert!(records.iter().all(|r| r[headers::RESULT] == "OK"));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        {
            let store = SqliteStore::connect(Some(&path)).await.unwrap();
            store.create(&row("A1")).await.unwrap();
        }
        let store = SqliteStore::connect(Some(&path)).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
