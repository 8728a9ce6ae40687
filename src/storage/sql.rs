// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite storage backend.
//!
//! Durable [`ConfigStore`] for single-node deployments. The compare-and-swap
//! is a single guarded `UPDATE`:
//!
//! ```sql
//! UPDATE device_configs
//!    SET fields = ?, updated_at = MAX(?, updated_at + 1)
//!  WHERE device_id = ? AND updated_at = ?
//! ```
//!
//! checked via `rows_affected`, so the token comparison and the write are one
//! atomic statement even with writers in separate processes. Business fields
//! are stored as JSON in a TEXT column; the schema layer owns their shape, the
//! database only needs the token column for arbitration.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

use super::traits::{ConfigStore, StoreError};
use crate::record::{epoch_millis, ConfigRecord, VersionToken};

pub struct SqliteConfigStore {
    pool: SqlitePool,
}

impl SqliteConfigStore {
    /// Open (or create) a database at the given sqlx URL.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// An in-memory database for tests and demos.
    ///
    /// Pinned to a single connection: each SQLite `:memory:` connection is
    /// its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                device_id INTEGER PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_configs (
                device_id INTEGER PRIMARY KEY REFERENCES devices(device_id),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                fields TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    /// Make a device known to the store.
    pub async fn register_device(&self, device_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO devices (device_id) VALUES (?)")
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn known(&self, device_id: i64) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT 1 FROM devices WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if row.is_some() {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn fetch(&self, device_id: i64) -> Result<Option<ConfigRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT created_at, updated_at, fields FROM device_configs WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let created_at: i64 = row
                    .try_get("created_at")
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let updated_at: i64 = row
                    .try_get("updated_at")
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let fields_json: String = row
                    .try_get("fields")
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let fields: Map<String, Value> = serde_json::from_str(&fields_json)
                    .map_err(|e| StoreError::Backend(format!("corrupt fields column: {e}")))?;
                Ok(Some(ConfigRecord {
                    device_id,
                    created_at,
                    updated_at: VersionToken(updated_at),
                    fields,
                }))
            }
            None => Ok(None),
        }
    }

    fn encode(fields: &Map<String, Value>) -> Result<String, StoreError> {
        serde_json::to_string(fields).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn load(&self, device_id: i64) -> Result<Option<ConfigRecord>, StoreError> {
        self.known(device_id).await?;
        self.fetch(device_id).await
    }

    async fn compare_and_swap(
        &self,
        device_id: i64,
        expected: VersionToken,
        fields: Map<String, Value>,
    ) -> Result<ConfigRecord, StoreError> {
        self.known(device_id).await?;

        // Single guarded statement: the WHERE clause is the token check and
        // MAX keeps the token monotonic against clock skew between writers.
        let result = sqlx::query(
            r#"
            UPDATE device_configs
               SET fields = ?, updated_at = MAX(?, updated_at + 1)
             WHERE device_id = ? AND updated_at = ?
            "#,
        )
        .bind(Self::encode(&fields)?)
        .bind(epoch_millis())
        .bind(device_id)
        .bind(expected.as_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            debug!(device_id, expected = expected.as_millis(), "CAS lost");
            return Err(StoreError::VersionMismatch);
        }

        self.fetch(device_id)
            .await?
            .ok_or_else(|| StoreError::Backend("record vanished after CAS".into()))
    }

    async fn reset_to_default(
        &self,
        device_id: i64,
        defaults: Map<String, Value>,
    ) -> Result<ConfigRecord, StoreError> {
        self.known(device_id).await?;

        let now = epoch_millis();
        sqlx::query(
            r#"
            INSERT INTO device_configs (device_id, created_at, updated_at, fields)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(device_id) DO UPDATE SET
                fields = excluded.fields,
                updated_at = MAX(excluded.updated_at, device_configs.updated_at + 1)
            "#,
        )
        .bind(device_id)
        .bind(now)
        .bind(now)
        .bind(Self::encode(&defaults)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.fetch(device_id)
            .await?
            .ok_or_else(|| StoreError::Backend("record vanished after reset".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    async fn store_with_device(device_id: i64) -> SqliteConfigStore {
        let store = SqliteConfigStore::in_memory().await.unwrap();
        store.register_device(device_id).await.unwrap();
        store
    }

    fn defaults() -> Map<String, Value> {
        Schema::device_defaults().default_record_fields()
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let store = SqliteConfigStore::in_memory().await.unwrap();
        assert!(matches!(store.load(1).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_reset_then_load() {
        let store = store_with_device(1).await;
        let created = store.reset_to_default(1, defaults()).await.unwrap();

        let loaded = store.load(1).await.unwrap().unwrap();
        assert_eq!(loaded.updated_at, created.updated_at);
        assert_eq!(loaded.fields["os_auto_update"], json!(true));
    }

    #[tokio::test]
    async fn test_cas_happy_path() {
        let store = store_with_device(1).await;
        let created = store.reset_to_default(1, defaults()).await.unwrap();

        let mut fields = created.fields.clone();
        fields.insert("firmware_hardware".into(), json!("arduino"));
        let updated = store
            .compare_and_swap(1, created.updated_at, fields)
            .await
            .unwrap();

        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.fields["firmware_hardware"], json!("arduino"));
    }

    #[tokio::test]
    async fn test_cas_stale_token_leaves_row_unchanged() {
        let store = store_with_device(1).await;
        let created = store.reset_to_default(1, defaults()).await.unwrap();

        let mut fields = created.fields.clone();
        fields.insert("firmware_hardware".into(), json!("arduino"));
        let stale = VersionToken(created.updated_at.as_millis() - 1);
        let result = store.compare_and_swap(1, stale, fields).await;

        assert!(matches!(result, Err(StoreError::VersionMismatch)));
        let live = store.load(1).await.unwrap().unwrap();
        assert_eq!(live.fields["firmware_hardware"], Value::Null);
        assert_eq!(live.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_cas_against_missing_record_fails() {
        let store = store_with_device(1).await;
        let result = store.compare_and_swap(1, VersionToken(1), defaults()).await;
        assert!(matches!(result, Err(StoreError::VersionMismatch)));
    }

    #[tokio::test]
    async fn test_reset_preserves_created_at() {
        let store = store_with_device(1).await;
        let first = store.reset_to_default(1, defaults()).await.unwrap();
        let second = store.reset_to_default(1, defaults()).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }
}
