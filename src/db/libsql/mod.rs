use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};

use crate::db::{DurableTier, StorageKey};
use crate::error::StoreError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS store_entries (\
     workspace_id TEXT NOT NULL, \
     collection TEXT NOT NULL, \
     value TEXT NOT NULL, \
     updated_at TEXT NOT NULL, \
     PRIMARY KEY (workspace_id, collection))";

pub struct LibSqlDurableTier {
    // Keep the database handle alive for the connection's lifetime.
    _db: libsql::Database,
    conn: Connection,
}

impl LibSqlDurableTier {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    key: parent.display().to_string(),
                    source,
                })?;
        }

        let db = libsql::Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        let tier = Self { _db: db, conn };
        tier.run_migrations().await?;
        Ok(tier)
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute(SCHEMA, ()).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableTier for LibSqlDurableTier {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM store_entries WHERE workspace_id = ?1 AND collection = ?2",
                params![key.workspace.as_str(), key.collection],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO store_entries (workspace_id, collection, value, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (workspace_id, collection) DO UPDATE SET \
                   value = excluded.value, \
                   updated_at = excluded.updated_at",
                params![
                    key.workspace.as_str(),
                    key.collection,
                    value,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM store_entries WHERE workspace_id = ?1 AND collection = ?2",
                params![key.workspace.as_str(), key.collection],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{DurableTier, StorageKey};
    use crate::ids::WorkspaceId;

    use super::LibSqlDurableTier;

    #[tokio::test]
    async fn upsert_overwrites_and_delete_reports_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tier = LibSqlDurableTier::new_local(&dir.path().join("store.db"))
            .await
            .expect("open libsql");
        let key = StorageKey::new(&WorkspaceId::new("firm").expect("workspace"), "graph");

        assert_eq!(tier.get(&key).await.expect("get"), None);
        tier.set(&key, "v1").await.expect("set v1");
        tier.set(&key, "v2").await.expect("set v2");
        assert_eq!(tier.get(&key).await.expect("get").as_deref(), Some("v2"));

        assert!(tier.remove(&key).await.expect("remove"));
        assert!(!tier.remove(&key).await.expect("remove again"));
    }
}
