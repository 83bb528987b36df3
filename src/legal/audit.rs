use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::collections::{AuditEntry, CollectionStore};
use crate::error::StoreError;
use crate::ids::{WorkspaceId, new_record_id};

/// Result of [`AuditTrail::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    Intact { entries: usize },
    Broken { index: usize, entry_id: String },
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

fn entry_hash(entry: &AuditEntry) -> Result<String, serde_json::Error> {
    let mut unsealed = entry.clone();
    unsealed.hash = None;
    let to_hash = serde_json::to_string(&unsealed)?;
    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash chain over the `audit_entries` collection. Once the collection is
/// capped, the first retained entry points at a hash that is no longer
/// stored, which `verify` accepts.
#[derive(Clone)]
pub struct AuditTrail {
    entries: CollectionStore<AuditEntry>,
}

impl AuditTrail {
    pub fn new(entries: CollectionStore<AuditEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &CollectionStore<AuditEntry> {
        &self.entries
    }

    /// Append one sealed entry to the chain.
    pub async fn append(
        &self,
        workspace: &WorkspaceId,
        action: &str,
        entity_kind: &str,
        entity_id: &str,
        details: Value,
    ) -> Result<AuditEntry, StoreError> {
        let existing = self.entries.get(workspace).await?;
        let mut entry = AuditEntry {
            id: new_record_id(),
            at: Utc::now(),
            action: action.to_string(),
            entity_kind: entity_kind.to_string(),
            entity_id: entity_id.to_string(),
            details,
            prev_hash: existing.last().and_then(|last| last.hash.clone()),
            hash: None,
        };
        let hash = entry_hash(&entry).map_err(|e| StoreError::Serialization {
            key: format!("{workspace}/audit_entries"),
            message: e.to_string(),
        })?;
        entry.hash = Some(hash);
        self.entries
            .upsert(workspace, entry)
            .await?
            .ok_or_else(|| StoreError::Query("audit entry dropped by retention".to_string()))
    }

    /// Append, logging instead of failing. Used after a mutation has already
    /// been committed.
    pub async fn record(
        &self,
        workspace: &WorkspaceId,
        action: &str,
        entity_kind: &str,
        entity_id: &str,
        details: Value,
    ) {
        if let Err(e) = self
            .append(workspace, action, entity_kind, entity_id, details)
            .await
        {
            tracing::warn!(
                workspace = %workspace,
                action,
                entity_kind,
                entity_id,
                error = %e,
                "Failed to append audit entry"
            );
        }
    }

    pub async fn verify(&self, workspace: &WorkspaceId) -> Result<ChainVerification, StoreError> {
        let entries = self.entries.get(workspace).await?;
        for (index, entry) in entries.iter().enumerate() {
            let sealed = entry_hash(entry).ok();
            let linked = index == 0 || entry.prev_hash == entries[index - 1].hash;
            if !linked || sealed.is_none() || sealed != entry.hash {
                return Ok(ChainVerification::Broken {
                    index,
                    entry_id: entry.id.clone(),
                });
            }
        }
        Ok(ChainVerification::Intact {
            entries: entries.len(),
        })
    }
}
