//! Flat, workspace-scoped collections (documents, jobs, emails, audit
//! entries, lawyer profiles, calendar events).
//!
//! Each collection is stored as a single list value behind the tiered store
//! and shares one policy pipeline: text sanitization, dedup by record key,
//! TTL purge, and a max-items cap.

pub mod records;

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_stream::StreamExt as _;

use crate::db::{StorageKey, TieredStore, Watch};
use crate::error::StoreError;
use crate::ids::WorkspaceId;
use crate::sanitize::SanitizationGuard;

pub use records::{AuditEntry, DocumentRecord, EmailRecord, JobRecord, JobStatus, LawyerProfile};

/// A record stored in a flat collection.
pub trait CollectionRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name, used as the second half of the storage key.
    const COLLECTION: &'static str;

    /// Dedup key. Two records with the same key are the same record.
    fn record_key(&self) -> String;

    /// Age reference for TTL and max-items. Records without one are never
    /// purged by TTL and sort oldest for max-items.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Cap oversized text fields. Returns true when anything changed.
    fn sanitize(&mut self, _guard: &SanitizationGuard) -> bool {
        false
    }
}

/// Retention rules for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionPolicy {
    pub ttl: Option<Duration>,
    pub max_items: Option<usize>,
}

impl CollectionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }
}

/// What one pass of the policy pipeline changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PolicyOutcome {
    sanitized: usize,
    deduplicated: usize,
    expired: usize,
    capped: usize,
}

impl PolicyOutcome {
    fn changed(&self) -> bool {
        *self != Self::default()
    }
}

/// Typed repository over one collection for every workspace.
pub struct CollectionStore<T> {
    tiers: TieredStore,
    guard: SanitizationGuard,
    policy: CollectionPolicy,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionStore<T> {
    fn clone(&self) -> Self {
        Self {
            tiers: self.tiers.clone(),
            guard: self.guard,
            policy: self.policy,
            _record: PhantomData,
        }
    }
}

impl<T: CollectionRecord> CollectionStore<T> {
    pub fn new(tiers: TieredStore, guard: SanitizationGuard, policy: CollectionPolicy) -> Self {
        Self {
            tiers,
            guard,
            policy,
            _record: PhantomData,
        }
    }

    pub fn policy(&self) -> CollectionPolicy {
        self.policy
    }

    fn key(workspace: &WorkspaceId) -> StorageKey {
        StorageKey::new(workspace, T::COLLECTION)
    }

    fn apply_policies(&self, items: &mut Vec<T>, now: DateTime<Utc>) -> PolicyOutcome {
        let mut outcome = PolicyOutcome::default();

        for item in items.iter_mut() {
            if item.sanitize(&self.guard) {
                outcome.sanitized += 1;
            }
        }

        // Later duplicates replace the earlier record in its position.
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(items.len());
        let mut deduped: Vec<T> = Vec::with_capacity(items.len());
        for item in items.drain(..) {
            match positions.get(&item.record_key()) {
                Some(&idx) => {
                    deduped[idx] = item;
                    outcome.deduplicated += 1;
                }
                None => {
                    positions.insert(item.record_key(), deduped.len());
                    deduped.push(item);
                }
            }
        }
        *items = deduped;

        if let Some(ttl) = self.policy.ttl
            && let Ok(ttl) = chrono::Duration::from_std(ttl)
            && let Some(cutoff) = now.checked_sub_signed(ttl)
        {
            let before = items.len();
            items.retain(|item| item.timestamp().is_none_or(|ts| ts >= cutoff));
            outcome.expired = before - items.len();
        }

        if let Some(max) = self.policy.max_items
            && items.len() > max
        {
            let mut order: Vec<(usize, Option<DateTime<Utc>>)> = items
                .iter()
                .enumerate()
                .map(|(idx, item)| (idx, item.timestamp()))
                .collect();
            // Newest first; among equal timestamps the later position wins.
            order.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
            let keep: HashSet<usize> = order.iter().take(max).map(|(idx, _)| *idx).collect();
            let before = items.len();
            let mut idx = 0;
            items.retain(|_| {
                let kept = keep.contains(&idx);
                idx += 1;
                kept
            });
            outcome.capped = before - items.len();
        }

        outcome
    }

    async fn load(&self, workspace: &WorkspaceId) -> Result<Vec<T>, StoreError> {
        Ok(self
            .tiers
            .get_json::<Vec<T>>(&Self::key(workspace))
            .await?
            .unwrap_or_default())
    }

    /// Read the collection. Anything the policies had to repair is written
    /// back so the stored copy heals.
    pub async fn get(&self, workspace: &WorkspaceId) -> Result<Vec<T>, StoreError> {
        let mut items = self.load(workspace).await?;
        let outcome = self.apply_policies(&mut items, Utc::now());
        if outcome.changed() {
            tracing::info!(
                workspace = %workspace,
                collection = T::COLLECTION,
                sanitized = outcome.sanitized,
                deduplicated = outcome.deduplicated,
                expired = outcome.expired,
                capped = outcome.capped,
                "Repaired collection on read"
            );
            self.tiers.set_json(&Self::key(workspace), &items).await?;
        }
        Ok(items)
    }

    /// Replace the whole collection.
    pub async fn set(&self, workspace: &WorkspaceId, items: Vec<T>) -> Result<(), StoreError> {
        self.persist(workspace, items).await.map(|_| ())
    }

    async fn persist(&self, workspace: &WorkspaceId, mut items: Vec<T>) -> Result<Vec<T>, StoreError> {
        let outcome = self.apply_policies(&mut items, Utc::now());
        if outcome.sanitized > 0 {
            tracing::info!(
                workspace = %workspace,
                collection = T::COLLECTION,
                sanitized = outcome.sanitized,
                "Capped oversized fields on write"
            );
        }
        self.tiers.set_json(&Self::key(workspace), &items).await?;
        Ok(items)
    }

    /// Current list, then the list after every later write.
    pub async fn watch(&self, workspace: &WorkspaceId) -> Result<Watch<Vec<T>>, StoreError> {
        let changes = self.tiers.changes::<Vec<T>>(&Self::key(workspace));
        let initial = self.get(workspace).await?;
        let store = self.clone();
        let updates = changes.map(move |raw| {
            let mut items = raw.unwrap_or_default();
            store.apply_policies(&mut items, Utc::now());
            items
        });
        Ok(Box::pin(tokio_stream::once(initial).chain(updates)))
    }

    pub async fn find(&self, workspace: &WorkspaceId, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self
            .get(workspace)
            .await?
            .into_iter()
            .find(|item| item.record_key() == key))
    }

    /// Insert or replace by record key. Returns the record as stored, or
    /// `None` when the TTL or max-items policy dropped it on the way in.
    pub async fn upsert(&self, workspace: &WorkspaceId, item: T) -> Result<Option<T>, StoreError> {
        let key = item.record_key();
        let mut items = self.load(workspace).await?;
        match items.iter_mut().find(|existing| existing.record_key() == key) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(self
            .persist(workspace, items)
            .await?
            .into_iter()
            .find(|stored| stored.record_key() == key))
    }

    pub async fn remove(&self, workspace: &WorkspaceId, key: &str) -> Result<bool, StoreError> {
        let mut items = self.load(workspace).await?;
        let before = items.len();
        items.retain(|item| item.record_key() != key);
        if items.len() == before {
            return Ok(false);
        }
        self.set(workspace, items).await?;
        Ok(true)
    }

    /// Drop expired records now. Returns how many were removed.
    pub async fn purge_expired(&self, workspace: &WorkspaceId) -> Result<usize, StoreError> {
        let mut items = self.load(workspace).await?;
        let outcome = self.apply_policies(&mut items, Utc::now());
        if outcome.changed() {
            self.tiers.set_json(&Self::key(workspace), &items).await?;
        }
        Ok(outcome.expired)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    use crate::db::{LruCacheTier, MemoryDurableTier, TieredStore};
    use crate::ids::WorkspaceId;
    use crate::sanitize::SanitizationGuard;

    use super::{CollectionPolicy, CollectionRecord, CollectionStore};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
        at: Option<DateTime<Utc>>,
    }

    impl CollectionRecord for Note {
        const COLLECTION: &'static str = "notes";

        fn record_key(&self) -> String {
            self.id.clone()
        }

        fn timestamp(&self) -> Option<DateTime<Utc>> {
            self.at
        }

        fn sanitize(&mut self, guard: &SanitizationGuard) -> bool {
            guard.sanitize_field(&mut self.body)
        }
    }

    fn note(id: &str, minutes_ago: Option<i64>) -> Note {
        Note {
            id: id.to_string(),
            body: format!("body {id}"),
            at: minutes_ago.map(|m| Utc::now() - chrono::Duration::minutes(m)),
        }
    }

    fn store(policy: CollectionPolicy) -> CollectionStore<Note> {
        CollectionStore::new(
            TieredStore::new(
                Arc::new(LruCacheTier::new(Default::default())),
                Arc::new(MemoryDurableTier::new()),
            ),
            SanitizationGuard::new(32),
            policy,
        )
    }

    fn ws() -> WorkspaceId {
        WorkspaceId::new("firm").expect("workspace")
    }

    fn ids(items: &[Note]) -> Vec<&str> {
        items.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let store = store(CollectionPolicy::unbounded());
        store.upsert(&ws(), note("a", None)).await.expect("a");
        store.upsert(&ws(), note("b", None)).await.expect("b");
        let mut changed = note("a", None);
        changed.body = "edited".to_string();
        store.upsert(&ws(), changed).await.expect("a again");

        let items = store.get(&ws()).await.expect("get");
        assert_eq!(ids(&items), vec!["a", "b"]);
        assert_eq!(items[0].body, "edited");
    }

    #[tokio::test]
    async fn set_keeps_last_duplicate_at_first_position() {
        let store = store(CollectionPolicy::unbounded());
        let mut dup = note("a", None);
        dup.body = "second".to_string();
        store
            .set(&ws(), vec![note("a", None), note("b", None), dup])
            .await
            .expect("set");

        let items = store.get(&ws()).await.expect("get");
        assert_eq!(ids(&items), vec!["a", "b"]);
        assert_eq!(items[0].body, "second");
    }

    #[tokio::test]
    async fn ttl_purges_old_records_but_keeps_untimed_ones() {
        let store =
            store(CollectionPolicy::unbounded().with_ttl(Some(Duration::from_secs(60 * 60))));
        store
            .tiers
            .set_json(
                &CollectionStore::<Note>::key(&ws()),
                &vec![note("old", Some(120)), note("fresh", Some(5)), note("untimed", None)],
            )
            .await
            .expect("seed");

        assert_eq!(store.purge_expired(&ws()).await.expect("purge"), 1);
        let items = store.get(&ws()).await.expect("get");
        assert_eq!(ids(&items), vec!["fresh", "untimed"]);
    }

    #[tokio::test]
    async fn max_items_keeps_newest_in_original_order() {
        let store = store(CollectionPolicy::unbounded().with_max_items(Some(2)));
        store
            .set(
                &ws(),
                vec![note("oldest", Some(30)), note("newest", Some(1)), note("middle", Some(10))],
            )
            .await
            .expect("set");

        let items = store.get(&ws()).await.expect("get");
        assert_eq!(ids(&items), vec!["newest", "middle"]);
    }

    #[tokio::test]
    async fn oversized_records_heal_on_read_and_stay_small() {
        let store = store(CollectionPolicy::unbounded());
        let mut big = note("big", None);
        big.body = "z".repeat(10_000);
        store
            .tiers
            .set_json(&CollectionStore::<Note>::key(&ws()), &vec![big])
            .await
            .expect("seed corrupt");

        let first = store.get(&ws()).await.expect("get");
        let limit = SanitizationGuard::new(32).max_sanitized_len();
        assert!(first[0].body.len() <= limit);

        let second = store.get(&ws()).await.expect("get again");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn upsert_reports_records_the_policies_dropped() {
        let store = store(CollectionPolicy::unbounded().with_ttl(Some(Duration::from_secs(60))));
        let stale = note("old", Some(5));
        assert_eq!(store.upsert(&ws(), stale).await.expect("stale"), None);

        let fresh = note("new", Some(0));
        let stored = store.upsert(&ws(), fresh.clone()).await.expect("fresh");
        assert_eq!(stored, Some(fresh));
        assert_eq!(ids(&store.get(&ws()).await.expect("get")), vec!["new"]);
    }

    #[tokio::test]
    async fn remove_reports_whether_anything_was_removed() {
        let store = store(CollectionPolicy::unbounded());
        store.upsert(&ws(), note("a", None)).await.expect("a");
        assert!(store.remove(&ws(), "a").await.expect("remove"));
        assert!(!store.remove(&ws(), "a").await.expect("remove again"));
        assert!(store.find(&ws(), "a").await.expect("find").is_none());
    }
}
