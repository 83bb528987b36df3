use chrono::{DateTime, Duration, Utc};
use tokio_stream::StreamExt as _;

use crate::db::{StorageKey, TieredStore, Watch};
use crate::error::StoreError;
use crate::graph::model::{
    Actor, Appointment, CaseFile, Client, Deadline, GraphEntity, Issue, Matter, WorkspaceGraph,
};
use crate::graph::normalize::{normalize, normalize_with_report};
use crate::ids::WorkspaceId;

pub const GRAPH_COLLECTION: &str = "graph";

/// What a graph mutation decided.
#[derive(Debug)]
pub enum Mutation<R> {
    /// Persist the mutated graph and return `R`.
    Write(R),
    /// Leave storage untouched and return `R`.
    Skip(R),
}

/// Result of [`GraphStore::mutate`].
#[derive(Debug)]
pub struct Committed<R> {
    pub value: R,
    /// The normalized graph as written, or as read when nothing was written.
    pub graph: WorkspaceGraph,
    pub written: bool,
}

/// Canonical per-workspace graph.
///
/// Every read and write goes through the shape normalizer. Mutations are
/// whole-graph read-modify-write with no locking: the caller must serialize
/// writers per workspace. Two concurrent writers on the same workspace lose
/// updates, last write wins.
#[derive(Clone)]
pub struct GraphStore {
    tiers: TieredStore,
}

fn key(workspace: &WorkspaceId) -> StorageKey {
    StorageKey::new(workspace, GRAPH_COLLECTION)
}

/// Strictly after `previous`, so "changed since" checks never tie.
fn next_revision(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

impl GraphStore {
    pub fn new(tiers: TieredStore) -> Self {
        Self { tiers }
    }

    /// The normalized graph. An unknown workspace yields a fresh graph that
    /// already holds the default client.
    pub async fn get(&self, workspace: &WorkspaceId) -> Result<WorkspaceGraph, StoreError> {
        let raw = self
            .tiers
            .get_json::<WorkspaceGraph>(&key(workspace))
            .await?
            .unwrap_or_default();
        let (graph, report) = normalize_with_report(workspace, raw);
        if !report.is_clean() {
            tracing::debug!(
                workspace = %workspace,
                created_default_client = report.created_default_client,
                backfilled_matters = report.backfilled_matters,
                synthesized_matters = report.synthesized_matters,
                repaired_deadlines = report.repaired_deadlines,
                "Normalized workspace graph on read"
            );
        }
        Ok(graph)
    }

    /// Normalize and persist the whole graph.
    pub async fn set(
        &self,
        workspace: &WorkspaceId,
        graph: WorkspaceGraph,
    ) -> Result<(), StoreError> {
        self.write(workspace, graph).await.map(|_| ())
    }

    async fn write(
        &self,
        workspace: &WorkspaceId,
        graph: WorkspaceGraph,
    ) -> Result<WorkspaceGraph, StoreError> {
        let graph = normalize(workspace, graph);
        self.tiers.set_json(&key(workspace), &graph).await?;
        Ok(graph)
    }

    /// Current graph followed by every later write, normalized.
    pub async fn watch(&self, workspace: &WorkspaceId) -> Result<Watch<WorkspaceGraph>, StoreError> {
        let changes = self.tiers.changes::<WorkspaceGraph>(&key(workspace));
        let initial = self.get(workspace).await?;
        let ws = workspace.clone();
        let updates = changes.map(move |raw| normalize(&ws, raw.unwrap_or_default()));
        Ok(Box::pin(tokio_stream::once(initial).chain(updates)))
    }

    /// Read the latest graph, let `f` change it, and write it back whole with
    /// a bumped `updated_at` unless `f` returns [`Mutation::Skip`].
    pub async fn mutate<R, F>(
        &self,
        workspace: &WorkspaceId,
        f: F,
    ) -> Result<Committed<R>, StoreError>
    where
        F: FnOnce(&mut WorkspaceGraph) -> Mutation<R>,
    {
        let mut graph = self.get(workspace).await?;
        match f(&mut graph) {
            Mutation::Skip(value) => Ok(Committed {
                value,
                graph,
                written: false,
            }),
            Mutation::Write(value) => {
                graph.updated_at = next_revision(graph.updated_at);
                let graph = self.write(workspace, graph).await?;
                Ok(Committed {
                    value,
                    graph,
                    written: true,
                })
            }
        }
    }

    /// Apply `f` to the latest graph and write it back whole.
    pub async fn update<F>(
        &self,
        workspace: &WorkspaceId,
        f: F,
    ) -> Result<WorkspaceGraph, StoreError>
    where
        F: FnOnce(&mut WorkspaceGraph),
    {
        let committed = self
            .mutate(workspace, |graph| {
                f(graph);
                Mutation::Write(())
            })
            .await?;
        Ok(committed.graph)
    }

    pub async fn find<E: GraphEntity>(
        &self,
        workspace: &WorkspaceId,
        id: &str,
    ) -> Result<Option<E>, StoreError> {
        Ok(E::map(&self.get(workspace).await?).get(id).cloned())
    }

    pub async fn list<E: GraphEntity>(&self, workspace: &WorkspaceId) -> Result<Vec<E>, StoreError> {
        Ok(E::map(&self.get(workspace).await?).values().cloned().collect())
    }

    /// Insert or replace one entity as-is and return it after normalization.
    pub async fn upsert<E: GraphEntity>(
        &self,
        workspace: &WorkspaceId,
        entity: E,
    ) -> Result<E, StoreError> {
        let id = entity.id().to_string();
        let fallback = entity.clone();
        let committed = self
            .mutate(workspace, |graph| {
                E::map_mut(graph).insert(id.clone(), entity);
                Mutation::Write(())
            })
            .await?;
        Ok(E::map(&committed.graph)
            .get(&id)
            .cloned()
            .unwrap_or(fallback))
    }

    /// Remove one entity without touching anything that references it.
    pub async fn delete<E: GraphEntity>(
        &self,
        workspace: &WorkspaceId,
        id: &str,
    ) -> Result<bool, StoreError> {
        let committed = self
            .mutate(workspace, |graph| match E::map_mut(graph).remove(id) {
                Some(_) => Mutation::Write(true),
                None => Mutation::Skip(false),
            })
            .await?;
        Ok(committed.value)
    }
}

macro_rules! entity_helpers {
    ($($ty:ty => $upsert:ident, $delete:ident;)*) => {
        impl GraphStore {
            $(
                pub async fn $upsert(
                    &self,
                    workspace: &WorkspaceId,
                    entity: $ty,
                ) -> Result<$ty, StoreError> {
                    self.upsert(workspace, entity).await
                }

                pub async fn $delete(
                    &self,
                    workspace: &WorkspaceId,
                    id: &str,
                ) -> Result<bool, StoreError> {
                    self.delete::<$ty>(workspace, id).await
                }
            )*
        }
    };
}

entity_helpers! {
    Client => upsert_client, delete_client;
    Matter => upsert_matter, delete_matter;
    CaseFile => upsert_case_file, delete_case_file;
    Actor => upsert_actor, delete_actor;
    Issue => upsert_issue, delete_issue;
    Deadline => upsert_deadline, delete_deadline;
    Appointment => upsert_appointment, delete_appointment;
}
