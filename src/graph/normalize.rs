//! Shape normalization: the migration pass applied to every graph read and
//! write.
//!
//! `normalize` is pure and idempotent. It only fills in what is missing or
//! repairs what is malformed; fields it does not know about are carried
//! through untouched.

use crate::graph::model::{Client, ClientKind, Matter, MatterStatus, WorkspaceGraph};
use crate::ids::{WorkspaceId, dedupe_ids, default_client_id, synthesized_matter_id};

pub const SCHEMA_VERSION: u32 = 3;

/// Used when a deadline ends up with no valid reminder offsets.
pub const DEFAULT_REMINDER_OFFSETS: [i64; 2] = [1440, 60];

pub const DEFAULT_CLIENT_NAME: &str = "Unassigned client";

/// What a normalization pass had to fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    pub created_default_client: bool,
    pub aligned_ids: usize,
    pub backfilled_matters: usize,
    pub synthesized_matters: usize,
    pub repaired_deadlines: usize,
}

impl NormalizationReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Deduplicate, drop negatives, sort descending; fall back to the default set.
pub fn normalize_reminder_offsets(offsets: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = offsets.iter().copied().filter(|o| *o >= 0).collect();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out.dedup();
    if out.is_empty() {
        DEFAULT_REMINDER_OFFSETS.to_vec()
    } else {
        out
    }
}

pub fn normalize(workspace: &WorkspaceId, graph: WorkspaceGraph) -> WorkspaceGraph {
    normalize_with_report(workspace, graph).0
}

pub fn normalize_with_report(
    workspace: &WorkspaceId,
    mut graph: WorkspaceGraph,
) -> (WorkspaceGraph, NormalizationReport) {
    let mut report = NormalizationReport::default();
    let default_client = default_client_id(workspace);

    graph.workspace_id = workspace.as_str().to_string();
    graph.schema_version = SCHEMA_VERSION;

    report.aligned_ids = align_ids(&mut graph);

    if !graph.clients.contains_key(&default_client) {
        graph.clients.insert(
            default_client.clone(),
            Client {
                id: default_client.clone(),
                kind: ClientKind::Organization,
                display_name: DEFAULT_CLIENT_NAME.to_string(),
                created_at: graph.updated_at,
                updated_at: graph.updated_at,
                ..Client::default()
            },
        );
        report.created_default_client = true;
    }

    // Case files first, so synthesized matters go through matter backfill.
    for (id, case_file) in graph.case_files.iter_mut() {
        if case_file.matter_id().is_some() || case_file.is_detached() {
            continue;
        }
        let matter_id = synthesized_matter_id(workspace, id);
        case_file.link_matter(matter_id.clone());
        if !graph.matters.contains_key(&matter_id) {
            let title = if case_file.title.trim().is_empty() {
                format!("Case file {id}")
            } else {
                case_file.title.clone()
            };
            graph.matters.insert(
                matter_id.clone(),
                Matter {
                    id: matter_id,
                    title,
                    client_id: default_client.clone(),
                    client_ids: vec![default_client.clone()],
                    status: MatterStatus::Active,
                    created_at: case_file.created_at,
                    updated_at: case_file.updated_at,
                    ..Matter::default()
                },
            );
            report.synthesized_matters += 1;
        }
    }

    for matter in graph.matters.values_mut() {
        if backfill_matter(matter, &default_client) {
            report.backfilled_matters += 1;
        }
    }

    for deadline in graph.deadlines.values_mut() {
        let normalized = normalize_reminder_offsets(&deadline.reminder_offsets_in_minutes);
        if normalized != deadline.reminder_offsets_in_minutes {
            deadline.reminder_offsets_in_minutes = normalized;
            report.repaired_deadlines += 1;
        }
    }

    (graph, report)
}

fn backfill_matter(matter: &mut Matter, default_client: &str) -> bool {
    let mut changed = false;
    if matter.client_id.trim().is_empty() {
        matter.client_id = default_client.to_string();
        changed = true;
    }
    changed |= dedupe_ids(&mut matter.client_ids);
    if !matter.client_ids.contains(&matter.client_id) {
        matter.client_ids.insert(0, matter.client_id.clone());
        changed = true;
    }
    changed
}

fn align_ids(graph: &mut WorkspaceGraph) -> usize {
    fn align<E: crate::graph::GraphEntity>(
        map: &mut std::collections::BTreeMap<String, E>,
    ) -> usize {
        let mut fixed = 0;
        for (key, entity) in map.iter_mut() {
            if entity.id() != key {
                entity.set_id(key.clone());
                fixed += 1;
            }
        }
        fixed
    }

    align(&mut graph.clients)
        + align(&mut graph.matters)
        + align(&mut graph.case_files)
        + align(&mut graph.actors)
        + align(&mut graph.issues)
        + align(&mut graph.deadlines)
        + align(&mut graph.appointments)
}
