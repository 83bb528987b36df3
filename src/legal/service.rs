use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Value, json};

use crate::collections::{CollectionStore, LawyerProfile};
use crate::error::StoreError;
use crate::graph::{
    Actor, Appointment, CaseFile, Client, Deadline, DeadlineStatus, GraphEntity, GraphStore, Issue,
    Matter, Mutation, WorkspaceGraph, normalize_reminder_offsets,
};
use crate::ids::{WorkspaceId, dedupe_ids, default_client_id, new_record_id};
use crate::legal::audit::AuditTrail;
use crate::legal::calendar::{CalendarSync, DEADLINE_SOURCE, project_deadline};

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

fn remove_id(ids: &mut Vec<String>, id: &str) -> bool {
    let before = ids.len();
    ids.retain(|existing| existing != id);
    ids.len() != before
}

/// Point the case-file back-reference for `id` at `next`, dropping it from
/// the case file it used to belong to.
fn relink_case_file(
    graph: &mut WorkspaceGraph,
    id: &str,
    prior: Option<String>,
    next: Option<&str>,
    ids: fn(&mut CaseFile) -> &mut Vec<String>,
) {
    if let Some(prior) = prior.as_deref()
        && Some(prior) != next
        && let Some(old) = graph.case_files.get_mut(prior)
    {
        remove_id(ids(old), id);
    }
    if let Some(next) = next
        && let Some(case_file) = graph.case_files.get_mut(next)
    {
        push_unique(ids(case_file), id);
    }
}

/// Give `entity` an id if it has none, keep the stored `created_at`, and
/// refresh `updated_at`.
fn stamp<E: GraphEntity>(graph: &WorkspaceGraph, entity: &mut E) {
    if entity.id().trim().is_empty() {
        entity.set_id(new_record_id());
    }
    let now = Utc::now();
    let created_at = E::map(graph)
        .get(entity.id())
        .map(|prior| prior.created_at())
        .unwrap_or(now);
    entity.set_timestamps(created_at, now);
}

/// Relationship rules over the workspace graph.
///
/// Validation rejections come back as `Ok(None)` / `Ok(false)`; only storage
/// failures are errors. Calendar and audit follow-ups run after the graph
/// write has committed and never fail the operation.
#[derive(Clone)]
pub struct LegalPracticeService {
    graph: GraphStore,
    lawyers: CollectionStore<LawyerProfile>,
    calendar: Arc<dyn CalendarSync>,
    audit: AuditTrail,
}

impl LegalPracticeService {
    pub fn new(
        graph: GraphStore,
        lawyers: CollectionStore<LawyerProfile>,
        calendar: Arc<dyn CalendarSync>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            graph,
            lawyers,
            calendar,
            audit,
        }
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    async fn record(
        &self,
        workspace: &WorkspaceId,
        action: &str,
        kind: &str,
        id: &str,
        details: Value,
    ) {
        self.audit.record(workspace, action, kind, id, details).await;
    }

    async fn project(&self, workspace: &WorkspaceId, deadline: &Deadline) {
        let event = project_deadline(workspace, deadline);
        if let Err(e) = self.calendar.upsert_event_for_source(event).await {
            tracing::warn!(
                workspace = %workspace,
                deadline_id = %deadline.id,
                error = %e,
                "Calendar projection failed"
            );
        }
    }

    async fn unproject(&self, workspace: &WorkspaceId, deadline_id: &str) {
        if let Err(e) = self
            .calendar
            .remove_event_for_source(workspace, DEADLINE_SOURCE, deadline_id)
            .await
        {
            tracing::warn!(
                workspace = %workspace,
                deadline_id,
                error = %e,
                "Calendar event removal failed"
            );
        }
    }

    /// Stamp and store one entity, letting `link` fix up related entities in
    /// the same write.
    async fn upsert_stamped<E, L>(
        &self,
        workspace: &WorkspaceId,
        mut entity: E,
        link: L,
    ) -> Result<E, StoreError>
    where
        E: GraphEntity,
        L: FnOnce(&mut WorkspaceGraph, &E),
    {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                stamp(graph, &mut entity);
                link(graph, &entity);
                let id = entity.id().to_string();
                E::map_mut(graph).insert(id.clone(), entity);
                Mutation::Write(id)
            })
            .await?;
        let id = committed.value;
        let stored = E::map(&committed.graph).get(&id).cloned().ok_or_else(|| {
            StoreError::Query(format!("{} '{id}' missing after write", E::KIND))
        })?;
        self.record(workspace, "upsert", E::KIND, &id, json!({})).await;
        Ok(stored)
    }

    pub async fn upsert_client(
        &self,
        workspace: &WorkspaceId,
        client: Client,
    ) -> Result<Client, StoreError> {
        self.upsert_stamped(workspace, client, |_, _| {}).await
    }

    /// `None` when an assigned lawyer has no profile or is inactive.
    pub async fn upsert_matter(
        &self,
        workspace: &WorkspaceId,
        mut matter: Matter,
    ) -> Result<Option<Matter>, StoreError> {
        dedupe_ids(&mut matter.assigned_lawyer_ids);
        if !matter.assigned_lawyer_ids.is_empty() {
            let profiles = self.lawyers.get(workspace).await?;
            let unusable = matter.assigned_lawyer_ids.iter().find(|id| {
                !profiles
                    .iter()
                    .any(|profile| &profile.id == *id && profile.active)
            });
            if let Some(lawyer_id) = unusable {
                tracing::debug!(
                    workspace = %workspace,
                    matter_id = %matter.id,
                    lawyer_id = %lawyer_id,
                    "Rejected matter with missing or inactive lawyer"
                );
                return Ok(None);
            }
        }
        self.upsert_stamped(workspace, matter, |_, _| {})
            .await
            .map(Some)
    }

    pub async fn upsert_case_file(
        &self,
        workspace: &WorkspaceId,
        case_file: CaseFile,
    ) -> Result<CaseFile, StoreError> {
        self.upsert_stamped(workspace, case_file, |_, _| {}).await
    }

    pub async fn upsert_actor(
        &self,
        workspace: &WorkspaceId,
        actor: Actor,
    ) -> Result<Actor, StoreError> {
        self.upsert_stamped(workspace, actor, |graph, actor| {
            let prior = graph
                .actors
                .get(&actor.id)
                .and_then(|prior| prior.case_file_id.clone());
            relink_case_file(
                graph,
                &actor.id,
                prior,
                actor.case_file_id.as_deref(),
                |file| &mut file.actor_ids,
            );
        })
        .await
    }

    pub async fn upsert_issue(
        &self,
        workspace: &WorkspaceId,
        issue: Issue,
    ) -> Result<Issue, StoreError> {
        self.upsert_stamped(workspace, issue, |graph, issue| {
            let prior = graph
                .issues
                .get(&issue.id)
                .and_then(|prior| prior.case_file_id.clone());
            relink_case_file(
                graph,
                &issue.id,
                prior,
                issue.case_file_id.as_deref(),
                |file| &mut file.issue_ids,
            );
        })
        .await
    }

    pub async fn upsert_appointment(
        &self,
        workspace: &WorkspaceId,
        appointment: Appointment,
    ) -> Result<Appointment, StoreError> {
        self.upsert_stamped(workspace, appointment, |_, _| {}).await
    }

    /// Store a deadline with normalized reminder offsets and project it to
    /// the calendar. `None` when the status change is not a legal
    /// transition from the stored status.
    pub async fn upsert_deadline(
        &self,
        workspace: &WorkspaceId,
        mut deadline: Deadline,
    ) -> Result<Option<Deadline>, StoreError> {
        deadline.reminder_offsets_in_minutes =
            normalize_reminder_offsets(&deadline.reminder_offsets_in_minutes);

        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if let Some(prior) = graph.deadlines.get(deadline.id.as_str())
                    && !prior.status.can_transition_to(deadline.status)
                {
                    return Mutation::Skip(None);
                }
                stamp(graph, &mut deadline);
                let prior = graph
                    .deadlines
                    .get(&deadline.id)
                    .and_then(|prior| prior.case_file_id.clone());
                relink_case_file(
                    graph,
                    &deadline.id,
                    prior,
                    deadline.case_file_id.as_deref(),
                    |file| &mut file.deadline_ids,
                );
                let id = deadline.id.clone();
                graph.deadlines.insert(id.clone(), deadline);
                Mutation::Write(Some(id))
            })
            .await?;

        let Some(id) = committed.value else {
            tracing::debug!(workspace = %workspace, "Rejected illegal deadline status change");
            return Ok(None);
        };
        let Some(stored) = committed.graph.deadlines.get(&id).cloned() else {
            return Ok(None);
        };
        self.project(workspace, &stored).await;
        self.record(
            workspace,
            "upsert",
            Deadline::KIND,
            &id,
            json!({ "status": stored.status.as_str() }),
        )
        .await;
        Ok(Some(stored))
    }

    /// Move a deadline to `status` and re-project it. `None` when the
    /// deadline is missing or the transition is not allowed.
    pub async fn transition_deadline(
        &self,
        workspace: &WorkspaceId,
        deadline_id: &str,
        status: DeadlineStatus,
    ) -> Result<Option<Deadline>, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                let Some(deadline) = graph.deadlines.get_mut(deadline_id) else {
                    return Mutation::Skip(None);
                };
                if !deadline.status.can_transition_to(status) {
                    return Mutation::Skip(None);
                }
                if deadline.status == status {
                    return Mutation::Skip(Some(deadline.status));
                }
                let from = deadline.status;
                deadline.status = status;
                deadline.updated_at = Utc::now();
                Mutation::Write(Some(from))
            })
            .await?;

        let Some(from) = committed.value else {
            return Ok(None);
        };
        let Some(deadline) = committed.graph.deadlines.get(deadline_id).cloned() else {
            return Ok(None);
        };
        self.project(workspace, &deadline).await;
        if committed.written {
            self.record(
                workspace,
                "transition",
                Deadline::KIND,
                deadline_id,
                json!({ "from": from.as_str(), "to": status.as_str() }),
            )
            .await;
        }
        Ok(Some(deadline))
    }

    pub async fn mark_deadline_acknowledged(
        &self,
        workspace: &WorkspaceId,
        deadline_id: &str,
    ) -> Result<Option<Deadline>, StoreError> {
        self.transition_deadline(workspace, deadline_id, DeadlineStatus::Acknowledged)
            .await
    }

    /// Delete a client, reassigning every matter it was on. The default
    /// client cannot be deleted.
    pub async fn delete_client(
        &self,
        workspace: &WorkspaceId,
        client_id: &str,
    ) -> Result<bool, StoreError> {
        let default_client = default_client_id(workspace);
        if client_id == default_client {
            return Ok(false);
        }

        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if graph.clients.remove(client_id).is_none() {
                    return Mutation::Skip(None);
                }
                let now = Utc::now();
                let mut affected = 0usize;
                for matter in graph.matters.values_mut() {
                    if !matter.has_client(client_id) {
                        continue;
                    }
                    remove_id(&mut matter.client_ids, client_id);
                    if matter.client_id == client_id {
                        matter.client_id = matter
                            .client_ids
                            .first()
                            .cloned()
                            .unwrap_or_else(|| default_client.clone());
                    }
                    if matter.client_ids.is_empty() {
                        matter.client_ids.push(matter.client_id.clone());
                    }
                    matter.updated_at = now;
                    affected += 1;
                }
                Mutation::Write(Some(affected))
            })
            .await?;

        let Some(affected) = committed.value else {
            return Ok(false);
        };
        self.record(
            workspace,
            "delete",
            Client::KIND,
            client_id,
            json!({ "reassigned_matters": affected }),
        )
        .await;
        Ok(true)
    }

    /// Idempotent. `None` when the matter or the client does not exist.
    pub async fn add_client_to_matter(
        &self,
        workspace: &WorkspaceId,
        matter_id: &str,
        client_id: &str,
    ) -> Result<Option<Matter>, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if !graph.clients.contains_key(client_id) {
                    return Mutation::Skip(false);
                }
                let Some(matter) = graph.matters.get_mut(matter_id) else {
                    return Mutation::Skip(false);
                };
                if matter.client_ids.iter().any(|id| id == client_id) {
                    return Mutation::Skip(true);
                }
                matter.client_ids.push(client_id.to_string());
                matter.updated_at = Utc::now();
                Mutation::Write(true)
            })
            .await?;

        if !committed.value {
            return Ok(None);
        }
        if committed.written {
            self.record(
                workspace,
                "add_client",
                Matter::KIND,
                matter_id,
                json!({ "client_id": client_id }),
            )
            .await;
        }
        Ok(committed.graph.matters.get(matter_id).cloned())
    }

    /// `None` when the matter is missing or `client_id` is its primary
    /// client. Removing a client that is not on the matter returns the
    /// matter unchanged.
    pub async fn remove_client_from_matter(
        &self,
        workspace: &WorkspaceId,
        matter_id: &str,
        client_id: &str,
    ) -> Result<Option<Matter>, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                let Some(matter) = graph.matters.get_mut(matter_id) else {
                    return Mutation::Skip(false);
                };
                if matter.client_id == client_id {
                    return Mutation::Skip(false);
                }
                if !remove_id(&mut matter.client_ids, client_id) {
                    return Mutation::Skip(true);
                }
                matter.updated_at = Utc::now();
                Mutation::Write(true)
            })
            .await?;

        if !committed.value {
            return Ok(None);
        }
        if committed.written {
            self.record(
                workspace,
                "remove_client",
                Matter::KIND,
                matter_id,
                json!({ "client_id": client_id }),
            )
            .await;
        }
        Ok(committed.graph.matters.get(matter_id).cloned())
    }

    /// Delete a matter. Case files that pointed at it are detached and kept;
    /// deadlines and appointments lose their matter reference.
    pub async fn delete_matter(
        &self,
        workspace: &WorkspaceId,
        matter_id: &str,
    ) -> Result<bool, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if graph.matters.remove(matter_id).is_none() {
                    return Mutation::Skip(None);
                }
                let mut detached = 0usize;
                for case_file in graph.case_files.values_mut() {
                    if case_file.matter_id() == Some(matter_id) {
                        case_file.detach_matter();
                        detached += 1;
                    }
                }
                let mut unlinked_deadlines = Vec::new();
                for deadline in graph.deadlines.values_mut() {
                    if deadline.matter_id.as_deref() == Some(matter_id) {
                        deadline.matter_id = None;
                        unlinked_deadlines.push(deadline.id.clone());
                    }
                }
                for appointment in graph.appointments.values_mut() {
                    if appointment.matter_id.as_deref() == Some(matter_id) {
                        appointment.matter_id = None;
                    }
                }
                Mutation::Write(Some((detached, unlinked_deadlines)))
            })
            .await?;

        let Some((detached, unlinked_deadlines)) = committed.value else {
            return Ok(false);
        };
        join_all(
            unlinked_deadlines
                .iter()
                .filter_map(|id| committed.graph.deadlines.get(id))
                .map(|deadline| self.project(workspace, deadline)),
        )
        .await;
        self.record(
            workspace,
            "delete",
            Matter::KIND,
            matter_id,
            json!({ "detached_case_files": detached }),
        )
        .await;
        Ok(true)
    }

    /// Link a case file to an existing matter, undoing any earlier detach.
    pub async fn attach_case_file_to_matter(
        &self,
        workspace: &WorkspaceId,
        case_file_id: &str,
        matter_id: &str,
    ) -> Result<Option<CaseFile>, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if !graph.matters.contains_key(matter_id) {
                    return Mutation::Skip(false);
                }
                let Some(case_file) = graph.case_files.get_mut(case_file_id) else {
                    return Mutation::Skip(false);
                };
                if case_file.matter_id() == Some(matter_id) {
                    return Mutation::Skip(true);
                }
                case_file.link_matter(matter_id);
                case_file.updated_at = Utc::now();
                Mutation::Write(true)
            })
            .await?;

        if !committed.value {
            return Ok(None);
        }
        if committed.written {
            self.record(
                workspace,
                "attach",
                CaseFile::KIND,
                case_file_id,
                json!({ "matter_id": matter_id }),
            )
            .await;
        }
        Ok(committed.graph.case_files.get(case_file_id).cloned())
    }

    /// Delete a case file and clear the back-references its actors, issues
    /// and deadlines hold.
    pub async fn delete_case_file(
        &self,
        workspace: &WorkspaceId,
        case_file_id: &str,
    ) -> Result<bool, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if graph.case_files.remove(case_file_id).is_none() {
                    return Mutation::Skip(false);
                }
                let owned = Some(case_file_id);
                for actor in graph.actors.values_mut() {
                    if actor.case_file_id.as_deref() == owned {
                        actor.case_file_id = None;
                    }
                }
                for issue in graph.issues.values_mut() {
                    if issue.case_file_id.as_deref() == owned {
                        issue.case_file_id = None;
                    }
                }
                for deadline in graph.deadlines.values_mut() {
                    if deadline.case_file_id.as_deref() == owned {
                        deadline.case_file_id = None;
                    }
                }
                Mutation::Write(true)
            })
            .await?;

        if committed.value {
            self.record(workspace, "delete", CaseFile::KIND, case_file_id, json!({}))
                .await;
        }
        Ok(committed.value)
    }

    pub async fn delete_actor(
        &self,
        workspace: &WorkspaceId,
        actor_id: &str,
    ) -> Result<bool, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if graph.actors.remove(actor_id).is_none() {
                    return Mutation::Skip(false);
                }
                for case_file in graph.case_files.values_mut() {
                    remove_id(&mut case_file.actor_ids, actor_id);
                }
                Mutation::Write(true)
            })
            .await?;

        if committed.value {
            self.record(workspace, "delete", Actor::KIND, actor_id, json!({}))
                .await;
        }
        Ok(committed.value)
    }

    pub async fn delete_issue(
        &self,
        workspace: &WorkspaceId,
        issue_id: &str,
    ) -> Result<bool, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if graph.issues.remove(issue_id).is_none() {
                    return Mutation::Skip(false);
                }
                for case_file in graph.case_files.values_mut() {
                    remove_id(&mut case_file.issue_ids, issue_id);
                }
                Mutation::Write(true)
            })
            .await?;

        if committed.value {
            self.record(workspace, "delete", Issue::KIND, issue_id, json!({}))
                .await;
        }
        Ok(committed.value)
    }

    /// Delete a deadline, drop it from case files, and remove its calendar
    /// event.
    pub async fn delete_deadline(
        &self,
        workspace: &WorkspaceId,
        deadline_id: &str,
    ) -> Result<bool, StoreError> {
        let committed = self
            .graph
            .mutate(workspace, |graph| {
                if graph.deadlines.remove(deadline_id).is_none() {
                    return Mutation::Skip(false);
                }
                for case_file in graph.case_files.values_mut() {
                    remove_id(&mut case_file.deadline_ids, deadline_id);
                }
                Mutation::Write(true)
            })
            .await?;

        if !committed.value {
            return Ok(false);
        }
        self.unproject(workspace, deadline_id).await;
        self.record(workspace, "delete", Deadline::KIND, deadline_id, json!({}))
            .await;
        Ok(true)
    }

    pub async fn delete_appointment(
        &self,
        workspace: &WorkspaceId,
        appointment_id: &str,
    ) -> Result<bool, StoreError> {
        let deleted = self
            .graph
            .delete::<Appointment>(workspace, appointment_id)
            .await?;
        if deleted {
            self.record(workspace, "delete", Appointment::KIND, appointment_id, json!({}))
                .await;
        }
        Ok(deleted)
    }

    /// Matters where the client is primary or co-party.
    pub async fn matters_for_client(
        &self,
        workspace: &WorkspaceId,
        client_id: &str,
    ) -> Result<Vec<Matter>, StoreError> {
        let graph = self.graph.get(workspace).await?;
        Ok(graph
            .matters
            .into_values()
            .filter(|matter| matter.has_client(client_id))
            .collect())
    }
}
