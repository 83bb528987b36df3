use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collections::{CollectionRecord, CollectionStore};
use crate::error::CalendarError;
use crate::graph::{Deadline, DeadlineStatus};
use crate::ids::WorkspaceId;

pub const DEADLINE_SOURCE: &str = "deadline";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarReminder {
    pub offset_minutes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarEvent {
    pub workspace_id: String,
    pub matter_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub all_day: bool,
    pub reminders: Vec<CalendarReminder>,
    pub source: String,
    pub source_id: String,
}

impl CalendarEvent {
    pub fn source_key(source: &str, source_id: &str) -> String {
        format!("{source}:{source_id}")
    }
}

impl CollectionRecord for CalendarEvent {
    const COLLECTION: &'static str = "calendar_events";

    fn record_key(&self) -> String {
        Self::source_key(&self.source, &self.source_id)
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.start_at)
    }
}

/// Calendar the service keeps in step with deadlines.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Create or replace the event owned by `(event.source, event.source_id)`.
    async fn upsert_event_for_source(&self, event: CalendarEvent) -> Result<(), CalendarError>;

    /// Returns whether an event was removed.
    async fn remove_event_for_source(
        &self,
        workspace: &WorkspaceId,
        source: &str,
        source_id: &str,
    ) -> Result<bool, CalendarError>;
}

pub fn status_glyph(status: DeadlineStatus) -> &'static str {
    match status {
        DeadlineStatus::Open => "⏳",
        DeadlineStatus::Alerted => "🔔",
        DeadlineStatus::Acknowledged => "👁",
        DeadlineStatus::Expired => "⚠",
        DeadlineStatus::Completed => "✅",
    }
}

/// The event a deadline projects to, keyed by `(deadline, deadline id)`.
/// Reminders mirror the offsets 1:1. Every deadline write re-projects the
/// event in full, so calendar-side edits do not survive.
pub fn project_deadline(workspace: &WorkspaceId, deadline: &Deadline) -> CalendarEvent {
    CalendarEvent {
        workspace_id: workspace.as_str().to_string(),
        matter_id: deadline.matter_id.clone(),
        title: format!("{} {}", status_glyph(deadline.status), deadline.title),
        description: deadline.description.clone(),
        start_at: deadline.due_at,
        all_day: deadline.all_day,
        reminders: deadline
            .reminder_offsets_in_minutes
            .iter()
            .map(|offset| CalendarReminder {
                offset_minutes: *offset,
            })
            .collect(),
        source: DEADLINE_SOURCE.to_string(),
        source_id: deadline.id.clone(),
    }
}

/// Calendar kept as a flat `calendar_events` collection per workspace.
#[derive(Clone)]
pub struct CollectionCalendar {
    events: CollectionStore<CalendarEvent>,
}

impl CollectionCalendar {
    pub fn new(events: CollectionStore<CalendarEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &CollectionStore<CalendarEvent> {
        &self.events
    }

    pub async fn find_for_source(
        &self,
        workspace: &WorkspaceId,
        source: &str,
        source_id: &str,
    ) -> Result<Option<CalendarEvent>, CalendarError> {
        Ok(self
            .events
            .find(workspace, &CalendarEvent::source_key(source, source_id))
            .await?)
    }
}

#[async_trait]
impl CalendarSync for CollectionCalendar {
    async fn upsert_event_for_source(&self, event: CalendarEvent) -> Result<(), CalendarError> {
        let Some(workspace) = WorkspaceId::new(&event.workspace_id) else {
            return Err(CalendarError::Rejected {
                source_kind: event.source,
                source_id: event.source_id,
                reason: "event has no usable workspace id".to_string(),
            });
        };
        if event.source_id.trim().is_empty() {
            return Err(CalendarError::Rejected {
                source_kind: event.source,
                source_id: event.source_id,
                reason: "event has no source id".to_string(),
            });
        }
        self.events.upsert(&workspace, event).await?;
        Ok(())
    }

    async fn remove_event_for_source(
        &self,
        workspace: &WorkspaceId,
        source: &str,
        source_id: &str,
    ) -> Result<bool, CalendarError> {
        Ok(self
            .events
            .remove(workspace, &CalendarEvent::source_key(source, source_id))
            .await?)
    }
}
