use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Decode a scalar, falling back to its default on `null`, a wrong type or
/// an unknown enum variant.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Decode a list, dropping elements that do not decode.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Decode an id-keyed map, dropping entries that are not objects.
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries
            .into_iter()
            .filter(|(_, entry)| entry.is_object())
            .filter_map(|(id, entry)| serde_json::from_value(entry).ok().map(|e| (id, e)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// Distinguish a present `null` from an absent key. A value of the wrong
/// type reads as never linked.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Some(None),
        Value::String(id) => Some(Some(id)),
        _ => None,
    })
}

/// Reminder offsets from older payloads can be floats, strings or junk.
/// Keep anything that reads as a finite number, truncated toward zero.
fn lenient_offsets<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    fn finite(f: f64) -> Option<i64> {
        f.is_finite().then(|| f.trunc() as i64)
    }

    let raw = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    Ok(raw
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(finite)),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(finite),
            _ => None,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Individual,
    Organization,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub kind: ClientKind,
    #[serde(deserialize_with = "lenient")]
    pub display_name: String,
    #[serde(deserialize_with = "lenient")]
    pub archived: bool,
    #[serde(deserialize_with = "lenient_list")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Matter lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatterStatus {
    Intake,
    #[default]
    Active,
    Pending,
    Closed,
    Archived,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpposingParty {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub counsel: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Matter {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    /// Primary client. Always present in `client_ids`.
    #[serde(deserialize_with = "lenient")]
    pub client_id: String,
    #[serde(deserialize_with = "lenient_list")]
    pub client_ids: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub status: MatterStatus,
    #[serde(deserialize_with = "lenient")]
    pub jurisdiction: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub assigned_lawyer_ids: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub opposing_parties: Vec<OpposingParty>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Matter {
    pub fn has_client(&self, client_id: &str) -> bool {
        self.client_id == client_id || self.client_ids.iter().any(|id| id == client_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseFile {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    /// `None`: never linked (legacy data, gets a synthesized matter).
    /// `Some(None)`: explicitly detached. `Some(Some(id))`: linked.
    #[serde(
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub matter_id: Option<Option<String>>,
    #[serde(deserialize_with = "lenient_list")]
    pub actor_ids: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub issue_ids: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub deadline_ids: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CaseFile {
    /// Linked matter id, if any.
    pub fn matter_id(&self) -> Option<&str> {
        self.matter_id
            .as_ref()
            .and_then(|inner| inner.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.matter_id, Some(None))
    }

    pub fn link_matter(&mut self, matter_id: impl Into<String>) {
        self.matter_id = Some(Some(matter_id.into()));
    }

    pub fn detach_matter(&mut self) {
        self.matter_id = Some(None);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Actor {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub case_file_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Issue {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub case_file_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Deadline state.
///
/// `open → {acknowledged | alerted | expired} → completed`, and
/// `alerted → acknowledged`. Nothing returns to `open`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineStatus {
    #[default]
    Open,
    Acknowledged,
    Alerted,
    Expired,
    Completed,
}

impl DeadlineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Alerted => "alerted",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }

    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        use DeadlineStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Open, Acknowledged)
                | (Open, Alerted)
                | (Open, Expired)
                | (Alerted, Acknowledged)
                | (Acknowledged, Completed)
                | (Alerted, Completed)
                | (Expired, Completed)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deadline {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub matter_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub case_file_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub due_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub all_day: bool,
    #[serde(deserialize_with = "lenient")]
    pub status: DeadlineStatus,
    #[serde(deserialize_with = "lenient_offsets")]
    pub reminder_offsets_in_minutes: Vec<i64>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appointment {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub matter_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub starts_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything a workspace knows about its clients and matters, persisted
/// and read as one value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceGraph {
    #[serde(deserialize_with = "lenient")]
    pub workspace_id: String,
    #[serde(deserialize_with = "lenient")]
    pub schema_version: u32,
    /// Bumped on every structural change.
    #[serde(deserialize_with = "lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_entries")]
    pub clients: BTreeMap<String, Client>,
    #[serde(deserialize_with = "lenient_entries")]
    pub matters: BTreeMap<String, Matter>,
    #[serde(deserialize_with = "lenient_entries")]
    pub case_files: BTreeMap<String, CaseFile>,
    #[serde(deserialize_with = "lenient_entries")]
    pub actors: BTreeMap<String, Actor>,
    #[serde(deserialize_with = "lenient_entries")]
    pub issues: BTreeMap<String, Issue>,
    #[serde(deserialize_with = "lenient_entries")]
    pub deadlines: BTreeMap<String, Deadline>,
    #[serde(deserialize_with = "lenient_entries")]
    pub appointments: BTreeMap<String, Appointment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An entity kept in one of the graph's maps.
pub trait GraphEntity: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn created_at(&self) -> DateTime<Utc>;
    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>);
    fn map(graph: &WorkspaceGraph) -> &BTreeMap<String, Self>;
    fn map_mut(graph: &mut WorkspaceGraph) -> &mut BTreeMap<String, Self>;
}

macro_rules! graph_entity {
    ($ty:ty, $kind:literal, $field:ident) => {
        impl GraphEntity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
                self.created_at = created_at;
                self.updated_at = updated_at;
            }

            fn map(graph: &WorkspaceGraph) -> &BTreeMap<String, Self> {
                &graph.$field
            }

            fn map_mut(graph: &mut WorkspaceGraph) -> &mut BTreeMap<String, Self> {
                &mut graph.$field
            }
        }
    };
}

graph_entity!(Client, "client", clients);
graph_entity!(Matter, "matter", matters);
graph_entity!(CaseFile, "case_file", case_files);
graph_entity!(Actor, "actor", actors);
graph_entity!(Issue, "issue", issues);
graph_entity!(Deadline, "deadline", deadlines);
graph_entity!(Appointment, "appointment", appointments);
