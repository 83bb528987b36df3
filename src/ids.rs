use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for every UUIDv5 this crate derives.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c61_7779_6572_4000_8000_6772_6170_6800);

/// Keep identifiers filesystem-safe and deterministic.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Tenant boundary. Every storage key is namespaced by one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Sanitize `raw`; `None` if nothing usable remains.
    pub fn new(raw: &str) -> Option<Self> {
        let id = sanitize_identifier(raw);
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn derived_id(workspace: &WorkspaceId, purpose: &str, input: &str) -> String {
    let name = format!("{}:{purpose}:{input}", workspace.as_str());
    Uuid::new_v5(&ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Id of the workspace's catch-all client.
pub fn default_client_id(workspace: &WorkspaceId) -> String {
    derived_id(workspace, "default-client", "")
}

/// Id of the matter synthesized for a case file that never had one.
pub fn synthesized_matter_id(workspace: &WorkspaceId, case_file_id: &str) -> String {
    derived_id(workspace, "case-file-matter", case_file_id)
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Drop blanks and repeats, keeping first-seen order. Returns true when
/// anything was removed.
pub fn dedupe_ids(ids: &mut Vec<String>) -> bool {
    let before = ids.len();
    let mut seen = HashSet::with_capacity(ids.len());
    ids.retain(|id| !id.trim().is_empty() && seen.insert(id.clone()));
    ids.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_ids_are_sanitized() {
        let ws = WorkspaceId::new(" Acme Law/Boston ").expect("workspace");
        assert_eq!(ws.as_str(), "acme-law-boston");
        assert!(WorkspaceId::new("  !!! ").is_none());
    }

    #[test]
    fn derived_ids_are_stable_and_workspace_scoped() {
        let a = WorkspaceId::new("a").expect("workspace");
        let b = WorkspaceId::new("b").expect("workspace");
        assert_eq!(default_client_id(&a), default_client_id(&a));
        assert_ne!(default_client_id(&a), default_client_id(&b));
        assert_eq!(
            synthesized_matter_id(&a, "cf-1"),
            synthesized_matter_id(&a, "cf-1")
        );
        assert_ne!(
            synthesized_matter_id(&a, "cf-1"),
            synthesized_matter_id(&a, "cf-2")
        );
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let mut ids = vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            " ".to_string(),
            "c".to_string(),
        ];
        assert!(dedupe_ids(&mut ids));
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(!dedupe_ids(&mut ids));
    }
}
