use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collections::CollectionRecord;
use crate::sanitize::SanitizationGuard;

/// A document attached to a matter. `text` holds extracted text, `content`
/// the raw body when it was stored inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentRecord {
    pub id: String,
    pub matter_id: Option<String>,
    pub title: String,
    pub mime_type: Option<String>,
    pub text: Option<String>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CollectionRecord for DocumentRecord {
    const COLLECTION: &'static str = "documents";

    fn record_key(&self) -> String {
        self.id.clone()
    }

    fn sanitize(&mut self, guard: &SanitizationGuard) -> bool {
        let text = guard.sanitize_optional(&mut self.text);
        let content = guard.sanitize_optional(&mut self.content);
        text || content
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Background work item. Expires by `updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub payload: Value,
    pub output: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CollectionRecord for JobRecord {
    const COLLECTION: &'static str = "jobs";

    fn record_key(&self) -> String {
        self.id.clone()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn sanitize(&mut self, guard: &SanitizationGuard) -> bool {
        let output = guard.sanitize_optional(&mut self.output);
        let error = guard.sanitize_optional(&mut self.error);
        output || error
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailRecord {
    pub id: String,
    pub matter_id: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub body: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CollectionRecord for EmailRecord {
    const COLLECTION: &'static str = "emails";

    fn record_key(&self) -> String {
        self.id.clone()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.sent_at.unwrap_or(self.created_at))
    }

    fn sanitize(&mut self, guard: &SanitizationGuard) -> bool {
        guard.sanitize_field(&mut self.body)
    }
}

/// One link in a workspace's audit hash chain.
///
/// `hash` is the SHA-256 of the entry serialized with `hash` unset, so it
/// covers `prev_hash` as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditEntry {
    pub id: String,
    pub at: DateTime<Utc>,
    pub action: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl CollectionRecord for AuditEntry {
    const COLLECTION: &'static str = "audit_entries";

    fn record_key(&self) -> String {
        self.id.clone()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.at)
    }
}

/// A lawyer who can be assigned to matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LawyerProfile {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for LawyerProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            display_name: String::new(),
            email: None,
            active: true,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            extra: Map::new(),
        }
    }
}

impl CollectionRecord for LawyerProfile {
    const COLLECTION: &'static str = "lawyer_profiles";

    fn record_key(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lawyer_profiles_default_to_active() {
        let profile: LawyerProfile =
            serde_json::from_str(r#"{"id":"l1","display_name":"Ada"}"#).expect("decode");
        assert!(profile.active);

        let inactive: LawyerProfile =
            serde_json::from_str(r#"{"id":"l2","active":false}"#).expect("decode");
        assert!(!inactive.active);
    }

    #[test]
    fn document_sanitizes_both_text_fields() {
        let guard = SanitizationGuard::new(16);
        let mut doc = DocumentRecord {
            id: "d1".to_string(),
            text: Some("a".repeat(100)),
            content: Some(format!("data:image/png;base64,{}", "QUJD".repeat(50))),
            ..DocumentRecord::default()
        };

        assert!(doc.sanitize(&guard));
        assert!(doc.text.as_deref().is_some_and(|t| t.ends_with("[truncated]")));
        assert_eq!(
            doc.content.as_deref(),
            Some(crate::sanitize::BINARY_PLACEHOLDER)
        );
        assert!(!doc.sanitize(&guard));
    }

    #[test]
    fn email_age_prefers_sent_at() {
        let sent = Utc::now();
        let email = EmailRecord {
            id: "e1".to_string(),
            sent_at: Some(sent),
            ..EmailRecord::default()
        };
        assert_eq!(email.timestamp(), Some(sent));
    }
}
