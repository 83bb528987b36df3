//! clawyer-store: per-workspace persistence for a legal practice.
//!
//! The workspace graph (clients, matters, case files, actors, issues,
//! deadlines, appointments) is normalized on every read and write and stored
//! as one value. Flat side collections (documents, jobs, emails, audit
//! entries, lawyer profiles, calendar events) share the same tiered storage
//! policy. [`LegalPracticeService`] keeps relationships consistent on top.
//!
//! Every store assumes one writer per workspace. There is no locking.

pub mod collections;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod ids;
pub mod legal;
pub mod logging;
pub mod sanitize;
pub mod settings;

use std::sync::Arc;

pub use collections::{
    AuditEntry, CollectionPolicy, CollectionRecord, CollectionStore, DocumentRecord, EmailRecord,
    JobRecord, JobStatus, LawyerProfile,
};
pub use config::StoreConfig;
pub use db::{StorageKey, TieredStore};
pub use error::{CacheError, CalendarError, ConfigError, StoreError};
pub use graph::{GraphStore, WorkspaceGraph};
pub use ids::WorkspaceId;
pub use legal::{AuditTrail, CalendarEvent, CalendarSync, CollectionCalendar, LegalPracticeService};
pub use sanitize::SanitizationGuard;

/// Every store for one configuration, sharing a single pair of tiers.
#[derive(Clone)]
pub struct Stores {
    pub tiers: TieredStore,
    pub graph: GraphStore,
    pub documents: CollectionStore<DocumentRecord>,
    pub jobs: CollectionStore<JobRecord>,
    pub emails: CollectionStore<EmailRecord>,
    pub lawyers: CollectionStore<LawyerProfile>,
    pub audit: AuditTrail,
    pub calendar: CollectionCalendar,
    pub legal: LegalPracticeService,
}

impl Stores {
    /// Open the configured tiers and wire every store over them.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let tiers = db::tiers_from_config(&config.storage).await?;
        Ok(Self::with_tiers(tiers, config))
    }

    /// Wire every store over existing tiers.
    pub fn with_tiers(tiers: TieredStore, config: &StoreConfig) -> Self {
        let guard = SanitizationGuard::new(config.storage.text_field_budget);
        let limits = &config.collections;

        let graph = GraphStore::new(tiers.clone());
        let documents = CollectionStore::new(tiers.clone(), guard, CollectionPolicy::unbounded());
        let jobs = CollectionStore::new(
            tiers.clone(),
            guard,
            CollectionPolicy::unbounded()
                .with_ttl(limits.job_ttl)
                .with_max_items(limits.job_max_items),
        );
        let emails = CollectionStore::new(
            tiers.clone(),
            guard,
            CollectionPolicy::unbounded().with_max_items(limits.email_max_items),
        );
        let lawyers = CollectionStore::new(tiers.clone(), guard, CollectionPolicy::unbounded());
        let audit = AuditTrail::new(CollectionStore::new(
            tiers.clone(),
            guard,
            CollectionPolicy::unbounded().with_max_items(limits.audit_max_items),
        ));
        let calendar = CollectionCalendar::new(CollectionStore::new(
            tiers.clone(),
            guard,
            CollectionPolicy::unbounded(),
        ));
        let legal = LegalPracticeService::new(
            graph.clone(),
            lawyers.clone(),
            Arc::new(calendar.clone()),
            audit.clone(),
        );

        Self {
            tiers,
            graph,
            documents,
            jobs,
            emails,
            lawyers,
            audit,
            calendar,
            legal,
        }
    }
}
