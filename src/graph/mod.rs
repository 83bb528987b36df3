//! The per-workspace entity graph: model, normalization, and storage.

pub mod model;
pub mod normalize;
pub mod store;

pub use model::{
    Actor, Appointment, CaseFile, Client, ClientKind, Deadline, DeadlineStatus, GraphEntity, Issue,
    Matter, MatterStatus, OpposingParty, WorkspaceGraph,
};
pub use normalize::{
    DEFAULT_REMINDER_OFFSETS, NormalizationReport, SCHEMA_VERSION, normalize,
    normalize_reminder_offsets, normalize_with_report,
};
pub use store::{Committed, GRAPH_COLLECTION, GraphStore, Mutation};
