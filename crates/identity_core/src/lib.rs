//! Identity reconciliation core.
//! This crate is the single source of truth for contact-linking invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ReconcileConfig, DEFAULT_MAX_ATTEMPTS};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence};
pub use model::identity::IdentityView;
pub use model::observation::{Observation, ObservationError};
pub use repo::contact_repo::{ContactStore, SqliteContactStore, StoreError, StoreResult};
pub use service::group_resolver::{MergePlan, PrimarySource, Resolution};
pub use service::identity_service::{
    IdentityService, ReconcileError, ReconcileResult, Reconciliation,
};
pub use service::merge_executor::MergeOutcome;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
