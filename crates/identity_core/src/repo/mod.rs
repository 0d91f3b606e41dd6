//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage capabilities reconciliation depends on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs never surface soft-deleted contacts.
//! - Lock contention is reported as `StoreError::Conflict`, distinct from
//!   other storage failures.

pub mod contact_repo;
