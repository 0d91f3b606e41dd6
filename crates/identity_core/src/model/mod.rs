//! Contact domain model.
//!
//! # Responsibility
//! - Define the contact record, the incoming observation and the consolidated
//!   identity view returned to callers.
//!
//! # Invariants
//! - Every contact is identified by a stable, monotonically assigned `ContactId`.
//! - Deletion is represented by a soft-delete marker, never a hard delete.

pub mod contact;
pub mod identity;
pub mod observation;
