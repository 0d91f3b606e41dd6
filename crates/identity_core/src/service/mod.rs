//! Reconciliation use-case services.
//!
//! # Responsibility
//! - Resolve, merge, integrate and project identity groups.
//! - Keep callers decoupled from storage details.

pub mod group_resolver;
pub mod identity_service;
pub mod identity_view;
pub mod merge_executor;
pub mod observation_integrator;
