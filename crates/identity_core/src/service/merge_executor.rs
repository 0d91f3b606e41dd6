//! Applies merge plans produced by group resolution.
//!
//! # Invariants
//! - Demotion of every extra primary and re-pointing of their secondaries is
//!   one store call, so no caller observes a half-merged group.
//! - The survivor is never modified.

use crate::model::contact::ContactId;
use crate::repo::contact_repo::{ContactStore, StoreResult};
use crate::service::group_resolver::MergePlan;
use log::info;

/// Outcome of one applied merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor_id: ContactId,
    pub demoted_ids: Vec<ContactId>,
    /// Demoted primaries plus re-pointed secondaries.
    pub rows_changed: usize,
}

/// Demotes every primary in `plan.demoted` under `plan.survivor`.
pub fn execute<S: ContactStore>(store: &S, plan: &MergePlan) -> StoreResult<MergeOutcome> {
    let demoted_ids = plan.demoted_ids();
    let rows_changed = store.demote_and_relink(&demoted_ids, plan.survivor.id)?;

    info!(
        "event=merge module=merge status=ok survivor_id={} demoted_count={} rows_changed={}",
        plan.survivor.id,
        demoted_ids.len(),
        rows_changed
    );

    Ok(MergeOutcome {
        survivor_id: plan.survivor.id,
        demoted_ids,
        rows_changed,
    })
}
