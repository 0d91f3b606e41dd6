//! Authoritative primary selection for one observation.
//!
//! # Responsibility
//! - Pick the candidate primary from the contacts an observation matched.
//! - Collect every primary the observation connects and decide whether they
//!   must be merged.
//!
//! # Invariants
//! - Competing primaries are ordered by `(created_at, id)`; the first wins.
//! - A secondary whose link resolves to nothing is used as its own primary
//!   and reported through `event=data_integrity`.
//! - Link chains are followed for at most `MAX_LINK_HOPS` steps.

use crate::model::contact::{Contact, ContactId};
use crate::model::observation::Observation;
use crate::repo::contact_repo::{ContactStore, StoreError, StoreResult};
use log::warn;
use std::collections::HashMap;

const MAX_LINK_HOPS: usize = 8;

/// How the candidate primary was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimarySource {
    /// The observation matched the primary directly.
    Matched,
    /// Reached through the `linked_id` of a matched secondary.
    Linked { via: ContactId },
    /// A matched secondary had no resolvable primary and stands in for one.
    DanglingFallback { secondary: ContactId },
}

/// Primaries that must collapse into one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub survivor: Contact,
    /// Primaries to demote under `survivor`, oldest first.
    pub demoted: Vec<Contact>,
}

impl MergePlan {
    pub fn demoted_ids(&self) -> Vec<ContactId> {
        self.demoted.iter().map(|contact| contact.id).collect()
    }
}

/// Result of group resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Primary every later step works against.
    pub primary: Contact,
    pub source: PrimarySource,
    /// Present when more than one primary is implicated.
    pub merge: Option<MergePlan>,
}

/// Resolves the authoritative primary for `matched`, the active contacts the
/// observation hit directly.
///
/// # Errors
/// - `StoreError::InvalidData` when `matched` is empty.
/// - Any store lookup failure.
pub fn resolve<S: ContactStore>(
    store: &S,
    observation: &Observation,
    matched: &[Contact],
) -> StoreResult<Resolution> {
    let owners = resolve_owners(store, matched)?;
    let (candidate, source) = candidate_primary(matched, &owners)?;

    let mut implicated =
        store.find_primaries_by_email_or_phone(observation.email(), observation.phone_number())?;
    implicated.extend(owners.values().flatten().cloned());

    match plan_merge(implicated) {
        Ok(plan) => Ok(Resolution {
            primary: plan.survivor.clone(),
            source,
            merge: Some(plan),
        }),
        Err(Some(only)) => Ok(Resolution {
            primary: only,
            source,
            merge: None,
        }),
        Err(None) => Ok(Resolution {
            primary: candidate,
            source,
            merge: None,
        }),
    }
}

/// Resolves the primary a single contact belongs to.
///
/// Returns the contact itself for primaries and for secondaries whose link
/// cannot be resolved.
pub fn owner_of<S: ContactStore>(store: &S, contact: &Contact) -> StoreResult<Contact> {
    if contact.is_primary() {
        return Ok(contact.clone());
    }
    Ok(follow_link(store, contact)?.unwrap_or_else(|| contact.clone()))
}

/// Oldest primary among `contacts`, if any.
pub fn oldest_primary(contacts: &[Contact]) -> Option<&Contact> {
    contacts
        .iter()
        .filter(|contact| contact.is_primary())
        .min_by_key(|contact| contact.seniority())
}

/// Orders and deduplicates `primaries` and splits off the survivor.
///
/// Returns `Err(Some(primary))` when exactly one distinct primary remains and
/// `Err(None)` when there is none.
pub fn plan_merge(mut primaries: Vec<Contact>) -> Result<MergePlan, Option<Contact>> {
    primaries.retain(Contact::is_primary);
    primaries.sort_by_key(Contact::seniority);
    primaries.dedup_by_key(|contact| contact.id);

    let mut ordered = primaries.into_iter();
    let Some(survivor) = ordered.next() else {
        return Err(None);
    };
    let demoted: Vec<Contact> = ordered.collect();
    if demoted.is_empty() {
        return Err(Some(survivor));
    }
    Ok(MergePlan { survivor, demoted })
}

fn candidate_primary(
    matched: &[Contact],
    owners: &HashMap<ContactId, Option<Contact>>,
) -> StoreResult<(Contact, PrimarySource)> {
    if let Some(primary) = oldest_primary(matched) {
        return Ok((primary.clone(), PrimarySource::Matched));
    }

    let mut secondaries: Vec<&Contact> = matched.iter().collect();
    secondaries.sort_by_key(|contact| contact.id);

    for secondary in &secondaries {
        let owner = secondary
            .linked_id
            .and_then(|linked_id| owners.get(&linked_id))
            .and_then(Option::as_ref);
        if let Some(owner) = owner {
            return Ok((owner.clone(), PrimarySource::Linked { via: secondary.id }));
        }
    }

    let Some(fallback) = secondaries.first() else {
        return Err(StoreError::InvalidData(
            "group resolution requires at least one matched contact".to_string(),
        ));
    };
    warn!(
        "event=data_integrity module=resolver status=degraded kind=dangling_fallback contact_id={} linked_id={:?}",
        fallback.id, fallback.linked_id
    );
    Ok((
        (*fallback).clone(),
        PrimarySource::DanglingFallback {
            secondary: fallback.id,
        },
    ))
}

/// Maps every `linked_id` of a matched secondary to its active primary, or
/// `None` when the link is dangling.
fn resolve_owners<S: ContactStore>(
    store: &S,
    matched: &[Contact],
) -> StoreResult<HashMap<ContactId, Option<Contact>>> {
    let mut owners = HashMap::new();
    for contact in matched.iter().filter(|contact| !contact.is_primary()) {
        let Some(linked_id) = contact.linked_id else {
            continue;
        };
        if owners.contains_key(&linked_id) {
            continue;
        }
        if let Some(primary) = matched
            .iter()
            .find(|candidate| candidate.id == linked_id && candidate.is_primary())
        {
            owners.insert(linked_id, Some(primary.clone()));
            continue;
        }
        owners.insert(linked_id, follow_link(store, contact)?);
    }
    Ok(owners)
}

/// Walks `linked_id` references from a secondary until a primary is found.
fn follow_link<S: ContactStore>(store: &S, secondary: &Contact) -> StoreResult<Option<Contact>> {
    let mut visited = vec![secondary.id];
    let mut next = secondary.linked_id;

    for hop in 1..=MAX_LINK_HOPS {
        let Some(linked_id) = next else {
            break;
        };
        if visited.contains(&linked_id) {
            warn!(
                "event=data_integrity module=resolver status=degraded kind=link_cycle contact_id={} linked_id={}",
                secondary.id, linked_id
            );
            return Ok(None);
        }
        visited.push(linked_id);

        match store.find_by_id(linked_id)? {
            Some(target) if target.is_primary() => {
                if hop > 1 {
                    warn!(
                        "event=data_integrity module=resolver status=degraded kind=chained_link contact_id={} primary_id={} hops={}",
                        secondary.id, target.id, hop
                    );
                }
                return Ok(Some(target));
            }
            Some(target) => next = target.linked_id,
            None => {
                warn!(
                    "event=data_integrity module=resolver status=degraded kind=dangling_link contact_id={} linked_id={}",
                    secondary.id, linked_id
                );
                return Ok(None);
            }
        }
    }

    warn!(
        "event=data_integrity module=resolver status=degraded kind=unresolved_chain contact_id={} hops={}",
        secondary.id, MAX_LINK_HOPS
    );
    Ok(None)
}
