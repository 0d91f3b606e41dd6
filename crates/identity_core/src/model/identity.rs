//! Consolidated identity view.
//!
//! # Responsibility
//! - Project one identity group into the caller-facing shape.
//!
//! # Invariants
//! - `emails` / `phone_numbers` list the primary's value first, then
//!   secondaries in ascending id order, without duplicates.
//! - `secondary_contact_ids` is ascending.

use crate::model::contact::{Contact, ContactId};
use serde::{Deserialize, Serialize};

/// Externally visible identity of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

impl IdentityView {
    /// Builds the view for `primary` from the members of its group.
    ///
    /// `group` may or may not contain `primary` itself; every other member is
    /// reported as a secondary. Pure projection, no ordering is assumed on
    /// input.
    pub fn from_group(primary: &Contact, group: &[Contact]) -> Self {
        let mut secondaries: Vec<&Contact> = group
            .iter()
            .filter(|contact| contact.id != primary.id)
            .collect();
        secondaries.sort_by_key(|contact| contact.id);

        let mut emails = Vec::new();
        let mut phone_numbers = Vec::new();
        for contact in std::iter::once(primary).chain(secondaries.iter().copied()) {
            push_unique(&mut emails, contact.email.as_deref());
            push_unique(&mut phone_numbers, contact.phone_number.as_deref());
        }

        Self {
            primary_contact_id: primary.id,
            emails,
            phone_numbers,
            secondary_contact_ids: secondaries.iter().map(|contact| contact.id).collect(),
        }
    }

    /// View of a lone primary with no secondaries.
    pub fn single(primary: &Contact) -> Self {
        Self::from_group(primary, &[])
    }
}

fn push_unique(values: &mut Vec<String>, candidate: Option<&str>) {
    if let Some(value) = candidate {
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }
}
