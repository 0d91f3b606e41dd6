//! Identity view assembly.

use crate::model::contact::Contact;
use crate::model::identity::IdentityView;
use crate::repo::contact_repo::{ContactStore, StoreResult};

/// Re-reads the group of `primary` and projects it. Performs no writes.
pub fn build<S: ContactStore>(store: &S, primary: &Contact) -> StoreResult<IdentityView> {
    let group = store.find_group(primary.id)?;
    Ok(IdentityView::from_group(primary, &group))
}
