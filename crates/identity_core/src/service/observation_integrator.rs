//! Records new contact points observed for an existing identity.
//!
//! # Invariants
//! - At most one secondary is created per observation.
//! - Nothing is created when every supplied value already appears somewhere
//!   in the group, even if never together on one record.

use crate::model::contact::Contact;
use crate::model::observation::Observation;
use crate::repo::contact_repo::{ContactStore, StoreResult};

/// Creates a secondary under `primary` when `observation` carries a value the
/// group has not seen. Returns the created contact, if any.
pub fn integrate<S: ContactStore>(
    store: &S,
    primary: &Contact,
    observation: &Observation,
) -> StoreResult<Option<Contact>> {
    let group = store.find_group(primary.id)?;
    if !contributes_new_value(&group, observation) {
        return Ok(None);
    }

    let created = store.create_secondary(
        observation.email(),
        observation.phone_number(),
        primary.id,
    )?;
    Ok(Some(created))
}

/// Whether `observation` holds an email or phone number absent from `group`.
pub fn contributes_new_value(group: &[Contact], observation: &Observation) -> bool {
    let email_is_new = observation.email().is_some_and(|email| {
        !group
            .iter()
            .any(|contact| contact.email.as_deref() == Some(email))
    });
    let phone_is_new = observation.phone_number().is_some_and(|phone| {
        !group
            .iter()
            .any(|contact| contact.phone_number.as_deref() == Some(phone))
    });
    email_is_new || phone_is_new
}

#[cfg(test)]
mod tests {
    use super::contributes_new_value;
    use crate::model::contact::{Contact, LinkPrecedence};
    use crate::model::observation::Observation;

    fn row(id: i64, email: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id,
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id: (id != 1).then_some(1),
            link_precedence: if id == 1 {
                LinkPrecedence::Primary
            } else {
                LinkPrecedence::Secondary
            },
            created_at: id,
            updated_at: id,
            deleted_at: None,
        }
    }

    #[test]
    fn values_spread_across_records_are_not_new() {
        let group = vec![row(1, Some("a@x.com"), None), row(2, None, Some("111"))];
        let observation = Observation::new(Some("a@x.com"), Some("111")).unwrap();
        assert!(!contributes_new_value(&group, &observation));
    }

    #[test]
    fn one_new_value_is_enough() {
        let group = vec![row(1, Some("a@x.com"), Some("111"))];
        let new_phone = Observation::new(Some("a@x.com"), Some("222")).unwrap();
        let new_email = Observation::new(Some("b@x.com"), None::<String>).unwrap();
        assert!(contributes_new_value(&group, &new_phone));
        assert!(contributes_new_value(&group, &new_email));
    }

    #[test]
    fn absent_fields_never_count_as_new() {
        let group = vec![row(1, None, Some("111"))];
        let observation = Observation::new(None::<String>, Some("111")).unwrap();
        assert!(!contributes_new_value(&group, &observation));
    }
}
