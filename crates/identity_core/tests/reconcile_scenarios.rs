use identity_core::db::open_db_in_memory;
use identity_core::{
    ContactStore, IdentityService, IdentityView, LinkPrecedence, Observation, ObservationError,
    ReconcileError, SqliteContactStore,
};
use rusqlite::{params, Connection};

fn observe(email: Option<&str>, phone: Option<&str>) -> Observation {
    Observation::new(email, phone).unwrap()
}

fn insert_contact(
    conn: &Connection,
    id: i64,
    email: Option<&str>,
    phone: Option<&str>,
    linked_id: Option<i64>,
    created_at: i64,
) {
    let precedence = if linked_id.is_some() {
        "secondary"
    } else {
        "primary"
    };
    conn.execute(
        "INSERT INTO contacts (id, email, phone_number, linked_id, link_precedence, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
        params![id, email, phone, linked_id, precedence, created_at],
    )
    .unwrap();
}

fn count_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))
        .unwrap()
}

fn view(primary: i64, emails: &[&str], phones: &[&str], secondaries: &[i64]) -> IdentityView {
    IdentityView {
        primary_contact_id: primary,
        emails: emails.iter().map(|value| value.to_string()).collect(),
        phone_numbers: phones.iter().map(|value| value.to_string()).collect(),
        secondary_contact_ids: secondaries.to_vec(),
    }
}

#[test]
fn first_observation_creates_primary() {
    let conn = open_db_in_memory().unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("a@x.com"), None))
        .unwrap();

    assert_eq!(result.view, view(1, &["a@x.com"], &[], &[]));
    let created = result.created.unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.link_precedence, LinkPrecedence::Primary);
    assert!(result.demoted_ids.is_empty());
}

#[test]
fn new_phone_for_known_email_creates_secondary() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), Some("111"), None, 100);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("a@x.com"), Some("222")))
        .unwrap();

    assert_eq!(result.view, view(1, &["a@x.com"], &["111", "222"], &[2]));
    let created = result.created.unwrap();
    assert_eq!(created.id, 2);
    assert_eq!(created.email.as_deref(), Some("a@x.com"));
    assert_eq!(created.phone_number.as_deref(), Some("222"));
    assert_eq!(created.linked_id, Some(1));
}

#[test]
fn observation_joining_two_primaries_demotes_the_newer_one() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), None, None, 100);
    insert_contact(&conn, 2, None, Some("222"), None, 200);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("a@x.com"), Some("222")))
        .unwrap();

    assert_eq!(result.view, view(1, &["a@x.com"], &["222"], &[2]));
    assert_eq!(result.demoted_ids, vec![2]);
    assert!(result.created.is_none());
    assert_eq!(count_rows(&conn), 2);

    let store = SqliteContactStore::new(&conn);
    let demoted = store.find_by_id(2).unwrap().unwrap();
    assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(demoted.linked_id, Some(1));
}

#[test]
fn oldest_primary_wins_even_when_it_has_the_larger_id() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, None, Some("111"), None, 900);
    insert_contact(&conn, 2, Some("b@x.com"), None, None, 100);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile(&observe(Some("b@x.com"), Some("111")))
        .unwrap();

    assert_eq!(result, view(2, &["b@x.com"], &["111"], &[1]));
}

#[test]
fn merge_repoints_secondaries_of_the_demoted_primary() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), None, None, 100);
    insert_contact(&conn, 2, None, Some("222"), None, 200);
    insert_contact(&conn, 3, Some("c@x.com"), Some("222"), Some(2), 300);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile(&observe(Some("a@x.com"), Some("222")))
        .unwrap();

    assert_eq!(result, view(1, &["a@x.com", "c@x.com"], &["222"], &[2, 3]));
    let store = SqliteContactStore::new(&conn);
    assert_eq!(store.find_by_id(3).unwrap().unwrap().linked_id, Some(1));
}

#[test]
fn secondary_match_pulls_in_its_primary_for_merging() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), Some("111"), None, 100);
    insert_contact(&conn, 2, Some("b@x.com"), Some("111"), Some(1), 200);
    insert_contact(&conn, 3, Some("c@x.com"), Some("333"), None, 300);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("b@x.com"), Some("333")))
        .unwrap();

    assert_eq!(
        result.view,
        view(
            1,
            &["a@x.com", "b@x.com", "c@x.com"],
            &["111", "333"],
            &[2, 3]
        )
    );
    assert_eq!(result.demoted_ids, vec![3]);
    assert!(result.created.is_none());
}

#[test]
fn only_secondaries_matched_resolves_through_linked_id() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), Some("111"), None, 100);
    insert_contact(&conn, 2, Some("b@x.com"), Some("222"), Some(1), 200);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile(&observe(Some("b@x.com"), Some("999")))
        .unwrap();

    assert_eq!(
        result,
        view(1, &["a@x.com", "b@x.com"], &["111", "222", "999"], &[2, 3])
    );
}

#[test]
fn repeated_observation_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));
    let observation = observe(Some("a@x.com"), Some("111"));

    let first = service.reconcile_detailed(&observation).unwrap();
    let rows_after_first = count_rows(&conn);
    let second = service.reconcile_detailed(&observation).unwrap();

    assert!(first.created.is_some());
    assert!(second.created.is_none());
    assert!(second.demoted_ids.is_empty());
    assert_eq!(first.view, second.view);
    assert_eq!(count_rows(&conn), rows_after_first);
}

#[test]
fn known_values_from_different_records_create_nothing() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), None, None, 100);
    insert_contact(&conn, 2, None, Some("111"), Some(1), 200);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("a@x.com"), Some("111")))
        .unwrap();

    assert!(result.created.is_none());
    assert_eq!(result.view, view(1, &["a@x.com"], &["111"], &[2]));
    assert_eq!(count_rows(&conn), 2);
}

#[test]
fn partial_observation_of_known_value_creates_nothing() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), Some("111"), None, 100);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let by_phone = service.reconcile(&observe(None, Some("111"))).unwrap();

    assert_eq!(by_phone, view(1, &["a@x.com"], &["111"], &[]));
    assert_eq!(count_rows(&conn), 1);
}

#[test]
fn soft_deleted_contacts_are_ignored() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), None, None, 100);
    conn.execute("UPDATE contacts SET deleted_at = 150 WHERE id = 1;", [])
        .unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service.reconcile(&observe(Some("a@x.com"), None)).unwrap();

    assert_eq!(result, view(2, &["a@x.com"], &[], &[]));
}

#[test]
fn dangling_link_falls_back_to_the_secondary_itself() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), Some("111"), None, 100);
    insert_contact(&conn, 2, Some("b@x.com"), Some("111"), Some(1), 200);
    conn.execute("UPDATE contacts SET deleted_at = 250 WHERE id = 1;", [])
        .unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("b@x.com"), Some("999")))
        .unwrap();

    assert_eq!(result.view, view(2, &["b@x.com"], &["111", "999"], &[3]));
    assert_eq!(result.created.unwrap().linked_id, Some(2));
}

#[test]
fn chained_secondaries_resolve_to_the_root_primary() {
    let conn = open_db_in_memory().unwrap();
    insert_contact(&conn, 1, Some("a@x.com"), None, None, 100);
    insert_contact(&conn, 2, Some("b@x.com"), None, Some(1), 200);
    insert_contact(&conn, 3, Some("c@x.com"), None, Some(2), 300);
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let result = service
        .reconcile_detailed(&observe(Some("c@x.com"), Some("333")))
        .unwrap();

    assert_eq!(result.view.primary_contact_id, 1);
    assert_eq!(result.created.unwrap().linked_id, Some(1));
}

#[test]
fn missing_contact_points_fail_validation_without_writes() {
    let conn = open_db_in_memory().unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let err = service.reconcile_contact_points(None, Some("")).unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Validation(ObservationError::MissingContactPoint)
    ));
    assert_eq!(count_rows(&conn), 0);
}

#[test]
fn store_failures_are_not_retried_and_roll_back() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE contacts;").unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));

    let err = service
        .reconcile(&observe(Some("a@x.com"), None))
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Store(_)));
    assert!(conn.is_autocommit());
}

#[test]
fn identity_of_reports_group_for_any_member() {
    let conn = open_db_in_memory().unwrap();
    let service = IdentityService::new(SqliteContactStore::new(&conn));
    service
        .reconcile(&observe(Some("a@x.com"), Some("111")))
        .unwrap();
    service
        .reconcile(&observe(Some("b@x.com"), Some("111")))
        .unwrap();

    let expected = view(1, &["a@x.com", "b@x.com"], &["111"], &[2]);
    assert_eq!(service.identity_of(1).unwrap(), Some(expected.clone()));
    assert_eq!(service.identity_of(2).unwrap(), Some(expected));
    assert_eq!(service.identity_of(42).unwrap(), None);
    assert_eq!(count_rows(&conn), 2);
}
