//! Contact store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the lookup, insert and relink operations reconciliation needs.
//! - Expose one transaction boundary so a whole reconciliation commits or
//!   rolls back as a unit.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Soft-deleted rows (`deleted_at IS NOT NULL`) are never returned.
//! - Write paths call `Contact::validate()`-equivalent checks before SQL.
//! - Read paths reject unparseable rows instead of masking them.
//! - `demote_and_relink` is a single statement, so it applies fully or not
//!   at all.

use crate::db::DbError;
use crate::model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rusqlite::{Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for contact persistence and query operations.
#[derive(Debug)]
pub enum StoreError {
    /// Row-level invariant rejected before or after SQL.
    Validation(ContactValidationError),
    /// Another writer holds the database; the caller may retry the unit of
    /// work from scratch.
    Conflict(DbError),
    /// Any other storage failure.
    Db(DbError),
    /// Relink target does not exist or is not an active primary.
    NotFound(ContactId),
    /// Persisted row cannot be converted into a `Contact`.
    InvalidData(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(err) => write!(f, "contact store busy: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "primary contact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Conflict(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ContactValidationError> for StoreError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        if value.is_lock_contention() {
            Self::Conflict(value)
        } else {
            Self::Db(value)
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

/// Storage capabilities used by reconciliation.
pub trait ContactStore {
    /// Active contacts whose email equals `email` or whose phone equals
    /// `phone_number`, ascending by id. Absent arguments skip their clause.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>>;
    /// Active primaries matching either value, oldest first.
    fn find_primaries_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>>;
    /// Loads one active contact.
    fn find_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>>;
    /// Active contacts with `id = primary_id` or `linked_id = primary_id`,
    /// ascending by id.
    fn find_group(&self, primary_id: ContactId) -> StoreResult<Vec<Contact>>;
    /// Inserts a new primary.
    fn create_primary(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Contact>;
    /// Inserts a new secondary under `linked_id`.
    fn create_secondary(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
        linked_id: ContactId,
    ) -> StoreResult<Contact>;
    /// Demotes every contact in `ids` to secondary under `new_linked_id` and
    /// re-points their existing secondaries to `new_linked_id`. Returns the
    /// number of rows changed.
    fn demote_and_relink(&self, ids: &[ContactId], new_linked_id: ContactId)
        -> StoreResult<usize>;
    /// Runs `work` as one atomic unit. Any error rolls back every write made
    /// by `work`.
    fn transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> StoreResult<T>;
}

/// SQLite-backed contact store.
pub struct SqliteContactStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactStore<'conn> {
    /// Creates a store over a migrated connection (see `db::open_db`).
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_contacts(&self, sql: &str, bind_values: Vec<Value>) -> StoreResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut contacts = Vec::new();

        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }

        Ok(contacts)
    }

    fn load_required(&self, id: ContactId) -> StoreResult<Contact> {
        self.find_by_id(id)?.ok_or_else(|| {
            StoreError::InvalidData(format!("contact {id} missing right after insert"))
        })
    }

    fn insert(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
        precedence: LinkPrecedence,
        linked_id: Option<ContactId>,
    ) -> StoreResult<Contact> {
        if email.is_none() && phone_number.is_none() {
            return Err(ContactValidationError::MissingContactPoint { id: 0 }.into());
        }

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                linked_id,
                link_precedence
            ) VALUES (?1, ?2, ?3, ?4);",
            params![email, phone_number, linked_id, precedence.as_str()],
        )?;

        self.load_required(self.conn.last_insert_rowid())
    }
}

impl ContactStore for SqliteContactStore<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>> {
        let Some((clause, bind_values)) = contact_point_clause(email, phone_number) else {
            return Ok(Vec::new());
        };
        self.query_contacts(
            &format!(
                "{CONTACT_SELECT_SQL}
                 WHERE deleted_at IS NULL
                   AND ({clause})
                 ORDER BY id ASC;"
            ),
            bind_values,
        )
    }

    fn find_primaries_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>> {
        let Some((clause, bind_values)) = contact_point_clause(email, phone_number) else {
            return Ok(Vec::new());
        };
        self.query_contacts(
            &format!(
                "{CONTACT_SELECT_SQL}
                 WHERE deleted_at IS NULL
                   AND link_precedence = 'primary'
                   AND ({clause})
                 ORDER BY created_at ASC, id ASC;"
            ),
            bind_values,
        )
    }

    fn find_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE id = ?1
               AND deleted_at IS NULL;"
        ))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }

        Ok(None)
    }

    fn find_group(&self, primary_id: ContactId) -> StoreResult<Vec<Contact>> {
        self.query_contacts(
            &format!(
                "{CONTACT_SELECT_SQL}
                 WHERE deleted_at IS NULL
                   AND (id = ?1 OR linked_id = ?1)
                 ORDER BY id ASC;"
            ),
            vec![Value::Integer(primary_id)],
        )
    }

    fn create_primary(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Contact> {
        self.insert(email, phone_number, LinkPrecedence::Primary, None)
    }

    fn create_secondary(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
        linked_id: ContactId,
    ) -> StoreResult<Contact> {
        self.insert(
            email,
            phone_number,
            LinkPrecedence::Secondary,
            Some(linked_id),
        )
    }

    fn demote_and_relink(
        &self,
        ids: &[ContactId],
        new_linked_id: ContactId,
    ) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        if ids.contains(&new_linked_id) {
            return Err(ContactValidationError::SelfLink { id: new_linked_id }.into());
        }

        let target_is_primary: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1
                 FROM contacts
                 WHERE id = ?1
                   AND link_precedence = 'primary'
                   AND deleted_at IS NULL;",
                [new_linked_id],
                |row| row.get(0),
            )
            .optional()?;
        if target_is_primary.is_none() {
            return Err(StoreError::NotFound(new_linked_id));
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut bind_values = vec![Value::Integer(new_linked_id)];
        // Bound twice: once for the demoted rows, once for their secondaries.
        bind_values.extend(ids.iter().map(|id| Value::Integer(*id)));
        bind_values.extend(ids.iter().map(|id| Value::Integer(*id)));

        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET
                    link_precedence = 'secondary',
                    linked_id = ?1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id <> ?1
                   AND (id IN ({placeholders}) OR linked_id IN ({placeholders}));"
            ),
            params_from_iter(bind_values),
        )?;

        Ok(changed)
    }

    fn transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Self) -> StoreResult<T>,
    {
        // Immediate: the write lock is taken before the first read, so two
        // reconciliations never decide on the same stale snapshot.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let output = work(self)?;
        tx.commit()?;
        Ok(output)
    }
}

fn contact_point_clause(
    email: Option<&str>,
    phone_number: Option<&str>,
) -> Option<(String, Vec<Value>)> {
    let mut clauses = Vec::new();
    let mut bind_values = Vec::new();

    if let Some(email) = email {
        clauses.push("email = ?");
        bind_values.push(Value::Text(email.to_string()));
    }
    if let Some(phone_number) = phone_number {
        clauses.push("phone_number = ?");
        bind_values.push(Value::Text(phone_number.to_string()));
    }

    if clauses.is_empty() {
        return None;
    }
    Some((clauses.join(" OR "), bind_values))
}

fn parse_contact_row(row: &Row<'_>) -> StoreResult<Contact> {
    let id: ContactId = row.get("id")?;

    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence for id {id}"
        ))
    })?;

    let contact = Contact {
        id,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact.validate().map_err(|err| {
        StoreError::InvalidData(format!("contact row {id} violates invariants: {err}"))
    })?;
    Ok(contact)
}
