//! Contact record model.
//!
//! # Responsibility
//! - Define the canonical contact row and its link precedence.
//! - Provide structural validation used by repository write and read paths.
//!
//! # Invariants
//! - `linked_id` is set iff `link_precedence == Secondary`.
//! - A contact never links to itself.
//! - At least one of `email` / `phone_number` is present.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable contact identifier, assigned by storage in creation order.
pub type ContactId = i64;

/// Role of a contact inside its identity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Authoritative record of the group.
    Primary,
    /// Record attached to a primary through `linked_id`.
    Secondary,
}

impl LinkPrecedence {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// One persisted contact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Primary this record belongs to. `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Epoch ms creation timestamp. Earlier creation wins merges.
    pub created_at: i64,
    /// Epoch ms timestamp of the last link change.
    pub updated_at: i64,
    /// Epoch ms soft-delete marker.
    pub deleted_at: Option<i64>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Ordering key used whenever two primaries compete: oldest first, then
    /// lowest id.
    pub fn seniority(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    /// Id of the primary this record reports to, or its own id for primaries.
    pub fn owner_id(&self) -> Option<ContactId> {
        match self.link_precedence {
            LinkPrecedence::Primary => Some(self.id),
            LinkPrecedence::Secondary => self.linked_id,
        }
    }

    /// Checks structural invariants of a single row.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(ContactValidationError::MissingContactPoint { id: self.id });
        }
        if self.linked_id == Some(self.id) {
            return Err(ContactValidationError::SelfLink { id: self.id });
        }
        match (self.link_precedence, self.linked_id) {
            (LinkPrecedence::Primary, Some(linked_id)) => {
                Err(ContactValidationError::PrimaryWithLink {
                    id: self.id,
                    linked_id,
                })
            }
            (LinkPrecedence::Secondary, None) => {
                Err(ContactValidationError::SecondaryWithoutLink { id: self.id })
            }
            _ => Ok(()),
        }
    }
}

/// Structural violations of a single contact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    MissingContactPoint { id: ContactId },
    SelfLink { id: ContactId },
    PrimaryWithLink { id: ContactId, linked_id: ContactId },
    SecondaryWithoutLink { id: ContactId },
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactPoint { id } => {
                write!(f, "contact {id} has neither email nor phone number")
            }
            Self::SelfLink { id } => write!(f, "contact {id} links to itself"),
            Self::PrimaryWithLink { id, linked_id } => {
                write!(f, "primary contact {id} must not link to {linked_id}")
            }
            Self::SecondaryWithoutLink { id } => {
                write!(f, "secondary contact {id} has no linked primary")
            }
        }
    }
}

impl Error for ContactValidationError {}
