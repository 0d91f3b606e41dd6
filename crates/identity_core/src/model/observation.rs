//! Incoming observation model.
//!
//! # Invariants
//! - An `Observation` always carries at least one contact point.
//! - Empty strings are treated as absent; values are otherwise kept verbatim
//!   because matching is exact.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One `(email?, phoneNumber?)` pair submitted for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Observation {
    /// Builds a validated observation.
    ///
    /// # Errors
    /// - `ObservationError::MissingContactPoint` when both values are absent
    ///   or empty.
    pub fn new(
        email: Option<impl Into<String>>,
        phone_number: Option<impl Into<String>>,
    ) -> Result<Self, ObservationError> {
        let email = non_empty(email.map(Into::into));
        let phone_number = non_empty(phone_number.map(Into::into));
        if email.is_none() && phone_number.is_none() {
            return Err(ObservationError::MissingContactPoint);
        }
        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

/// Validation failure for caller-supplied observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationError {
    /// Neither email nor phone number was supplied.
    MissingContactPoint,
}

impl Display for ObservationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactPoint => write!(f, "either email or phoneNumber is required"),
        }
    }
}

impl Error for ObservationError {}
