//! Identity reconciliation use-case service.
//!
//! # Responsibility
//! - Sequence match, group resolution, merge, integration and view building
//!   for one observation inside one store transaction.
//! - Retry the whole unit of work when the store reports lock contention.
//!
//! # Invariants
//! - Invalid observations never reach the store.
//! - Each attempt either commits all of its writes or none of them.
//! - Exactly one of "new primary", "new secondary" or "no new record"
//!   happens per successful call.

use crate::config::ReconcileConfig;
use crate::model::contact::{Contact, ContactId};
use crate::model::identity::IdentityView;
use crate::model::observation::{Observation, ObservationError};
use crate::repo::contact_repo::{ContactStore, StoreError, StoreResult};
use crate::service::group_resolver::{self, PrimarySource};
use crate::service::{identity_view, merge_executor, observation_integrator};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors surfaced by `IdentityService`.
#[derive(Debug)]
pub enum ReconcileError {
    /// Caller input was rejected before any store access.
    Validation(ObservationError),
    /// Lock contention persisted across every attempt.
    TransientStore { attempts: u32, last: StoreError },
    /// Non-retryable store failure; the attempt was rolled back.
    Store(StoreError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::TransientStore { attempts, last } => write!(
                f,
                "contact store stayed busy after {attempts} attempts: {last}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::TransientStore { last, .. } => Some(last),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ObservationError> for ReconcileError {
    fn from(value: ObservationError) -> Self {
        Self::Validation(value)
    }
}

/// Everything one reconciliation did, alongside the resulting view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub view: IdentityView,
    /// Contact inserted by this call, primary or secondary.
    pub created: Option<Contact>,
    /// Former primaries demoted by this call.
    pub demoted_ids: Vec<ContactId>,
}

impl Reconciliation {
    fn outcome_label(&self) -> &'static str {
        match &self.created {
            Some(contact) if contact.is_primary() => "created_primary",
            Some(_) => "created_secondary",
            None if !self.demoted_ids.is_empty() => "merged",
            None => "unchanged",
        }
    }
}

/// Reconciliation entry point over an explicit contact store.
pub struct IdentityService<S: ContactStore> {
    store: S,
    config: ReconcileConfig,
}

impl<S: ContactStore> IdentityService<S> {
    /// Creates a service with default retry settings.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ReconcileConfig::default())
    }

    pub fn with_config(store: S, config: ReconcileConfig) -> Self {
        Self { store, config }
    }

    /// Validates raw caller input, then reconciles it.
    ///
    /// # Errors
    /// - `ReconcileError::Validation` when both values are absent or empty.
    pub fn reconcile_contact_points(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> ReconcileResult<IdentityView> {
        let observation = Observation::new(email, phone_number)?;
        self.reconcile(&observation)
    }

    /// Reconciles one observation and returns the consolidated identity.
    pub fn reconcile(&self, observation: &Observation) -> ReconcileResult<IdentityView> {
        self.reconcile_detailed(observation)
            .map(|reconciliation| reconciliation.view)
    }

    /// Reconciles one observation and reports the writes it performed.
    ///
    /// # Errors
    /// - `ReconcileError::TransientStore` when every attempt hit lock
    ///   contention.
    /// - `ReconcileError::Store` for any other store failure.
    pub fn reconcile_detailed(&self, observation: &Observation) -> ReconcileResult<Reconciliation> {
        let started_at = Instant::now();
        info!(
            "event=reconcile module=service status=start has_email={} has_phone={}",
            observation.email().is_some(),
            observation.phone_number().is_some()
        );

        let max_attempts = self.config.max_attempts();
        let mut attempt = 1;
        loop {
            match self
                .store
                .transaction(|store| reconcile_once(store, observation))
            {
                Ok(reconciliation) => {
                    info!(
                        "event=reconcile module=service status=ok outcome={} primary_id={} secondary_count={} attempts={} duration_ms={}",
                        reconciliation.outcome_label(),
                        reconciliation.view.primary_contact_id,
                        reconciliation.view.secondary_contact_ids.len(),
                        attempt,
                        started_at.elapsed().as_millis()
                    );
                    return Ok(reconciliation);
                }
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    warn!(
                        "event=reconcile_retry module=service status=retry attempt={} max_attempts={} error={}",
                        attempt, max_attempts, err
                    );
                    std::thread::sleep(self.config.retry_backoff() * attempt);
                    attempt += 1;
                }
                Err(err) => {
                    let error_code = if err.is_conflict() {
                        "store_busy"
                    } else {
                        "store_failed"
                    };
                    error!(
                        "event=reconcile module=service status=error error_code={} attempts={} duration_ms={} error={}",
                        error_code,
                        attempt,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    if err.is_conflict() {
                        return Err(ReconcileError::TransientStore {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    return Err(ReconcileError::Store(err));
                }
            }
        }
    }

    /// Returns the identity `contact_id` currently belongs to without
    /// writing anything. `None` for unknown or soft-deleted contacts.
    pub fn identity_of(&self, contact_id: ContactId) -> ReconcileResult<Option<IdentityView>> {
        let lookup = || -> StoreResult<Option<IdentityView>> {
            let Some(contact) = self.store.find_by_id(contact_id)? else {
                return Ok(None);
            };
            let primary = group_resolver::owner_of(&self.store, &contact)?;
            identity_view::build(&self.store, &primary).map(Some)
        };
        lookup().map_err(ReconcileError::Store)
    }
}

fn reconcile_once<S: ContactStore>(
    store: &S,
    observation: &Observation,
) -> StoreResult<Reconciliation> {
    let matched = store.find_by_email_or_phone(observation.email(), observation.phone_number())?;

    if matched.is_empty() {
        let created = store.create_primary(observation.email(), observation.phone_number())?;
        return Ok(Reconciliation {
            view: IdentityView::single(&created),
            created: Some(created),
            demoted_ids: Vec::new(),
        });
    }

    let resolution = group_resolver::resolve(store, observation, &matched)?;
    if let PrimarySource::DanglingFallback { secondary } = resolution.source {
        if resolution.primary.id == secondary {
            warn!(
                "event=data_integrity module=service status=degraded kind=secondary_as_primary contact_id={}",
                secondary
            );
        }
    }

    let demoted_ids = match &resolution.merge {
        Some(plan) => merge_executor::execute(store, plan)?.demoted_ids,
        None => Vec::new(),
    };

    let created = observation_integrator::integrate(store, &resolution.primary, observation)?;
    let view = identity_view::build(store, &resolution.primary)?;

    Ok(Reconciliation {
        view,
        created,
        demoted_ids,
    })
}
