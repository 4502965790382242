//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::order::OrderError;
use crate::table::TableError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An order rejected the command.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A table rejected the command.
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// The menu catalog could not be consulted.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Input failed validation before any state was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`DomainError`] for callers that map failures
/// onto a transport (status codes, exit codes, retry decisions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InvalidState,
    Conflict,
    Internal,
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::Order(e) => e.kind(),
            DomainError::Table(e) => e.kind(),
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
            | DomainError::EventStore(EventStoreError::DuplicateKey { .. }) => ErrorKind::Conflict,
            DomainError::EventStore(_) | DomainError::Catalog(_) | DomainError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true if this is an optimistic concurrency failure on `aggregate_id`.
    pub fn is_conflict_on(&self, aggregate_id: common::AggregateId) -> bool {
        matches!(
            self,
            DomainError::EventStore(e) if e.conflicting_aggregate() == Some(aggregate_id)
        )
    }
}
