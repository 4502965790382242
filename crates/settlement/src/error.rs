//! Settlement error types.

use common::AggregateId;
use domain::{DomainError, ErrorKind, OrderNumber};
use event_store::EventStoreError;
use thiserror::Error;

use crate::state::SettlementState;

/// Errors that can occur during settlement.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A table settlement stopped part-way. Orders listed in `settled`
    /// remain paid. `failed` is the order that could not be settled, or
    /// `None` when the payments went through but the run's own bookkeeping
    /// did not.
    #[error(
        "Settlement {run_id} stopped{} after settling {} order(s): {source}",
        failed.as_ref().map(|n| format!(" at {n}")).unwrap_or_default(),
        settled.len()
    )]
    PartiallySettled {
        run_id: AggregateId,
        settled: Vec<OrderNumber>,
        failed: Option<OrderNumber>,
        #[source]
        source: Box<SettlementError>,
    },

    /// The settlement run is not in a state that accepts the event.
    #[error("Invalid settlement state: cannot {action} while {state}")]
    InvalidState {
        state: SettlementState,
        action: &'static str,
    },

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SettlementError {
    /// Classification shared with the domain layer. A partial settlement
    /// takes the kind of the failure that stopped it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::PartiallySettled { source, .. } => source.kind(),
            SettlementError::InvalidState { .. } => ErrorKind::InvalidState,
            SettlementError::Domain(e) => e.kind(),
            SettlementError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                ErrorKind::Conflict
            }
            SettlementError::EventStore(_) | SettlementError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Reason a partial settlement stopped, if this is one.
    pub fn partial_reason(&self) -> Option<String> {
        match self {
            SettlementError::PartiallySettled { source, .. } => Some(source.to_string()),
            _ => None,
        }
    }
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;
