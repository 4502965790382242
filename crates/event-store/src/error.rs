use thiserror::Error;

use crate::{AggregateId, Version};

#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer moved the stream past the version the caller loaded.
    #[error("stream {aggregate_id} is at {actual}, append expected {expected}")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    #[error("{namespace} '{key}' already belongs to {owner}")]
    DuplicateKey {
        namespace: String,
        key: String,
        owner: AggregateId,
    },

    #[error("rejected append: {0}")]
    InvalidAppend(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payload encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Returns true for optimistic concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// The aggregate whose stream rejected the append, if this is a conflict.
    pub fn conflicting_aggregate(&self) -> Option<AggregateId> {
        match self {
            Self::ConcurrencyConflict { aggregate_id, .. } => Some(*aggregate_id),
            _ => None,
        }
    }

    /// Counts conflicts on their way out of an append.
    pub(crate) fn observed(self) -> Self {
        if let Self::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        } = &self
        {
            metrics::counter!("event_store_conflicts_total").increment(1);
            tracing::debug!(%aggregate_id, %expected, %actual, "append rejected");
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, EventStoreError>;
