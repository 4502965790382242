//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;
use serde::de::DeserializeOwned;

use crate::{ProjectionError, Result};

/// Number of store events a projection has consumed, relevant or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }

    /// Returns true if the event at 1-based `index` in the global stream
    /// has not been consumed yet.
    pub fn is_behind(&self, index: u64) -> bool {
        self.events_processed < index
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// Folds store events into a read model.
///
/// Every event in the global stream is handed to every projection, so
/// `handle` must advance the position even for events it ignores.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all derived state and rewinds to position zero.
    async fn reset(&self) -> Result<()>;
}

/// Decodes an envelope payload into the aggregate's event enum.
pub(crate) fn decode<E: DeserializeOwned>(event: &EventEnvelope) -> Result<E> {
    event.decode().map_err(|source| {
        ProjectionError::Deserialization {
            event_type: event.event_type.clone(),
            source,
        }
    })
}

pub(crate) fn unknown_entity(projection: &'static str, event: &EventEnvelope) -> ProjectionError {
    ProjectionError::UnknownEntity {
        projection,
        aggregate_type: event.aggregate_type.clone(),
        aggregate_id: event.aggregate_id,
        event_type: event.event_type.clone(),
    }
}
