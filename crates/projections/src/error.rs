//! Projection error types.

use common::AggregateId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored payload no longer matches the event type it was written as.
    #[error("Cannot decode {event_type} event: {source}")]
    Deserialization {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// An event refers to an entity the projection has never seen.
    #[error("{projection}: {event_type} for unknown {aggregate_type} {aggregate_id}")]
    UnknownEntity {
        projection: &'static str,
        aggregate_type: String,
        aggregate_id: AggregateId,
        event_type: String,
    },
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
