//! Append-only persistence for the café POS.
//!
//! Order, table and settlement run streams are stored as [`EventEnvelope`]s
//! with optimistic concurrency per stream. [`StreamAppend`] batches commit
//! several streams atomically (an order together with its table). Named
//! [`SequenceStore`] counters hand out order numbers and the
//! [`UniqueKeyStore`] index keeps table and order numbers unique.

pub mod error;
pub mod event;
pub mod keys;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod sequence;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use keys::UniqueKeyStore;
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use sequence::SequenceStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, Persistence, StreamAppend};
