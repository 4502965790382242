use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, SequenceStore, Snapshot,
    UniqueKeyStore, Version,
};

/// Optimistic concurrency guard for an append.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// The stream must be at exactly this version. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The stream must not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Events for one aggregate stream, part of a multi-stream commit.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl StreamAppend {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    /// The aggregate this append targets, if it carries any events.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.events.first().map(|e| e.aggregate_id)
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only storage for order, table and settlement streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends one stream's events in a single commit and returns the
    /// stream's new version. A version mismatch yields `ConcurrencyConflict`
    /// and writes nothing.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Appends to several aggregate streams in one atomic commit.
    ///
    /// Every stream's expected version is checked before anything is written;
    /// a single mismatch rejects the whole batch. Returns the new version of
    /// each stream, in input order.
    async fn append_batch(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// Oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events at `from_version` and later, oldest first.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Every stored event in commit order. Projections catch up from here.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// `None` for a stream that has never been written.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Replaces any earlier snapshot of the same aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// The latest snapshot, if any, and the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.get_events_for_aggregate(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Everything the command side needs from storage: event streams,
/// named counters and unique secondary keys.
pub trait Persistence: EventStore + SequenceStore + UniqueKeyStore {}

impl<T: EventStore + SequenceStore + UniqueKeyStore + ?Sized> Persistence for T {}

/// One stream, one aggregate type, consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let invalid = |reason: String| Err(EventStoreError::InvalidAppend(reason));

    let Some(first) = events.first() else {
        return invalid("nothing to append".to_string());
    };

    for (event, expected) in events.iter().zip((first.version.as_i64()..).map(Version::new)) {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return invalid(format!(
                "{} {} mixed into the {} stream of {}",
                event.aggregate_type, event.aggregate_id, first.aggregate_type, first.aggregate_id
            ));
        }
        if event.version != expected {
            return invalid(format!(
                "version {} where {expected} was due",
                event.version
            ));
        }
    }

    Ok(())
}

/// Validates a multi-stream batch: each stream valid on its own, no stream twice.
pub fn validate_batch_for_append(appends: &[StreamAppend]) -> Result<()> {
    if appends.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "empty batch".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for append in appends {
        validate_events_for_append(&append.events)?;
        if let Some(id) = append.aggregate_id()
            && !seen.insert(id)
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "aggregate {id} appears more than once in batch"
            )));
        }
    }
    Ok(())
}
