use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, SequenceStore, Snapshot,
    UniqueKeyStore, Version,
    store::{
        AppendOptions, EventStore, EventStream, StreamAppend, validate_batch_for_append,
        validate_events_for_append,
    },
};

/// Process-local store behind the same traits as [`crate::PostgresEventStore`].
/// Used by tests and by `pos` when no database URL is configured; clones
/// share state.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
    sequences: Arc<Mutex<HashMap<String, i64>>>,
    keys: Arc<RwLock<HashMap<(String, String), AggregateId>>>,
}

fn current_version_of(store: &[EventEnvelope], aggregate_id: AggregateId) -> Version {
    store
        .iter()
        .filter(|e| e.aggregate_id == aggregate_id)
        .map(|e| e.version)
        .max()
        .unwrap_or(Version::initial())
}

fn check_append(store: &[EventEnvelope], append: &StreamAppend) -> Result<Version> {
    let Some(first_event) = append.events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "nothing to append".to_string(),
        ));
    };
    let aggregate_id = first_event.aggregate_id;
    let current_version = current_version_of(store, aggregate_id);

    if let Some(expected) = append.options.expected_version
        && current_version != expected
    {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual: current_version,
        });
    }

    // Unique (aggregate_id, version) constraint
    if first_event.version <= current_version {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected: append.options.expected_version.unwrap_or(current_version),
            actual: current_version,
        });
    }

    Ok(append
        .events
        .last()
        .map(|e| e.version)
        .unwrap_or(Version::initial()))
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clears all events, snapshots, sequences and keys.
    pub async fn clear(&self) {
        self.events.write().await.clear();
        self.snapshots.write().await.clear();
        self.sequences.lock().await.clear();
        self.keys.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;

        let append = StreamAppend::new(events, options);
        let mut store = self.events.write().await;
        let last_version = check_append(&store, &append).map_err(EventStoreError::observed)?;
        store.extend(append.events);

        Ok(last_version)
    }

    async fn append_batch(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_batch_for_append(&appends)?;

        // One write lock for the whole batch: all checks pass before any event lands.
        let mut store = self.events.write().await;
        let versions = appends
            .iter()
            .map(|append| check_append(&store, append))
            .collect::<Result<Vec<_>>>()
            .map_err(EventStoreError::observed)?;

        for append in appends {
            store.extend(append.events);
        }

        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::initial())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        Ok(store
            .iter()
            .filter(|e| query.matches(e))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        self.query_events(EventQuery::for_event_type(event_type)).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.events.read().await.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        let version = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max();
        Ok(version)
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&aggregate_id).cloned())
    }
}

#[async_trait]
impl SequenceStore for InMemoryEventStore {
    async fn next_value(&self, name: &str) -> Result<i64> {
        let mut sequences = self.sequences.lock().await;
        let value = sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn current_value(&self, name: &str) -> Result<i64> {
        Ok(self
            .sequences
            .lock()
            .await
            .get(name)
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl UniqueKeyStore for InMemoryEventStore {
    async fn claim_key(&self, namespace: &str, key: &str, owner: AggregateId) -> Result<()> {
        let mut keys = self.keys.write().await;
        let slot = (namespace.to_string(), key.to_string());
        match keys.get(&slot) {
            Some(existing) if *existing != owner => Err(EventStoreError::DuplicateKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
                owner: *existing,
            }),
            Some(_) => Ok(()),
            None => {
                keys.insert(slot, owner);
                Ok(())
            }
        }
    }

    async fn lookup_key(&self, namespace: &str, key: &str) -> Result<Option<AggregateId>> {
        let keys = self.keys.read().await;
        Ok(keys
            .get(&(namespace.to_string(), key.to_string()))
            .copied())
    }

    async fn release_key(&self, namespace: &str, key: &str, owner: AggregateId) -> Result<()> {
        let mut keys = self.keys.write().await;
        let slot = (namespace.to_string(), key.to_string());
        if keys.get(&slot) == Some(&owner) {
            keys.remove(&slot);
        }
        Ok(())
    }
}
