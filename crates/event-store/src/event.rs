use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Identifier of one stored event, distinct from the aggregate it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its aggregate stream.
///
/// A stream that has never been written is at version 0; its first event is
/// version 1. Appends name the version they expect the stream to be at, which
/// is how two staff members editing the same order or table are told apart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a stream with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored event: the serialized domain event plus where it belongs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// Domain event name, e.g. `OrderPlaced` or `TableOccupied`.
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// Stream kind: `Order`, `Table` or `SettlementRun`.
    pub aggregate_type: String,

    /// Version of the aggregate after this event.
    pub version: Version,

    pub timestamp: DateTime<Utc>,

    pub payload: serde_json::Value,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Wraps a domain event for appending at `version`.
    pub fn for_event<E: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        event_type: &str,
        version: Version,
        event: &E,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            version,
            timestamp: Utc::now(),
            payload: serde_json::to_value(event)?,
            metadata: HashMap::new(),
        })
    }

    /// Deserializes the payload without copying it.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        E::deserialize(&self.payload)
    }
}

/// Field-by-field envelope construction, mostly for tests and fixtures.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Shorthand for fixtures and tests. Library code builds envelopes with
    /// [`EventEnvelope::for_event`] or [`try_build`](Self::try_build).
    ///
    /// # Panics
    ///
    /// Panics if the event type, aggregate id, aggregate type, version or
    /// payload is missing.
    #[track_caller]
    pub fn build(self) -> EventEnvelope {
        match self.try_build() {
            Some(envelope) => envelope,
            None => panic!("event envelope is missing a required field"),
        }
    }

    /// `None` if the event type, aggregate id, aggregate type, version or
    /// payload is missing.
    pub fn try_build(self) -> Option<EventEnvelope> {
        Some(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type?,
            aggregate_id: self.aggregate_id?,
            aggregate_type: self.aggregate_type?,
            version: self.version?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum TableEvent {
        TableOccupied { seats: u32 },
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn versions_count_from_an_empty_stream() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::first() < Version::new(2));
    }

    #[test]
    fn for_event_round_trips_through_decode() {
        let table_id = AggregateId::new();
        let event = TableEvent::TableOccupied { seats: 4 };

        let envelope =
            EventEnvelope::for_event(table_id, "Table", "TableOccupied", Version::first(), &event)
                .unwrap();

        assert_eq!(envelope.aggregate_id, table_id);
        assert_eq!(envelope.aggregate_type, "Table");
        assert_eq!(envelope.payload["type"], "TableOccupied");
        assert!(envelope.metadata.is_empty());
        assert_eq!(envelope.decode::<TableEvent>().unwrap(), event);
    }

    #[test]
    fn decode_rejects_a_foreign_payload() {
        let envelope = EventEnvelope::builder()
            .event_type("TableOccupied")
            .aggregate_id(AggregateId::new())
            .aggregate_type("Table")
            .version(Version::first())
            .payload_raw(serde_json::json!({"type": "OrderPlaced", "data": {}}))
            .build();

        assert!(envelope.decode::<TableEvent>().is_err());
    }

    #[test]
    fn builder_keeps_metadata() {
        let envelope = EventEnvelope::builder()
            .event_type("OrderPlaced")
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .metadata("terminal", serde_json::json!("bar-1"))
            .build();

        assert_eq!(
            envelope.metadata.get("terminal"),
            Some(&serde_json::json!("bar-1"))
        );
    }

    #[test]
    fn try_build_needs_every_required_field() {
        assert!(EventEnvelope::builder().try_build().is_none());
        assert!(
            EventEnvelope::builder()
                .event_type("OrderPlaced")
                .aggregate_id(AggregateId::new())
                .aggregate_type("Order")
                .payload_raw(serde_json::json!({}))
                .try_build()
                .is_none()
        );
    }

    #[test]
    #[should_panic(expected = "missing a required field")]
    fn build_panics_without_a_version() {
        EventEnvelope::builder()
            .event_type("OrderPlaced")
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .payload_raw(serde_json::json!({}))
            .build();
    }
}
