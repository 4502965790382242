//! Feeds store events to projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

/// Replays the global event stream into registered projections.
///
/// Catch-up is incremental: each projection only receives events past its
/// own position, so the processor can be run again after new commands to
/// bring the views up to date.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Current position of every registered projection, in registration order.
    pub async fn positions(&self) -> Vec<(&'static str, ProjectionPosition)> {
        let mut positions = Vec::with_capacity(self.projections.len());
        for projection in &self.projections {
            positions.push((projection.name(), projection.position().await));
        }
        positions
    }

    /// Streams the store from the beginning and delivers every event a
    /// projection has not consumed yet. Returns the stream length.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all_events().await?;
        let mut index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            index += 1;

            for projection in &self.projections {
                if projection.position().await.is_behind(index) {
                    projection.handle(&event).await?;
                    delivered += 1;
                    metrics::counter!("projections_events_processed", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        tracing::info!(stream_length = index, delivered, "catch-up complete");

        Ok(index)
    }

    /// Delivers one freshly committed event to every projection.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
            metrics::counter!("projections_events_processed", "projection" => projection.name())
                .increment(1);
        }
        Ok(())
    }

    /// Resets every projection and replays the whole store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, InMemoryEventStore, Version};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Records the event types it sees.
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<RwLock<Vec<String>>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    #[async_trait]
    impl Projection for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            self.seen.write().await.push(event.event_type.clone());
            let mut pos = self.position.write().await;
            *pos = pos.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            self.seen.write().await.clear();
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn envelope(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Table")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
    }

    async fn store_with(event_types: &[&str]) -> (InMemoryEventStore, AggregateId) {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let events = event_types
            .iter()
            .enumerate()
            .map(|(i, t)| envelope(id, i as i64 + 1, t))
            .collect();
        store.append(events, AppendOptions::new()).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn catch_up_delivers_in_stream_order() {
        let (store, _) = store_with(&["TableRegistered", "OrderAttached", "TableOccupied"]).await;
        let recorder = Recorder::default();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(recorder.clone()));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(
            *recorder.seen.read().await,
            vec!["TableRegistered", "OrderAttached", "TableOccupied"]
        );
    }

    #[tokio::test]
    async fn second_catch_up_only_delivers_new_events() {
        let (store, id) = store_with(&["TableRegistered", "TableOccupied"]).await;
        let recorder = Recorder::default();
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(recorder.clone()));
        processor.run_catch_up().await.unwrap();

        store
            .append(vec![envelope(id, 3, "TableReleased")], AppendOptions::new())
            .await
            .unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(recorder.seen.read().await.len(), 3);
        assert_eq!(recorder.seen.read().await[2], "TableReleased");
    }

    #[tokio::test]
    async fn late_registration_catches_up_alone() {
        let (store, _) = store_with(&["TableRegistered", "TableOccupied"]).await;
        let early = Recorder::default();
        let late = Recorder::default();

        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(early.clone()));
        processor.run_catch_up().await.unwrap();
        processor.register(Box::new(late.clone()));
        processor.run_catch_up().await.unwrap();

        assert_eq!(early.seen.read().await.len(), 2);
        assert_eq!(late.seen.read().await.len(), 2);

        let positions = processor.positions().await;
        assert_eq!(positions.len(), 2);
        assert!(positions.iter().all(|(_, p)| p.events_processed == 2));
    }

    #[tokio::test]
    async fn process_event_reaches_every_projection() {
        let a = Recorder::default();
        let b = Recorder::default();
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(a.clone()));
        processor.register(Box::new(b.clone()));
        assert_eq!(processor.projection_count(), 2);

        processor
            .process_event(&envelope(AggregateId::new(), 1, "TableRegistered"))
            .await
            .unwrap();

        assert_eq!(a.position().await.events_processed, 1);
        assert_eq!(b.position().await.events_processed, 1);
    }

    #[tokio::test]
    async fn rebuild_replays_from_scratch() {
        let (store, _) = store_with(&["TableRegistered", "TableOccupied"]).await;
        let recorder = Recorder::default();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(recorder.clone()));

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(recorder.seen.read().await.len(), 2);
        assert_eq!(recorder.position().await.events_processed, 2);
    }
}
