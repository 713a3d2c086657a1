//! Feeds stored events to registered projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from an event store to projections.
///
/// - Catch-up: streams every stored event and hands each projection the ones
///   past its position
/// - Rebuild: resets every projection and replays from scratch
///
/// Catch-up runs are serialized, so concurrent readers refreshing the views
/// never deliver an event twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Brings every projection up to date. Returns how many deliveries were
    /// made across all projections.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;

        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;

            for projection in &self.projections {
                if !projection.position().await.has_seen(event_index) {
                    projection.handle(&event).await?;
                    delivered += 1;
                }
            }
        }

        if delivered > 0 {
            metrics::counter!("projection_events_processed_total").increment(delivered);
            tracing::debug!(events = event_index, delivered, "projections caught up");
        }
        Ok(delivered)
    }

    /// Delivers a single event to every projection.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            tracing::info!(projection = projection.name(), "resetting projection");
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::OrderScript;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::DriverId;
    use event_store::{AppendOptions, EventStoreExt, InMemoryEventStore};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Counts every event it sees.
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            }
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    async fn store_with_delivery() -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let mut script = OrderScript::placed("bole", 500);
        script.deliver(DriverId::new(), 1.0, 2.0);
        store
            .append(script.envelopes.clone(), AppendOptions::expect_new())
            .await
            .unwrap();
        store
    }

    fn counting(processor: &mut ProjectionProcessor<InMemoryEventStore>) -> Arc<RwLock<u64>> {
        let projection = CountingProjection::new();
        let count = Arc::clone(&projection.count);
        processor.register(Box::new(projection));
        count
    }

    #[tokio::test]
    async fn catch_up_delivers_every_event_once() {
        let store = store_with_delivery().await;
        let total = store.event_count().await as u64;
        let mut processor = ProjectionProcessor::new(store);
        let count = counting(&mut processor);

        assert_eq!(processor.run_catch_up().await.unwrap(), total);
        assert_eq!(*count.read().await, total);

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(*count.read().await, total);
    }

    #[tokio::test]
    async fn catch_up_picks_up_new_events() {
        let store = store_with_delivery().await;
        let mut processor = ProjectionProcessor::new(store.clone());
        let count = counting(&mut processor);
        processor.run_catch_up().await.unwrap();
        let before = *count.read().await;

        let script = OrderScript::placed("bole", 500);
        store
            .append(script.envelopes.clone(), AppendOptions::expect_new())
            .await
            .unwrap();

        assert_eq!(processor.run_catch_up().await.unwrap(), 1);
        assert_eq!(*count.read().await, before + 1);
    }

    #[tokio::test]
    async fn rebuild_resets_and_replays() {
        let store = store_with_delivery().await;
        let total = store.event_count().await as u64;
        let mut processor = ProjectionProcessor::new(store);
        let count = counting(&mut processor);

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();
        assert_eq!(*count.read().await, total);
    }

    #[tokio::test]
    async fn every_projection_is_fed() {
        let store = store_with_delivery().await;
        let total = store.event_count().await as u64;
        let mut processor = ProjectionProcessor::new(store);
        let first = counting(&mut processor);
        let second = counting(&mut processor);
        assert_eq!(processor.projection_count(), 2);

        assert_eq!(processor.run_catch_up().await.unwrap(), 2 * total);
        assert_eq!(*first.read().await, total);
        assert_eq!(*second.read().await, total);
    }

    #[tokio::test]
    async fn empty_store_delivers_nothing() {
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        let count = counting(&mut processor);

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(*count.read().await, 0);
    }

    #[tokio::test]
    async fn concurrent_catch_ups_do_not_double_deliver() {
        let store = store_with_delivery().await;
        let total = store.event_count().await as u64;
        let mut processor = ProjectionProcessor::new(store);
        let count = counting(&mut processor);
        let processor = Arc::new(processor);

        let (a, b) = tokio::join!(processor.run_catch_up(), processor.run_catch_up());
        assert_eq!(a.unwrap() + b.unwrap(), total);
        assert_eq!(*count.read().await, total);
    }

    #[tokio::test]
    async fn single_event_is_delivered() {
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        let count = counting(&mut processor);
        let script = OrderScript::placed("bole", 500);

        processor.process_event(&script.envelopes[0]).await.unwrap();
        assert_eq!(*count.read().await, 1);
    }
}
