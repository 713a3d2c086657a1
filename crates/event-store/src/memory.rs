use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, StreamAppend, batch_event_count, validate_batch},
};

#[derive(Default)]
struct MemoryState {
    /// Every event in commit order.
    log: Vec<EventEnvelope>,
    /// Positions in `log` per stream, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
    idempotency_keys: HashSet<String>,
}

impl MemoryState {
    fn version_of(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|positions| positions.last())
            .map(|&pos| self.log[pos].version)
            .unwrap_or(Version::initial())
    }
}

/// In-memory event store used by tests and the default server profile.
///
/// A single write lock spans the checks and the writes of a batch, which makes
/// batches atomic and serializes competing writers on the same streams.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<MemoryState>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.log.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, batch), fields(streams = batch.len()))]
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_batch(&batch)?;
        let event_count = batch_event_count(&batch);

        let mut state = self.state.write().await;

        // Check everything before writing anything.
        for append in &batch {
            let first = &append.events[0];
            let current = state.version_of(first.aggregate_id);

            if let Some(expected) = append.options.expected_version
                && current != expected
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected,
                    actual: current,
                });
            }

            if first.version != current.next() {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected: Version::new(first.version.as_i64() - 1),
                    actual: current,
                });
            }

            if let Some(key) = append
                .events
                .iter()
                .filter_map(|e| e.idempotency_key.as_ref())
                .find(|key| state.idempotency_keys.contains(*key))
            {
                return Err(EventStoreError::DuplicateIdempotencyKey { key: key.clone() });
            }
        }

        let mut versions = Vec::with_capacity(batch.len());
        for append in batch {
            versions.push(append.last_version());
            for event in append.events {
                if let Some(key) = &event.idempotency_key {
                    state.idempotency_keys.insert(key.clone());
                }
                let position = state.log.len();
                state
                    .streams
                    .entry(event.aggregate_id)
                    .or_default()
                    .push(position);
                state.log.push(event);
            }
        }

        metrics::counter!("events_appended_total").increment(event_count);
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
        let state = self.state.read().await;
        let events = state
            .streams
            .get(&aggregate_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| &state.log[pos])
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.state.read().await.log.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let state = self.state.read().await;
        Ok(state
            .streams
            .contains_key(&aggregate_id)
            .then(|| state.version_of(aggregate_id)))
    }

    async fn idempotency_key_exists(&self, key: &str) -> Result<bool> {
        Ok(self.state.read().await.idempotency_keys.contains(key))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        let is_newer = snapshots
            .get(&snapshot.aggregate_id)
            .is_none_or(|existing| existing.version < snapshot.version);
        if is_newer {
            snapshots.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }
}
