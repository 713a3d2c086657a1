use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Options for appending events to a stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Version the stream must be at for the append to succeed.
    /// `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// No version check.
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
        Self::expect_version(Version::initial())
    }
}

/// Events destined for one stream, guarded by an expected version.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl StreamAppend {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    /// Stream targeted by this append. Only meaningful after validation.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.events.first().map(|e| e.aggregate_id)
    }

    /// Version of the last event in the append.
    pub fn last_version(&self) -> Version {
        self.events
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial())
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Persistence for event streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to several streams as one atomic unit.
    ///
    /// Either every append commits or none does. Each append's expected
    /// version is checked against its stream; any idempotency key already in
    /// the store (or repeated within the batch) aborts the whole batch with
    /// [`EventStoreError::DuplicateIdempotencyKey`].
    ///
    /// Returns the new version of each stream, in batch order.
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// Events of one stream in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events of one stream starting at `from_version` (inclusive).
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Every stored event in commit order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Current version of a stream, `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Returns true if an event with this idempotency key exists.
    async fn idempotency_key_exists(&self, key: &str) -> Result<bool>;

    /// Replaces the snapshot of an aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Latest snapshot of an aggregate, if any.
    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods available on every [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends events to a single stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let versions = self
            .append_batch(vec![StreamAppend::new(events, options)])
            .await?;
        Ok(versions.into_iter().next().unwrap_or(Version::initial()))
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Loads the latest snapshot (if any) and the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        match self.get_snapshot(aggregate_id).await? {
            Some(snapshot) => {
                let events = self
                    .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                    .await?;
                Ok((Some(snapshot), events))
            }
            None => Ok((None, self.get_events_for_aggregate(aggregate_id).await?)),
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks the shape of a batch before it touches storage.
///
pub(crate) fn batch_event_count(batch: &[StreamAppend]) -> u64 {
    batch.iter().map(|append| append.events.len() as u64).sum()
}

/// Every append must be non-empty, target a single stream with a single
/// aggregate type, and carry consecutive versions. A stream may appear only
/// once per batch, and idempotency keys must be distinct within the batch.
pub fn validate_batch(batch: &[StreamAppend]) -> Result<()> {
    if batch.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    }

    let mut streams = HashSet::new();
    let mut keys = HashSet::new();

    for append in batch {
        let Some(first) = append.events.first() else {
            return Err(EventStoreError::InvalidAppend(
                "cannot append an empty event list".to_string(),
            ));
        };

        if !streams.insert(first.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one batch",
                first.aggregate_id
            )));
        }

        let mut expected = first.version;
        for (index, event) in append.events.iter().enumerate() {
            if event.aggregate_id != first.aggregate_id
                || event.aggregate_type != first.aggregate_type
            {
                return Err(EventStoreError::InvalidAppend(
                    "all events of an append must target the same stream".to_string(),
                ));
            }
            if index > 0 {
                expected = expected.next();
                if event.version != expected {
                    return Err(EventStoreError::InvalidAppend(format!(
                        "event versions must be sequential: expected {expected}, got {}",
                        event.version
                    )));
                }
            }
            if let Some(key) = &event.idempotency_key
                && !keys.insert(key.clone())
            {
                return Err(EventStoreError::DuplicateIdempotencyKey { key: key.clone() });
            }
        }
    }

    Ok(())
}
