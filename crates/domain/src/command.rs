//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};
use serde::{Serialize, de::DeserializeOwned};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Append options guarding a stream that was loaded at `version`.
pub fn expected_version(version: Version) -> AppendOptions {
    if version == Version::initial() {
        AppendOptions::expect_new()
    } else {
        AppendOptions::expect_version(version)
    }
}

/// Wraps domain events into envelopes numbered after `current_version`.
pub fn build_envelopes<A>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError>
where
    A: Aggregate,
{
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .idempotency_key(event.idempotency_key())
            .payload(event)?
            .build();
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

/// Loads aggregates of one type and executes commands against them.
///
/// Execution is load, decide, append with the loaded version as the expected
/// version. A concurrent writer makes the append fail with a conflict.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from its latest snapshot and subsequent events.
    ///
    /// If the stream doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: DeserializeOwned,
    {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => Self::restore_from_snapshot(snapshot)?,
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: DeserializeOwned,
    {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Executes a command and persists the resulting events.
    ///
    /// An empty event list is a no-op and nothing is written.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: DeserializeOwned,
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = build_envelopes::<A>(aggregate_id, current_version, &events)?;
        let new_version = self
            .store
            .append(envelopes, expected_version(current_version))
            .await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    fn restore_from_snapshot(snapshot: Snapshot) -> Result<A, DomainError>
    where
        A: DeserializeOwned,
    {
        let version = snapshot.version;
        let mut aggregate: A = snapshot.into_state()?;
        aggregate.set_version(version);
        Ok(aggregate)
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Executes a command and saves a snapshot when an interval is crossed.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute(aggregate_id, command_fn).await?;
        let previous = Version::new(result.new_version.as_i64() - result.events.len() as i64);

        if A::crossed_snapshot_boundary(previous, result.new_version) {
            save_snapshot(&self.store, aggregate_id, &result.aggregate).await;
        }

        Ok(result)
    }
}

/// Persists a snapshot of `aggregate`. Snapshots only speed up loading, so a
/// failure is logged and otherwise ignored.
pub(crate) async fn save_snapshot<S, A>(store: &S, aggregate_id: AggregateId, aggregate: &A)
where
    S: EventStore + ?Sized,
    A: Aggregate + Serialize,
{
    let snapshot = match Snapshot::from_state(
        aggregate_id,
        A::aggregate_type(),
        aggregate.version(),
        aggregate,
    ) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            tracing::warn!(%aggregate_id, %error, "failed to serialize snapshot");
            return;
        }
    };

    if let Err(error) = store.save_snapshot(snapshot).await {
        tracing::warn!(%aggregate_id, %error, "failed to save snapshot");
    }
}
