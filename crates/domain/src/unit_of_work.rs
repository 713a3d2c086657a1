//! Atomic commits spanning several aggregate streams.

use common::AggregateId;
use event_store::{EventStore, Snapshot, StreamAppend, Version};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::command::{build_envelopes, expected_version};
use crate::error::DomainError;

/// Collects the events one request produces for every stream it touches and
/// commits them as a single all-or-nothing batch.
///
/// Each stream is guarded by the version it was loaded at. If any stream was
/// written concurrently the whole batch fails with a conflict and nothing is
/// persisted.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    appends: Vec<StreamAppend>,
    snapshots: Vec<Snapshot>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `events` for the stream of `aggregate`, which must be in the
    /// state it was loaded in. Empty event lists are ignored.
    pub fn stage<A: Aggregate>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate: &A,
        events: &[A::Event],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let current = aggregate.version();
        let envelopes = build_envelopes::<A>(aggregate_id, current, events)?;
        self.appends
            .push(StreamAppend::new(envelopes, expected_version(current)));
        Ok(())
    }

    /// Like [`stage`](Self::stage), and additionally snapshots the resulting
    /// state after a successful commit if an interval boundary is crossed.
    pub fn stage_with_snapshot<A>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate: &A,
        events: &[A::Event],
    ) -> Result<(), DomainError>
    where
        A: SnapshotCapable + Clone,
    {
        self.stage(aggregate_id, aggregate, events)?;

        let from = aggregate.version();
        let to = Version::new(from.as_i64() + events.len() as i64);
        if !events.is_empty() && A::crossed_snapshot_boundary(from, to) {
            let mut next = aggregate.clone();
            next.apply_events(events.iter().cloned());
            next.set_version(to);
            self.snapshots.push(Snapshot::from_state(
                aggregate_id,
                A::aggregate_type(),
                to,
                &next,
            )?);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    /// Number of streams staged so far.
    pub fn stream_count(&self) -> usize {
        self.appends.len()
    }

    /// Commits every staged stream atomically.
    ///
    /// Returns the new version of each stream in staging order. Snapshots are
    /// written after the events and their failures are only logged.
    pub async fn commit<S>(self, store: &S) -> Result<Vec<Version>, DomainError>
    where
        S: EventStore + ?Sized,
    {
        if self.appends.is_empty() {
            return Ok(vec![]);
        }

        let streams = self.appends.len();
        let versions = store.append_batch(self.appends).await?;
        tracing::debug!(streams, "unit of work committed");

        for snapshot in self.snapshots {
            let aggregate_id = snapshot.aggregate_id;
            if let Err(error) = store.save_snapshot(snapshot).await {
                tracing::warn!(%aggregate_id, %error, "failed to save snapshot");
            }
        }

        Ok(versions)
    }
}
