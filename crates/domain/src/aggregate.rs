//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded on an aggregate stream, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Event name stored alongside the payload.
    fn event_type(&self) -> &'static str;

    /// Business key that must never be recorded twice across the whole store.
    ///
    /// Ledger events return keys such as `"<order_id>:earnings"`; most events
    /// return `None`.
    fn idempotency_key(&self) -> Option<String> {
        None
    }
}

/// An event-sourced consistency boundary.
///
/// Aggregates are rebuilt by replaying their events. Command methods inspect
/// the current state and return new events; `apply` folds an event into the
/// state and must never fail, since events are facts that already happened.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    /// Stream family name, e.g. `"Order"`.
    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// Version of the last applied event; 0 for a fresh aggregate.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state is periodically persisted as a snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    /// Returns true if the current version sits exactly on an interval.
    fn should_snapshot(&self) -> bool {
        self.version().as_i64() > 0
            && (self.version().as_i64() as usize).is_multiple_of(Self::snapshot_interval())
    }

    /// Returns true if moving from `from` to `to` crossed an interval
    /// boundary. A single commit may append several events at once, so the
    /// exact multiple can be skipped.
    fn crossed_snapshot_boundary(from: Version, to: Version) -> bool {
        let interval = Self::snapshot_interval() as i64;
        to.as_i64() > 0 && from.as_i64() / interval != to.as_i64() / interval
    }
}
