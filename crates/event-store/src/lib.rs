//! Append-only event storage for the order engine.
//!
//! Streams (one per aggregate) are versioned for optimistic concurrency. A
//! [`StreamAppend`] batch spanning several streams commits atomically, and
//! idempotency keys carried by envelopes are unique across the whole store.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, StreamAppend};
