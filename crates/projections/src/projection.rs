//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the global event stream a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }

    /// True if the event at 1-based `index` of the global stream was
    /// already handled.
    pub fn has_seen(&self, index: u64) -> bool {
        index <= self.events_processed
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} events", self.events_processed)
    }
}

/// Folds events, in commit order, into a read model.
///
/// Every stored event advances the position, including events of streams
/// the projection ignores, so the position can be compared with an index
/// into the global event stream.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all state so the projection can be rebuilt from scratch.
    async fn reset(&self) -> Result<()>;
}
