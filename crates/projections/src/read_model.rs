//! Read model trait for query-side views.

/// A view that answers queries from denormalized state.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries currently held. Returns 0 while a writer holds the
    /// view.
    fn count(&self) -> usize;
}
