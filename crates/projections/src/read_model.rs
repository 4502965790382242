//! Read model trait for query-side views.

/// Query access to a denormalized view.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries currently held. Returns 0 while a writer holds the lock.
    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
