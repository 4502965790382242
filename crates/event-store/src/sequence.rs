use async_trait::async_trait;

use crate::Result;

/// Named, monotonically increasing counters.
///
/// `next_value` is atomic: two concurrent callers on the same name never
/// receive the same value. The first value handed out is 1.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn next_value(&self, name: &str) -> Result<i64>;

    /// Current value without incrementing; 0 for an unused sequence.
    async fn current_value(&self, name: &str) -> Result<i64>;
}
