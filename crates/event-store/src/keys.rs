use async_trait::async_trait;

use crate::{AggregateId, Result};

/// Index of unique secondary keys (order numbers, table numbers).
///
/// Keys are scoped by namespace. Claiming a key that another aggregate owns
/// fails with `EventStoreError::DuplicateKey`; re-claiming a key for its
/// current owner succeeds.
#[async_trait]
pub trait UniqueKeyStore: Send + Sync {
    async fn claim_key(&self, namespace: &str, key: &str, owner: AggregateId) -> Result<()>;

    async fn lookup_key(&self, namespace: &str, key: &str) -> Result<Option<AggregateId>>;

    /// Frees a key. Only the owner can release it; releasing a key owned by
    /// someone else, or not claimed at all, is a no-op.
    async fn release_key(&self, namespace: &str, key: &str, owner: AggregateId) -> Result<()>;
}
