//! Order number allocation.

use event_store::SequenceStore;

use crate::error::DomainError;
use crate::order::OrderNumber;

/// Hands out order numbers from a persisted counter.
///
/// Every call consumes a value, whether or not the order it was drawn for
/// is eventually written.
#[derive(Clone)]
pub struct OrderNumberSequencer<S: SequenceStore> {
    store: S,
}

impl<S: SequenceStore> OrderNumberSequencer<S> {
    pub const SEQUENCE: &'static str = "order_number";

    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn next(&self) -> Result<OrderNumber, DomainError> {
        let value = self.store.next_value(Self::SEQUENCE).await?;
        Ok(OrderNumber::from_sequence(value))
    }

    /// Last number handed out, if any.
    pub async fn last(&self) -> Result<Option<OrderNumber>, DomainError> {
        let value = self.store.current_value(Self::SEQUENCE).await?;
        Ok((value > 0).then(|| OrderNumber::from_sequence(value)))
    }
}
