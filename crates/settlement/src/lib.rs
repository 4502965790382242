//! Payment settlement for the café POS.
//!
//! Settling a single order records payment and, atomically with it, takes
//! the order off its table. Settling a whole table walks every open order
//! on it; each bulk settlement is an event-sourced [`SettlementRun`] so a
//! partial failure leaves an audit trail:
//!
//! ```text
//! SettlementStarted ──► OrderSettled / OrderSkipped … ──┬──► SettlementCompleted
//!                                                        └──► SettlementAborted
//! ```
//!
//! Orders settled before a failure stay settled.

pub mod aggregate;
pub mod error;
pub mod events;
pub mod service;
pub mod state;

pub use aggregate::SettlementRun;
pub use error::SettlementError;
pub use events::SettlementEvent;
pub use service::{PaymentSettlement, SettlementSummary};
pub use state::SettlementState;
