//! Query side of the café POS.
//!
//! Commands write events through the domain services; this crate folds
//! those events into in-memory views that answer the listing questions the
//! floor staff and the kitchen ask:
//! - [`ActiveOrdersView`]: open orders by table, the kitchen queue, items by status
//! - [`OrderHistoryView`]: every order, filterable by status, payment and date
//! - [`FloorPlanView`]: tables grouped by occupancy
//!
//! [`ProjectionProcessor`] replays the store into registered projections.

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{
    ActiveOrderSummary, ActiveOrdersView, FloorPlanView, FloorTable, HistoryFilter,
    OrderHistoryEntry, OrderHistoryView,
};
