//! Read model views.

pub mod active_orders;
pub mod floor_plan;
pub mod order_history;

pub use active_orders::{ActiveOrderSummary, ActiveOrdersView};
pub use floor_plan::{FloorPlanView, FloorTable};
pub use order_history::{HistoryFilter, OrderHistoryEntry, OrderHistoryView};
