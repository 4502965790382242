//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    ItemStatusChangedData, ItemsAddedData, OrderCancelledData, OrderEvent, OrderPlacedData,
    OrderSettledData,
};
pub use service::{ORDER_NUMBER_KEY, OrderService, RetryPolicy};
pub use state::{ItemStatus, OrderStatus, PaymentStatus};
pub use value_objects::{
    LineItemId, MenuItemId, Money, OrderItem, OrderNumber, PaymentMethod, PricedItem,
};

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order already placed")]
    AlreadyPlaced,

    /// Order is not in a status that allows the action.
    #[error("Cannot {action} order {order_number}: order is {status}")]
    NotActive {
        order_number: OrderNumber,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("Order {order_number} is already paid")]
    AlreadyPaid { order_number: OrderNumber },

    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: LineItemId },

    #[error("Item {item_id} cannot move from {from} to {to}")]
    InvalidTransition {
        item_id: LineItemId,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("Invalid quantity for {menu_item}: {quantity} (must be at least 1)")]
    InvalidQuantity { menu_item: MenuItemId, quantity: u32 },

    #[error("Invalid price for {menu_item}: {price}")]
    InvalidPrice { menu_item: MenuItemId, price: Money },

    #[error("Order has no items")]
    NoItems,
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotPlaced | OrderError::ItemNotFound { .. } => ErrorKind::NotFound,
            OrderError::AlreadyPlaced => ErrorKind::Conflict,
            OrderError::NotActive { .. }
            | OrderError::AlreadyPaid { .. }
            | OrderError::InvalidTransition { .. } => ErrorKind::InvalidState,
            OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::NoItems => ErrorKind::Validation,
        }
    }
}
