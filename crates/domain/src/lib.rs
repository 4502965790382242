//! Domain layer for the café point-of-sale.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits for event-sourced entities
//! - CommandHandler and UnitOfWork for deciding and committing commands
//! - Order aggregate with the line item preparation workflow
//! - Table aggregate tracking occupancy by open orders
//! - OrderService and TableService, the command-side entry points

pub mod aggregate;
pub mod catalog;
pub mod command;
pub mod error;
pub mod order;
pub mod sequencer;
pub mod table;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use catalog::{CatalogError, InMemoryMenuCatalog, MenuCatalog, MenuEntry};
pub use command::{CommandHandler, CommandResult, Decision, UnitOfWork};
pub use error::{DomainError, ErrorKind};
pub use order::{
    AddItems, CancelOrder, CreateOrder, ItemStatus, LineItemId, MenuItemId, Money,
    ORDER_NUMBER_KEY, Order, OrderError, OrderEvent, OrderItem, OrderNumber, OrderService,
    OrderStatus, PaymentMethod, PaymentStatus, PricedItem, RequestedItem, RetryPolicy,
    SetItemStatus,
};
pub use sequencer::OrderNumberSequencer;
pub use table::{
    RegisterTable, TABLE_NUMBER_KEY, Table, TableError, TableEvent, TableNumber, TableService,
    TableStatus,
};
