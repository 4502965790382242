//! Table aggregate: registration and occupancy.

mod aggregate;
mod events;
mod service;
mod state;

pub use aggregate::Table;
pub use events::{
    OrderAttachedData, OrderDetachedData, TableEvent, TableOccupiedData, TableRegisteredData,
    TableReleasedData, TableRemovedData,
};
pub use service::{RegisterTable, TABLE_NUMBER_KEY, TableService};
pub use state::TableStatus;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Table label shown on the floor, e.g. `T1`. Unique across tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableNumber(String);

impl TableNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TableNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TableNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Errors that can occur during table operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table is not registered")]
    NotRegistered,

    #[error("Table {0} was removed")]
    Removed(TableNumber),

    #[error("Table already registered")]
    AlreadyRegistered,

    #[error("Table number must not be empty")]
    EmptyNumber,

    #[error("Invalid capacity: {0} (must be greater than 0)")]
    InvalidCapacity(u32),

    #[error("Cannot {action} table {table_number}: table is {status}")]
    InvalidTransition {
        table_number: TableNumber,
        status: TableStatus,
        action: &'static str,
    },

    #[error("Table {table_number} still has {open_orders} unpaid order(s)")]
    HasOpenOrders {
        table_number: TableNumber,
        open_orders: usize,
    },
}

impl TableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TableError::NotRegistered | TableError::Removed(_) => ErrorKind::NotFound,
            TableError::AlreadyRegistered => ErrorKind::Conflict,
            TableError::EmptyNumber | TableError::InvalidCapacity(_) => ErrorKind::Validation,
            TableError::InvalidTransition { .. } | TableError::HasOpenOrders { .. } => {
                ErrorKind::InvalidState
            }
        }
    }
}
