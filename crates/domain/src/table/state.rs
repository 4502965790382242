//! Table occupancy states.

use serde::{Deserialize, Serialize};

/// Occupancy of a table.
///
/// ```text
/// Available ◄──► Occupied
///     Reserved ──► Occupied   (an order is seated)
/// ```
///
/// `Occupied` mirrors "at least one active, unpaid order is seated here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    #[default]
    Available,
    Occupied,
    /// No workflow produces it yet; seating an order on it occupies the table.
    Reserved,
}

impl TableStatus {
    /// Walk-in occupancy without an order.
    pub fn can_occupy(&self) -> bool {
        matches!(self, TableStatus::Available)
    }

    pub fn can_release(&self) -> bool {
        matches!(self, TableStatus::Occupied)
    }

    /// Seating an order is allowed from any status.
    pub fn can_seat_order(&self) -> bool {
        true
    }

    pub fn can_remove(&self) -> bool {
        matches!(self, TableStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Available => "available",
            TableStatus::Occupied => "occupied",
            TableStatus::Reserved => "reserved",
        }
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
