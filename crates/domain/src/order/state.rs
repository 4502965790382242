//! Order, payment and line item state machines.

use serde::{Deserialize, Serialize};

/// Lifecycle of an order.
///
/// ```text
/// Active ──┬──► Completed   (settled)
///          └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Open for new items and kitchen progress.
    #[default]
    Active,

    /// Paid and closed (terminal state).
    Completed,

    /// Cancelled before payment (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if items can be added or progressed in this status.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::Active)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Active)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    /// Recognised for completeness; no operation produces it.
    Refunded,
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Preparation status of a single line item.
///
/// ```text
/// Pending ──► Preparing ──► Ready ──► Served
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 5] = [
        ItemStatus::Pending,
        ItemStatus::Preparing,
        ItemStatus::Ready,
        ItemStatus::Served,
        ItemStatus::Cancelled,
    ];

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::Preparing)
                | (ItemStatus::Preparing, ItemStatus::Ready)
                | (ItemStatus::Ready, ItemStatus::Served)
                | (ItemStatus::Pending, ItemStatus::Cancelled)
                | (ItemStatus::Preparing, ItemStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Served | ItemStatus::Cancelled)
    }

    /// Still waiting on the kitchen.
    pub fn is_in_kitchen(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Preparing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Preparing => "preparing",
            ItemStatus::Ready => "ready",
            ItemStatus::Served => "served",
            ItemStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
