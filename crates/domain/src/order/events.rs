//! Order domain events.

use chrono::{DateTime, Utc};
use common::{ActorId, AggregateId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{ItemStatus, LineItemId, Money, OrderItem, OrderNumber, PaymentMethod};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was opened at a table with its first items.
    OrderPlaced(OrderPlacedData),

    /// More items were added to an active order.
    ItemsAdded(ItemsAddedData),

    /// A line item moved through preparation.
    ItemStatusChanged(ItemStatusChangedData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// Order was paid and completed.
    OrderSettled(OrderSettledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::ItemsAdded(_) => "ItemsAdded",
            OrderEvent::ItemStatusChanged(_) => "ItemStatusChanged",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderSettled(_) => "OrderSettled",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub table_id: AggregateId,

    /// Staff member who opened the order.
    pub staff: ActorId,

    /// Items with their catalog snapshot, all pending.
    pub items: Vec<OrderItem>,

    pub total_amount: Money,
    pub placed_at: DateTime<Utc>,
}

/// Data for ItemsAdded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsAddedData {
    pub items: Vec<OrderItem>,
    pub added_by: ActorId,
    pub added_at: DateTime<Utc>,
}

impl ItemsAddedData {
    pub fn added_total(&self) -> Money {
        self.items.iter().map(OrderItem::billable_total).sum()
    }
}

/// Data for ItemStatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStatusChangedData {
    pub item_id: LineItemId,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub modified_by: ActorId,
    pub changed_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub note: Option<String>,
    pub cancelled_by: ActorId,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for OrderSettled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettledData {
    pub method: PaymentMethod,

    /// Order total at the moment of payment.
    pub amount: Money,

    pub settled_by: ActorId,

    /// Bulk settlement run this payment belongs to, if any.
    pub settlement_id: Option<AggregateId>,

    pub settled_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    pub fn order_placed(
        order_id: AggregateId,
        order_number: OrderNumber,
        table_id: AggregateId,
        staff: ActorId,
        items: Vec<OrderItem>,
    ) -> Self {
        let total_amount = items.iter().map(OrderItem::billable_total).sum();
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            order_number,
            table_id,
            staff,
            items,
            total_amount,
            placed_at: Utc::now(),
        })
    }

    pub fn items_added(items: Vec<OrderItem>, added_by: ActorId) -> Self {
        OrderEvent::ItemsAdded(ItemsAddedData {
            items,
            added_by,
            added_at: Utc::now(),
        })
    }

    pub fn item_status_changed(
        item_id: LineItemId,
        from: ItemStatus,
        to: ItemStatus,
        modified_by: ActorId,
    ) -> Self {
        OrderEvent::ItemStatusChanged(ItemStatusChangedData {
            item_id,
            from,
            to,
            modified_by,
            changed_at: Utc::now(),
        })
    }

    pub fn order_cancelled(
        reason: impl Into<String>,
        note: Option<String>,
        cancelled_by: ActorId,
    ) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            note,
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }

    pub fn order_settled(
        method: PaymentMethod,
        amount: Money,
        settled_by: ActorId,
        settlement_id: Option<AggregateId>,
    ) -> Self {
        OrderEvent::OrderSettled(OrderSettledData {
            method,
            amount,
            settled_by,
            settlement_id,
            settled_at: Utc::now(),
        })
    }
}
