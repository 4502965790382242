//! Table domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::TableNumber;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TableEvent {
    TableRegistered(TableRegisteredData),

    /// An active, unpaid order was seated at the table.
    OrderAttached(OrderAttachedData),

    /// A seated order was paid or cancelled.
    OrderDetached(OrderDetachedData),

    TableOccupied(TableOccupiedData),
    TableReleased(TableReleasedData),
    TableRemoved(TableRemovedData),
}

impl DomainEvent for TableEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TableEvent::TableRegistered(_) => "TableRegistered",
            TableEvent::OrderAttached(_) => "OrderAttached",
            TableEvent::OrderDetached(_) => "OrderDetached",
            TableEvent::TableOccupied(_) => "TableOccupied",
            TableEvent::TableReleased(_) => "TableReleased",
            TableEvent::TableRemoved(_) => "TableRemoved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRegisteredData {
    pub table_id: AggregateId,
    pub table_number: TableNumber,
    pub capacity: u32,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAttachedData {
    pub order_id: AggregateId,
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetachedData {
    pub order_id: AggregateId,
    pub detached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOccupiedData {
    /// Order that caused the occupancy; None for a walk-in.
    pub order_id: Option<AggregateId>,
    pub occupied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReleasedData {
    /// Last order to leave; None for a manual release.
    pub order_id: Option<AggregateId>,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRemovedData {
    pub removed_at: DateTime<Utc>,
}

// Convenience constructors for events
impl TableEvent {
    pub fn table_registered(
        table_id: AggregateId,
        table_number: TableNumber,
        capacity: u32,
    ) -> Self {
        TableEvent::TableRegistered(TableRegisteredData {
            table_id,
            table_number,
            capacity,
            registered_at: Utc::now(),
        })
    }

    pub fn order_attached(order_id: AggregateId) -> Self {
        TableEvent::OrderAttached(OrderAttachedData {
            order_id,
            attached_at: Utc::now(),
        })
    }

    pub fn order_detached(order_id: AggregateId) -> Self {
        TableEvent::OrderDetached(OrderDetachedData {
            order_id,
            detached_at: Utc::now(),
        })
    }

    pub fn table_occupied(order_id: Option<AggregateId>) -> Self {
        TableEvent::TableOccupied(TableOccupiedData {
            order_id,
            occupied_at: Utc::now(),
        })
    }

    pub fn table_released(order_id: Option<AggregateId>) -> Self {
        TableEvent::TableReleased(TableReleasedData {
            order_id,
            released_at: Utc::now(),
        })
    }

    pub fn table_removed() -> Self {
        TableEvent::TableRemoved(TableRemovedData {
            removed_at: Utc::now(),
        })
    }
}
