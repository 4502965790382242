//! Table aggregate implementation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    TableError, TableEvent, TableNumber, TableStatus,
    events::{
        OrderAttachedData, OrderDetachedData, TableOccupiedData, TableRegisteredData,
        TableReleasedData, TableRemovedData,
    },
};

/// Table aggregate root.
///
/// Tracks the set of open orders seated at the table; the table is
/// `Occupied` exactly while that set is non-empty or a walk-in holds it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    table_number: Option<TableNumber>,
    capacity: u32,
    status: TableStatus,
    open_orders: BTreeSet<AggregateId>,
    removed: bool,
    registered_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Table {
    type Event = TableEvent;
    type Error = TableError;

    fn aggregate_type() -> &'static str {
        "Table"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TableEvent::TableRegistered(data) => self.apply_registered(data),
            TableEvent::OrderAttached(data) => self.apply_order_attached(data),
            TableEvent::OrderDetached(data) => self.apply_order_detached(data),
            TableEvent::TableOccupied(data) => self.apply_occupied(data),
            TableEvent::TableReleased(data) => self.apply_released(data),
            TableEvent::TableRemoved(data) => self.apply_removed(data),
        }
    }
}

impl SnapshotCapable for Table {
    fn snapshot_interval() -> usize {
        100
    }
}

// Query methods
impl Table {
    pub fn table_number(&self) -> Option<&TableNumber> {
        self.table_number.as_ref()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn status(&self) -> TableStatus {
        self.status
    }

    /// Ids of active, unpaid orders seated here.
    pub fn open_orders(&self) -> &BTreeSet<AggregateId> {
        &self.open_orders
    }

    pub fn has_open_orders(&self) -> bool {
        !self.open_orders.is_empty()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn number_for_errors(&self) -> TableNumber {
        self.table_number
            .clone()
            .unwrap_or_else(|| TableNumber::new("unregistered"))
    }

    /// Registered and not removed.
    fn ensure_usable(&self) -> Result<(), TableError> {
        if self.id.is_none() {
            return Err(TableError::NotRegistered);
        }
        if self.removed {
            return Err(TableError::Removed(self.number_for_errors()));
        }
        Ok(())
    }

    fn invalid_transition(&self, action: &'static str) -> TableError {
        TableError::InvalidTransition {
            table_number: self.number_for_errors(),
            status: self.status,
            action,
        }
    }
}

// Command methods (return events)
impl Table {
    pub fn register(
        &self,
        table_id: AggregateId,
        table_number: TableNumber,
        capacity: u32,
    ) -> Result<Vec<TableEvent>, TableError> {
        if self.id.is_some() {
            return Err(TableError::AlreadyRegistered);
        }
        if table_number.as_str().trim().is_empty() {
            return Err(TableError::EmptyNumber);
        }
        if capacity == 0 {
            return Err(TableError::InvalidCapacity(capacity));
        }

        Ok(vec![TableEvent::table_registered(
            table_id,
            table_number,
            capacity,
        )])
    }

    /// Walk-in occupancy, before any order exists.
    pub fn occupy(&self) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_usable()?;
        if !self.status.can_occupy() {
            return Err(self.invalid_transition("occupy"));
        }
        Ok(vec![TableEvent::table_occupied(None)])
    }

    /// Manual release. Refused while unpaid orders remain seated.
    pub fn release(&self) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_usable()?;
        if !self.status.can_release() {
            return Err(self.invalid_transition("release"));
        }
        if self.has_open_orders() {
            return Err(TableError::HasOpenOrders {
                table_number: self.number_for_errors(),
                open_orders: self.open_orders.len(),
            });
        }
        Ok(vec![TableEvent::table_released(None)])
    }

    /// Seats an order, occupying the table if it is not already.
    pub fn attach_order(&self, order_id: AggregateId) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_usable()?;
        if self.open_orders.contains(&order_id) {
            return Ok(vec![]);
        }

        let mut events = vec![TableEvent::order_attached(order_id)];
        if self.status != TableStatus::Occupied {
            events.push(TableEvent::table_occupied(Some(order_id)));
        }
        Ok(events)
    }

    /// Removes a paid or cancelled order. Releases the table when it was the
    /// last one. Unknown orders are a no-op.
    pub fn detach_order(&self, order_id: AggregateId) -> Result<Vec<TableEvent>, TableError> {
        if self.id.is_none() {
            return Err(TableError::NotRegistered);
        }
        if !self.open_orders.contains(&order_id) {
            return Ok(vec![]);
        }

        let mut events = vec![TableEvent::order_detached(order_id)];
        if self.open_orders.len() == 1 && self.status == TableStatus::Occupied {
            events.push(TableEvent::table_released(Some(order_id)));
        }
        Ok(events)
    }

    /// Releases an occupied table that has no open orders left; no-op otherwise.
    pub fn release_if_vacant(&self) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_usable()?;
        if self.status == TableStatus::Occupied && !self.has_open_orders() {
            return Ok(vec![TableEvent::table_released(None)]);
        }
        Ok(vec![])
    }

    pub fn remove(&self) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_usable()?;
        if self.has_open_orders() {
            return Err(TableError::HasOpenOrders {
                table_number: self.number_for_errors(),
                open_orders: self.open_orders.len(),
            });
        }
        if !self.status.can_remove() {
            return Err(self.invalid_transition("remove"));
        }
        Ok(vec![TableEvent::table_removed()])
    }
}

// Event application
impl Table {
    fn apply_registered(&mut self, data: TableRegisteredData) {
        self.id = Some(data.table_id);
        self.table_number = Some(data.table_number);
        self.capacity = data.capacity;
        self.status = TableStatus::Available;
        self.registered_at = Some(data.registered_at);
        self.updated_at = Some(data.registered_at);
    }

    fn apply_order_attached(&mut self, data: OrderAttachedData) {
        self.open_orders.insert(data.order_id);
        self.updated_at = Some(data.attached_at);
    }

    fn apply_order_detached(&mut self, data: OrderDetachedData) {
        self.open_orders.remove(&data.order_id);
        self.updated_at = Some(data.detached_at);
    }

    fn apply_occupied(&mut self, data: TableOccupiedData) {
        self.status = TableStatus::Occupied;
        self.updated_at = Some(data.occupied_at);
    }

    fn apply_released(&mut self, data: TableReleasedData) {
        self.status = TableStatus::Available;
        self.updated_at = Some(data.released_at);
    }

    fn apply_removed(&mut self, data: TableRemovedData) {
        self.removed = true;
        self.updated_at = Some(data.removed_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;

    fn registered() -> Table {
        let mut table = Table::default();
        let events = table
            .register(AggregateId::new(), TableNumber::new("T1"), 4)
            .unwrap();
        for event in events {
            table.apply(event);
        }
        table
    }

    fn apply_all(table: &mut Table, events: Vec<TableEvent>) {
        for event in events {
            table.apply(event);
        }
    }

    #[test]
    fn register_table() {
        let table = registered();

        assert!(table.id().is_some());
        assert_eq!(table.table_number().unwrap().as_str(), "T1");
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.status(), TableStatus::Available);
        assert!(!table.has_open_orders());
    }

    #[test]
    fn register_validates_input() {
        let table = Table::default();
        assert!(matches!(
            table.register(AggregateId::new(), "T1".into(), 0),
            Err(TableError::InvalidCapacity(0))
        ));
        assert!(matches!(
            table.register(AggregateId::new(), "  ".into(), 2),
            Err(TableError::EmptyNumber)
        ));
        assert!(matches!(
            registered().register(AggregateId::new(), "T2".into(), 2),
            Err(TableError::AlreadyRegistered)
        ));
    }

    #[test]
    fn attach_first_order_occupies() {
        let mut table = registered();
        let order = AggregateId::new();

        let events = table.attach_order(order).unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, ["OrderAttached", "TableOccupied"]);

        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Occupied);
        assert!(table.open_orders().contains(&order));
    }

    #[test]
    fn attach_second_order_keeps_occupancy() {
        let mut table = registered();
        let events = table.attach_order(AggregateId::new()).unwrap();
        apply_all(&mut table, events);

        let events = table.attach_order(AggregateId::new()).unwrap();
        assert_eq!(events.len(), 1);
        apply_all(&mut table, events);
        assert_eq!(table.open_orders().len(), 2);
    }

    #[test]
    fn attach_is_idempotent() {
        let mut table = registered();
        let order = AggregateId::new();
        let events = table.attach_order(order).unwrap();
        apply_all(&mut table, events);

        assert!(table.attach_order(order).unwrap().is_empty());
    }

    #[test]
    fn detach_last_order_releases() {
        let mut table = registered();
        let a = AggregateId::new();
        let b = AggregateId::new();
        let events = table.attach_order(a).unwrap();
        apply_all(&mut table, events);
        let events = table.attach_order(b).unwrap();
        apply_all(&mut table, events);

        let events = table.detach_order(a).unwrap();
        assert_eq!(events.len(), 1);
        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Occupied);

        let events = table.detach_order(b).unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, ["OrderDetached", "TableReleased"]);
        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Available);
        assert!(!table.has_open_orders());
    }

    #[test]
    fn detach_unknown_order_is_noop() {
        let table = registered();
        assert!(table.detach_order(AggregateId::new()).unwrap().is_empty());
    }

    #[test]
    fn manual_occupy_and_release() {
        let mut table = registered();

        let events = table.occupy().unwrap();
        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Occupied);
        assert!(matches!(
            table.occupy(),
            Err(TableError::InvalidTransition { action: "occupy", .. })
        ));

        let events = table.release().unwrap();
        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Available);
        assert!(matches!(
            table.release(),
            Err(TableError::InvalidTransition { action: "release", .. })
        ));
    }

    #[test]
    fn release_refused_with_open_orders() {
        let mut table = registered();
        let events = table.attach_order(AggregateId::new()).unwrap();
        apply_all(&mut table, events);

        let err = table.release().unwrap_err();
        assert!(matches!(err, TableError::HasOpenOrders { open_orders: 1, .. }));
    }

    #[test]
    fn reserved_table_is_occupied_by_an_order() {
        let mut table = registered();
        table.status = TableStatus::Reserved;

        assert!(table.occupy().is_err());
        let events = table.attach_order(AggregateId::new()).unwrap();
        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Occupied);
    }

    #[test]
    fn release_if_vacant() {
        let mut table = registered();
        assert!(table.release_if_vacant().unwrap().is_empty());

        let events = table.occupy().unwrap();
        apply_all(&mut table, events);
        let events = table.release_if_vacant().unwrap();
        assert_eq!(events.len(), 1);
        apply_all(&mut table, events);
        assert_eq!(table.status(), TableStatus::Available);
    }

    #[test]
    fn remove_requires_available_and_empty() {
        let mut table = registered();
        let order = AggregateId::new();
        let events = table.attach_order(order).unwrap();
        apply_all(&mut table, events);
        assert!(matches!(
            table.remove(),
            Err(TableError::HasOpenOrders { .. })
        ));

        let events = table.detach_order(order).unwrap();
        apply_all(&mut table, events);
        let events = table.remove().unwrap();
        apply_all(&mut table, events);
        assert!(table.is_removed());

        assert!(matches!(table.occupy(), Err(TableError::Removed(_))));
        assert!(matches!(
            table.attach_order(AggregateId::new()),
            Err(TableError::Removed(_))
        ));
    }

    #[test]
    fn commands_on_unregistered_table() {
        let table = Table::default();
        assert!(matches!(table.occupy(), Err(TableError::NotRegistered)));
        assert!(matches!(
            table.attach_order(AggregateId::new()),
            Err(TableError::NotRegistered)
        ));
    }

    #[test]
    fn state_survives_snapshot_serialization() {
        let mut table = registered();
        let events = table.attach_order(AggregateId::new()).unwrap();
        apply_all(&mut table, events);

        let json = serde_json::to_value(&table).unwrap();
        let restored: Table = serde_json::from_value(json).unwrap();
        assert_eq!(restored.open_orders(), table.open_orders());
        assert_eq!(restored.status(), TableStatus::Occupied);
    }
}
