//! Order commands.
//!
//! Typed inputs for the order operations. `validate` checks shape only
//! (non-empty, quantities); catalog resolution happens in the service.

use common::{Actor, AggregateId};

use super::{ItemStatus, LineItemId, MenuItemId, OrderError, OrderNumber};

/// One item as requested by staff, before catalog resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedItem {
    pub menu_item: MenuItemId,
    pub quantity: u32,
    pub notes: Option<String>,
}

impl RequestedItem {
    pub fn new(menu_item: impl Into<MenuItemId>, quantity: u32) -> Self {
        Self {
            menu_item: menu_item.into(),
            quantity,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

fn validate_requested(items: &[RequestedItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }
    if let Some(item) = items.iter().find(|item| item.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            menu_item: item.menu_item.clone(),
            quantity: item.quantity,
        });
    }
    Ok(())
}

/// Command to open an order at a table.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub table_id: AggregateId,
    pub staff: Actor,
    pub items: Vec<RequestedItem>,
}

impl CreateOrder {
    pub fn new(table_id: AggregateId, staff: Actor, items: Vec<RequestedItem>) -> Self {
        Self {
            table_id,
            staff,
            items,
        }
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        validate_requested(&self.items)
    }
}

/// Command to append items to an active order.
#[derive(Debug, Clone)]
pub struct AddItems {
    pub order_number: OrderNumber,
    pub items: Vec<RequestedItem>,
    pub actor: Actor,
}

impl AddItems {
    pub fn new(order_number: impl Into<OrderNumber>, items: Vec<RequestedItem>, actor: Actor) -> Self {
        Self {
            order_number: order_number.into(),
            items,
            actor,
        }
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        validate_requested(&self.items)
    }
}

/// Command to move a line item through preparation.
#[derive(Debug, Clone)]
pub struct SetItemStatus {
    pub order_number: OrderNumber,
    pub item_id: LineItemId,
    pub status: ItemStatus,
    pub actor: Actor,
}

impl SetItemStatus {
    pub fn new(
        order_number: impl Into<OrderNumber>,
        item_id: LineItemId,
        status: ItemStatus,
        actor: Actor,
    ) -> Self {
        Self {
            order_number: order_number.into(),
            item_id,
            status,
            actor,
        }
    }
}

/// Command to cancel an active order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_number: OrderNumber,
    pub reason: String,
    pub note: Option<String>,
    pub actor: Actor,
}

impl CancelOrder {
    pub fn new(order_number: impl Into<OrderNumber>, reason: impl Into<String>, actor: Actor) -> Self {
        Self {
            order_number: order_number.into(),
            reason: reason.into(),
            note: None,
            actor,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_order_requires_items() {
        let cmd = CreateOrder::new(AggregateId::new(), Actor::staff(), vec![]);
        assert!(matches!(cmd.validate(), Err(OrderError::NoItems)));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let cmd = AddItems::new(
            "OD000001",
            vec![RequestedItem::new("latte", 1), RequestedItem::new("mocha", 0)],
            Actor::staff(),
        );
        let err = cmd.validate().unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidQuantity { ref menu_item, .. } if menu_item.as_str() == "mocha"
        ));
    }

    #[test]
    fn builders_set_optional_fields() {
        let item = RequestedItem::new("latte", 2).with_notes("oat milk");
        assert_eq!(item.notes.as_deref(), Some("oat milk"));

        let cancel = CancelOrder::new("OD000003", "wrong table", Actor::staff()).with_note("moved");
        assert_eq!(cancel.order_number.as_str(), "OD000003");
        assert_eq!(cancel.note.as_deref(), Some("moved"));
    }
}
