//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{ActorId, AggregateId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    ItemStatus, LineItemId, Money, OrderError, OrderEvent, OrderItem, OrderNumber, OrderStatus,
    PaymentMethod, PaymentStatus, PricedItem,
    events::{
        ItemStatusChangedData, ItemsAddedData, OrderCancelledData, OrderPlacedData,
        OrderSettledData,
    },
};

/// Order aggregate root.
///
/// Line items keep insertion order. `total_amount` is kept in step with the
/// items: the sum of price × quantity over lines that are not cancelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_number: Option<OrderNumber>,
    table_id: Option<AggregateId>,
    staff: Option<ActorId>,
    items: Vec<OrderItem>,
    total_amount: Money,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    note: Option<String>,
    cancel_reason: Option<String>,
    cancelled_by: Option<ActorId>,
    settled_by: Option<ActorId>,
    settlement_id: Option<AggregateId>,
    placed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::ItemsAdded(data) => self.apply_items_added(data),
            OrderEvent::ItemStatusChanged(data) => self.apply_item_status_changed(data),
            OrderEvent::OrderCancelled(data) => self.apply_order_cancelled(data),
            OrderEvent::OrderSettled(data) => self.apply_order_settled(data),
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn table_id(&self) -> Option<AggregateId> {
        self.table_id
    }

    pub fn staff(&self) -> Option<ActorId> {
        self.staff
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    /// Items in the order they were added.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn get_item(&self, item_id: LineItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn cancelled_by(&self) -> Option<ActorId> {
        self.cancelled_by
    }

    pub fn settled_by(&self) -> Option<ActorId> {
        self.settled_by
    }

    pub fn settlement_id(&self) -> Option<AggregateId> {
        self.settlement_id
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    /// Active and not yet paid: the orders that keep a table occupied.
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Active && !self.payment_status.is_paid()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn next_item_id(&self) -> LineItemId {
        self.items
            .iter()
            .map(|item| item.id)
            .max()
            .map(|id| id.next())
            .unwrap_or_else(LineItemId::first)
    }

    fn number_for_errors(&self) -> OrderNumber {
        self.order_number
            .clone()
            .unwrap_or_else(|| OrderNumber::new("unplaced"))
    }

    fn ensure_placed(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        Ok(())
    }

    fn ensure_active(&self, action: &'static str) -> Result<(), OrderError> {
        self.ensure_placed()?;
        if !self.status.can_modify_items() {
            return Err(OrderError::NotActive {
                order_number: self.number_for_errors(),
                status: self.status,
                action,
            });
        }
        Ok(())
    }
}

fn validate_items(items: &[PricedItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }
    for item in items {
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                menu_item: item.menu_item.clone(),
                quantity: item.quantity,
            });
        }
        if item.price.is_negative() {
            return Err(OrderError::InvalidPrice {
                menu_item: item.menu_item.clone(),
                price: item.price,
            });
        }
    }
    Ok(())
}

// Command methods (return events)
impl Order {
    /// Opens the order. Items start pending and are numbered from 1.
    pub fn place(
        &self,
        order_id: AggregateId,
        order_number: OrderNumber,
        table_id: AggregateId,
        staff: ActorId,
        items: Vec<PricedItem>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        validate_items(&items)?;

        let mut next_id = LineItemId::first();
        let lines = items
            .into_iter()
            .map(|item| {
                let line = OrderItem::from_priced(next_id, item, ItemStatus::Pending);
                next_id = next_id.next();
                line
            })
            .collect();

        Ok(vec![OrderEvent::order_placed(
            order_id,
            order_number,
            table_id,
            staff,
            lines,
        )])
    }

    /// Appends items to an active order. Added items go straight to preparing.
    pub fn add_items(
        &self,
        items: Vec<PricedItem>,
        actor: ActorId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_active("add items to")?;
        validate_items(&items)?;

        let mut next_id = self.next_item_id();
        let lines = items
            .into_iter()
            .map(|item| {
                let line = OrderItem::from_priced(next_id, item, ItemStatus::Preparing);
                next_id = next_id.next();
                line
            })
            .collect();

        Ok(vec![OrderEvent::items_added(lines, actor)])
    }

    /// Moves one line item to `to` if that is a legal successor of its status.
    pub fn set_item_status(
        &self,
        item_id: LineItemId,
        to: ItemStatus,
        actor: ActorId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        let item = self
            .get_item(item_id)
            .ok_or(OrderError::ItemNotFound { item_id })?;
        self.ensure_active("change items of")?;

        if !item.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                item_id,
                from: item.status,
                to,
            });
        }

        Ok(vec![OrderEvent::item_status_changed(
            item_id,
            item.status,
            to,
            actor,
        )])
    }

    pub fn cancel(
        &self,
        reason: impl Into<String>,
        note: Option<String>,
        actor: ActorId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if !self.status.can_cancel() {
            return Err(OrderError::NotActive {
                order_number: self.number_for_errors(),
                status: self.status,
                action: "cancel",
            });
        }
        if self.payment_status.is_paid() {
            return Err(OrderError::AlreadyPaid {
                order_number: self.number_for_errors(),
            });
        }

        Ok(vec![OrderEvent::order_cancelled(reason, note, actor)])
    }

    /// Records payment and completes the order.
    pub fn settle(
        &self,
        method: PaymentMethod,
        actor: ActorId,
        settlement_id: Option<AggregateId>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if self.payment_status.is_paid() {
            return Err(OrderError::AlreadyPaid {
                order_number: self.number_for_errors(),
            });
        }
        if self.status != OrderStatus::Active {
            return Err(OrderError::NotActive {
                order_number: self.number_for_errors(),
                status: self.status,
                action: "settle",
            });
        }

        Ok(vec![OrderEvent::order_settled(
            method,
            self.total_amount,
            actor,
            settlement_id,
        )])
    }
}

// Event application
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.table_id = Some(data.table_id);
        self.staff = Some(data.staff);
        self.items = data.items;
        self.total_amount = data.total_amount;
        self.status = OrderStatus::Active;
        self.payment_status = PaymentStatus::Unpaid;
        self.placed_at = Some(data.placed_at);
        self.updated_at = Some(data.placed_at);
    }

    fn apply_items_added(&mut self, data: ItemsAddedData) {
        self.total_amount += data.added_total();
        self.items.extend(data.items);
        self.updated_at = Some(data.added_at);
    }

    fn apply_item_status_changed(&mut self, data: ItemStatusChangedData) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == data.item_id) {
            let before = item.billable_total();
            item.status = data.to;
            item.modified_by = Some(data.modified_by);
            let after = item.billable_total();
            self.total_amount += after - before;
        }
        self.updated_at = Some(data.changed_at);
    }

    fn apply_order_cancelled(&mut self, data: OrderCancelledData) {
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = Some(data.reason);
        self.note = data.note;
        self.cancelled_by = Some(data.cancelled_by);
        self.updated_at = Some(data.cancelled_at);
    }

    fn apply_order_settled(&mut self, data: OrderSettledData) {
        self.status = OrderStatus::Completed;
        self.payment_status = PaymentStatus::Paid;
        self.payment_method = Some(data.method);
        self.settled_by = Some(data.settled_by);
        self.settlement_id = data.settlement_id;
        self.settled_at = Some(data.settled_at);
        self.updated_at = Some(data.settled_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregate, DomainEvent};

    fn latte(quantity: u32) -> PricedItem {
        PricedItem::new("latte", "Latte", Money::new(45000), quantity)
    }

    fn croissant(quantity: u32) -> PricedItem {
        PricedItem::new("croissant", "Croissant", Money::new(30000), quantity)
    }

    fn placed_order(items: Vec<PricedItem>) -> Order {
        let mut order = Order::default();
        let events = order
            .place(
                AggregateId::new(),
                OrderNumber::from_sequence(1),
                AggregateId::new(),
                ActorId::new(),
                items,
            )
            .unwrap();
        order.apply_events(events);
        order
    }

    fn advance(order: &mut Order, item: u32, to: ItemStatus) {
        let events = order
            .set_item_status(LineItemId::new(item), to, ActorId::new())
            .unwrap();
        order.apply_events(events);
    }

    #[test]
    fn place_snapshots_items_and_total() {
        let order = placed_order(vec![latte(2), croissant(1)]);

        assert_eq!(order.status(), OrderStatus::Active);
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(order.order_number().unwrap().as_str(), "OD000001");
        assert_eq!(order.total_amount(), Money::new(120000));
        assert_eq!(order.item_count(), 2);

        let first = &order.items()[0];
        assert_eq!(first.id, LineItemId::new(1));
        assert_eq!(first.item_name, "Latte");
        assert_eq!(first.status, ItemStatus::Pending);
        assert_eq!(order.items()[1].id, LineItemId::new(2));
        assert!(order.is_open());
    }

    #[test]
    fn place_twice_fails() {
        let order = placed_order(vec![latte(1)]);
        let result = order.place(
            AggregateId::new(),
            OrderNumber::from_sequence(2),
            AggregateId::new(),
            ActorId::new(),
            vec![latte(1)],
        );
        assert!(matches!(result, Err(OrderError::AlreadyPlaced)));
    }

    #[test]
    fn place_rejects_empty_and_zero_quantity() {
        let order = Order::default();
        let place = |items| {
            order.place(
                AggregateId::new(),
                OrderNumber::from_sequence(1),
                AggregateId::new(),
                ActorId::new(),
                items,
            )
        };

        assert!(matches!(place(vec![]), Err(OrderError::NoItems)));
        assert!(matches!(
            place(vec![latte(1), croissant(0)]),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn add_items_continue_numbering_and_start_preparing() {
        let mut order = placed_order(vec![latte(1)]);

        let events = order
            .add_items(vec![croissant(2), latte(1)], ActorId::new())
            .unwrap();
        order.apply_events(events);

        assert_eq!(order.item_count(), 3);
        assert_eq!(order.total_amount(), Money::new(150000));
        let added = &order.items()[1];
        assert_eq!(added.id, LineItemId::new(2));
        assert_eq!(added.status, ItemStatus::Preparing);
        assert_eq!(order.items()[2].id, LineItemId::new(3));
        // Existing items untouched
        assert_eq!(order.items()[0].status, ItemStatus::Pending);
    }

    #[test]
    fn item_moves_through_kitchen() {
        let mut order = placed_order(vec![latte(2)]);
        let barista = ActorId::new();

        for to in [ItemStatus::Preparing, ItemStatus::Ready, ItemStatus::Served] {
            let events = order
                .set_item_status(LineItemId::first(), to, barista)
                .unwrap();
            order.apply_events(events);
        }

        let item = order.get_item(LineItemId::first()).unwrap();
        assert_eq!(item.status, ItemStatus::Served);
        assert_eq!(item.modified_by, Some(barista));
        assert_eq!(order.status(), OrderStatus::Active);
        assert_eq!(order.total_amount(), Money::new(90000));
    }

    #[test]
    fn illegal_item_transitions_are_rejected() {
        let mut order = placed_order(vec![latte(1)]);
        for from in ItemStatus::ALL {
            for to in ItemStatus::ALL {
                if from.can_transition_to(to) {
                    continue;
                }
                let mut candidate = order.clone();
                candidate.items[0].status = from;
                let result = candidate.set_item_status(LineItemId::first(), to, ActorId::new());
                assert!(
                    matches!(result, Err(OrderError::InvalidTransition { .. })),
                    "{from} -> {to} should be rejected"
                );
            }
        }

        advance(&mut order, 1, ItemStatus::Preparing);
        assert_eq!(order.items()[0].status, ItemStatus::Preparing);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let order = placed_order(vec![latte(1)]);
        let result = order.set_item_status(LineItemId::new(7), ItemStatus::Ready, ActorId::new());
        assert!(matches!(result, Err(OrderError::ItemNotFound { .. })));
    }

    #[test]
    fn cancelled_line_leaves_total() {
        let mut order = placed_order(vec![latte(2), croissant(1)]);

        advance(&mut order, 2, ItemStatus::Cancelled);

        assert_eq!(order.total_amount(), Money::new(90000));
        assert_eq!(order.item_count(), 2);
    }

    #[test]
    fn cancel_records_reason_and_actor() {
        let mut order = placed_order(vec![latte(1)]);
        let staff = ActorId::new();

        let events = order
            .cancel("guest left", Some("comped coffee".to_string()), staff)
            .unwrap();
        assert_eq!(events[0].event_type(), "OrderCancelled");
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason(), Some("guest left"));
        assert_eq!(order.note(), Some("comped coffee"));
        assert_eq!(order.cancelled_by(), Some(staff));
        assert!(!order.is_open());
    }

    #[test]
    fn terminal_orders_reject_changes() {
        let mut order = placed_order(vec![latte(1)]);
        let events = order.cancel("mistake", None, ActorId::new()).unwrap();
        order.apply_events(events);

        assert!(matches!(
            order.cancel("again", None, ActorId::new()),
            Err(OrderError::NotActive { .. })
        ));
        assert!(matches!(
            order.add_items(vec![latte(1)], ActorId::new()),
            Err(OrderError::NotActive { .. })
        ));
        assert!(matches!(
            order.set_item_status(LineItemId::first(), ItemStatus::Preparing, ActorId::new()),
            Err(OrderError::NotActive { .. })
        ));
        assert!(matches!(
            order.settle(PaymentMethod::Cash, ActorId::new(), None),
            Err(OrderError::NotActive { .. })
        ));
    }

    #[test]
    fn settle_completes_and_second_settle_is_already_paid() {
        let mut order = placed_order(vec![latte(2)]);
        let cashier = ActorId::new();

        let events = order.settle(PaymentMethod::Cash, cashier, None).unwrap();
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.payment_method(), Some(PaymentMethod::Cash));
        assert_eq!(order.settled_by(), Some(cashier));
        assert!(order.settled_at().is_some());

        let before = order.clone();
        let result = order.settle(PaymentMethod::Card, cashier, None);
        assert!(matches!(result, Err(OrderError::AlreadyPaid { .. })));
        assert_eq!(order.payment_method(), before.payment_method());
        assert_eq!(order.version(), before.version());
    }

    #[test]
    fn commands_on_unplaced_order_fail() {
        let order = Order::default();
        assert!(matches!(
            order.settle(PaymentMethod::Cash, ActorId::new(), None),
            Err(OrderError::NotPlaced)
        ));
        assert!(matches!(
            order.cancel("x", None, ActorId::new()),
            Err(OrderError::NotPlaced)
        ));
    }

    #[test]
    fn state_survives_snapshot_serialization() {
        let mut order = placed_order(vec![latte(1)]);
        advance(&mut order, 1, ItemStatus::Preparing);

        let json = serde_json::to_value(&order).unwrap();
        let restored: Order = serde_json::from_value(json).unwrap();

        assert_eq!(restored.items(), order.items());
        assert_eq!(restored.total_amount(), order.total_amount());
        assert_eq!(restored.order_number(), order.order_number());
    }
}
