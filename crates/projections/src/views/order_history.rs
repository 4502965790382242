//! Every order ever placed, with how it ended.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ActorId, AggregateId};
use domain::{Money, OrderEvent, OrderItem, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, decode, unknown_entity};
use crate::read_model::ReadModel;

#[derive(Debug, Clone)]
pub struct OrderHistoryEntry {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub table_id: AggregateId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub total_amount: Money,
    pub item_count: usize,
    pub placed_at: DateTime<Utc>,
    /// Set once the order is settled or cancelled.
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<ActorId>,
    pub cancellation_reason: Option<String>,
    pub settlement_id: Option<AggregateId>,
    items: Vec<OrderItem>,
}

impl OrderHistoryEntry {
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }
}

/// Criteria for [`OrderHistoryView::query`]. Unset fields match everything;
/// the date range applies to `placed_at` and is inclusive on both ends.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub placed_from: Option<DateTime<Utc>>,
    pub placed_until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    pub fn placed_between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.placed_from = Some(from);
        self.placed_until = Some(until);
        self
    }

    pub fn matches(&self, entry: &OrderHistoryEntry) -> bool {
        self.status.is_none_or(|s| s == entry.status)
            && self.payment_status.is_none_or(|p| p == entry.payment_status)
            && self.placed_from.is_none_or(|from| entry.placed_at >= from)
            && self.placed_until.is_none_or(|until| entry.placed_at <= until)
    }
}

/// Full order history, including orders that are still open.
#[derive(Clone)]
pub struct OrderHistoryView {
    state: Arc<RwLock<HistoryState>>,
}

struct HistoryState {
    entries: HashMap<AggregateId, OrderHistoryEntry>,
    position: ProjectionPosition,
}

impl OrderHistoryView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(HistoryState {
                entries: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Option<OrderHistoryEntry> {
        self.state.read().await.entries.get(&order_id).cloned()
    }

    /// Matching orders, most recently placed first.
    pub async fn query(&self, filter: &HistoryFilter) -> Vec<OrderHistoryEntry> {
        let mut entries: Vec<_> = self
            .state
            .read()
            .await
            .entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.placed_at
                .cmp(&a.placed_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });
        entries
    }

    /// Sum of settled amounts for orders matching `filter`.
    pub async fn revenue(&self, filter: &HistoryFilter) -> Money {
        self.state
            .read()
            .await
            .entries
            .values()
            .filter(|e| e.payment_status.is_paid() && filter.matches(e))
            .map(|e| e.total_amount)
            .sum()
    }
}

impl Default for OrderHistoryView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for OrderHistoryView {
    fn name(&self) -> &'static str {
        "OrderHistoryView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.aggregate_type == "Order" {
            let order_event: OrderEvent = decode(event)?;
            let order_id = event.aggregate_id;

            match order_event {
                OrderEvent::OrderPlaced(data) => {
                    state.entries.insert(
                        order_id,
                        OrderHistoryEntry {
                            order_id,
                            order_number: data.order_number,
                            table_id: data.table_id,
                            status: OrderStatus::Active,
                            payment_status: PaymentStatus::Unpaid,
                            payment_method: None,
                            total_amount: data.total_amount,
                            item_count: data.items.len(),
                            placed_at: data.placed_at,
                            closed_at: None,
                            closed_by: None,
                            cancellation_reason: None,
                            settlement_id: None,
                            items: data.items,
                        },
                    );
                }
                other => {
                    let Some(entry) = state.entries.get_mut(&order_id) else {
                        return Err(unknown_entity(Projection::name(self), event));
                    };
                    apply_to_entry(entry, other);
                }
            }
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

fn apply_to_entry(entry: &mut OrderHistoryEntry, event: OrderEvent) {
    match event {
        OrderEvent::ItemsAdded(data) => {
            entry.items.extend(data.items);
        }
        OrderEvent::ItemStatusChanged(data) => {
            if let Some(item) = entry.items.iter_mut().find(|i| i.id == data.item_id) {
                item.status = data.to;
                item.modified_by = Some(data.modified_by);
            }
        }
        OrderEvent::OrderCancelled(data) => {
            entry.status = OrderStatus::Cancelled;
            entry.closed_at = Some(data.cancelled_at);
            entry.closed_by = Some(data.cancelled_by);
            entry.cancellation_reason = Some(data.reason);
        }
        OrderEvent::OrderSettled(data) => {
            entry.status = OrderStatus::Completed;
            entry.payment_status = PaymentStatus::Paid;
            entry.payment_method = Some(data.method);
            entry.closed_at = Some(data.settled_at);
            entry.closed_by = Some(data.settled_by);
            entry.settlement_id = data.settlement_id;
        }
        OrderEvent::OrderPlaced(_) => {}
    }

    entry.item_count = entry.items.len();
    entry.total_amount = entry.items.iter().map(OrderItem::billable_total).sum();
}

impl ReadModel for OrderHistoryView {
    fn name(&self) -> &'static str {
        "OrderHistoryView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.entries.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{DomainEvent, ItemStatus, LineItemId, PricedItem};
    use event_store::Version;

    fn envelope(order_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(order_id)
            .aggregate_type("Order")
            .event_type(event.event_type())
            .version(Version::new(version))
            .payload(event)
            .unwrap()
            .build()
    }

    async fn place(view: &OrderHistoryView, seq: i64, price: i64, offset_hours: i64) -> AggregateId {
        let order_id = AggregateId::new();
        let item = OrderItem::from_priced(
            LineItemId::first(),
            PricedItem::new("latte", "Latte", Money::new(price), 1),
            ItemStatus::Pending,
        );
        let mut event = OrderEvent::order_placed(
            order_id,
            OrderNumber::from_sequence(seq),
            AggregateId::new(),
            ActorId::new(),
            vec![item],
        );
        if let OrderEvent::OrderPlaced(data) = &mut event {
            data.placed_at += Duration::hours(offset_hours);
        }
        view.handle(&envelope(order_id, 1, &event)).await.unwrap();
        order_id
    }

    async fn settle(view: &OrderHistoryView, order_id: AggregateId, amount: i64) {
        let event = OrderEvent::order_settled(PaymentMethod::Card, Money::new(amount), ActorId::new(), None);
        view.handle(&envelope(order_id, 2, &event)).await.unwrap();
    }

    async fn cancel(view: &OrderHistoryView, order_id: AggregateId) {
        let event = OrderEvent::order_cancelled("customer left", Some("table 4".into()), ActorId::new());
        view.handle(&envelope(order_id, 2, &event)).await.unwrap();
    }

    #[tokio::test]
    async fn settled_order_records_payment() {
        let view = OrderHistoryView::new();
        let order_id = place(&view, 1, 45000, 0).await;
        settle(&view, order_id, 45000).await;

        let entry = view.get_order(order_id).await.unwrap();
        assert_eq!(entry.status, OrderStatus::Completed);
        assert_eq!(entry.payment_status, PaymentStatus::Paid);
        assert_eq!(entry.payment_method, Some(PaymentMethod::Card));
        assert!(entry.closed_at.is_some());
        assert_eq!(entry.items().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_order_keeps_its_reason() {
        let view = OrderHistoryView::new();
        let order_id = place(&view, 1, 45000, 0).await;
        cancel(&view, order_id).await;

        let entry = view.get_order(order_id).await.unwrap();
        assert_eq!(entry.status, OrderStatus::Cancelled);
        assert_eq!(entry.payment_status, PaymentStatus::Unpaid);
        assert_eq!(entry.cancellation_reason.as_deref(), Some("customer left"));
    }

    #[tokio::test]
    async fn query_filters_by_status_and_payment() {
        let view = OrderHistoryView::new();
        let paid = place(&view, 1, 45000, 0).await;
        let cancelled = place(&view, 2, 30000, 0).await;
        let open = place(&view, 3, 20000, 0).await;
        settle(&view, paid, 45000).await;
        cancel(&view, cancelled).await;

        let completed = view.query(&HistoryFilter::new().status(OrderStatus::Completed)).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].order_id, paid);

        let unpaid = view
            .query(&HistoryFilter::new().payment_status(PaymentStatus::Unpaid))
            .await;
        let mut ids: Vec<_> = unpaid.iter().map(|e| e.order_id).collect();
        ids.sort_by_key(|id| id.to_string());
        let mut expected = vec![cancelled, open];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(ids, expected);

        assert_eq!(view.query(&HistoryFilter::new()).await.len(), 3);
        assert_eq!(view.revenue(&HistoryFilter::new()).await, Money::new(45000));
    }

    #[tokio::test]
    async fn query_filters_by_date_range_newest_first() {
        let view = OrderHistoryView::new();
        let now = Utc::now();
        let yesterday = place(&view, 1, 45000, -24).await;
        let this_morning = place(&view, 2, 45000, -3).await;
        let just_now = place(&view, 3, 45000, 0).await;

        let today = view
            .query(&HistoryFilter::new().placed_between(now - Duration::hours(12), now + Duration::hours(1)))
            .await;
        let ids: Vec<_> = today.iter().map(|e| e.order_id).collect();
        assert_eq!(ids, vec![just_now, this_morning]);
        assert!(!ids.contains(&yesterday));
    }

    #[tokio::test]
    async fn cancelled_lines_drop_out_of_the_total() {
        let view = OrderHistoryView::new();
        let order_id = place(&view, 1, 45000, 0).await;
        let staff = ActorId::new();

        let extra = OrderItem::from_priced(
            LineItemId::new(2),
            PricedItem::new("espresso", "Espresso", Money::new(30000), 1),
            ItemStatus::Pending,
        );
        view.handle(&envelope(order_id, 2, &OrderEvent::items_added(vec![extra], staff)))
            .await
            .unwrap();
        assert_eq!(view.get_order(order_id).await.unwrap().total_amount, Money::new(75000));

        let event = OrderEvent::item_status_changed(
            LineItemId::new(2),
            ItemStatus::Pending,
            ItemStatus::Cancelled,
            staff,
        );
        view.handle(&envelope(order_id, 3, &event)).await.unwrap();

        let entry = view.get_order(order_id).await.unwrap();
        assert_eq!(entry.total_amount, Money::new(45000));
        assert_eq!(entry.item_count, 2);
    }

    #[tokio::test]
    async fn event_for_unknown_order_is_an_error() {
        let view = OrderHistoryView::new();
        let event = OrderEvent::order_cancelled("x", None, ActorId::new());

        let err = view
            .handle(&envelope(AggregateId::new(), 2, &event))
            .await
            .unwrap_err();

        assert!(matches!(err, crate::ProjectionError::UnknownEntity { .. }));
        assert_eq!(view.position().await.events_processed, 0);
    }
}
