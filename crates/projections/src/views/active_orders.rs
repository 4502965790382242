//! Open orders as the floor and the kitchen see them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ActorId, AggregateId};
use domain::{ItemStatus, Money, OrderEvent, OrderItem, OrderNumber};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, decode};
use crate::read_model::ReadModel;

/// An order that is neither settled nor cancelled.
#[derive(Debug, Clone)]
pub struct ActiveOrderSummary {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub table_id: AggregateId,
    pub staff: ActorId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveOrderSummary {
    /// Lines the kitchen still has to work on.
    pub fn kitchen_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Pending | ItemStatus::Preparing))
    }

    pub fn has_kitchen_work(&self) -> bool {
        self.kitchen_items().next().is_some()
    }

    fn recalculate_total(&mut self) {
        self.total_amount = self.items.iter().map(OrderItem::billable_total).sum();
    }
}

/// Active orders keyed by aggregate id.
///
/// Orders enter on `OrderPlaced` and leave on `OrderCancelled` or
/// `OrderSettled`.
#[derive(Clone)]
pub struct ActiveOrdersView {
    orders: Arc<RwLock<HashMap<AggregateId, ActiveOrderSummary>>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl ActiveOrdersView {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
        }
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Option<ActiveOrderSummary> {
        self.orders.read().await.get(&order_id).cloned()
    }

    pub async fn find_by_number(&self, number: &OrderNumber) -> Option<ActiveOrderSummary> {
        self.orders
            .read()
            .await
            .values()
            .find(|o| &o.order_number == number)
            .cloned()
    }

    /// All active orders, oldest first.
    pub async fn all(&self) -> Vec<ActiveOrderSummary> {
        self.sorted(|_| true).await
    }

    /// Active orders seated at one table, oldest first.
    pub async fn by_table(&self, table_id: AggregateId) -> Vec<ActiveOrderSummary> {
        self.sorted(|o| o.table_id == table_id).await
    }

    /// Orders with at least one pending or preparing line, oldest first.
    pub async fn kitchen_queue(&self) -> Vec<ActiveOrderSummary> {
        self.sorted(ActiveOrderSummary::has_kitchen_work).await
    }

    /// Active orders narrowed to their lines in `status`; orders with no
    /// such line are left out. `total_amount` still reflects the whole order.
    pub async fn with_items_in(&self, status: ItemStatus) -> Vec<ActiveOrderSummary> {
        self.sorted(|o| o.items.iter().any(|i| i.status == status))
            .await
            .into_iter()
            .map(|mut o| {
                o.items.retain(|i| i.status == status);
                o
            })
            .collect()
    }

    async fn sorted(&self, keep: impl Fn(&ActiveOrderSummary) -> bool) -> Vec<ActiveOrderSummary> {
        let mut orders: Vec<_> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| keep(*o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.placed_at
                .cmp(&b.placed_at)
                .then_with(|| a.order_number.cmp(&b.order_number))
        });
        orders
    }
}

impl Default for ActiveOrdersView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for ActiveOrdersView {
    fn name(&self) -> &'static str {
        "ActiveOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type == "Order" {
            let order_event: OrderEvent = decode(event)?;
            let order_id = event.aggregate_id;
            let mut orders = self.orders.write().await;

            match order_event {
                OrderEvent::OrderPlaced(data) => {
                    orders.insert(
                        order_id,
                        ActiveOrderSummary {
                            order_id,
                            order_number: data.order_number,
                            table_id: data.table_id,
                            staff: data.staff,
                            items: data.items,
                            total_amount: data.total_amount,
                            placed_at: data.placed_at,
                            updated_at: data.placed_at,
                        },
                    );
                }
                OrderEvent::ItemsAdded(data) => {
                    if let Some(order) = orders.get_mut(&order_id) {
                        order.items.extend(data.items);
                        order.recalculate_total();
                        order.updated_at = data.added_at;
                    }
                }
                OrderEvent::ItemStatusChanged(data) => {
                    if let Some(order) = orders.get_mut(&order_id) {
                        if let Some(item) = order.items.iter_mut().find(|i| i.id == data.item_id) {
                            item.status = data.to;
                            item.modified_by = Some(data.modified_by);
                        }
                        order.recalculate_total();
                        order.updated_at = data.changed_at;
                    }
                }
                OrderEvent::OrderCancelled(_) | OrderEvent::OrderSettled(_) => {
                    orders.remove(&order_id);
                }
            }
        }

        let mut pos = self.position.write().await;
        *pos = pos.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.orders.write().await.clear();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for ActiveOrdersView {
    fn name(&self) -> &'static str {
        "ActiveOrdersView"
    }

    fn count(&self) -> usize {
        self.orders.try_read().map(|o| o.len()).unwrap_or(0)
    }
}
