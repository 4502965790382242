//! Tables on the floor and who is sitting at them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{TableEvent, TableNumber, TableStatus};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, decode, unknown_entity};
use crate::read_model::ReadModel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorTable {
    pub table_id: AggregateId,
    pub table_number: TableNumber,
    pub capacity: u32,
    pub status: TableStatus,
    pub open_orders: usize,
    pub updated_at: DateTime<Utc>,
}

/// Registered tables; removed tables drop out.
#[derive(Clone)]
pub struct FloorPlanView {
    tables: Arc<RwLock<HashMap<AggregateId, FloorTable>>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl FloorPlanView {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
        }
    }

    pub async fn get_table(&self, table_id: AggregateId) -> Option<FloorTable> {
        self.tables.read().await.get(&table_id).cloned()
    }

    /// The whole floor, ordered by table number.
    pub async fn tables(&self) -> Vec<FloorTable> {
        self.sorted(|_| true).await
    }

    pub async fn with_status(&self, status: TableStatus) -> Vec<FloorTable> {
        self.sorted(|t| t.status == status).await
    }

    /// Table count per status, in `Available`, `Occupied`, `Reserved` order.
    pub async fn status_counts(&self) -> [(TableStatus, usize); 3] {
        let tables = self.tables.read().await;
        [TableStatus::Available, TableStatus::Occupied, TableStatus::Reserved]
            .map(|status| (status, tables.values().filter(|t| t.status == status).count()))
    }

    async fn sorted(&self, keep: impl Fn(&FloorTable) -> bool) -> Vec<FloorTable> {
        let mut tables: Vec<_> = self
            .tables
            .read()
            .await
            .values()
            .filter(|t| keep(*t))
            .cloned()
            .collect();
        tables.sort_by(|a, b| a.table_number.cmp(&b.table_number));
        tables
    }
}

impl Default for FloorPlanView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for FloorPlanView {
    fn name(&self) -> &'static str {
        "FloorPlanView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type == "Table" {
            let table_event: TableEvent = decode(event)?;
            let table_id = event.aggregate_id;
            let mut tables = self.tables.write().await;

            if let TableEvent::TableRegistered(data) = &table_event {
                tables.insert(
                    table_id,
                    FloorTable {
                        table_id,
                        table_number: data.table_number.clone(),
                        capacity: data.capacity,
                        status: TableStatus::Available,
                        open_orders: 0,
                        updated_at: data.registered_at,
                    },
                );
            } else if let TableEvent::TableRemoved(_) = &table_event {
                tables.remove(&table_id);
            } else {
                let Some(table) = tables.get_mut(&table_id) else {
                    return Err(unknown_entity(Projection::name(self), event));
                };
                match table_event {
                    TableEvent::OrderAttached(_) => table.open_orders += 1,
                    TableEvent::OrderDetached(_) => {
                        table.open_orders = table.open_orders.saturating_sub(1)
                    }
                    TableEvent::TableOccupied(_) => table.status = TableStatus::Occupied,
                    TableEvent::TableReleased(_) => table.status = TableStatus::Available,
                    TableEvent::TableRegistered(_) | TableEvent::TableRemoved(_) => {}
                }
                table.updated_at = event.timestamp;
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
        self.tables.write().await.clear();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for FloorPlanView {
    fn name(&self) -> &'static str {
        "FloorPlanView"
    }

    fn count(&self) -> usize {
        self.tables.try_read().map(|t| t.len()).unwrap_or(0)
    }
}
