//! Café point-of-sale service.
//!
//! [`Pos`] wires the command side (orders, tables, settlement) and the
//! read models onto one event store. The `pos` binary builds it from
//! [`Config`], seeds tables and menu, and keeps the views current until
//! shutdown.

pub mod config;
pub mod error;
pub mod seed;
pub mod telemetry;

pub use config::{Config, ConfigError, LogFormat};
pub use error::{PosError, Result};
pub use seed::{Seed, SeedError, SeedReport};

use domain::{InMemoryMenuCatalog, OrderService, RetryPolicy, TableService};
use event_store::Persistence;
use projections::{
    ActiveOrdersView, FloorPlanView, OrderHistoryView, ProjectionProcessor,
};
use settlement::PaymentSettlement;

/// Services and views sharing one store.
pub struct Pos<S: Persistence + Clone> {
    tables: TableService<S>,
    settlement: PaymentSettlement<S, InMemoryMenuCatalog>,
    processor: ProjectionProcessor<S>,
    active_orders: ActiveOrdersView,
    order_history: OrderHistoryView,
    floor_plan: FloorPlanView,
}

impl<S: Persistence + Clone> Pos<S> {
    pub fn new(store: S, catalog: InMemoryMenuCatalog, retry: RetryPolicy) -> Self {
        let orders = OrderService::new(store.clone(), catalog).with_retry_policy(retry);

        let active_orders = ActiveOrdersView::new();
        let order_history = OrderHistoryView::new();
        let floor_plan = FloorPlanView::new();

        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(active_orders.clone()));
        processor.register(Box::new(order_history.clone()));
        processor.register(Box::new(floor_plan.clone()));

        Self {
            tables: TableService::new(store),
            settlement: PaymentSettlement::new(orders),
            processor,
            active_orders,
            order_history,
            floor_plan,
        }
    }

    /// Builds the service with the retry limit from `config` and an empty menu.
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(
            store,
            InMemoryMenuCatalog::new(),
            RetryPolicy {
                max_conflict_retries: config.max_conflict_retries,
            },
        )
    }

    pub fn orders(&self) -> &OrderService<S, InMemoryMenuCatalog> {
        self.settlement.orders()
    }

    pub fn tables(&self) -> &TableService<S> {
        &self.tables
    }

    pub fn settlement(&self) -> &PaymentSettlement<S, InMemoryMenuCatalog> {
        &self.settlement
    }

    pub fn catalog(&self) -> &InMemoryMenuCatalog {
        self.orders().catalog()
    }

    pub fn active_orders(&self) -> &ActiveOrdersView {
        &self.active_orders
    }

    pub fn order_history(&self) -> &OrderHistoryView {
        &self.order_history
    }

    pub fn floor_plan(&self) -> &FloorPlanView {
        &self.floor_plan
    }

    pub async fn seed(&self, seed: Seed) -> Result<SeedReport> {
        Ok(seed.apply(&self.tables, self.catalog()).await?)
    }

    /// Feeds events committed since the last refresh into the views.
    /// Returns the length of the event stream.
    pub async fn refresh_views(&self) -> Result<u64> {
        Ok(self.processor.run_catch_up().await?)
    }

    /// Rebuilds every view from the first event.
    pub async fn rebuild_views(&self) -> Result<u64> {
        Ok(self.processor.rebuild_all().await?)
    }
}
