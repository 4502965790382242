//! Order service providing the order lifecycle API.
//!
//! Every operation that changes whether an order keeps its table occupied
//! (create, cancel, settle) commits the order and table streams together.

use common::{ActorId, AggregateId};
use event_store::{EventStoreError, Persistence};

use crate::catalog::MenuCatalog;
use crate::command::{CommandHandler, CommandResult, UnitOfWork};
use crate::error::DomainError;
use crate::sequencer::OrderNumberSequencer;
use crate::table::Table;

use super::{
    AddItems, CancelOrder, CreateOrder, Order, OrderError, OrderEvent, OrderItem, OrderNumber,
    PricedItem, RequestedItem, SetItemStatus,
};

/// Key namespace holding order number → order id.
pub const ORDER_NUMBER_KEY: &str = "order_number";

const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// How often a table-reconciling commit is re-decided after losing a
/// version race on the table stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_conflict_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

/// Service for managing orders and the table occupancy they imply.
pub struct OrderService<S, C>
where
    S: Persistence + Clone,
    C: MenuCatalog,
{
    orders: CommandHandler<S, Order>,
    tables: CommandHandler<S, Table>,
    sequencer: OrderNumberSequencer<S>,
    catalog: C,
    retry: RetryPolicy,
}

impl<S, C> Clone for OrderService<S, C>
where
    S: Persistence + Clone,
    C: MenuCatalog + Clone,
{
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            tables: self.tables.clone(),
            sequencer: self.sequencer.clone(),
            catalog: self.catalog.clone(),
            retry: self.retry,
        }
    }
}

impl<S, C> OrderService<S, C>
where
    S: Persistence + Clone,
    C: MenuCatalog,
{
    pub fn new(store: S, catalog: C) -> Self {
        Self {
            orders: CommandHandler::new(store.clone()),
            tables: CommandHandler::new(store.clone()),
            sequencer: OrderNumberSequencer::new(store),
            catalog,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Command handler for order streams.
    pub fn orders(&self) -> &CommandHandler<S, Order> {
        &self.orders
    }

    /// Command handler for table streams.
    pub fn tables(&self) -> &CommandHandler<S, Table> {
        &self.tables
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Places a new order at a table and marks the table occupied.
    ///
    /// The order number is drawn before anything is written, so a failed
    /// creation leaves a gap in the numbering.
    #[tracing::instrument(skip(self, cmd), fields(table_id = %cmd.table_id, staff = %cmd.staff.id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<CommandResult<Order>, DomainError> {
        cmd.validate()?;
        let table_id = cmd.table_id;

        match self.tables.load_existing(table_id).await? {
            Some(table) if !table.is_removed() => {}
            _ => return Err(DomainError::not_found("table", table_id)),
        }
        let items = self.resolve_items(&cmd.items).await?;

        let order_id = AggregateId::new();
        let order_number = self.sequencer.next().await?;
        self.claim_order_number(&order_number, order_id).await?;

        let staff = cmd.staff.id;
        let (number, lines) = (&order_number, &items);
        let result = self
            .with_table_retries(table_id, move || {
                self.place_once(order_id, number, table_id, staff, lines)
            })
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                // nothing was committed, so the number can go back to the pool
                if let Err(release) = self
                    .orders
                    .store()
                    .release_key(ORDER_NUMBER_KEY, order_number.as_str(), order_id)
                    .await
                {
                    tracing::warn!(%order_number, error = %release, "order number not released");
                }
                return Err(e);
            }
        };

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            %order_id,
            %order_number,
            total = %result.aggregate.total_amount(),
            "order created"
        );
        Ok(result)
    }

    /// Appends items to an active order. New lines start in preparation.
    #[tracing::instrument(skip(self, cmd), fields(order_number = %cmd.order_number))]
    pub async fn add_items(&self, cmd: AddItems) -> Result<CommandResult<Order>, DomainError> {
        cmd.validate()?;
        let order_id = self.order_id_for(&cmd.order_number).await?;
        let items = self.resolve_items(&cmd.items).await?;
        let actor = cmd.actor.id;

        let result = self
            .orders
            .execute(order_id, |order| order.add_items(items, actor))
            .await?;
        self.orders.snapshot_if_due(&result).await;

        tracing::info!(%order_id, total = %result.aggregate.total_amount(), "items added");
        Ok(result)
    }

    /// Moves one line item along its preparation workflow.
    #[tracing::instrument(skip(self, cmd), fields(order_number = %cmd.order_number, item_id = %cmd.item_id))]
    pub async fn set_item_status(&self, cmd: SetItemStatus) -> Result<OrderItem, DomainError> {
        let order_id = self.order_id_for(&cmd.order_number).await?;
        let actor = cmd.actor.id;

        let result = self
            .orders
            .execute(order_id, |order| {
                order.set_item_status(cmd.item_id, cmd.status, actor)
            })
            .await?;
        self.orders.snapshot_if_due(&result).await;

        metrics::counter!("order_items_status_changed_total", "status" => cmd.status.as_str())
            .increment(1);

        result
            .aggregate
            .get_item(cmd.item_id)
            .cloned()
            .ok_or_else(|| OrderError::ItemNotFound { item_id: cmd.item_id }.into())
    }

    /// Cancels an active order and frees its table if nothing else is open there.
    #[tracing::instrument(skip(self, cmd), fields(order_number = %cmd.order_number))]
    pub async fn cancel_order(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        let order_id = self.order_id_for(&cmd.order_number).await?;
        let actor = cmd.actor.id;

        let result = self
            .commit_with_table(order_id, |order| {
                order.cancel(cmd.reason.clone(), cmd.note.clone(), actor)
            })
            .await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, reason = %cmd.reason, "order cancelled");
        Ok(result)
    }

    /// Runs an order command that takes the order off its table (cancel,
    /// settle) and commits it together with the table's detach.
    ///
    /// A version race on the table stream is re-decided up to the retry
    /// policy; a race on the order stream surfaces as a conflict.
    pub async fn commit_with_table<F>(
        &self,
        order_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<Order>, DomainError>
    where
        F: Fn(&Order) -> Result<Vec<OrderEvent>, OrderError>,
    {
        let order = self
            .orders
            .load_existing(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let table_id = order
            .table_id()
            .ok_or_else(|| DomainError::not_found("table", order_id))?;

        let command_fn = &command_fn;
        self.with_table_retries(table_id, move || async move {
            let order_decision = self.orders.decide(order_id, command_fn).await?;
            let table_decision = self
                .tables
                .decide(table_id, |table| table.detach_order(order_id))
                .await?;

            let mut uow = UnitOfWork::new();
            uow.stage(&order_decision).stage(&table_decision);
            uow.commit(self.orders.store()).await?;

            let table_result = table_decision.finish();
            self.tables.snapshot_if_due(&table_result).await;
            let result = order_decision.finish();
            self.orders.snapshot_if_due(&result).await;
            Ok(result)
        })
        .await
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.orders.load_existing(order_id).await
    }

    pub async fn find_by_number(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, DomainError> {
        let owner = self
            .orders
            .store()
            .lookup_key(ORDER_NUMBER_KEY, order_number.as_str())
            .await?;
        match owner {
            Some(order_id) => self.get_order(order_id).await,
            None => Ok(None),
        }
    }

    /// Resolves an order number to its order id.
    pub async fn order_id_for(&self, order_number: &OrderNumber) -> Result<AggregateId, DomainError> {
        self.orders
            .store()
            .lookup_key(ORDER_NUMBER_KEY, order_number.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_number))
    }

    /// Snapshots name and price of every requested item. Unknown or
    /// unavailable items reject the whole request.
    async fn resolve_items(&self, requested: &[RequestedItem]) -> Result<Vec<PricedItem>, DomainError> {
        let mut priced = Vec::with_capacity(requested.len());
        for item in requested {
            let Some(entry) = self.catalog.find_item(&item.menu_item).await? else {
                return Err(DomainError::Validation(format!(
                    "unknown menu item: {}",
                    item.menu_item
                )));
            };
            if !entry.available {
                return Err(DomainError::Validation(format!(
                    "menu item {} is unavailable",
                    item.menu_item
                )));
            }

            let mut line = PricedItem::new(entry.id, entry.name, entry.price, item.quantity);
            line.notes = item.notes.clone();
            priced.push(line);
        }
        Ok(priced)
    }

    async fn claim_order_number(
        &self,
        order_number: &OrderNumber,
        order_id: AggregateId,
    ) -> Result<(), DomainError> {
        match self
            .orders
            .store()
            .claim_key(ORDER_NUMBER_KEY, order_number.as_str(), order_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e @ EventStoreError::DuplicateKey { .. }) => {
                metrics::counter!("order_number_conflicts_total").increment(1);
                tracing::warn!(%order_number, "order number already taken");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn place_once(
        &self,
        order_id: AggregateId,
        order_number: &OrderNumber,
        table_id: AggregateId,
        staff: ActorId,
        items: &[PricedItem],
    ) -> Result<CommandResult<Order>, DomainError> {
        let order_decision = self.orders.decide_on(order_id, Order::default(), |order| {
            order.place(
                order_id,
                order_number.clone(),
                table_id,
                staff,
                items.to_vec(),
            )
        })?;
        let table_decision = self
            .tables
            .decide(table_id, |table| table.attach_order(order_id))
            .await?;

        let mut uow = UnitOfWork::new();
        uow.stage(&order_decision).stage(&table_decision);
        uow.commit(self.orders.store()).await?;

        let table_result = table_decision.finish();
        self.tables.snapshot_if_due(&table_result).await;
        Ok(order_decision.finish())
    }

    async fn with_table_retries<F, Fut, T>(
        &self,
        table_id: AggregateId,
        mut attempt_fn: F,
    ) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DomainError>>,
    {
        let mut retries = 0;
        loop {
            match attempt_fn().await {
                Err(e) if e.is_conflict_on(table_id) && retries < self.retry.max_conflict_retries => {
                    retries += 1;
                    tracing::debug!(%table_id, retries, "table stream moved, re-deciding");
                }
                other => return other,
            }
        }
    }
}
