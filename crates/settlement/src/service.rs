//! Payment settlement service.

use common::{Actor, AggregateId};
use domain::{
    Aggregate, CommandHandler, CommandResult, DomainError, DomainEvent, MenuCatalog, Money, Order,
    OrderError, OrderNumber, OrderService, OrderStatus, PaymentMethod,
};
use event_store::{AppendOptions, EventEnvelope, Persistence, Version};

use crate::aggregate::SettlementRun;
use crate::error::{Result, SettlementError};
use crate::events::SettlementEvent;

/// Outcome of a completed table settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementSummary {
    pub run_id: AggregateId,
    pub table_id: AggregateId,
    /// Orders paid by this run, in order number order.
    pub settled: Vec<OrderNumber>,
    /// Orders found already paid or cancelled when their turn came.
    pub skipped: Vec<OrderNumber>,
    pub total: Money,
}

impl SettlementSummary {
    pub fn count(&self) -> usize {
        self.settled.len()
    }
}

/// Records payments for single orders and whole tables.
pub struct PaymentSettlement<S, C>
where
    S: Persistence + Clone,
    C: MenuCatalog,
{
    store: S,
    orders: OrderService<S, C>,
    runs: CommandHandler<S, SettlementRun>,
}

impl<S, C> Clone for PaymentSettlement<S, C>
where
    S: Persistence + Clone,
    C: MenuCatalog + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            orders: self.orders.clone(),
            runs: self.runs.clone(),
        }
    }
}

impl<S, C> PaymentSettlement<S, C>
where
    S: Persistence + Clone,
    C: MenuCatalog,
{
    /// Creates a settlement service over the same store as `orders`.
    pub fn new(orders: OrderService<S, C>) -> Self {
        let store = orders.orders().store().clone();
        Self {
            runs: CommandHandler::new(store.clone()),
            store,
            orders,
        }
    }

    pub fn orders(&self) -> &OrderService<S, C> {
        &self.orders
    }

    /// Records payment for one order and frees its table if it was the
    /// last open order there. A paid order is left untouched.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn settle_order(
        &self,
        order_number: &OrderNumber,
        method: PaymentMethod,
        actor: Actor,
    ) -> Result<CommandResult<Order>> {
        let order_id = self.orders.order_id_for(order_number).await?;

        let result = self
            .orders
            .commit_with_table(order_id, |order| order.settle(method, actor.id, None))
            .await?;

        metrics::counter!("orders_settled_total", "method" => method.as_str()).increment(1);
        tracing::info!(
            %order_id,
            amount = %result.aggregate.total_amount(),
            "order settled"
        );
        Ok(result)
    }

    /// Settles every open order on a table with one payment method, then
    /// releases the table.
    ///
    /// Orders are settled one at a time. If one fails, the run stops with
    /// [`SettlementError::PartiallySettled`]; orders settled before it stay
    /// paid. Orders paid or cancelled concurrently are skipped.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn settle_table(
        &self,
        table_id: AggregateId,
        method: PaymentMethod,
        actor: Actor,
    ) -> Result<SettlementSummary> {
        let table = self
            .orders
            .tables()
            .load_existing(table_id)
            .await?
            .filter(|table| !table.is_removed())
            .ok_or_else(|| DomainError::not_found("table", table_id))?;

        let mut open = Vec::new();
        for order_id in table.open_orders() {
            if let Some(order) = self.orders.get_order(*order_id).await?
                && order.is_open()
            {
                open.push(order);
            }
        }
        open.sort_by(|a, b| a.order_number().cmp(&b.order_number()));
        let planned = open
            .iter()
            .filter_map(|order| order.order_number().cloned())
            .collect();

        let run_id = AggregateId::new();
        let mut run = SettlementRun::default();
        let events = run.start(run_id, table_id, method, planned, actor.id)?;
        self.record(run_id, &mut run, events).await?;
        metrics::counter!("table_settlements_total").increment(1);

        let mut settled = Vec::new();
        for order in &open {
            let (Some(order_id), Some(number)) = (order.id(), order.order_number().cloned())
            else {
                continue;
            };

            let outcome = self
                .orders
                .commit_with_table(order_id, |order| {
                    order.settle(method, actor.id, Some(run_id))
                })
                .await;

            let events = match outcome {
                Ok(result) => {
                    metrics::counter!("orders_settled_total", "method" => method.as_str())
                        .increment(1);
                    settled.push(number.clone());
                    run.record_settled(number, result.aggregate.total_amount())?
                }
                Err(DomainError::Order(OrderError::AlreadyPaid { .. })) => {
                    tracing::info!(%run_id, order_number = %number, "already paid, skipping");
                    run.record_skipped(number, "already paid")?
                }
                Err(DomainError::Order(OrderError::NotActive {
                    status: OrderStatus::Cancelled,
                    ..
                })) => {
                    tracing::info!(%run_id, order_number = %number, "cancelled, skipping");
                    run.record_skipped(number, "cancelled")?
                }
                Err(e) => {
                    let events = run.abort(number.clone(), e.to_string())?;
                    if let Err(record) = self.record(run_id, &mut run, events).await {
                        tracing::warn!(%run_id, error = %record, "abort not recorded");
                    }
                    return Err(self.stopped(run_id, table_id, settled, Some(number), e.into()));
                }
            };
            if let Err(e) = self.record(run_id, &mut run, events).await {
                return Err(self.stopped(run_id, table_id, settled, None, e));
            }
        }

        if let Err(e) = self.release_if_vacant(table_id).await {
            return Err(self.stopped(run_id, table_id, settled, None, e));
        }
        let events = run.complete()?;
        if let Err(e) = self.record(run_id, &mut run, events).await {
            return Err(self.stopped(run_id, table_id, settled, None, e));
        }

        tracing::info!(
            %run_id,
            %table_id,
            settled = settled.len(),
            total = %run.total(),
            "table settled"
        );
        Ok(SettlementSummary {
            run_id,
            table_id,
            settled,
            skipped: run.skipped().to_vec(),
            total: run.total(),
        })
    }

    /// Wraps an error raised once the run has started. Anything after a
    /// payment went through, or a failure to settle an order, is a partial
    /// settlement; otherwise the error is returned as is.
    fn stopped(
        &self,
        run_id: AggregateId,
        table_id: AggregateId,
        settled: Vec<OrderNumber>,
        failed: Option<OrderNumber>,
        error: SettlementError,
    ) -> SettlementError {
        if settled.is_empty() && failed.is_none() {
            return error;
        }

        metrics::counter!("table_settlement_failures_total").increment(1);
        tracing::warn!(
            %run_id,
            %table_id,
            failed = ?failed,
            settled = settled.len(),
            %error,
            "table settlement stopped"
        );
        SettlementError::PartiallySettled {
            run_id,
            settled,
            failed,
            source: Box::new(error),
        }
    }

    /// Loads a settlement run by id.
    pub async fn get_run(&self, run_id: AggregateId) -> Result<Option<SettlementRun>> {
        Ok(self.runs.load_existing(run_id).await?)
    }

    /// Frees the table if no open order is left on it. Retried when the
    /// table stream moves underneath.
    async fn release_if_vacant(&self, table_id: AggregateId) -> Result<()> {
        let max_retries = self.orders.retry_policy().max_conflict_retries;
        let mut retries = 0;
        loop {
            match self
                .orders
                .tables()
                .execute(table_id, |table| table.release_if_vacant())
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict_on(table_id) && retries < max_retries => retries += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Appends run events and folds them into `run`.
    async fn record(
        &self,
        run_id: AggregateId,
        run: &mut SettlementRun,
        events: Vec<SettlementEvent>,
    ) -> Result<()> {
        let current = run.version();
        let mut version = current;
        let mut envelopes = Vec::with_capacity(events.len());
        for event in &events {
            version = version.next();
            envelopes.push(EventEnvelope::for_event(
                run_id,
                SettlementRun::aggregate_type(),
                event.event_type(),
                version,
                event,
            )?);
        }

        let options = if current == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(current)
        };
        self.store.append(envelopes, options).await?;

        run.apply_events(events);
        run.set_version(version);
        Ok(())
    }
}
