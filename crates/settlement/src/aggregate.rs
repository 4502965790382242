//! Settlement run aggregate.

use common::{ActorId, AggregateId};
use domain::{Aggregate, Money, OrderNumber, PaymentMethod};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::events::SettlementEvent;
use crate::state::SettlementState;

/// An event-sourced record of one table settlement.
///
/// Keeps the orders the run set out to settle and what happened to each.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementRun {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    table_id: Option<AggregateId>,
    method: Option<PaymentMethod>,
    started_by: Option<ActorId>,
    state: SettlementState,
    planned: Vec<OrderNumber>,
    settled: Vec<OrderNumber>,
    skipped: Vec<OrderNumber>,
    total: Money,
    failed: Option<OrderNumber>,
    failure_reason: Option<String>,
}

impl Aggregate for SettlementRun {
    type Event = SettlementEvent;
    type Error = SettlementError;

    fn aggregate_type() -> &'static str {
        "SettlementRun"
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
            SettlementEvent::SettlementStarted(data) => {
                self.id = Some(data.run_id);
                self.table_id = Some(data.table_id);
                self.method = Some(data.method);
                self.started_by = Some(data.started_by);
                self.planned = data.orders;
                self.state = SettlementState::Running;
            }
            SettlementEvent::OrderSettled(data) => {
                self.total += data.amount;
                self.settled.push(data.order_number);
            }
            SettlementEvent::OrderSkipped(data) => {
                self.skipped.push(data.order_number);
            }
            SettlementEvent::SettlementCompleted(_) => {
                self.state = SettlementState::Completed;
            }
            SettlementEvent::SettlementAborted(data) => {
                self.state = SettlementState::PartiallyFailed;
                self.failed = Some(data.failed);
                self.failure_reason = Some(data.reason);
            }
        }
    }
}

// Query methods
impl SettlementRun {
    pub fn state(&self) -> SettlementState {
        self.state
    }

    pub fn table_id(&self) -> Option<AggregateId> {
        self.table_id
    }

    pub fn method(&self) -> Option<PaymentMethod> {
        self.method
    }

    pub fn started_by(&self) -> Option<ActorId> {
        self.started_by
    }

    /// Orders that were open when the run started.
    pub fn planned(&self) -> &[OrderNumber] {
        &self.planned
    }

    pub fn settled(&self) -> &[OrderNumber] {
        &self.settled
    }

    pub fn skipped(&self) -> &[OrderNumber] {
        &self.skipped
    }

    /// Sum charged by this run.
    pub fn total(&self) -> Money {
        self.total
    }

    pub fn failed(&self) -> Option<&OrderNumber> {
        self.failed.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

// Command methods (return events)
impl SettlementRun {
    pub fn start(
        &self,
        run_id: AggregateId,
        table_id: AggregateId,
        method: PaymentMethod,
        orders: Vec<OrderNumber>,
        actor: ActorId,
    ) -> Result<Vec<SettlementEvent>, SettlementError> {
        if !self.state.can_start() {
            return Err(self.invalid("start"));
        }
        Ok(vec![SettlementEvent::settlement_started(
            run_id, table_id, method, orders, actor,
        )])
    }

    pub fn record_settled(
        &self,
        order_number: OrderNumber,
        amount: Money,
    ) -> Result<Vec<SettlementEvent>, SettlementError> {
        if !self.state.is_running() {
            return Err(self.invalid("record a settled order"));
        }
        Ok(vec![SettlementEvent::order_settled(order_number, amount)])
    }

    pub fn record_skipped(
        &self,
        order_number: OrderNumber,
        reason: impl Into<String>,
    ) -> Result<Vec<SettlementEvent>, SettlementError> {
        if !self.state.is_running() {
            return Err(self.invalid("record a skipped order"));
        }
        Ok(vec![SettlementEvent::order_skipped(order_number, reason)])
    }

    pub fn complete(&self) -> Result<Vec<SettlementEvent>, SettlementError> {
        if !self.state.is_running() {
            return Err(self.invalid("complete"));
        }
        Ok(vec![SettlementEvent::settlement_completed(
            self.settled.len(),
            self.total,
        )])
    }

    pub fn abort(
        &self,
        failed: OrderNumber,
        reason: impl Into<String>,
    ) -> Result<Vec<SettlementEvent>, SettlementError> {
        if !self.state.is_running() {
            return Err(self.invalid("abort"));
        }
        Ok(vec![SettlementEvent::settlement_aborted(failed, reason)])
    }

    fn invalid(&self, action: &'static str) -> SettlementError {
        SettlementError::InvalidState {
            state: self.state,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(orders: &[i64]) -> SettlementRun {
        let mut run = SettlementRun::default();
        let events = run
            .start(
                AggregateId::new(),
                AggregateId::new(),
                PaymentMethod::Card,
                orders.iter().map(|n| OrderNumber::from_sequence(*n)).collect(),
                ActorId::new(),
            )
            .unwrap();
        run.apply_events(events);
        run
    }

    #[test]
    fn test_default_run() {
        let run = SettlementRun::default();
        assert!(run.id().is_none());
        assert_eq!(run.state(), SettlementState::NotStarted);
        assert!(run.record_settled(OrderNumber::from_sequence(1), Money::zero()).is_err());
    }

    #[test]
    fn test_completed_run_totals() {
        let mut run = started(&[1, 2, 3]);
        assert_eq!(run.state(), SettlementState::Running);
        assert_eq!(run.planned().len(), 3);

        let events = run
            .record_settled(OrderNumber::from_sequence(1), Money::new(90000))
            .unwrap();
        run.apply_events(events);
        let events = run
            .record_skipped(OrderNumber::from_sequence(2), "already paid")
            .unwrap();
        run.apply_events(events);
        let events = run
            .record_settled(OrderNumber::from_sequence(3), Money::new(30000))
            .unwrap();
        run.apply_events(events);

        let events = run.complete().unwrap();
        assert!(matches!(
            &events[0],
            SettlementEvent::SettlementCompleted(data) if data.settled_count == 2
        ));
        run.apply_events(events);

        assert_eq!(run.state(), SettlementState::Completed);
        assert_eq!(run.total(), Money::new(120000));
        assert_eq!(run.skipped(), [OrderNumber::from_sequence(2)]);
        assert_eq!(run.method(), Some(PaymentMethod::Card));
    }

    #[test]
    fn test_aborted_run_keeps_settled_orders() {
        let mut run = started(&[1, 2]);
        let events = run
            .record_settled(OrderNumber::from_sequence(1), Money::new(45000))
            .unwrap();
        run.apply_events(events);
        let events = run
            .abort(OrderNumber::from_sequence(2), "store unavailable")
            .unwrap();
        run.apply_events(events);

        assert_eq!(run.state(), SettlementState::PartiallyFailed);
        assert_eq!(run.settled(), [OrderNumber::from_sequence(1)]);
        assert_eq!(run.failed(), Some(&OrderNumber::from_sequence(2)));
        assert_eq!(run.failure_reason(), Some("store unavailable"));
    }

    #[test]
    fn test_terminal_run_rejects_events() {
        let mut run = started(&[]);
        let events = run.complete().unwrap();
        run.apply_events(events);

        assert!(matches!(
            run.complete(),
            Err(SettlementError::InvalidState { action: "complete", .. })
        ));
        assert!(run.abort(OrderNumber::from_sequence(1), "late").is_err());
        assert!(run.start(AggregateId::new(), AggregateId::new(), PaymentMethod::Cash, vec![], ActorId::new()).is_err());
    }
}
