//! Settlement run events.

use chrono::{DateTime, Utc};
use common::{ActorId, AggregateId};
use domain::{DomainEvent, Money, OrderNumber, PaymentMethod};
use serde::{Deserialize, Serialize};

/// Events recorded while settling a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SettlementEvent {
    /// A bulk settlement started for the listed orders.
    SettlementStarted(SettlementStartedData),

    /// One order was paid as part of the run.
    OrderSettled(OrderSettledData),

    /// One order was already paid by someone else; nothing was charged.
    OrderSkipped(OrderSkippedData),

    /// Every listed order was settled or skipped.
    SettlementCompleted(SettlementCompletedData),

    /// An order could not be settled; the run stopped there.
    SettlementAborted(SettlementAbortedData),
}

impl DomainEvent for SettlementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SettlementEvent::SettlementStarted(_) => "SettlementStarted",
            SettlementEvent::OrderSettled(_) => "SettlementOrderSettled",
            SettlementEvent::OrderSkipped(_) => "SettlementOrderSkipped",
            SettlementEvent::SettlementCompleted(_) => "SettlementCompleted",
            SettlementEvent::SettlementAborted(_) => "SettlementAborted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementStartedData {
    pub run_id: AggregateId,
    pub table_id: AggregateId,
    pub method: PaymentMethod,
    pub orders: Vec<OrderNumber>,
    pub started_by: ActorId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettledData {
    pub order_number: OrderNumber,
    pub amount: Money,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSkippedData {
    pub order_number: OrderNumber,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCompletedData {
    pub settled_count: usize,
    pub total: Money,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementAbortedData {
    pub failed: OrderNumber,
    pub reason: String,
    pub aborted_at: DateTime<Utc>,
}

// Convenience constructors
impl SettlementEvent {
    pub fn settlement_started(
        run_id: AggregateId,
        table_id: AggregateId,
        method: PaymentMethod,
        orders: Vec<OrderNumber>,
        started_by: ActorId,
    ) -> Self {
        SettlementEvent::SettlementStarted(SettlementStartedData {
            run_id,
            table_id,
            method,
            orders,
            started_by,
            started_at: Utc::now(),
        })
    }

    pub fn order_settled(order_number: OrderNumber, amount: Money) -> Self {
        SettlementEvent::OrderSettled(OrderSettledData {
            order_number,
            amount,
            settled_at: Utc::now(),
        })
    }

    pub fn order_skipped(order_number: OrderNumber, reason: impl Into<String>) -> Self {
        SettlementEvent::OrderSkipped(OrderSkippedData {
            order_number,
            reason: reason.into(),
        })
    }

    pub fn settlement_completed(settled_count: usize, total: Money) -> Self {
        SettlementEvent::SettlementCompleted(SettlementCompletedData {
            settled_count,
            total,
            completed_at: Utc::now(),
        })
    }

    pub fn settlement_aborted(failed: OrderNumber, reason: impl Into<String>) -> Self {
        SettlementEvent::SettlementAborted(SettlementAbortedData {
            failed,
            reason: reason.into(),
            aborted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        let number = OrderNumber::from_sequence(1);
        assert_eq!(
            SettlementEvent::settlement_started(
                AggregateId::new(),
                AggregateId::new(),
                PaymentMethod::Cash,
                vec![],
                ActorId::new(),
            )
            .event_type(),
            "SettlementStarted"
        );
        assert_eq!(
            SettlementEvent::order_settled(number.clone(), Money::new(1)).event_type(),
            "SettlementOrderSettled"
        );
        assert_eq!(
            SettlementEvent::order_skipped(number.clone(), "paid").event_type(),
            "SettlementOrderSkipped"
        );
        assert_eq!(
            SettlementEvent::settlement_completed(1, Money::new(1)).event_type(),
            "SettlementCompleted"
        );
        assert_eq!(
            SettlementEvent::settlement_aborted(number, "boom").event_type(),
            "SettlementAborted"
        );
    }

    #[test]
    fn test_serialization_shape() {
        let event = SettlementEvent::order_settled(OrderNumber::from_sequence(7), Money::new(90000));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderSettled");
        assert_eq!(json["data"]["order_number"], "OD000007");
        assert_eq!(json["data"]["amount"], 90000);

        let back: SettlementEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, SettlementEvent::OrderSettled(_)));
    }
}
