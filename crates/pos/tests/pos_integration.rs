//! End-to-end runs of the assembled service on the in-memory store.

use common::Actor;
use domain::{
    Aggregate, CancelOrder, CreateOrder, ErrorKind, ItemStatus, LineItemId, Money, OrderNumber,
    OrderStatus, PaymentMethod, RequestedItem, SetItemStatus, TableNumber, TableStatus,
};
use event_store::InMemoryEventStore;
use pos::{Config, Pos, PosError, Seed};
use projections::HistoryFilter;

const SEED: &str = r#"{
    "tables": [
        { "tableNumber": "T1", "capacity": 4 },
        { "tableNumber": "T2", "capacity": 2 }
    ],
    "menu": [
        { "id": "latte", "name": "Latte", "price": 45000 },
        { "id": "espresso", "name": "Espresso", "price": 30000 },
        { "id": "affogato", "name": "Affogato", "price": 60000, "available": false }
    ]
}"#;

async fn seeded() -> Pos<InMemoryEventStore> {
    let pos = Pos::from_config(InMemoryEventStore::new(), &Config::default());
    pos.seed(Seed::from_json(SEED).unwrap()).await.unwrap();
    pos
}

async fn table_id(pos: &Pos<InMemoryEventStore>, number: &str) -> common::AggregateId {
    pos.tables()
        .find_by_number(&TableNumber::new(number))
        .await
        .unwrap()
        .unwrap()
        .id()
        .unwrap()
}

async fn order(pos: &Pos<InMemoryEventStore>, table: &str, items: Vec<RequestedItem>) -> OrderNumber {
    let table_id = table_id(pos, table).await;
    pos.orders()
        .create_order(CreateOrder::new(table_id, Actor::staff(), items))
        .await
        .unwrap()
        .aggregate
        .order_number()
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn seeded_floor_is_available() {
    let pos = seeded().await;
    pos.refresh_views().await.unwrap();

    let floor = pos.floor_plan().tables().await;
    assert_eq!(floor.len(), 2);
    assert!(floor.iter().all(|t| t.status == TableStatus::Available));
    assert_eq!(pos.catalog().len().await, 3);
}

#[tokio::test]
async fn unavailable_menu_item_is_refused() {
    let pos = seeded().await;
    let t1 = table_id(&pos, "T1").await;

    let err = pos
        .orders()
        .create_order(CreateOrder::new(
            t1,
            Actor::staff(),
            vec![RequestedItem::new("affogato", 1)],
        ))
        .await
        .unwrap_err();

    assert_eq!(PosError::from(err).kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn service_day_reaches_every_view() {
    let pos = seeded().await;
    let t1 = table_id(&pos, "T1").await;

    let first = order(&pos, "T1", vec![RequestedItem::new("latte", 2)]).await;
    let second = order(&pos, "T1", vec![RequestedItem::new("espresso", 1)]).await;
    let third = order(&pos, "T2", vec![RequestedItem::new("latte", 1)]).await;
    assert_eq!(first.as_str(), "OD000001");

    for status in [ItemStatus::Preparing, ItemStatus::Ready, ItemStatus::Served] {
        pos.orders()
            .set_item_status(SetItemStatus::new(
                first.clone(),
                LineItemId::first(),
                status,
                Actor::barista(),
            ))
            .await
            .unwrap();
    }
    pos.orders()
        .cancel_order(CancelOrder::new(third.clone(), "spilled", Actor::staff()))
        .await
        .unwrap();
    pos.refresh_views().await.unwrap();

    let queue: Vec<_> = pos
        .active_orders()
        .kitchen_queue()
        .await
        .into_iter()
        .map(|o| o.order_number)
        .collect();
    assert_eq!(queue, vec![second.clone()]);
    assert_eq!(
        pos.floor_plan().with_status(TableStatus::Occupied).await.len(),
        1
    );

    let summary = pos
        .settlement()
        .settle_table(t1, PaymentMethod::Transfer, Actor::staff())
        .await
        .unwrap();
    assert_eq!(summary.settled, vec![first, second]);
    assert_eq!(summary.total, Money::new(120000));

    pos.refresh_views().await.unwrap();
    assert!(pos.active_orders().all().await.is_empty());
    assert_eq!(
        pos.floor_plan().with_status(TableStatus::Available).await.len(),
        2
    );

    let history = pos.order_history();
    assert_eq!(history.query(&HistoryFilter::new()).await.len(), 3);
    assert_eq!(
        history
            .query(&HistoryFilter::new().status(OrderStatus::Cancelled))
            .await
            .len(),
        1
    );
    assert_eq!(history.revenue(&HistoryFilter::new()).await, Money::new(120000));
}

#[tokio::test]
async fn rebuilt_views_match_incremental_ones() {
    let pos = seeded().await;
    order(&pos, "T1", vec![RequestedItem::new("latte", 1)]).await;
    order(&pos, "T2", vec![RequestedItem::new("espresso", 3)]).await;
    pos.refresh_views().await.unwrap();
    let floor = pos.floor_plan().tables().await;

    let events = pos.rebuild_views().await.unwrap();

    assert!(events > 0);
    assert_eq!(pos.floor_plan().tables().await, floor);
    assert_eq!(pos.active_orders().all().await.len(), 2);
}

#[tokio::test]
async fn reseeding_keeps_existing_tables() {
    let pos = seeded().await;
    let report = pos.seed(Seed::from_json(SEED).unwrap()).await.unwrap();

    assert_eq!(report.tables_registered, 0);
    assert_eq!(report.tables_existing, 2);
    assert_eq!(pos.tables().list_tables().await.unwrap().len(), 2);
}

#[tokio::test]
async fn retry_limit_comes_from_config() {
    let config = Config {
        max_conflict_retries: 7,
        ..Config::default()
    };
    let pos = Pos::from_config(InMemoryEventStore::new(), &config);
    assert_eq!(pos.orders().retry_policy().max_conflict_retries, 7);
}
