mod support;

use std::time::Duration;

use fulfillment_engine::{
    db_types::{Correlation, NotificationStatus},
    dispatcher::{dispatch_channel, DispatcherConfig, NotificationOrchestrator},
    events::EventProducers,
    traits::{ChatTarget, FulfillmentDatabase},
    OrderFlowApi,
    SqliteDatabase,
};
use support::{in_zone_terms, new_test_db, place_request, seed_customer, seed_vendor, ScriptedChannel};

fn fast_config() -> DispatcherConfig {
    DispatcherConfig { queue_depth: 32, concurrency: 5, max_attempts: 5, backoff_base: Duration::from_millis(1) }
}

type TestDispatcher =
    fulfillment_engine::dispatcher::NotificationDispatcher<SqliteDatabase, ScriptedChannel, ScriptedChannel>;

async fn drained(dispatcher: TestDispatcher, worker: tokio::task::JoinHandle<()>) {
    drop(dispatcher);
    worker.await.expect("worker completed");
}

#[tokio::test]
async fn records_are_written_ahead_and_marked_sent() {
    let db = new_test_db().await;
    let channel = ScriptedChannel::default();
    let (dispatcher, worker) = dispatch_channel(db.clone(), channel.clone(), channel.clone(), fast_config());
    let worker = tokio::spawn(worker.run());

    let record_id = dispatcher
        .send_sms("09120000000", "Your order has been placed.", Correlation::default())
        .await
        .expect("record created");
    drained(dispatcher, worker).await;

    let record = db.fetch_notification(record_id).await.expect("query").expect("exists");
    assert_eq!(record.status, NotificationStatus::Sent);
    assert_eq!(record.attempts, 1);
    assert!(record.last_error.is_none());
    assert!(record.provider_message_id.is_some());
    assert_eq!(channel.calls(), 1);
    assert!(db.fetch_dead_letters().await.expect("query").is_empty());
}

#[tokio::test]
async fn transient_failures_are_retried_until_delivery() {
    let db = new_test_db().await;
    let channel = ScriptedChannel::failing_first(2);
    let (dispatcher, worker) = dispatch_channel(db.clone(), channel.clone(), channel.clone(), fast_config());
    let worker = tokio::spawn(worker.run());

    let record_id = dispatcher
        .send_chat("chat-42", "Vendor accepted your order.", ChatTarget::Customer, Correlation::default())
        .await
        .expect("record created");
    drained(dispatcher, worker).await;

    let record = db.fetch_notification(record_id).await.expect("query").expect("exists");
    assert_eq!(record.status, NotificationStatus::Sent);
    assert_eq!(record.attempts, 3);
    assert!(record.last_error.is_none());
    assert!(db.fetch_dead_letters().await.expect("query").is_empty());
}

#[tokio::test]
async fn exhausted_retries_land_in_the_dead_letter_store() {
    let db = new_test_db().await;
    let channel = ScriptedChannel::failing_first(u32::MAX);
    let (dispatcher, worker) = dispatch_channel(db.clone(), channel.clone(), channel.clone(), fast_config());
    let worker = tokio::spawn(worker.run());

    let record_id = dispatcher
        .send_sms("09120000000", "Your order has been delivered.", Correlation::default())
        .await
        .expect("record created");
    drained(dispatcher, worker).await;

    let record = db.fetch_notification(record_id).await.expect("query").expect("exists");
    assert_eq!(record.status, NotificationStatus::Failed);
    assert_eq!(record.attempts, 5);
    assert!(record.last_error.is_some());
    assert_eq!(channel.calls(), 5);

    let dead = db.fetch_dead_letters().await.expect("query");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].notification_id, record_id);
    // The original payload travels with the dead letter for operator inspection.
    assert_eq!(dead[0].message, "Your order has been delivered.");
    assert_eq!(dead[0].recipient, "09120000000");
    assert!(dead[0].reason.contains("timed out"));
}

#[tokio::test]
async fn a_dead_queue_falls_back_to_synchronous_delivery() {
    let db = new_test_db().await;
    let channel = ScriptedChannel::default();
    let (dispatcher, worker) = dispatch_channel(db.clone(), channel.clone(), channel.clone(), fast_config());
    // Nobody is draining the queue: drop the consumer half so enqueues fail immediately.
    drop(worker);

    let record_id = dispatcher
        .send_sms("09120000000", "Payment confirmed.", Correlation::default())
        .await
        .expect("record created");

    let record = db.fetch_notification(record_id).await.expect("query").expect("exists");
    assert_eq!(record.status, NotificationStatus::Sent);
    assert_eq!(record.attempts, 1);
    assert_eq!(channel.calls(), 1);
}

#[tokio::test]
async fn orchestrator_notifies_customer_and_vendor_on_order_created() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = flow.place_order(place_request("note-1", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");

    let channel = ScriptedChannel::default();
    let (dispatcher, worker) = dispatch_channel(db.clone(), channel.clone(), channel.clone(), fast_config());
    let worker = tokio::spawn(worker.run());
    let orchestrator = NotificationOrchestrator::new(db.clone(), dispatcher);
    orchestrator.on_order_created(&order).await;
    drop(orchestrator);
    worker.await.expect("worker completed");

    // Customer chat + customer SMS + vendor chat.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE order_id = $1")
        .bind(&order.order_id)
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(count, 3);
    assert_eq!(channel.calls(), 3);

    let sent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE order_id = $1 AND status = 'SENT'")
        .bind(&order.order_id)
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(sent, 3);
}
