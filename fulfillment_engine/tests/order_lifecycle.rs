mod support;

use fulfillment_engine::{
    db_types::{Actor, OrderStatusType, PaymentStatus, SettlementType},
    events::EventProducers,
    matching::{geo::Coordinates, DeliveryPricing, MatchError, MatchRequest, VendorMatcher},
    traits::{FulfillmentDatabase, FulfillmentDbError},
    OrderFlowApi,
    OrderFlowError,
};
use sfg_common::Rial;
use support::{cod_terms, in_zone_terms, new_test_db, place_request, seed_customer, seed_vendor};

#[tokio::test]
async fn placed_order_recomputes_totals_and_appends_history() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let order = api.place_order(place_request("ord-1", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    assert_eq!(order.status, OrderStatusType::Placed);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.subtotal, Rial::from(500_000));
    assert_eq!(order.delivery_fee, Rial::from(0));
    assert_eq!(order.total_price, Rial::from(500_000));
    assert_eq!(order.total_price, order.subtotal + order.delivery_fee);

    let items = db.fetch_order_items(&order).await.expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, Rial::from(250_000));
    assert_eq!(items[0].quantity, 2);

    let history = api.history_for_order(&order.order_id).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OrderStatusType::Placed);
}

#[tokio::test]
async fn cod_orders_carry_the_courier_fee_and_skip_online_payment() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let order = api.place_order(place_request("ord-2", "cust-1", "vend-1", cod_terms())).await.expect("placed");
    assert_eq!(order.settlement, SettlementType::Cod);
    assert_eq!(order.payment_status, PaymentStatus::None);
    assert_eq!(order.total_price, Rial::from(750_000));
    assert_eq!(order.pricing.estimated_fee, Rial::from(250_000));
}

#[tokio::test]
async fn empty_cart_is_rejected_before_any_mutation() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let mut request = place_request("ord-3", "cust-1", "vend-1", in_zone_terms());
    request.items.clear();
    let err = api.place_order(request).await.expect_err("empty cart");
    assert!(matches!(err, OrderFlowError::ValidationError(_)));
    assert!(db.fetch_order_by_order_id(&"ord-3".parse().unwrap()).await.expect("query").is_none());
}

#[tokio::test]
async fn duplicate_order_ids_are_rejected() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    api.place_order(place_request("ord-4", "cust-1", "vend-1", in_zone_terms())).await.expect("first");
    let err = api.place_order(place_request("ord-4", "cust-1", "vend-1", in_zone_terms())).await.expect_err("dup");
    assert!(matches!(err, OrderFlowError::DatabaseError(FulfillmentDbError::OrderAlreadyExists(_))));
}

#[tokio::test]
async fn full_happy_path_reaches_delivered() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.place_order(place_request("ord-5", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    let oid = order.order_id.clone();

    let vendor = Actor::vendor("vend-1");
    let admin = Actor::admin("ops-1");
    let steps = [
        (OrderStatusType::VendorAccepted, &vendor),
        (OrderStatusType::Preparing, &vendor),
        (OrderStatusType::Ready, &vendor),
        (OrderStatusType::CourierAssigned, &admin),
        (OrderStatusType::OutForDelivery, &admin),
        (OrderStatusType::Delivered, &vendor),
    ];
    for (next, actor) in steps {
        let updated = api.transition(&oid, next, None, actor).await.expect("legal transition");
        assert_eq!(updated.status, next);
    }

    let history = api.history_for_order(&oid).await.expect("history");
    assert_eq!(history.len(), 7);
    assert_eq!(history.last().unwrap().status, OrderStatusType::Delivered);
}

#[tokio::test]
async fn unlisted_transitions_leave_the_order_untouched() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.place_order(place_request("ord-6", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    let admin = Actor::admin("ops-1");

    // PLACED -> PREPARING skips VENDOR_ACCEPTED and is not in the table, even for an admin.
    let err = api.transition(&order.order_id, OrderStatusType::Preparing, None, &admin).await.expect_err("illegal");
    assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));

    let unchanged = api.fetch_order(&order.order_id).await.expect("fetch").expect("exists");
    assert_eq!(unchanged.status, OrderStatusType::Placed);
    assert_eq!(api.history_for_order(&order.order_id).await.expect("history").len(), 1);
}

#[tokio::test]
async fn terminal_states_accept_nothing_further() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.place_order(place_request("ord-7", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    let admin = Actor::admin("ops-1");
    api.transition(&order.order_id, OrderStatusType::Cancelled, None, &admin).await.expect("cancel");
    let err =
        api.transition(&order.order_id, OrderStatusType::VendorAccepted, None, &admin).await.expect_err("terminal");
    assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn customers_can_cancel_only_while_pending() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let customer = Actor::customer("cust-1");

    let order = api.place_order(place_request("ord-8", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    let cancelled =
        api.transition(&order.order_id, OrderStatusType::Cancelled, Some("changed my mind".to_string()), &customer)
            .await
            .expect("customer cancel while PLACED");
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);

    let order = api.place_order(place_request("ord-9", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    api.transition(&order.order_id, OrderStatusType::VendorAccepted, None, &Actor::vendor("vend-1"))
        .await
        .expect("accept");
    let err = api
        .transition(&order.order_id, OrderStatusType::Cancelled, None, &customer)
        .await
        .expect_err("vendor already committed");
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn vendors_cannot_move_orders_they_do_not_own() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.place_order(place_request("ord-10", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    let err = api
        .transition(&order.order_id, OrderStatusType::VendorAccepted, None, &Actor::vendor("vend-2"))
        .await
        .expect_err("foreign vendor");
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn transitions_on_missing_orders_report_not_found() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db, EventProducers::default());
    let err = api
        .transition(&"ghost".parse().unwrap(), OrderStatusType::Cancelled, None, &Actor::admin("ops-1"))
        .await
        .expect_err("missing");
    assert!(matches!(err, OrderFlowError::OrderNotFound(_)));
}

#[tokio::test]
async fn order_reads_are_scoped_to_the_owning_customer() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.place_order(place_request("ord-11", "cust-1", "vend-1", in_zone_terms())).await.expect("placed");

    assert!(api.order_for_customer(&order.order_id, "cust-1").await.expect("query").is_some());
    assert!(api.order_for_customer(&order.order_id, "cust-2").await.expect("query").is_none());
    assert_eq!(api.orders_for_customer("cust-1").await.expect("list").len(), 1);
}

//--------------------------------------   VendorMatcher       -------------------------------------------------------

fn matcher_pricing() -> DeliveryPricing {
    DeliveryPricing {
        internal_fee: Rial::from(0),
        base_fee: Rial::from(100_000),
        per_km_rate: Rial::from(12_500),
        peak_multiplier: 1.0,
        max_distance_km: 30.0,
    }
}

fn in_zone_request() -> MatchRequest {
    MatchRequest {
        location: Coordinates::new(35.70, 51.40),
        settlement: SettlementType::Prepaid,
        cod_confirmed: false,
    }
}

#[tokio::test]
async fn vendor_at_daily_cap_rejects_further_orders() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-cap", Some(2)).await;
    seed_customer(&db, "cust-1").await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let matcher = VendorMatcher::new(db.clone(), matcher_pricing());
    let vendor = db.fetch_vendor("vend-cap").await.expect("query").expect("seeded");

    for n in 0..2 {
        matcher.match_vendor(&vendor, &in_zone_request()).await.expect("capacity available");
        api.place_order(place_request(&format!("cap-{n}"), "cust-1", "vend-cap", in_zone_terms()))
            .await
            .expect("placed");
    }
    let err = matcher.match_vendor(&vendor, &in_zone_request()).await.expect_err("at cap");
    assert!(matches!(err, MatchError::CapacityExceeded(_)));

    // Cancelled orders do not count against the cap.
    api.transition(&"cap-0".parse().unwrap(), OrderStatusType::Cancelled, None, &Actor::admin("ops-1"))
        .await
        .expect("cancel");
    matcher.match_vendor(&vendor, &in_zone_request()).await.expect("capacity freed");
}

#[tokio::test]
async fn inactive_vendors_never_match() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-off", None).await;
    let mut vendor = db.fetch_vendor("vend-off").await.expect("query").expect("seeded");
    vendor.is_active = false;
    db.upsert_vendor(&vendor).await.expect("update");
    let vendor = db.fetch_vendor("vend-off").await.expect("query").expect("seeded");

    let matcher = VendorMatcher::new(db, matcher_pricing());
    let err = matcher.match_vendor(&vendor, &in_zone_request()).await.expect_err("inactive");
    assert!(matches!(err, MatchError::VendorInactive(_)));
}

#[tokio::test]
async fn out_of_zone_needs_cod_confirmation_and_forces_cod() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    let vendor = db.fetch_vendor("vend-1").await.expect("query").expect("seeded");
    let matcher = VendorMatcher::new(db, matcher_pricing());

    // ~14.5 km east of the vendor: outside the 5 km radius, inside the 30 km ceiling.
    let mut request = MatchRequest {
        location: Coordinates::new(35.6892, 51.55),
        settlement: SettlementType::Prepaid,
        cod_confirmed: false,
    };
    let err = matcher.match_vendor(&vendor, &request).await.expect_err("needs confirmation");
    assert!(matches!(err, MatchError::CodConfirmationRequired));

    request.cod_confirmed = true;
    let terms = matcher.match_vendor(&vendor, &request).await.expect("confirmed");
    assert_eq!(terms.settlement, SettlementType::Cod);
    assert!(terms.delivery_fee > Rial::from(0));
    assert_eq!(terms.pricing.estimated_fee, terms.delivery_fee);
}

#[tokio::test]
async fn addresses_beyond_the_ceiling_are_out_of_service_area() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    let vendor = db.fetch_vendor("vend-1").await.expect("query").expect("seeded");
    let matcher = VendorMatcher::new(db, matcher_pricing());
    let request = MatchRequest {
        location: Coordinates::new(35.8400, 50.9391),
        settlement: SettlementType::Prepaid,
        cod_confirmed: true,
    };
    let err = matcher.match_vendor(&vendor, &request).await.expect_err("too far");
    assert!(matches!(err, MatchError::OutOfServiceArea { .. }));
}
