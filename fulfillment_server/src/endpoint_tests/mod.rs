//! HTTP-level tests: auth extraction, role gates, and the transport-side protections on the webhook routes.
//! Business behaviour is covered by the engine's own suite; these tests only prove the wiring.
use actix_web::{http::StatusCode, test, web, App};
use serde_json::json;

use fulfillment_engine::{
    db_types::{ActorType, Customer, Vendor},
    events::EventProducers,
    helpers::{calculate_hmac, RateLimiter},
    matching::{DeliveryPricing, VendorMatcher},
    test_utils::{prepare_test_db, random_db_path},
    OrderFlowApi,
    PaymentsApi,
    SqliteDatabase,
};
use provider_tools::{ZibalApi, ZibalConfig};
use sfg_common::Secret;

use crate::{
    auth::{TokenIssuer, DEFAULT_TOKEN_VALIDITY},
    config::{AuthConfig, ServerConfig},
    integrations::ZibalGateway,
    middleware::HmacMiddlewareFactory,
    routes,
};

const COURIER_SECRET: &str = "courier-secret";

async fn test_db() -> SqliteDatabase {
    let db = prepare_test_db(&random_db_path()).await;
    db.upsert_vendor(&Vendor {
        id: "vend-1".to_string(),
        name: "Vendor One".to_string(),
        lat: 35.6892,
        lng: 51.3890,
        service_radius_km: 5.0,
        is_active: true,
        max_daily_orders: None,
        chat_id: None,
    })
    .await
    .expect("vendor seeded");
    db.upsert_customer(&Customer {
        id: "cust-1".to_string(),
        mobile: "09120000000".to_string(),
        chat_id: None,
        is_active: true,
    })
    .await
    .expect("customer seeded");
    db
}

fn issuer() -> TokenIssuer {
    TokenIssuer::new(&AuthConfig { jwt_secret: Secret::new("endpoint-test-secret".to_string()) })
}

fn token(issuer: &TokenIssuer, sub: &str, role: ActorType) -> String {
    issuer.issue(sub, role, DEFAULT_TOKEN_VALIDITY).expect("token issued")
}

fn test_config() -> ServerConfig {
    ServerConfig {
        callback_secret: Some(Secret::new("cb-secret".to_string())),
        ..ServerConfig::default()
    }
}

fn test_gateway() -> ZibalGateway {
    // Points at an empty base URL; the tests below never let a request reach the gateway.
    ZibalGateway::new(ZibalApi::new(ZibalConfig::default()).expect("client"))
}

fn order_body() -> serde_json::Value {
    json!({
        "vendor_id": "vend-1",
        "items": [{ "variant_id": "variant-1", "quantity": 2, "unit_price": 250000 }],
        "address": { "title": "Home", "lat": 35.70, "lng": 51.40, "full_address": "No. 1, Azadi St" },
        "settlement": "PREPAID",
        "cod_confirmed": false
    })
}

macro_rules! full_app {
    ($db:expr, $issuer:expr, $config:expr) => {{
        let orders_api = OrderFlowApi::new($db.clone(), EventProducers::default());
        let payments_api =
            PaymentsApi::new($db.clone(), test_gateway(), EventProducers::default(), $config.reconciler_config());
        let matcher = VendorMatcher::new($db.clone(), DeliveryPricing::default());
        test::init_service(
            App::new()
                .app_data(web::Data::new($db.clone()))
                .app_data(web::Data::new(orders_api))
                .app_data(web::Data::new(payments_api))
                .app_data(web::Data::new(matcher))
                .app_data(web::Data::new($issuer.clone()))
                .app_data(web::Data::new(RateLimiter::new()))
                .app_data(web::Data::new($config.clone()))
                .service(routes::health)
                .service(routes::create_order)
                .service(routes::my_orders)
                .service(routes::order_by_id)
                .service(routes::update_order_status)
                .service(routes::payment_callback)
                .service(routes::dead_letters),
        )
        .await
    }};
}

#[actix_web::test]
async fn health_needs_no_token() {
    let _ = env_logger::try_init();
    let app = test::init_service(App::new().service(routes::health)).await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn orders_require_a_token() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/orders").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn garbage_tokens_are_rejected() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let req = test::TestRequest::get()
        .uri("/orders")
        .insert_header(("Authorization", "Bearer not-a-real-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn customers_place_orders_and_read_them_back() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let auth = ("Authorization", format!("Bearer {}", token(&issuer, "cust-1", ActorType::Customer)));

    let req = test::TestRequest::post().uri("/orders").insert_header(auth.clone()).set_json(order_body()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(created["status"], "PLACED");
    assert_eq!(created["total_price"], 500000);

    let req = test::TestRequest::get().uri("/orders").insert_header(auth).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let listed: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(listed.as_array().map(|a| a.len()), Some(1));
}

#[actix_web::test]
async fn vendors_cannot_place_orders() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let req = test::TestRequest::post()
        .uri("/orders")
        .insert_header(("Authorization", format!("Bearer {}", token(&issuer, "vend-1", ActorType::Vendor))))
        .set_json(order_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn foreign_vendors_cannot_transition_an_order() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let customer = ("Authorization", format!("Bearer {}", token(&issuer, "cust-1", ActorType::Customer)));
    let req =
        test::TestRequest::post().uri("/orders").insert_header(customer).set_json(order_body()).to_request();
    let created: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
    let order_id = created["order_id"].as_str().expect("order id").to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/orders/{order_id}/status"))
        .insert_header(("Authorization", format!("Bearer {}", token(&issuer, "vend-2", ActorType::Vendor))))
        .set_json(json!({ "status": "VENDOR_ACCEPTED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn dead_letters_are_admin_only() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let req = test::TestRequest::get()
        .uri("/admin/dead-letters")
        .insert_header(("Authorization", format!("Bearer {}", token(&issuer, "cust-1", ActorType::Customer))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/admin/dead-letters")
        .insert_header(("Authorization", format!("Bearer {}", token(&issuer, "ops-1", ActorType::Admin))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn callbacks_with_bad_signatures_are_forbidden() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let body = r#"{"trackId":"t-1","amount":500000,"success":"1"}"#;
    let req = test::TestRequest::post()
        .uri("/payments/callback")
        .insert_header(("x-callback-signature", calculate_hmac("wrong-secret", body.as_bytes())))
        .insert_header(("x-callback-timestamp", chrono::Utc::now().timestamp().to_string()))
        .insert_header(("content-type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn callbacks_are_rate_limited_per_source() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let issuer = issuer();
    let app = full_app!(db, issuer, test_config());
    let body = r#"{"trackId":"t-1","amount":500000,"success":"1"}"#;
    let make_req = || {
        test::TestRequest::post()
            .uri("/payments/callback")
            .insert_header(("x-callback-signature", "deadbeef"))
            .insert_header(("x-callback-timestamp", chrono::Utc::now().timestamp().to_string()))
            .insert_header(("content-type", "application/json"))
            .set_payload(body)
            .to_request()
    };
    for _ in 0..3 {
        let resp = test::call_service(&app, make_req()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
    let resp = test::call_service(&app, make_req()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[actix_web::test]
async fn courier_webhook_enforces_its_hmac() {
    let _ = env_logger::try_init();
    let db = test_db().await;
    let orders_api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let app = test::init_service(
        App::new().app_data(web::Data::new(db.clone())).app_data(web::Data::new(orders_api)).service(
            web::scope("/courier")
                .wrap(HmacMiddlewareFactory::new(
                    "x-courier-signature",
                    Secret::new(COURIER_SECRET.to_string()),
                    true,
                ))
                .service(routes::courier_webhook),
        ),
    )
    .await;

    let body = r#"{"order_id":"ghost","event":"ASSIGNED"}"#;
    // Unsigned: rejected by the middleware.
    let req = test::TestRequest::post()
        .uri("/courier/webhook")
        .insert_header(("content-type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Correctly signed: passes the middleware and reaches the handler (which 404s on the unknown order).
    let req = test::TestRequest::post()
        .uri("/courier/webhook")
        .insert_header(("x-courier-signature", calculate_hmac(COURIER_SECRET, body.as_bytes())))
        .insert_header(("content-type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
