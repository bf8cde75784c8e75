//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
//!
//! Handlers are async and must never block the worker thread; all I/O goes through the engine APIs.
use std::{net::IpAddr, time::Duration};

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use serde_json::json;

use fulfillment_engine::{
    db_types::{Actor, ActorType, OrderId},
    helpers::RateLimiter,
    matching::{Coordinates, MatchRequest, VendorMatcher},
    traits::FulfillmentDatabase,
    CallbackHeaders,
    OrderFlowApi,
    OrderFlowError,
    PaymentsApi,
    SqliteDatabase,
    VerifyClaim,
};

use crate::{
    auth::JwtClaims,
    config::{ServerConfig, CALLBACK_RATE_LIMIT, VERIFY_RATE_LIMIT},
    data_objects::{
        CourierWebhookBody,
        CreateOrderRequest,
        JsonResponse,
        PaymentRequestBody,
        TransitionRequest,
        VerifyRequestBody,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    integrations::ZibalGateway,
};

pub type OrderApi = OrderFlowApi<SqliteDatabase>;
pub type PayApi = PaymentsApi<SqliteDatabase, ZibalGateway>;
pub type Matcher = VendorMatcher<SqliteDatabase>;

// ----------------------------------------------   Health  -----------------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Orders  -----------------------------------------------------------

/// Place a new order. Customer only. The cart, the resolved address and the settlement preference arrive in the
/// body; the vendor matcher prices the delivery before the lifecycle opens its transaction.
#[post("/orders")]
pub async fn create_order(
    claims: JwtClaims,
    body: web::Json<CreateOrderRequest>,
    orders: web::Data<OrderApi>,
    matcher: web::Data<Matcher>,
    db: web::Data<SqliteDatabase>,
) -> Result<HttpResponse, ServerError> {
    claims.require_role(ActorType::Customer)?;
    let body = body.into_inner();
    trace!("💻️ Received order creation request from {}", claims.sub);
    let vendor = db
        .fetch_vendor(&body.vendor_id)
        .await?
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("Unknown vendor {}", body.vendor_id)))?;
    let match_request = MatchRequest {
        location: Coordinates::new(body.address.lat, body.address.lng),
        settlement: body.settlement,
        cod_confirmed: body.cod_confirmed,
    };
    let terms = matcher.match_vendor(&vendor, &match_request).await?;
    let order_id = body.order_id.clone().unwrap_or_else(new_order_id);
    let request = fulfillment_engine::PlaceOrderRequest {
        order_id: OrderId::from(order_id),
        customer_id: claims.sub.clone(),
        vendor_id: vendor.id.clone(),
        items: body.items.into_iter().map(Into::into).collect(),
        address: body.address.into(),
        terms,
        scheduled_at: body.scheduled_at,
    };
    let order = orders.place_order(request).await?;
    Ok(HttpResponse::Created().json(order))
}

fn new_order_id() -> String {
    format!("ord-{:012x}", rand::random::<u64>() & 0xffff_ffff_ffff)
}

/// Orders for the calling customer, most recent first.
#[get("/orders")]
pub async fn my_orders(claims: JwtClaims, orders: web::Data<OrderApi>) -> Result<HttpResponse, ServerError> {
    claims.require_role(ActorType::Customer)?;
    let result = orders.orders_for_customer(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[get("/orders/{order_id}")]
pub async fn order_by_id(
    claims: JwtClaims,
    path: web::Path<String>,
    orders: web::Data<OrderApi>,
) -> Result<HttpResponse, ServerError> {
    let oid = OrderId::from(path.into_inner());
    let order = match claims.role {
        // Admins see everything; customers only their own orders.
        ActorType::Admin => orders.fetch_order(&oid).await?,
        _ => orders.order_for_customer(&oid, &claims.sub).await?,
    };
    let order = order.ok_or(ServerError::OrderFlow(OrderFlowError::OrderNotFound(oid)))?;
    Ok(HttpResponse::Ok().json(order))
}

/// Apply a status transition. The actor is taken from the token; legality and authorization are entirely the
/// lifecycle's business.
#[post("/orders/{order_id}/status")]
pub async fn update_order_status(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<TransitionRequest>,
    orders: web::Data<OrderApi>,
) -> Result<HttpResponse, ServerError> {
    let oid = OrderId::from(path.into_inner());
    let body = body.into_inner();
    trace!("💻️ {} requests {} -> {}", claims.sub, oid, body.status);
    let order = orders.transition(&oid, body.status, body.note, &claims.actor()).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[get("/orders/{order_id}/history")]
pub async fn order_history(
    claims: JwtClaims,
    path: web::Path<String>,
    orders: web::Data<OrderApi>,
) -> Result<HttpResponse, ServerError> {
    let oid = OrderId::from(path.into_inner());
    if claims.role != ActorType::Admin {
        orders
            .order_for_customer(&oid, &claims.sub)
            .await?
            .ok_or_else(|| ServerError::OrderFlow(OrderFlowError::OrderNotFound(oid.clone())))?;
    }
    let history = orders.history_for_order(&oid).await?;
    Ok(HttpResponse::Ok().json(history))
}

// ----------------------------------------------  Payments  ----------------------------------------------------------

/// Open (or reopen) a payment cycle for an order and hand back the pay link.
#[post("/payments/request")]
pub async fn request_payment(
    claims: JwtClaims,
    body: web::Json<PaymentRequestBody>,
    payments: web::Data<PayApi>,
) -> Result<HttpResponse, ServerError> {
    claims.require_role(ActorType::Customer)?;
    let oid = OrderId::from(body.into_inner().order_id);
    let session = payments.request_payment(&oid, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(json!({ "payment": session.payment, "payLink": session.pay_link })))
}

/// Verify a payment against the gateway. Open to the redirect flow, so rate-limited per track id instead of
/// requiring a token.
#[post("/payments/verify")]
pub async fn verify_payment(
    body: web::Json<VerifyRequestBody>,
    payments: web::Data<PayApi>,
    limiter: web::Data<RateLimiter>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let (limit, window) = VERIFY_RATE_LIMIT;
    limiter.check(&format!("verify:{}", body.track_id), limit, Duration::from_secs(window))?;
    let claim = VerifyClaim { order_id: body.order_id.map(OrderId::from), raw: json!({ "trackId": body.track_id }) };
    let outcome = payments.verify(&body.track_id, &claim).await?;
    Ok(HttpResponse::Ok().json(json!({ "payment": outcome.payment, "success": outcome.success })))
}

/// The gateway webhook. Signature, freshness, replay and field matching are enforced by the reconciler; this
/// handler only adds transport-level gates (rate limit, optional IP whitelist) and hands over the raw body.
#[post("/payments/callback")]
pub async fn payment_callback(
    req: HttpRequest,
    raw_body: web::Bytes,
    payments: web::Data<PayApi>,
    limiter: web::Data<RateLimiter>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let remote_ip = get_remote_ip(&req, config.use_x_forwarded_for);
    assert_whitelisted(remote_ip, &config.callback_whitelist)?;
    let key = remote_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
    let (limit, window) = CALLBACK_RATE_LIMIT;
    limiter.check(&format!("callback:{key}"), limit, Duration::from_secs(window))?;

    let headers = CallbackHeaders {
        signature: header_string(&req, "x-callback-signature"),
        timestamp: header_string(&req, "x-callback-timestamp"),
    };
    let outcome = payments.handle_callback(raw_body.as_ref(), &headers).await?;
    Ok(HttpResponse::Ok().json(json!({ "paymentStatus": outcome.payment_status, "success": outcome.success })))
}

fn header_string(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

fn assert_whitelisted(remote_ip: Option<IpAddr>, whitelist: &Option<Vec<IpAddr>>) -> Result<(), ServerError> {
    match (remote_ip, whitelist) {
        (_, None) => Ok(()),
        (Some(ip), Some(list)) if list.contains(&ip) => Ok(()),
        (Some(ip), Some(_)) => {
            warn!("💻️ Callback from non-whitelisted address {ip} denied");
            Err(ServerError::InsufficientPermissions("callback source not allowed".to_string()))
        },
        (None, Some(_)) => {
            warn!("💻️ No peer address found for a whitelisted callback route; denying access");
            Err(ServerError::InsufficientPermissions("callback source not allowed".to_string()))
        },
    }
}

// ----------------------------------------------  Courier  -----------------------------------------------------------

/// Courier status webhook. The HMAC middleware has already authenticated the caller; courier events map onto the
/// same state machine as every other transition, acting as the system.
#[post("/webhook")]
pub async fn courier_webhook(
    body: web::Json<CourierWebhookBody>,
    orders: web::Data<OrderApi>,
    db: web::Data<SqliteDatabase>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let oid = OrderId::from(body.order_id);
    let next = body.event.order_status();
    debug!("💻️ Courier webhook moves {oid} towards {next}");
    let order = orders.transition(&oid, next, Some(format!("courier event: {:?}", body.event)), &system_actor()).await?;
    db.update_courier_status(&oid, body.event.courier_status()).await?;
    Ok(HttpResponse::Ok().json(json!({ "orderStatus": order.status, "courierStatus": body.event.courier_status() })))
}

fn system_actor() -> Actor {
    Actor { actor_type: ActorType::System, id: "courier-webhook".to_string() }
}

// ----------------------------------------------   Admin   -----------------------------------------------------------

/// Dead letters awaiting inspection. Admin only.
#[get("/admin/dead-letters")]
pub async fn dead_letters(claims: JwtClaims, db: web::Data<SqliteDatabase>) -> Result<HttpResponse, ServerError> {
    claims.require_role(ActorType::Admin)?;
    let letters = db.fetch_dead_letters().await?;
    Ok(HttpResponse::Ok().json(letters))
}

/// Echo endpoint for smoke-testing auth wiring.
#[get("/auth/check")]
pub async fn check_token(claims: JwtClaims) -> Result<HttpResponse, ServerError> {
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{} ({})", claims.sub, claims.role))))
}
