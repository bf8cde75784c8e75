use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;

use fulfillment_engine::{
    dispatcher::{dispatch_channel, DispatcherConfig, NotificationOrchestrator},
    db_types::OrderStatusType,
    events::{EventHandlers, EventHooks, EventProducers},
    helpers::RateLimiter,
    matching::VendorMatcher,
    OrderFlowApi,
    PaymentsApi,
    SqliteDatabase,
};
use provider_tools::{SmsApi, TelegramApi, ZibalApi};

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    integrations::{SmsChannel, TelegramChat, ZibalGateway},
    middleware::HmacMiddlewareFactory,
    routes::{
        check_token,
        courier_webhook,
        create_order,
        dead_letters,
        health,
        my_orders,
        order_by_id,
        order_history,
        payment_callback,
        request_payment,
        update_order_status,
        verify_payment,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let chat = TelegramChat::new(
        TelegramApi::new(config.telegram.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?,
    );
    let sms =
        SmsChannel::new(SmsApi::new(config.sms.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?);
    let gateway = ZibalGateway::new(
        ZibalApi::new(config.zibal.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?,
    );

    let (dispatcher, worker) = dispatch_channel(db.clone(), chat, sms, DispatcherConfig::default());
    tokio::spawn(worker.run());
    let orchestrator = NotificationOrchestrator::new(db.clone(), dispatcher);
    let producers = start_event_hooks(orchestrator).await;

    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Wire the notification orchestrator onto the engine's post-commit events. Each hook clones the orchestrator into
/// its own task; a slow provider never backs up into the request path.
async fn start_event_hooks(
    orchestrator: NotificationOrchestrator<SqliteDatabase, TelegramChat, SmsChannel>,
) -> EventProducers {
    let mut hooks = EventHooks::default();
    let orch = orchestrator.clone();
    hooks.on_order_created(move |ev| {
        let orch = orch.clone();
        Box::pin(async move {
            orch.on_order_created(&ev.order).await;
        })
    });
    let orch = orchestrator.clone();
    hooks.on_order_status_changed(move |ev| {
        let orch = orch.clone();
        Box::pin(async move {
            match ev.to {
                OrderStatusType::VendorAccepted => orch.on_vendor_accepted(&ev.order).await,
                OrderStatusType::Preparing | OrderStatusType::OutForDelivery | OrderStatusType::Delivered => {
                    orch.on_delivery(&ev.order, ev.to).await
                },
                _ => {},
            }
        })
    });
    let orch = orchestrator.clone();
    hooks.on_payment_settled(move |ev| {
        let orch = orch.clone();
        Box::pin(async move {
            orch.on_payment_success(&ev.order).await;
        })
    });
    let orch = orchestrator;
    hooks.on_payment_failed(move |ev| {
        let orch = orch.clone();
        Box::pin(async move {
            orch.on_payment_failed(&ev.order).await;
        })
    });
    let handlers = EventHandlers::new(32, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: ZibalGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
    let payments_api = PaymentsApi::new(db.clone(), gateway, producers, config.reconciler_config());
    let matcher = VendorMatcher::new(db.clone(), config.pricing.clone());
    let jwt_signer = TokenIssuer::new(&config.auth);
    // Shared across workers so windows and replay keys are global to the process.
    let limiter = RateLimiter::new();
    let courier_secret = config.courier_hmac_secret.clone();
    let courier_checks = config.courier_hmac_checks;
    let bind_addr = (config.host.clone(), config.port);
    info!("🚀️ Starting fulfillment server on {}:{}", config.host, config.port);

    let srv = HttpServer::new(move || {
        let courier_scope = web::scope("/courier")
            .wrap(HmacMiddlewareFactory::new("x-courier-signature", courier_secret.clone(), courier_checks))
            .service(courier_webhook);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sfg::access_log"))
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(orders_api.clone()))
            .app_data(web::Data::new(payments_api.clone()))
            .app_data(web::Data::new(matcher.clone()))
            .app_data(web::Data::new(jwt_signer.clone()))
            .app_data(web::Data::new(limiter.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(health)
            .service(check_token)
            .service(create_order)
            .service(my_orders)
            .service(order_by_id)
            .service(order_history)
            .service(update_order_status)
            .service(request_payment)
            .service(verify_payment)
            .service(payment_callback)
            .service(dead_letters)
            .service(courier_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_addr)?
    .run();
    Ok(srv)
}
