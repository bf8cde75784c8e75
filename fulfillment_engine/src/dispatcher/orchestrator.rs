use log::*;

use crate::{
    db_types::{Correlation, Customer, DeliveryType, Order, OrderStatusType, Vendor},
    dispatcher::NotificationDispatcher,
    traits::{AuditRecorder, ChatProvider, ChatTarget, FulfillmentDatabase, SmsProvider},
};

/// Composes the role-appropriate transactional messages for each lifecycle event and hands them to the dispatcher
/// on both channels. All sends are best-effort: a missing customer record or a storage error costs a log line,
/// never a state change.
#[derive(Clone)]
pub struct NotificationOrchestrator<B, C, S> {
    db: B,
    dispatcher: NotificationDispatcher<B, C, S>,
}

impl<B, C, S> NotificationOrchestrator<B, C, S>
where
    B: FulfillmentDatabase + AuditRecorder,
    C: ChatProvider,
    S: SmsProvider,
{
    pub fn new(db: B, dispatcher: NotificationDispatcher<B, C, S>) -> Self {
        Self { db, dispatcher }
    }

    pub async fn on_order_created(&self, order: &Order) {
        let Some((customer, vendor)) = self.order_context(order).await else { return };
        let delivery_copy = match order.delivery_type {
            DeliveryType::OutOfZoneCourier => {
                "Your address is outside the vendor's delivery zone; a courier will deliver, paid on arrival."
            },
            DeliveryType::InZoneInternal => "Your order is within the delivery zone.",
        };
        let customer_message = format!(
            "Your order has been placed.\nOrder code: {}\n{delivery_copy}",
            order.order_id.short()
        );
        self.notify_customer(order, &customer, &customer_message, "order_created").await;

        if let Some(chat_id) = &vendor.chat_id {
            let vendor_message = format!(
                "New order #{} from {}\nTotal: {}",
                order.order_id.short(),
                customer.mobile,
                order.total_price
            );
            self.notify_vendor(order, chat_id, &vendor_message, "order_created").await;
        }
    }

    pub async fn on_payment_success(&self, order: &Order) {
        let Some((customer, vendor)) = self.order_context(order).await else { return };
        let message = format!("Your payment was confirmed.\nOrder code: {}", order.order_id.short());
        self.notify_customer(order, &customer, &message, "payment_success").await;

        if let Some(chat_id) = &vendor.chat_id {
            let vendor_message =
                format!("Payment for order #{} is confirmed and ready to accept.", order.order_id.short());
            self.notify_vendor(order, chat_id, &vendor_message, "payment_success").await;
        }
    }

    pub async fn on_payment_failed(&self, order: &Order) {
        let Some((customer, _)) = self.order_context(order).await else { return };
        let message = format!(
            "Your payment for order {} did not go through. You can retry from your orders page.",
            order.order_id.short()
        );
        self.notify_customer(order, &customer, &message, "payment_failed").await;
    }

    pub async fn on_vendor_accepted(&self, order: &Order) {
        let Some((customer, vendor)) = self.order_context(order).await else { return };
        let message = format!("{} accepted your order and is preparing it.", vendor.name);
        self.notify_customer(order, &customer, &message, "vendor_accepted").await;
    }

    pub async fn on_delivery(&self, order: &Order, status: OrderStatusType) {
        let Some((customer, _)) = self.order_context(order).await else { return };
        let message = match status {
            OrderStatusType::Delivered => "Your order has been delivered. Enjoy!".to_string(),
            _ => "Your order status was updated.".to_string(),
        };
        self.notify_customer(order, &customer, &message, "delivery_update").await;
    }

    async fn order_context(&self, order: &Order) -> Option<(Customer, Vendor)> {
        let customer = match self.db.fetch_customer(&order.customer_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!("📣️ No customer record for {} on order {}", order.customer_id, order.order_id);
                return None;
            },
            Err(e) => {
                error!("📣️ Could not load customer for order {}: {e}", order.order_id);
                return None;
            },
        };
        let vendor = match self.db.fetch_vendor(&order.vendor_id).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                warn!("📣️ No vendor record for {} on order {}", order.vendor_id, order.order_id);
                return None;
            },
            Err(e) => {
                error!("📣️ Could not load vendor for order {}: {e}", order.order_id);
                return None;
            },
        };
        Some((customer, vendor))
    }

    async fn notify_customer(&self, order: &Order, customer: &Customer, message: &str, event_name: &str) {
        let correlation = Correlation {
            event_name: Some(event_name.to_string()),
            order_id: Some(order.order_id.clone()),
            customer_id: Some(order.customer_id.clone()),
            vendor_id: None,
        };
        if let Some(chat_id) = &customer.chat_id {
            if let Err(e) =
                self.dispatcher.send_chat(chat_id, message, ChatTarget::Customer, correlation.clone()).await
            {
                error!("📣️ Could not queue chat notification for order {}: {e}", order.order_id);
            }
        }
        if let Err(e) = self.dispatcher.send_sms(&customer.mobile, message, correlation).await {
            error!("📣️ Could not queue SMS notification for order {}: {e}", order.order_id);
        }
    }

    async fn notify_vendor(&self, order: &Order, chat_id: &str, message: &str, event_name: &str) {
        let correlation = Correlation {
            event_name: Some(event_name.to_string()),
            order_id: Some(order.order_id.clone()),
            customer_id: None,
            vendor_id: Some(order.vendor_id.clone()),
        };
        if let Err(e) = self.dispatcher.send_chat(chat_id, message, ChatTarget::Vendor, correlation).await {
            error!("📣️ Could not queue vendor notification for order {}: {e}", order.order_id);
        }
    }
}
