use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;

use sfg_common::{Rial, RIAL_CURRENCY_CODE};

use crate::{
    db_types::{
        Actor,
        ActorType,
        AddressSnapshot,
        NewLineItem,
        NewOrder,
        Order,
        OrderId,
        OrderStatusHistory,
        OrderStatusType,
        PaymentStatus,
        SettlementType,
    },
    events::{EventProducers, OrderCreatedEvent, OrderStatusChangedEvent},
    matching::MatchTerms,
    sfe_api::errors::OrderFlowError,
    traits::{AuditEvent, AuditRecorder, FulfillmentDatabase},
};

/// Everything `place_order` needs, already resolved by upstream collaborators: the address snapshot comes from the
/// address service, the line items carry their price snapshots, and the delivery terms come out of
/// [`crate::matching::VendorMatcher`]. The lifecycle opens exactly one transaction around the insert; collaborators
/// are never called inside it.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub order_id: OrderId,
    pub customer_id: String,
    pub vendor_id: String,
    pub items: Vec<NewLineItem>,
    pub address: AddressSnapshot,
    pub terms: MatchTerms,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// `OrderFlowApi` is the order state machine: it creates orders and applies status transitions, appending history
/// and firing post-commit events as it goes.
#[derive(Clone)]
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: FulfillmentDatabase + AuditRecorder
{
    /// Persist a freshly matched order.
    ///
    /// The subtotal and total are recomputed here from the line items and the matched delivery fee; whatever totals
    /// a client sent upstream are ignored. The order row, its items and the initial PLACED history entry are
    /// written in a single transaction. The order-created event and the audit record fire after the commit and are
    /// best-effort: their failure never unwinds the order.
    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, OrderFlowError> {
        if request.items.is_empty() {
            return Err(OrderFlowError::ValidationError("Cart items required".to_string()));
        }
        if request.items.iter().any(|i| i.quantity <= 0) {
            return Err(OrderFlowError::ValidationError("Item quantities must be positive".to_string()));
        }
        if request.items.iter().any(|i| i.unit_price.is_negative()) {
            return Err(OrderFlowError::ValidationError("Item prices cannot be negative".to_string()));
        }
        let subtotal: Rial = request.items.iter().map(|i| i.unit_price * i.quantity).sum();
        let total_price = subtotal + request.terms.delivery_fee;
        let payment_status = match request.terms.settlement {
            SettlementType::Prepaid => PaymentStatus::Pending,
            SettlementType::Cod => PaymentStatus::None,
        };
        let new_order = NewOrder {
            order_id: request.order_id.clone(),
            customer_id: request.customer_id.clone(),
            vendor_id: request.vendor_id.clone(),
            status: OrderStatusType::Placed,
            payment_status,
            delivery_type: request.terms.delivery_type,
            delivery_provider: request.terms.delivery_provider,
            courier_status: request.terms.courier_status,
            settlement: request.terms.settlement,
            subtotal,
            delivery_fee: request.terms.delivery_fee,
            total_price,
            currency: RIAL_CURRENCY_CODE.to_string(),
            address: request.address,
            pricing: request.terms.pricing,
            scheduled_at: request.scheduled_at,
            items: request.items,
        };
        let order = self.db.insert_order(new_order).await?;
        debug!("🔄️📦️ Order {} placed for customer {} at {}", order.order_id, order.customer_id, order.total_price);
        self.call_order_created_hook(&order).await;
        self.audit(
            "order_created",
            AuditEvent::for_order(&order.order_id)
                .with_customer(&*order.customer_id)
                .with_vendor(&*order.vendor_id)
                .with_metadata(json!({ "deliveryType": order.delivery_type.as_str() })),
        )
        .await;
        Ok(order)
    }

    /// Apply a status transition on behalf of an actor.
    ///
    /// Legality comes first and only from the adjacency table: a pair that is not listed is
    /// [`OrderFlowError::InvalidTransition`] no matter who asks. Authorization is layered on top:
    ///
    /// * an admin may perform any listed transition;
    /// * a vendor may only move its own orders, and only forward (accept/reject/preparing/ready/delivered);
    /// * a customer may only cancel their own order, and only while it is still DRAFT or PLACED.
    ///
    /// The status update and the history row commit atomically. The status-changed event and audit record fire
    /// after the commit; their failure never rolls the transition back.
    pub async fn transition(
        &self,
        order_id: &OrderId,
        next: OrderStatusType,
        note: Option<String>,
        actor: &Actor,
    ) -> Result<Order, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let from = order.status;
        if !from.can_transition_to(next) {
            debug!("🔄️📦️ Rejected transition {from} -> {next} for order {order_id}");
            return Err(OrderFlowError::InvalidTransition { from, to: next });
        }
        authorize_transition(&order, next, actor)?;
        let updated = self.db.update_order_status(order_id, next, note.as_deref()).await?;
        info!("🔄️📦️ Order {order_id} moved {from} -> {next} by {}", actor.actor_type);
        let event = OrderStatusChangedEvent {
            order: updated.clone(),
            from,
            to: next,
            actor_type: actor.actor_type,
            note: note.clone(),
        };
        self.call_status_changed_hook(event).await;
        self.audit(
            "order_status_change",
            AuditEvent::for_order(order_id)
                .with_customer(&*updated.customer_id)
                .with_vendor(&*updated.vendor_id)
                .with_actor(actor.actor_type)
                .with_metadata(json!({ "from": from.as_str(), "to": next.as_str() })),
        )
        .await;
        if next == OrderStatusType::Delivered {
            self.audit(
                "delivery_completed",
                AuditEvent::for_order(order_id)
                    .with_customer(&*updated.customer_id)
                    .with_vendor(&*updated.vendor_id)
                    .with_actor(actor.actor_type),
            )
            .await;
        }
        Ok(updated)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        Ok(self.db.fetch_order_by_order_id(order_id).await?)
    }

    /// Orders for a customer, most recent first.
    pub async fn orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.db.fetch_orders_for_customer(customer_id).await?)
    }

    /// Fetch one order on behalf of a customer. Orders belonging to someone else are reported as absent rather
    /// than leaking their existence.
    pub async fn order_for_customer(
        &self,
        order_id: &OrderId,
        customer_id: &str,
    ) -> Result<Option<Order>, OrderFlowError> {
        let order = self.db.fetch_order_by_order_id(order_id).await?;
        Ok(order.filter(|o| o.customer_id == customer_id))
    }

    pub async fn history_for_order(&self, order_id: &OrderId) -> Result<Vec<OrderStatusHistory>, OrderFlowError> {
        Ok(self.db.fetch_history_for_order(order_id).await?)
    }

    async fn call_order_created_hook(&self, order: &Order) {
        for emitter in &self.producers.order_created_producer {
            trace!("🔄️📦️ Notifying order-created hook subscribers");
            emitter.publish_event(OrderCreatedEvent::new(order.clone())).await;
        }
    }

    async fn call_status_changed_hook(&self, event: OrderStatusChangedEvent) {
        for emitter in &self.producers.order_status_changed_producer {
            trace!("🔄️📦️ Notifying status-changed hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    async fn audit(&self, event_name: &str, event: AuditEvent) {
        if let Err(e) = self.db.record(event_name, event).await {
            warn!("🔄️📦️ Could not record audit event {event_name}: {e}");
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// The authorization layer on top of the adjacency table. Assumes legality has already been established.
fn authorize_transition(order: &Order, next: OrderStatusType, actor: &Actor) -> Result<(), OrderFlowError> {
    use OrderStatusType::*;
    match actor.actor_type {
        ActorType::Admin | ActorType::System => Ok(()),
        ActorType::Vendor => {
            if order.vendor_id != actor.id {
                return Err(OrderFlowError::Forbidden("Vendor not authorized for this order".to_string()));
            }
            const VENDOR_MOVES: &[OrderStatusType] = &[VendorAccepted, VendorRejected, Preparing, Ready, Delivered];
            if VENDOR_MOVES.contains(&next) {
                Ok(())
            } else {
                Err(OrderFlowError::Forbidden(format!("Vendors cannot move orders to {next}")))
            }
        },
        ActorType::Customer => {
            if order.customer_id != actor.id {
                return Err(OrderFlowError::Forbidden("Insufficient permissions".to_string()));
            }
            if next != Cancelled {
                return Err(OrderFlowError::Forbidden("Customers can only cancel their orders".to_string()));
            }
            // Once the vendor has committed resources the customer can no longer back out.
            if matches!(order.status, Draft | Placed) {
                Ok(())
            } else {
                Err(OrderFlowError::Forbidden("Only pending orders can be cancelled".to_string()))
            }
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::{
        CourierStatus,
        DeliveryProvider,
        DeliveryType,
        PricingBreakdown,
    };

    fn order_with(status: OrderStatusType) -> Order {
        Order {
            id: 1,
            order_id: OrderId::from("ord-1".to_string()),
            customer_id: "cust-1".to_string(),
            vendor_id: "vend-1".to_string(),
            status,
            payment_status: PaymentStatus::Pending,
            delivery_type: DeliveryType::InZoneInternal,
            delivery_provider: DeliveryProvider::InHouse,
            courier_status: CourierStatus::Pending,
            settlement: SettlementType::Prepaid,
            subtotal: Rial::from(500_000),
            delivery_fee: Rial::from(0),
            total_price: Rial::from(500_000),
            currency: RIAL_CURRENCY_CODE.to_string(),
            address: AddressSnapshot {
                title: "Home".to_string(),
                lat: 35.7,
                lng: 51.4,
                full_address: "No. 1, Azadi St".to_string(),
            },
            pricing: PricingBreakdown {
                base_fee: Rial::from(0),
                per_km_rate: Rial::from(0),
                peak_multiplier: 1.0,
                estimated_fee: Rial::from(0),
                distance_km: 1.0,
            },
            scheduled_at: None,
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_may_perform_any_listed_transition() {
        let order = order_with(OrderStatusType::Ready);
        let admin = Actor::admin("admin-1");
        assert!(authorize_transition(&order, OrderStatusType::CourierAssigned, &admin).is_ok());
        assert!(authorize_transition(&order, OrderStatusType::Cancelled, &admin).is_ok());
    }

    #[test]
    fn vendor_must_own_the_order() {
        let order = order_with(OrderStatusType::Placed);
        let intruder = Actor::vendor("vend-2");
        let err = authorize_transition(&order, OrderStatusType::VendorAccepted, &intruder).unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
        let owner = Actor::vendor("vend-1");
        assert!(authorize_transition(&order, OrderStatusType::VendorAccepted, &owner).is_ok());
    }

    #[test]
    fn vendor_cannot_cancel_or_assign_couriers() {
        let owner = Actor::vendor("vend-1");
        let order = order_with(OrderStatusType::Placed);
        assert!(matches!(
            authorize_transition(&order, OrderStatusType::Cancelled, &owner),
            Err(OrderFlowError::Forbidden(_))
        ));
        let ready = order_with(OrderStatusType::Ready);
        assert!(matches!(
            authorize_transition(&ready, OrderStatusType::CourierAssigned, &owner),
            Err(OrderFlowError::Forbidden(_))
        ));
    }

    #[test]
    fn customer_can_cancel_only_while_pending() {
        let customer = Actor::customer("cust-1");
        for status in [OrderStatusType::Draft, OrderStatusType::Placed] {
            let order = order_with(status);
            assert!(authorize_transition(&order, OrderStatusType::Cancelled, &customer).is_ok());
        }
        for status in [
            OrderStatusType::VendorAccepted,
            OrderStatusType::Preparing,
            OrderStatusType::Ready,
            OrderStatusType::CourierAssigned,
            OrderStatusType::OutForDelivery,
        ] {
            let order = order_with(status);
            assert!(matches!(
                authorize_transition(&order, OrderStatusType::Cancelled, &customer),
                Err(OrderFlowError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn customer_cannot_drive_fulfillment_forward() {
        let customer = Actor::customer("cust-1");
        let order = order_with(OrderStatusType::Placed);
        assert!(matches!(
            authorize_transition(&order, OrderStatusType::VendorAccepted, &customer),
            Err(OrderFlowError::Forbidden(_))
        ));
    }

    #[test]
    fn foreign_customer_is_rejected_before_status_rules() {
        let stranger = Actor::customer("cust-2");
        let order = order_with(OrderStatusType::Placed);
        assert!(matches!(
            authorize_transition(&order, OrderStatusType::Cancelled, &stranger),
            Err(OrderFlowError::Forbidden(_))
        ));
    }
}
