use log::*;

use crate::{
    db_types::{CourierStatus, DeliveryProvider, DeliveryType, PricingBreakdown, SettlementType, Vendor},
    matching::{
        geo::{classify, haversine_km, Coordinates, DeliveryPricing},
        MatchError,
    },
    traits::FulfillmentDatabase,
};
use sfg_common::Rial;

/// What the caller asks for: where the order goes and how the customer wants to settle. Out-of-zone deliveries
/// ignore the requested settlement (always cash-on-delivery) and must carry explicit confirmation.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub location: Coordinates,
    pub settlement: SettlementType,
    pub cod_confirmed: bool,
}

/// The fully resolved delivery terms for an order. Persisted verbatim with the order at placement; never
/// recomputed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTerms {
    pub delivery_type: DeliveryType,
    pub delivery_provider: DeliveryProvider,
    pub delivery_fee: Rial,
    pub distance_km: f64,
    pub courier_status: CourierStatus,
    pub settlement: SettlementType,
    pub pricing: PricingBreakdown,
}

/// Wraps the pure geo classifier with vendor eligibility checks against persisted state.
#[derive(Debug, Clone)]
pub struct VendorMatcher<B> {
    db: B,
    pricing: DeliveryPricing,
}

impl<B> VendorMatcher<B> {
    pub fn new(db: B, pricing: DeliveryPricing) -> Self {
        Self { db, pricing }
    }

    pub fn pricing(&self) -> &DeliveryPricing {
        &self.pricing
    }
}

impl<B> VendorMatcher<B>
where B: FulfillmentDatabase
{
    /// Match a vendor against a delivery request.
    ///
    /// Checks, in order:
    /// 1. The vendor is active.
    /// 2. The vendor has not exceeded its daily order cap (same-day orders, cancelled/rejected excluded).
    /// 3. The distance is within the hard service ceiling.
    /// 4. Out-of-zone deliveries carry explicit cash-on-delivery confirmation. The gate lives here, not in the
    ///    HTTP layer, so no other entry point can bypass it.
    ///
    /// Returns the delivery terms to persist with the order.
    pub async fn match_vendor(&self, vendor: &Vendor, request: &MatchRequest) -> Result<MatchTerms, MatchError> {
        if !vendor.is_active {
            return Err(MatchError::VendorInactive(vendor.id.clone()));
        }
        if let Some(cap) = vendor.max_daily_orders {
            let today = self.db.count_vendor_orders_today(&vendor.id).await?;
            if today >= cap {
                debug!("🧭️ Vendor {} is at capacity ({today}/{cap})", vendor.id);
                return Err(MatchError::CapacityExceeded(vendor.id.clone()));
            }
        }
        let distance_km = haversine_km(Coordinates::new(vendor.lat, vendor.lng), request.location);
        if distance_km > self.pricing.max_distance_km {
            return Err(MatchError::OutOfServiceArea { distance_km, max_km: self.pricing.max_distance_km });
        }
        let terms = classify(&self.pricing, distance_km, vendor.service_radius_km);
        let out_of_zone = terms.delivery_type == DeliveryType::OutOfZoneCourier;
        if out_of_zone && !request.cod_confirmed {
            return Err(MatchError::CodConfirmationRequired);
        }
        let settlement = if out_of_zone { SettlementType::Cod } else { request.settlement };
        trace!(
            "🧭️ Vendor {} matched at {distance_km:.2} km: {} via {}, fee {}",
            vendor.id,
            terms.delivery_type,
            terms.delivery_provider,
            terms.fee
        );
        Ok(MatchTerms {
            delivery_type: terms.delivery_type,
            delivery_provider: terms.delivery_provider,
            delivery_fee: terms.fee,
            distance_km,
            courier_status: if out_of_zone { CourierStatus::Requested } else { CourierStatus::Pending },
            settlement,
            pricing: terms.pricing,
        })
    }
}
