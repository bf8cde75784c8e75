use serde::{Deserialize, Serialize};

use sfg_common::Rial;

use crate::db_types::{DeliveryProvider, DeliveryType, PricingBreakdown};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default service ceiling for third-party couriers.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two coordinates, in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// The tariff inputs for delivery pricing. In-zone deliveries charge the flat internal rate; out-of-zone courier
/// deliveries charge `base_fee + distance * per_km_rate * peak_multiplier`, floored at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPricing {
    pub internal_fee: Rial,
    pub base_fee: Rial,
    pub per_km_rate: Rial,
    pub peak_multiplier: f64,
    /// Hard ceiling beyond which no provider is available.
    pub max_distance_km: f64,
}

impl Default for DeliveryPricing {
    fn default() -> Self {
        Self {
            internal_fee: Rial::from(0),
            base_fee: Rial::from(0),
            per_km_rate: Rial::from(0),
            peak_multiplier: 1.0,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
        }
    }
}

/// The classification result for a single vendor-customer pair. Pure data; persistence happens at order time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTerms {
    pub delivery_type: DeliveryType,
    pub delivery_provider: DeliveryProvider,
    pub fee: Rial,
    pub distance_km: f64,
    pub pricing: PricingBreakdown,
}

/// Classify a delivery and price it. `distance_km` must already be validated against the service ceiling by the
/// caller; this function only decides in-zone vs out-of-zone and computes the fee.
pub fn classify(pricing: &DeliveryPricing, distance_km: f64, service_radius_km: f64) -> DeliveryTerms {
    let in_zone = distance_km <= service_radius_km;
    let fee = if in_zone {
        pricing.internal_fee
    } else {
        let estimate =
            pricing.base_fee.value() as f64 + distance_km * pricing.per_km_rate.value() as f64 * pricing.peak_multiplier;
        Rial::from(estimate.round().max(0.0) as i64)
    };
    let breakdown = PricingBreakdown {
        base_fee: pricing.base_fee,
        per_km_rate: pricing.per_km_rate,
        peak_multiplier: pricing.peak_multiplier,
        estimated_fee: fee,
        distance_km,
    };
    DeliveryTerms {
        delivery_type: if in_zone { DeliveryType::InZoneInternal } else { DeliveryType::OutOfZoneCourier },
        delivery_provider: if in_zone { DeliveryProvider::InHouse } else { DeliveryProvider::Courier },
        fee,
        distance_km,
        pricing: breakdown,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TEHRAN: Coordinates = Coordinates { lat: 35.6892, lng: 51.3890 };
    const KARAJ: Coordinates = Coordinates { lat: 35.8400, lng: 50.9391 };

    #[test]
    fn distance_is_symmetric_and_non_negative() {
        let ab = haversine_km(TEHRAN, KARAJ);
        let ba = haversine_km(KARAJ, TEHRAN);
        assert!(ab > 0.0);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert!(haversine_km(TEHRAN, TEHRAN).abs() < 1e-9);
    }

    #[test]
    fn tehran_karaj_is_about_forty_km() {
        let d = haversine_km(TEHRAN, KARAJ);
        assert!((35.0..50.0).contains(&d), "got {d}");
    }

    #[test]
    fn within_radius_is_always_in_zone() {
        let pricing = DeliveryPricing::default();
        let terms = classify(&pricing, 4.2, 5.0);
        assert_eq!(terms.delivery_type, DeliveryType::InZoneInternal);
        assert_eq!(terms.delivery_provider, DeliveryProvider::InHouse);
        assert_eq!(terms.fee, pricing.internal_fee);
        // boundary case: exactly on the radius still counts as in-zone
        assert_eq!(classify(&pricing, 5.0, 5.0).delivery_type, DeliveryType::InZoneInternal);
    }

    #[test]
    fn out_of_zone_fee_follows_the_tariff() {
        let pricing = DeliveryPricing {
            internal_fee: Rial::from(0),
            base_fee: Rial::from(150_000),
            per_km_rate: Rial::from(20_000),
            peak_multiplier: 1.5,
            max_distance_km: 30.0,
        };
        let terms = classify(&pricing, 10.0, 5.0);
        assert_eq!(terms.delivery_type, DeliveryType::OutOfZoneCourier);
        assert_eq!(terms.delivery_provider, DeliveryProvider::Courier);
        // 150_000 + 10 * 20_000 * 1.5 = 450_000
        assert_eq!(terms.fee, Rial::from(450_000));
        assert_eq!(terms.pricing.estimated_fee, terms.fee);
        assert_eq!(terms.pricing.distance_km, 10.0);
    }

    #[test]
    fn fee_is_floored_at_zero() {
        let pricing = DeliveryPricing {
            base_fee: Rial::from(-500_000),
            per_km_rate: Rial::from(1_000),
            peak_multiplier: 1.0,
            ..Default::default()
        };
        let terms = classify(&pricing, 6.0, 5.0);
        assert_eq!(terms.fee, Rial::from(0));
    }
}
