//! Delivery matching: a pure geo classifier plus vendor eligibility checks.
//!
//! [`geo`] is side-effect free: coordinates in, classification, provider, fee and pricing breakdown out.
//! [`VendorMatcher`] wraps it with the checks that need persisted state (vendor active flag, daily capacity) and the
//! cash-on-delivery confirmation gate for out-of-zone deliveries.
pub mod geo;
mod vendor;

use thiserror::Error;

pub use geo::{haversine_km, Coordinates, DeliveryPricing, DeliveryTerms};
pub use vendor::{MatchRequest, MatchTerms, VendorMatcher};

use crate::traits::FulfillmentDbError;

#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("Vendor {0} is not taking orders right now")]
    VendorInactive(String),
    #[error("Vendor {0} has reached its daily order capacity")]
    CapacityExceeded(String),
    #[error("The delivery address is {distance_km:.1} km away, beyond the {max_km:.0} km service ceiling")]
    OutOfServiceArea { distance_km: f64, max_km: f64 },
    #[error("Out-of-zone deliveries are settled cash-on-delivery and need explicit customer confirmation")]
    CodConfirmationRequired,
    #[error(transparent)]
    DatabaseError(#[from] FulfillmentDbError),
}
