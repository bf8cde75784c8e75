//! Small shared mechanisms with no business logic of their own: webhook signatures, the fixed-window rate limiter,
//! and the TTL stores backing replay protection and bot session state.
mod rate_limit;
mod signature;
mod ttl_cache;

pub use rate_limit::{RateLimited, RateLimiter};
pub use signature::{calculate_hmac, from_hex, to_hex, verify_hmac};
pub use ttl_cache::{ReplayGuard, SessionStore, TtlCache};
