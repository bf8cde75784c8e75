use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Rate limit exceeded for {key}")]
pub struct RateLimited {
    pub key: String,
}

#[derive(Debug)]
struct Window {
    remaining: u32,
    resets_at: Instant,
}

/// Fixed-window rate limiter keyed by a logical key (customer id, track id, remote IP). Excess attempts are
/// rejected, never queued. Expired windows are pruned opportunistically so the map stays bounded by active keys.
#[derive(Clone, Default)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one attempt from the window for `key`, opening a fresh window if none is live.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> Result<(), RateLimited> {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        windows.retain(|_, w| w.resets_at > now);
        match windows.get_mut(key) {
            None => {
                windows.insert(key.to_string(), Window { remaining: limit.saturating_sub(1), resets_at: now + window });
                Ok(())
            },
            Some(w) if w.remaining == 0 => Err(RateLimited { key: key.to_string() }),
            Some(w) => {
                w.remaining -= 1;
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_after_limit_within_window() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            limiter.check("cust-1", 3, window).expect("within limit");
        }
        assert!(limiter.check("cust-1", 3, window).is_err());
        // other keys are unaffected
        limiter.check("cust-2", 3, window).expect("fresh key");
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(10);
        limiter.check("k", 1, window).expect("first");
        assert!(limiter.check("k", 1, window).is_err());
        std::thread::sleep(Duration::from_millis(15));
        limiter.check("k", 1, window).expect("window rolled over");
    }
}
