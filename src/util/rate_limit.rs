//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

use crate::types::PlayerId;

/// Keyed rate limiter type alias
pub type KeyedLimiter = RateLimiter<PlayerId, DefaultKeyedStateStore<PlayerId>, DefaultClock>;

/// Per-player request throttle shared by all engine entry points
pub struct PlayerRateLimiter {
    limiter: KeyedLimiter,
}

impl PlayerRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let quota =
            Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Check if a request is allowed (returns true if allowed)
    pub fn check(&self, player: PlayerId) -> bool {
        self.limiter.check_key(&player).is_ok()
    }

    /// Drop state for players whose budget has fully recovered
    pub fn prune(&self) {
        self.limiter.retain_recent();
    }
}
