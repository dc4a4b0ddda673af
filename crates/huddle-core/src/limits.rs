use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Connection slots and per-user inbound message quotas for the gateway.
pub struct GatewayLimits {
    max_connections: usize,
    active: Arc<AtomicUsize>,
    messages: DefaultKeyedRateLimiter<String>,
}

impl GatewayLimits {
    pub fn new(max_connections: usize, max_messages_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(max_messages_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            max_connections,
            active: Arc::new(AtomicUsize::new(0)),
            messages: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    /// Reserve a connection slot; the slot is released when the guard drops.
    pub fn try_acquire_connection(&self) -> Option<ConnectionSlot> {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= self.max_connections {
                return None;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Some(ConnectionSlot {
                        active: self.active.clone(),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// `Err(retry_after_ms)` when the user has exhausted their message quota.
    pub fn check_message(&self, user_id: &str) -> Result<(), u64> {
        let key = user_id.to_string();
        match self.messages.check_key(&key) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(wait.as_millis().max(1) as u64)
            }
        }
    }

    /// Drop limiter state for users that have been quiet for a while.
    pub fn prune(&self) {
        self.messages.retain_recent();
        self.messages.shrink_to_fit();
    }
}

pub struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_slots_are_bounded_and_released() {
        let limits = GatewayLimits::new(2, 10);
        let a = limits.try_acquire_connection().unwrap();
        let _b = limits.try_acquire_connection().unwrap();
        assert!(limits.try_acquire_connection().is_none());
        assert_eq!(limits.active_connections(), 2);
        drop(a);
        assert_eq!(limits.active_connections(), 1);
        assert!(limits.try_acquire_connection().is_some());
    }

    #[test]
    fn message_quota_is_per_user() {
        let limits = GatewayLimits::new(10, 2);
        assert!(limits.check_message("u1").is_ok());
        assert!(limits.check_message("u1").is_ok());
        let retry_after = limits.check_message("u1").unwrap_err();
        assert!(retry_after >= 1);
        assert!(limits.check_message("u2").is_ok());
    }

    #[test]
    fn zero_quota_is_clamped_to_one() {
        let limits = GatewayLimits::new(10, 0);
        assert!(limits.check_message("u1").is_ok());
        assert!(limits.check_message("u1").is_err());
    }
}
