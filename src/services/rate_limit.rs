//! Per-client request caps for auth endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RateLimitConfig;

/// Windows are swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// Counts one request from `ip`; `None` groups clients with no known address.
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-memory fixed window counter keyed by client address.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_at(
        &self,
        ip: Option<&str>,
        action: RateLimitAction,
        now: Instant,
    ) -> RateLimitDecision {
        let Ok(mut windows) = self.windows.lock() else {
            warn!("Rate limiter state poisoned; allowing request");
            return RateLimitDecision::Allowed;
        };

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let key = (action, ip.unwrap_or("unknown").to_string());
        let window = windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            return RateLimitDecision::Limited;
        }

        window.count += 1;
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        self.check_at(ip, action, Instant::now())
    }
}

#[must_use]
pub fn build_login_limiter(config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    if config.enabled {
        Arc::new(FixedWindowRateLimiter::new(
            config.max_requests,
            Duration::from_secs(config.window_seconds),
        ))
    } else {
        Arc::new(NoopRateLimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_after_max_requests() {
        let limiter = FixedWindowRateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(
                limiter.check_at(Some("10.0.0.1"), RateLimitAction::Login, now),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_at(Some("10.0.0.1"), RateLimitAction::Login, now),
            RateLimitDecision::Limited
        );

        // Other clients keep their own budget
        assert_eq!(
            limiter.check_at(Some("10.0.0.2"), RateLimitAction::Login, now),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn test_window_resets() {
        let limiter = FixedWindowRateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(
            limiter.check_at(None, RateLimitAction::Login, now),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_at(None, RateLimitAction::Login, now + Duration::from_secs(59)),
            RateLimitDecision::Limited
        );
        assert_eq!(
            limiter.check_at(None, RateLimitAction::Login, now + Duration::from_secs(60)),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn test_noop_allows() {
        let limiter = build_login_limiter(&RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        });
        for _ in 0..50 {
            assert_eq!(
                limiter.check_ip(Some("10.0.0.1"), RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
    }
}
