// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-IP limiter for unauthenticated traffic

use std::{fmt, net::IpAddr, time::Duration};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

/// Public limiter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicLimitConfig {
    /// Whether public requests are limited at all
    pub enabled: bool,
    /// Requests allowed per IP per minute
    pub requests_per_minute: u32,
}

impl Default for PublicLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 100,
        }
    }
}

/// Outcome of a public limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
}

/// Limiter for requests identified only by client IP
pub trait PublicLimiter: Send + Sync + fmt::Debug {
    /// Count one request from `ip` and decide whether it may proceed
    fn check(&self, ip: IpAddr) -> PublicLimitDecision;
}

#[derive(Debug, Clone)]
struct RequestCounter {
    count: u32,
    window_start: Instant,
}

/// Fixed one-minute window counter per IP
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: PublicLimitConfig,
    requests: DashMap<IpAddr, RequestCounter>,
}

impl FixedWindowLimiter {
    /// Create a new limiter with the given configuration
    pub fn new(config: PublicLimitConfig) -> Self {
        Self {
            config,
            requests: DashMap::new(),
        }
    }

    /// Check if limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Number of tracked IPs
    pub fn tracked_ips(&self) -> usize {
        self.requests.len()
    }

    fn cleanup_expired_entries(&self, now: Instant, window: Duration) {
        let entries_before = self.requests.len();
        self.requests
            .retain(|_, counter| now.duration_since(counter.window_start) <= window);

        let entries_after = self.requests.len();
        let cleaned_up = entries_before.saturating_sub(entries_after);
        if cleaned_up > 0 {
            debug!("cleaned up {} expired public limiter entries", cleaned_up);
        }

        if entries_after > MAX_RATE_LIMIT_ENTRIES {
            warn!(
                "public limiter still has {} entries after cleanup, removing oldest",
                entries_after
            );

            let mut oldest_entries: Vec<_> = self
                .requests
                .iter()
                .map(|entry| (*entry.key(), entry.value().window_start))
                .collect();
            oldest_entries.sort_by_key(|(_, window_start)| *window_start);

            let entries_to_remove = entries_after - MAX_RATE_LIMIT_ENTRIES / 2;
            for (ip, _) in oldest_entries.into_iter().take(entries_to_remove) {
                self.requests.remove(&ip);
            }
        }
    }
}

impl PublicLimiter for FixedWindowLimiter {
    fn check(&self, ip: IpAddr) -> PublicLimitDecision {
        let limit = self.config.requests_per_minute;
        if !self.config.enabled {
            return PublicLimitDecision {
                allowed: true,
                remaining: limit,
            };
        }

        let now = Instant::now();
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECONDS);

        if self.requests.len() > MAX_RATE_LIMIT_ENTRIES {
            self.cleanup_expired_entries(now, window);
        }

        let count = self
            .requests
            .entry(ip)
            .and_modify(|counter| {
                if now.duration_since(counter.window_start) > window {
                    counter.count = 1;
                    counter.window_start = now;
                } else {
                    counter.count = counter.count.saturating_add(1);
                }
            })
            .or_insert_with(|| RequestCounter {
                count: 1,
                window_start: now,
            })
            .count;

        if count > limit {
            debug!(%ip, count, "public rate limit exceeded");
            PublicLimitDecision {
                allowed: false,
                remaining: 0,
            }
        } else {
            PublicLimitDecision {
                allowed: true,
                remaining: limit - count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use tokio::time::advance;

    use super::*;

    fn limiter(requests_per_minute: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new(PublicLimitConfig {
            enabled: true,
            requests_per_minute,
        })
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let limiter = FixedWindowLimiter::new(PublicLimitConfig {
            enabled: false,
            requests_per_minute: 1,
        });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        for _ in 0..10 {
            assert!(limiter.check(ip).allowed);
        }
        assert!(!limiter.is_enabled());
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn limits_per_ip() {
        let limiter = limiter(3);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert_eq!(limiter.check(a).remaining, 2);
        assert_eq!(limiter.check(a).remaining, 1);
        assert_eq!(limiter.check(a).remaining, 0);
        assert!(!limiter.check(a).allowed);

        assert!(limiter.check(b).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets() {
        let limiter = limiter(1);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert!(limiter.check(ip).allowed);
        assert!(!limiter.check(ip).allowed);

        advance(Duration::from_secs(61)).await;
        assert!(limiter.check(ip).allowed);
    }
}
