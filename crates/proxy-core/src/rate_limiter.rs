// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Tiered rate limiting
//!
//! Authenticated callers get a token bucket sized from their plan plus a
//! monthly quota. Anonymous callers are counted per IP by the injected
//! [`PublicLimiter`].
//!
//! Per-token state lives in a `DashMap`. The read-modify-write of one check
//! runs under that token's shard lock, so concurrent checks of the same
//! token never spend the same bucket token twice, while tokens on other
//! shards proceed in parallel.

use std::{fmt, net::IpAddr, sync::Arc, time::Duration};

use backends::{PlanStore, PublicLimiter};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::Plan;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Who a request is counted against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitIdentity {
    /// Anonymous caller
    Ip(IpAddr),
    /// Holder of an access token
    Token(String),
}

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitReason {
    /// Monthly quota used up
    MonthlyLimit,
    /// Bucket empty
    RateLimit,
    /// Token has no plan
    UserNotFound,
}

impl RateLimitReason {
    /// Label returned to callers and used in metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MonthlyLimit => "monthly_limit",
            Self::RateLimit => "rate_limit",
            Self::UserNotFound => "user_not_found",
        }
    }
}

impl fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Rejection reason, `None` when allowed
    pub reason: Option<RateLimitReason>,
    /// Requests left right now, `None` when unlimited
    pub remaining: Option<u64>,
}

impl RateLimitDecision {
    fn allow(remaining: Option<u64>) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining,
        }
    }

    fn reject(reason: RateLimitReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            remaining: Some(0),
        }
    }
}

/// Point-in-time copy of a token's limiter state
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSnapshot {
    /// Plan the state was derived from
    pub plan: Plan,
    /// Tokens currently in the bucket
    pub tokens: f64,
    /// Bucket capacity
    pub capacity: f64,
    /// Refill rate in tokens per second
    pub refill_rate: f64,
    /// Requests counted in the current billing window
    pub monthly_used: u64,
    /// Start of the current billing window
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RateLimitState {
    plan: Plan,
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
    monthly_used: u64,
    window_start: DateTime<Utc>,
    last_seen: Instant,
}

impl RateLimitState {
    fn new(plan: Plan, burst_multiplier: f64, now: Instant, wall: DateTime<Utc>) -> Self {
        let (capacity, refill_rate) = bucket_shape(&plan, burst_multiplier);
        Self {
            plan,
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
            monthly_used: 0,
            window_start: month_start(wall),
            last_seen: now,
        }
    }

    fn apply_plan(&mut self, plan: Plan, burst_multiplier: f64) {
        if self.plan == plan {
            return;
        }
        debug!(from = %self.plan, to = %plan, "plan changed, reshaping bucket");
        let (capacity, refill_rate) = bucket_shape(&plan, burst_multiplier);
        self.capacity = capacity;
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(capacity);
        self.plan = plan;
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn roll_window(&mut self, wall: DateTime<Utc>) {
        let current = month_start(wall);
        if current > self.window_start {
            self.window_start = current;
            self.monthly_used = 0;
        }
    }

    fn consume(&mut self, now: Instant, wall: DateTime<Utc>) -> RateLimitDecision {
        self.last_seen = now;
        self.roll_window(wall);

        if self.plan.is_unlimited() && self.plan.monthly_limit.is_none() {
            self.monthly_used = self.monthly_used.saturating_add(1);
            return RateLimitDecision::allow(None);
        }

        if !self.plan.is_unlimited() {
            self.refill(now);
        }

        if let Some(limit) = self.plan.monthly_limit
            && self.monthly_used >= limit
        {
            return RateLimitDecision::reject(RateLimitReason::MonthlyLimit);
        }

        if self.plan.is_unlimited() {
            self.monthly_used = self.monthly_used.saturating_add(1);
            return RateLimitDecision::allow(None);
        }

        if self.tokens < 1.0 {
            return RateLimitDecision::reject(RateLimitReason::RateLimit);
        }

        self.tokens -= 1.0;
        self.monthly_used = self.monthly_used.saturating_add(1);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let remaining = self.tokens.floor() as u64;
        RateLimitDecision::allow(Some(remaining))
    }

    fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            plan: self.plan.clone(),
            tokens: self.tokens,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            monthly_used: self.monthly_used,
            window_start: self.window_start,
        }
    }
}

fn bucket_shape(plan: &Plan, burst_multiplier: f64) -> (f64, f64) {
    match plan.requests_per_second {
        Some(rps) => {
            let rate = f64::from(rps);
            ((rate * burst_multiplier).max(1.0), rate)
        }
        None => (f64::INFINITY, f64::INFINITY),
    }
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Tiered rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    plans: Arc<dyn PlanStore>,
    public: Arc<dyn PublicLimiter>,
    states: DashMap<String, RateLimitState>,
    burst_multiplier: f64,
}

impl RateLimiter {
    /// Create a limiter resolving plans from `plans` and delegating IP
    /// identities to `public`
    pub fn new(
        plans: Arc<dyn PlanStore>,
        public: Arc<dyn PublicLimiter>,
        burst_multiplier: f64,
    ) -> Self {
        Self {
            plans,
            public,
            states: DashMap::new(),
            burst_multiplier: burst_multiplier.max(1.0),
        }
    }

    /// Count one request and decide whether it may proceed
    pub async fn check(&self, identity: &RateLimitIdentity) -> RateLimitDecision {
        self.check_at(identity, Utc::now()).await
    }

    /// [`Self::check`] against an explicit wall clock, which only drives the
    /// monthly billing window
    pub async fn check_at(
        &self,
        identity: &RateLimitIdentity,
        wall: DateTime<Utc>,
    ) -> RateLimitDecision {
        match identity {
            RateLimitIdentity::Ip(ip) => {
                let decision = self.public.check(*ip);
                if decision.allowed {
                    RateLimitDecision::allow(Some(u64::from(decision.remaining)))
                } else {
                    RateLimitDecision::reject(RateLimitReason::RateLimit)
                }
            }
            RateLimitIdentity::Token(token) => self.check_token(token, wall).await,
        }
    }

    async fn check_token(&self, token: &str, wall: DateTime<Utc>) -> RateLimitDecision {
        let plan = match self.plans.plan_for_token(token).await {
            Ok(Some(plan)) => Some(plan),
            Ok(None) => {
                self.states.remove(token);
                return RateLimitDecision::reject(RateLimitReason::UserNotFound);
            }
            Err(e) => {
                // keep serving known tokens on their last plan
                warn!(error = %e, "plan lookup failed");
                None
            }
        };

        let now = Instant::now();
        match plan {
            Some(plan) => {
                let mut state = self
                    .states
                    .entry(token.to_string())
                    .or_insert_with(|| {
                        RateLimitState::new(plan.clone(), self.burst_multiplier, now, wall)
                    });
                state.apply_plan(plan, self.burst_multiplier);
                state.consume(now, wall)
            }
            None => match self.states.get_mut(token) {
                Some(mut state) => state.consume(now, wall),
                None => RateLimitDecision::reject(RateLimitReason::UserNotFound),
            },
        }
    }

    /// Current state of a token, if it has made a request
    pub fn snapshot(&self, token: &str) -> Option<RateLimitSnapshot> {
        self.states.get(token).map(|state| state.snapshot())
    }

    /// Number of tracked tokens
    pub fn tracked_tokens(&self) -> usize {
        self.states.len()
    }

    /// Drop state of tokens idle for longer than `max_idle`
    ///
    /// A pruned token starts over with a full bucket and, within the same
    /// month, loses its quota count; keep `max_idle` well above a month for
    /// quota accuracy.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states
            .retain(|_, state| now.saturating_duration_since(state.last_seen) <= max_idle);
        let removed = before.saturating_sub(self.states.len());
        if removed > 0 {
            debug!(removed, "pruned idle rate limit states");
        }
        removed
    }
}
