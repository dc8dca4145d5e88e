// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Subscription plans for authenticated access

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Rate and quota allowance attached to an access token
///
/// `None` in either limit means the dimension is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Plan {
    /// Plan name
    #[schema(example = "hobbyist")]
    pub name: String,
    /// Sustained requests per second, `None` for unlimited
    pub requests_per_second: Option<u32>,
    /// Requests per calendar month, `None` for unlimited
    pub monthly_limit: Option<u64>,
}

impl Plan {
    /// Entry plan: 10 requests per second, one million per month
    pub fn hobbyist() -> Self {
        Self::limited("hobbyist", 10, 1_000_000)
    }

    /// 50 requests per second, ten million per month
    pub fn scaling() -> Self {
        Self::limited("scaling", 50, 10_000_000)
    }

    /// 200 requests per second, one hundred million per month
    pub fn business() -> Self {
        Self::limited("business", 200, 100_000_000)
    }

    /// No rate or quota limits
    pub fn enterprise() -> Self {
        Self {
            name: "enterprise".to_string(),
            requests_per_second: None,
            monthly_limit: None,
        }
    }

    /// A plan with finite rate and quota
    pub fn limited(name: impl Into<String>, requests_per_second: u32, monthly_limit: u64) -> Self {
        Self {
            name: name.into(),
            requests_per_second: Some(requests_per_second),
            monthly_limit: Some(monthly_limit),
        }
    }

    /// All built-in plans
    pub fn builtins() -> [Self; 4] {
        [
            Self::hobbyist(),
            Self::scaling(),
            Self::business(),
            Self::enterprise(),
        ]
    }

    /// Whether requests under this plan are never rate limited
    pub fn is_unlimited(&self) -> bool {
        self.requests_per_second.is_none()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for Plan {
    type Err = PlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::builtins()
            .into_iter()
            .find(|plan| plan.name.eq_ignore_ascii_case(s))
            .ok_or_else(|| PlanParseError(s.to_string()))
    }
}

/// Error returned for an unknown plan name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan: {0}. Known plans are: hobbyist, scaling, business, enterprise")]
pub struct PlanParseError(pub String);
