// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Access token to plan mapping

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::Plan;
use tracing::info;

use crate::error::StoreResult;

/// Source of the plan assigned to an access token
#[async_trait]
pub trait PlanStore: Send + Sync + fmt::Debug {
    /// Plan assigned to `token`, `None` when the token is unknown
    async fn plan_for_token(&self, token: &str) -> StoreResult<Option<Plan>>;
}

/// In-memory plan store
///
/// Assignments take effect on the token's next request.
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: DashMap<String, Plan>,
}

impl MemoryPlanStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a plan to a token, replacing any previous plan
    pub fn assign(&self, token: impl Into<String>, plan: Plan) -> Option<Plan> {
        let token = token.into();
        info!(plan = %plan, "assigning plan to token");
        self.plans.insert(token, plan)
    }

    /// Remove a token's plan
    pub fn revoke(&self, token: &str) -> Option<Plan> {
        self.plans.remove(token).map(|(_, plan)| plan)
    }

    /// Number of tokens with a plan
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether no token has a plan
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn plan_for_token(&self, token: &str) -> StoreResult<Option<Plan>> {
        Ok(self.plans.get(token).map(|plan| plan.clone()))
    }
}
