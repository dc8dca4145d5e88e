// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Node selection and failover
//!
//! Candidates are drawn from a pool in uniformly random order and tried one
//! after another until one answers with a success status or the pool's
//! attempt budget is spent. MEV submissions fall back to the standard pool
//! when every protected relay fails.

use std::sync::Arc;

use bytes::Bytes;
use node_client::{NodeClient, NodeError, NodeResponse, node_label};
use rand::seq::SliceRandom;
use shared_types::{ChainConfig, RoutingCategory};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{config::DispatchBudgets, error::DispatchError};

/// Successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Answer of the winning node
    pub response: NodeResponse,
    /// Label of the winning node
    pub node: String,
    /// Pool the winning node belongs to
    pub pool: RoutingCategory,
    /// Attempts made, the winning one included
    pub attempts: usize,
}

struct PoolFailure {
    attempts: usize,
    last_error: Option<NodeError>,
}

/// Ordered random node selection with bounded retry
#[derive(Debug, Clone)]
pub struct NodeDispatcher {
    client: Arc<dyn NodeClient>,
    budgets: DispatchBudgets,
}

impl NodeDispatcher {
    /// Create a dispatcher sending through `client`
    pub fn new(client: Arc<dyn NodeClient>, budgets: DispatchBudgets) -> Self {
        Self { client, budgets }
    }

    /// Attempt budgets in use
    pub fn budgets(&self) -> DispatchBudgets {
        self.budgets
    }

    /// Send `body` to the pool serving `category` on `chain`
    pub async fn dispatch(
        &self,
        category: RoutingCategory,
        chain: &ChainConfig,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        match category {
            RoutingCategory::Mev if !chain.mev_nodes.is_empty() => {
                self.dispatch_mev(chain, &body, cancel).await
            }
            RoutingCategory::Archive if !chain.archive_nodes.is_empty() => {
                self.dispatch_pool(
                    category,
                    RoutingCategory::Archive,
                    &chain.archive_nodes,
                    self.budgets.archive,
                    &body,
                    cancel,
                )
                .await
            }
            _ => {
                self.dispatch_pool(
                    category,
                    RoutingCategory::Standard,
                    &chain.standard_nodes,
                    self.budgets.standard,
                    &body,
                    cancel,
                )
                .await
            }
        }
    }

    async fn dispatch_mev(
        &self,
        chain: &ChainConfig,
        body: &Bytes,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let relays = self
            .try_pool(
                RoutingCategory::Mev,
                &chain.mev_nodes,
                self.budgets.mev,
                body,
                cancel,
            )
            .await?;
        let mev = match relays {
            Ok(outcome) => return Ok(outcome),
            Err(failure) => failure,
        };

        if chain.standard_nodes.is_empty() {
            return Err(all_failed(
                RoutingCategory::Mev,
                mev.attempts,
                mev.last_error,
            ));
        }

        warn!(
            chain = %chain.slug,
            attempts = mev.attempts,
            "mev relays failed, falling back to standard nodes"
        );
        let fallback = self
            .try_pool(
                RoutingCategory::Standard,
                &chain.standard_nodes,
                self.budgets.mev_fallback,
                body,
                cancel,
            )
            .await?;

        match fallback {
            Ok(mut outcome) => {
                outcome.attempts += mev.attempts;
                Ok(outcome)
            }
            Err(standard) => Err(all_failed(
                RoutingCategory::Mev,
                mev.attempts + standard.attempts,
                standard.last_error.or(mev.last_error),
            )),
        }
    }

    async fn dispatch_pool(
        &self,
        category: RoutingCategory,
        pool_category: RoutingCategory,
        pool: &[Url],
        budget: usize,
        body: &Bytes,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        if pool.is_empty() {
            return Err(DispatchError::NoNodesConfigured { category });
        }
        self.try_pool(pool_category, pool, budget, body, cancel)
            .await?
            .map_err(|failure| all_failed(category, failure.attempts, failure.last_error))
    }

    async fn try_pool(
        &self,
        pool_category: RoutingCategory,
        pool: &[Url],
        budget: usize,
        body: &Bytes,
        cancel: &CancellationToken,
    ) -> Result<Result<DispatchOutcome, PoolFailure>, DispatchError> {
        let candidates = candidates(pool, budget);
        let mut last_error = None;

        for (index, node) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }

            let label = node_label(node);
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DispatchError::Cancelled),
                result = self.client.send(node, body.clone()) => result,
            };

            match result {
                Ok(response) => {
                    debug!(
                        node = %label,
                        pool = %pool_category,
                        attempt = index + 1,
                        "node answered"
                    );
                    return Ok(Ok(DispatchOutcome {
                        response,
                        node: label,
                        pool: pool_category,
                        attempts: index + 1,
                    }));
                }
                Err(e) => {
                    debug!(
                        node = %label,
                        pool = %pool_category,
                        attempt = index + 1,
                        error = %e,
                        "node attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Ok(Err(PoolFailure {
            attempts: candidates.len(),
            last_error,
        }))
    }
}

fn all_failed(
    category: RoutingCategory,
    attempts: usize,
    last_error: Option<NodeError>,
) -> DispatchError {
    DispatchError::AllNodesFailed {
        category,
        attempts,
        last_error,
    }
}

/// Up to `budget` distinct nodes of `pool` in uniformly random order
pub fn candidates(pool: &[Url], budget: usize) -> Vec<Url> {
    let mut nodes = pool.to_vec();
    let amount = budget.min(nodes.len());
    let (chosen, _) = nodes.partial_shuffle(&mut rand::thread_rng(), amount);
    chosen.to_vec()
}
