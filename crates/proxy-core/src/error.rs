// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types of the gateway core
//!
//! Node level failures never reach callers directly. They are retried by
//! the dispatcher and only the last one is carried in
//! [`DispatchError::AllNodesFailed`].

use node_client::NodeError;
use shared_types::{ChainSlug, RoutingCategory};
use thiserror::Error;

use crate::rate_limiter::RateLimitReason;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure to obtain an answer from a node pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The pool (and any fallback) holds no node
    #[error("no {category} nodes configured")]
    NoNodesConfigured {
        /// Category that was dispatched
        category: RoutingCategory,
    },

    /// Every attempted node failed
    #[error("all {attempts} attempted nodes failed{}", last_error_suffix(.last_error.as_ref()))]
    AllNodesFailed {
        /// Category that was dispatched
        category: RoutingCategory,
        /// Number of attempts made
        attempts: usize,
        /// Failure of the last attempt
        last_error: Option<NodeError>,
    },

    /// Caller cancelled before a node answered
    #[error("dispatch cancelled")]
    Cancelled,
}

fn last_error_suffix(error: Option<&NodeError>) -> String {
    error.map(|e| format!(": {e}")).unwrap_or_default()
}

impl DispatchError {
    /// HTTP status of the last failing node, if it answered at all
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::AllNodesFailed {
                last_error: Some(NodeError::Status { status, .. }),
                ..
            } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of one inbound call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Chain slug is not configured
    #[error("chain {chain} not found")]
    ChainNotFound {
        /// Requested chain
        chain: ChainSlug,
    },

    /// Caller exceeded its allowance
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Why the call was rejected
        reason: RateLimitReason,
    },

    /// Dispatch to the chain's nodes failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl GatewayError {
    /// Whether the caller went away
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::Cancelled))
    }
}
