// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Response cacheability and cache keys
//!
//! Every method belongs to one TTL class. Responses that can never change
//! (receipts, blocks by hash, chain id) live for the immutable TTL; reads
//! of head state live for the volatile TTL; everything else is not cached.

use std::{collections::BTreeMap, time::Duration};

use alloy_primitives::{hex, keccak256};
use serde_json::Value;
use shared_types::{ChainSlug, RequestEnvelope};

use crate::{block::BlockRef, config::ProxyConfig};

const IMMUTABLE_METHODS: [&str; 7] = [
    "eth_chainId",
    "net_version",
    "eth_getTransactionReceipt",
    "eth_getTransactionByHash",
    "eth_getBlockByHash",
    "eth_getBlockTransactionCountByHash",
    "eth_getTransactionByBlockHashAndIndex",
];

const VOLATILE_METHODS: [&str; 10] = [
    "eth_blockNumber",
    "eth_gasPrice",
    "eth_maxPriorityFeePerGas",
    "eth_feeHistory",
    "eth_getBalance",
    "eth_getCode",
    "eth_getTransactionCount",
    "eth_getStorageAt",
    "eth_call",
    "eth_estimateGas",
];

const BLOCK_DEPENDENT_METHODS: [&str; 3] = [
    "eth_getBlockByNumber",
    "eth_getBlockTransactionCountByNumber",
    "eth_getTransactionByBlockNumberAndIndex",
];

/// TTL class of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
    /// Not cached
    Never,
    /// Changes with every block
    Volatile,
    /// Never changes once available
    Immutable,
}

impl CacheClass {
    /// Class of a single call
    pub fn of(method: &str, params: &[Value]) -> Self {
        if IMMUTABLE_METHODS.contains(&method) {
            Self::Immutable
        } else if VOLATILE_METHODS.contains(&method) {
            Self::Volatile
        } else if BLOCK_DEPENDENT_METHODS.contains(&method) {
            match params.first().map(BlockRef::from_value) {
                None | Some(Some(BlockRef::Tag(_))) => Self::Volatile,
                Some(_) => Self::Immutable,
            }
        } else {
            Self::Never
        }
    }
}

/// Whether and for how long a response may be cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDecision {
    /// Whether the response may be stored
    pub cacheable: bool,
    /// Lifetime of the stored response, zero when not cacheable
    pub ttl: Duration,
}

impl CacheDecision {
    /// Decision for calls that are never cached
    pub const NEVER: Self = Self {
        cacheable: false,
        ttl: Duration::ZERO,
    };
}

/// Cache key of a request body on one chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheFingerprint(String);

impl CacheFingerprint {
    /// `0x`-prefixed hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    volatile_ttl: Duration,
    immutable_ttl: Duration,
    normalize_request_id: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(&ProxyConfig::default())
    }
}

impl CachePolicy {
    /// Create a policy from the gateway configuration
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            volatile_ttl: config.volatile_ttl,
            immutable_ttl: config.immutable_ttl,
            normalize_request_id: config.normalize_request_id,
        }
    }

    /// Whether fingerprints ignore the caller's request id
    pub fn normalizes_request_id(&self) -> bool {
        self.normalize_request_id
    }

    /// Decide cacheability of a single call
    pub fn decide(&self, method: &str, params: &[Value]) -> CacheDecision {
        let ttl = match CacheClass::of(method, params) {
            CacheClass::Never => return CacheDecision::NEVER,
            CacheClass::Volatile => self.volatile_ttl,
            CacheClass::Immutable => self.immutable_ttl,
        };

        if ttl.is_zero() {
            CacheDecision::NEVER
        } else {
            CacheDecision {
                cacheable: true,
                ttl,
            }
        }
    }

    /// Decide cacheability of a request body; batches and malformed
    /// bodies are never cached
    pub fn decide_envelope(&self, envelope: &RequestEnvelope) -> CacheDecision {
        if envelope.is_batch || envelope.is_malformed() {
            return CacheDecision::NEVER;
        }
        self.decide(&envelope.method, &envelope.params)
    }

    /// Cache key of `body` on `chain`
    ///
    /// The body is hashed verbatim, caller id included, unless request id
    /// normalization is enabled; then the id is nulled and the body
    /// re-serialized with sorted keys first.
    pub fn fingerprint(&self, chain: &ChainSlug, body: &[u8]) -> CacheFingerprint {
        let normalized = self
            .normalize_request_id
            .then(|| normalize_id(body))
            .flatten();
        let body = normalized.as_deref().unwrap_or(body);

        let mut preimage = Vec::with_capacity(chain.as_str().len() + 1 + body.len());
        preimage.extend_from_slice(chain.as_str().as_bytes());
        preimage.push(b':');
        preimage.extend_from_slice(body);

        CacheFingerprint(hex::encode_prefixed(keccak256(&preimage)))
    }
}

fn normalize_id(body: &[u8]) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let Value::Object(object) = value else {
        return None;
    };
    let mut sorted: BTreeMap<String, Value> = object.into_iter().collect();
    sorted.insert("id".to_string(), Value::Null);
    serde_json::to_vec(&sorted).ok()
}
