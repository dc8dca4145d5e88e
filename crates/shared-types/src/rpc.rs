// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! JSON-RPC request envelope and routing outcome types

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Method name carried by the envelope of an unparseable body
pub const UNKNOWN_METHOD: &str = "unknown";

/// Routing category deciding which node pool serves a call
///
/// Ordered by routing priority so a batch can be routed by its most
/// demanding member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RoutingCategory {
    /// Recent-state reads and everything unclassified
    Standard,
    /// Historical state queries
    Archive,
    /// Raw transaction submission through a protected relay
    Mev,
}

impl RoutingCategory {
    /// Lowercase label used in logs and metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Archive => "archive",
            Self::Mev => "mev",
        }
    }
}

impl fmt::Display for RoutingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache outcome reported to clients in the `X-NullRPC-Cache` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    /// Served from cache without contacting a node
    Hit,
    /// Cacheable call that was not cached yet
    Miss,
    /// Call is never cached (uncacheable method, batch or malformed body)
    Bypass,
    /// Response caching is disabled
    None,
}

impl CacheStatus {
    /// Response header carrying the cache outcome
    pub const HEADER_NAME: &'static str = "x-nullrpc-cache";

    /// Header value for this status
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    /// Caller-supplied id
    pub id: Value,
    /// Method name
    pub method: String,
    /// Positional parameters
    pub params: Vec<Value>,
}

impl RpcCall {
    fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::unknown();
        };

        let method = object
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_METHOD)
            .to_string();

        let params = match object.get("params") {
            Some(Value::Array(params)) => params.clone(),
            Some(Value::Null) | None => Vec::new(),
            // named parameters are kept as a single positional value
            Some(other) => vec![other.clone()],
        };

        Self {
            id: object.get("id").cloned().unwrap_or(Value::Null),
            method,
            params,
        }
    }

    fn unknown() -> Self {
        Self {
            id: Value::Null,
            method: UNKNOWN_METHOD.to_string(),
            params: Vec::new(),
        }
    }
}

/// Parsed view of an inbound request body
///
/// The body itself is forwarded verbatim; the envelope only drives
/// classification, caching and telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Caller-supplied id of the (first) call
    pub id: Value,
    /// Method of the (first) call
    pub method: String,
    /// Parameters of the (first) call
    pub params: Vec<Value>,
    /// Whether the body was a JSON array of calls
    pub is_batch: bool,
    /// Every call of a batch in order, empty for single calls
    pub batch: Vec<RpcCall>,
}

impl RequestEnvelope {
    /// Parse a request body; malformed JSON yields the null envelope
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Array(items)) => {
                let batch: Vec<RpcCall> = items.iter().map(RpcCall::from_value).collect();
                let first = batch.first().cloned().unwrap_or_else(RpcCall::unknown);
                Self {
                    id: first.id,
                    method: first.method,
                    params: first.params,
                    is_batch: true,
                    batch,
                }
            }
            Ok(value @ Value::Object(_)) => {
                let call = RpcCall::from_value(&value);
                Self {
                    id: call.id,
                    method: call.method,
                    params: call.params,
                    is_batch: false,
                    batch: Vec::new(),
                }
            }
            Ok(_) | Err(_) => Self::null(),
        }
    }

    /// Envelope used for bodies that are not JSON-RPC
    pub fn null() -> Self {
        Self {
            id: Value::Null,
            method: UNKNOWN_METHOD.to_string(),
            params: Vec::new(),
            is_batch: false,
            batch: Vec::new(),
        }
    }

    /// Whether this is the null envelope of an unparseable body
    pub fn is_malformed(&self) -> bool {
        !self.is_batch && self.method == UNKNOWN_METHOD
    }

    /// Iterate over `(method, params)` of every call in the body
    pub fn calls(&self) -> impl Iterator<Item = (&str, &[Value])> {
        let single = (!self.is_batch).then_some((self.method.as_str(), self.params.as_slice()));
        single.into_iter().chain(
            self.batch
                .iter()
                .map(|call| (call.method.as_str(), call.params.as_slice())),
        )
    }
}
