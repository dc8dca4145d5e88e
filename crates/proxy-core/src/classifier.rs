// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Request classification
//!
//! Decides which node pool serves a call from its method and parameters
//! alone. The archive rule is a heuristic: a historical read that slips
//! through as `standard` fails at the node and is retried against other
//! standard nodes.

use serde_json::Value;
use shared_types::{RequestEnvelope, RoutingCategory};

use crate::block::{BlockRef, BlockTag};

/// Methods whose last parameter selects the block the state is read at
pub const BLOCK_PARAMETERIZED_METHODS: [&str; 5] = [
    "eth_getBalance",
    "eth_getCode",
    "eth_getTransactionCount",
    "eth_getStorageAt",
    "eth_call",
];

/// Classify a single call
///
/// `recent_block_threshold` is the height below which an explicit block
/// number counts as historical.
pub fn classify(method: &str, params: &[Value], recent_block_threshold: u64) -> RoutingCategory {
    if method == "eth_sendRawTransaction" {
        return RoutingCategory::Mev;
    }

    if method.starts_with("trace_") || method.starts_with("debug_") || method == "eth_getLogs" {
        return RoutingCategory::Archive;
    }

    if BLOCK_PARAMETERIZED_METHODS.contains(&method)
        && params
            .last()
            .is_some_and(|param| is_historical(param, recent_block_threshold))
    {
        return RoutingCategory::Archive;
    }

    RoutingCategory::Standard
}

/// Classify a whole request body
///
/// A batch is routed by the most demanding of its calls; the null envelope
/// of a malformed body is `standard`.
pub fn classify_envelope(
    envelope: &RequestEnvelope,
    recent_block_threshold: u64,
) -> RoutingCategory {
    envelope
        .calls()
        .map(|(method, params)| classify(method, params, recent_block_threshold))
        .max()
        .unwrap_or(RoutingCategory::Standard)
}

fn is_historical(param: &Value, recent_block_threshold: u64) -> bool {
    match BlockRef::from_value(param) {
        Some(BlockRef::Tag(BlockTag::Earliest)) => true,
        Some(BlockRef::Number(number)) => number < recent_block_threshold,
        Some(BlockRef::Tag(_)) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const THRESHOLD: u64 = 1_000;

    #[test]
    fn fixed_method_rules() {
        assert_eq!(
            classify("eth_sendRawTransaction", &[json!("0x00")], THRESHOLD),
            RoutingCategory::Mev
        );
        assert_eq!(
            classify("trace_block", &[json!("0x1")], THRESHOLD),
            RoutingCategory::Archive
        );
        assert_eq!(
            classify("debug_traceTransaction", &[json!("0xabc")], THRESHOLD),
            RoutingCategory::Archive
        );
        assert_eq!(
            classify("eth_getLogs", &[json!({})], THRESHOLD),
            RoutingCategory::Archive
        );
        assert_eq!(
            classify("eth_blockNumber", &[], THRESHOLD),
            RoutingCategory::Standard
        );
        assert_eq!(
            classify("unknown", &[], THRESHOLD),
            RoutingCategory::Standard
        );
    }

    #[test]
    fn block_parameterized_matrix() {
        let shapes: [(Value, RoutingCategory); 11] = [
            (json!("earliest"), RoutingCategory::Archive),
            (json!("latest"), RoutingCategory::Standard),
            (json!("pending"), RoutingCategory::Standard),
            (json!("safe"), RoutingCategory::Standard),
            (json!("finalized"), RoutingCategory::Standard),
            (json!("0x0"), RoutingCategory::Archive),
            (json!("0x3e7"), RoutingCategory::Archive),
            (json!("0x3e8"), RoutingCategory::Standard),
            (json!("0x10000000000000000"), RoutingCategory::Standard),
            (json!({"blockHash": "0xabc"}), RoutingCategory::Standard),
            (json!(12), RoutingCategory::Standard),
        ];

        for method in BLOCK_PARAMETERIZED_METHODS {
            for (block, expected) in &shapes {
                let address = json!("0x0000000000000000000000000000000000000001");
                let params = [address, block.clone()];
                assert_eq!(
                    classify(method, &params, THRESHOLD),
                    *expected,
                    "{method} with {block}"
                );
            }
            assert_eq!(classify(method, &[], THRESHOLD), RoutingCategory::Standard);
        }
    }

    #[test]
    fn block_rule_ignores_other_methods() {
        assert_eq!(
            classify(
                "eth_getBlockByNumber",
                &[json!("earliest"), json!(false)],
                THRESHOLD
            ),
            RoutingCategory::Standard
        );
    }

    #[test]
    fn batches_take_the_highest_category() {
        let envelope = RequestEnvelope::parse(
            br#"[
                {"id":1,"method":"eth_blockNumber"},
                {"id":2,"method":"eth_getBalance","params":["0x01","earliest"]}
            ]"#,
        );
        assert_eq!(
            classify_envelope(&envelope, THRESHOLD),
            RoutingCategory::Archive
        );

        let envelope = RequestEnvelope::parse(
            br#"[
                {"id":1,"method":"trace_block","params":["0x1"]},
                {"id":2,"method":"eth_sendRawTransaction","params":["0x00"]}
            ]"#,
        );
        assert_eq!(classify_envelope(&envelope, THRESHOLD), RoutingCategory::Mev);

        let envelope = RequestEnvelope::parse(b"[]");
        assert_eq!(
            classify_envelope(&envelope, THRESHOLD),
            RoutingCategory::Standard
        );
    }

    #[test]
    fn malformed_bodies_are_standard() {
        let envelope = RequestEnvelope::parse(b"{nope");
        assert_eq!(
            classify_envelope(&envelope, THRESHOLD),
            RoutingCategory::Standard
        );
    }
}
