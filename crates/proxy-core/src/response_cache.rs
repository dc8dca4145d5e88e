// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Response cache on top of a [`CacheStore`]
//!
//! Cache problems never fail a call: a store error on read is a miss and a
//! store error on write is logged and forgotten.

use std::{sync::Arc, time::Duration};

use backends::CacheStore;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache_policy::CacheFingerprint;

/// Fingerprint-keyed response cache
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    /// Create a cache writing to `store`
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Fetch a cached response body
    pub async fn get(&self, fingerprint: &CacheFingerprint) -> Option<Bytes> {
        match self.store.get(fingerprint.as_str()).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a response body, returning whether it was written
    ///
    /// JSON-RPC error responses are never stored.
    pub async fn put(&self, fingerprint: &CacheFingerprint, body: Bytes, ttl: Duration) -> bool {
        if ttl.is_zero() || is_error_response(&body) {
            debug!(fingerprint = %fingerprint, "response not cacheable");
            return false;
        }

        match self.store.put(fingerprint.as_str(), body, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cache write failed");
                false
            }
        }
    }
}

/// Whether a body is a JSON-RPC error response, or no JSON at all
pub fn is_error_response(body: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => object.contains_key("error"),
        Ok(_) => false,
        // unparseable bodies are not worth keeping either
        Err(_) => true,
    }
}

/// Replace the `id` of a cached single-call response with the caller's id
///
/// Bodies that are not a JSON object are returned unchanged.
pub fn with_request_id(body: &Bytes, id: &Value) -> Bytes {
    let Ok(Value::Object(mut object)) = serde_json::from_slice::<Value>(body) else {
        return body.clone();
    };
    if object.get("id") == Some(id) {
        return body.clone();
    }
    object.insert("id".to_string(), id.clone());
    serde_json::to_vec(&object).map_or_else(|_| body.clone(), Bytes::from)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use backends::{MemoryCacheStore, StoreError, StoreResult};
    use mockall::mock;
    use serde_json::json;
    use shared_types::ChainSlug;

    use super::*;
    use crate::cache_policy::CachePolicy;

    mock! {
        Store {}

        #[async_trait]
        impl CacheStore for Store {
            async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;
            async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()>;
        }
    }

    impl std::fmt::Debug for MockStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockStore").finish_non_exhaustive()
        }
    }

    fn fingerprint(body: &[u8]) -> CacheFingerprint {
        CachePolicy::default().fingerprint(&ChainSlug::new("eth").unwrap(), body)
    }

    #[tokio::test(start_paused = true)]
    async fn round_trip_within_ttl() {
        let cache = ResponseCache::new(Arc::new(MemoryCacheStore::default()));
        let key = fingerprint(br#"{"id":1,"method":"eth_chainId"}"#);
        let response = Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#);

        assert!(cache.get(&key).await.is_none());
        assert!(cache.put(&key, response.clone(), Duration::from_secs(900)).await);
        assert_eq!(cache.get(&key).await, Some(response));

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn error_responses_are_not_stored() {
        let cache = ResponseCache::new(Arc::new(MemoryCacheStore::default()));
        let key = fingerprint(br#"{"id":1,"method":"eth_call"}"#);
        let error = Bytes::from_static(
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#,
        );

        assert!(!cache.put(&key, error, Duration::from_secs(1)).await);
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn store_failures_are_misses() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .returning(|_| Err(StoreError::unavailable("down")));
        store
            .expect_put()
            .returning(|_, _, _| Err(StoreError::unavailable("down")));

        let cache = ResponseCache::new(Arc::new(store));
        let key = fingerprint(br#"{"id":1,"method":"eth_chainId"}"#);

        assert!(cache.get(&key).await.is_none());
        let response = Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#);
        assert!(!cache.put(&key, response, Duration::from_secs(1)).await);
    }

    #[test]
    fn error_response_detection() {
        assert!(is_error_response(br#"{"id":1,"error":{"code":-1}}"#));
        assert!(!is_error_response(br#"{"id":1,"result":null}"#));
        assert!(!is_error_response(br#"[{"id":1,"error":{}}]"#));
        assert!(is_error_response(b"<html>"));
    }

    #[test]
    fn request_id_rewrite() {
        let cached = Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#);

        let rewritten = with_request_id(&cached, &json!("abc"));
        let value: Value = serde_json::from_slice(&rewritten).unwrap();
        assert_eq!(value["id"], json!("abc"));
        assert_eq!(value["result"], json!("0x1"));

        assert_eq!(with_request_id(&cached, &json!(1)), cached);

        let garbage = Bytes::from_static(b"nope");
        assert_eq!(with_request_id(&garbage, &json!(1)), garbage);
    }
}
