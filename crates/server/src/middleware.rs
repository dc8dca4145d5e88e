// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware module for HTTP request processing
//!
//! Attaches chain context to the tracing span of every JSON-RPC route so log
//! lines emitted by the gateway carry the addressed chain.

use axum::{http::Request, middleware::Next, response::Response};
use shared_types::ChainSlug;
use tokio::time::Instant;
use tracing::{Instrument, Level, debug, span};

/// Path context of a chain-addressed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRoute {
    /// Addressed chain
    pub chain: ChainSlug,
    /// Whether the path carries an access token
    pub authenticated: bool,
}

/// Read chain context from a request path
///
/// Returns `None` when the first segment is not a valid slug; the handler
/// rejects those with a proper error.
pub fn chain_route(path: &str) -> Option<ChainRoute> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let chain = ChainSlug::new(segments.next()?).ok()?;
    Some(ChainRoute {
        chain,
        authenticated: segments.next().is_some(),
    })
}

/// Wraps chain routes in a `chain_request` span
pub async fn chain_span_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let Some(route) = chain_route(req.uri().path()) else {
        return next.run(req).await;
    };

    // Access tokens stay out of the span.
    let span = span!(
        Level::INFO,
        "chain_request",
        chain = %route.chain,
        authenticated = route.authenticated,
        method = %req.method(),
    );

    let started = Instant::now();
    let response = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| {
        debug!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            "chain request finished"
        );
    });
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_and_token_paths() {
        assert_eq!(
            chain_route("/eth"),
            Some(ChainRoute {
                chain: ChainSlug::new("eth").unwrap(),
                authenticated: false,
            })
        );
        assert_eq!(
            chain_route("/base-sepolia/secret"),
            Some(ChainRoute {
                chain: ChainSlug::new("base-sepolia").unwrap(),
                authenticated: true,
            })
        );
    }

    #[test]
    fn invalid_first_segment_has_no_route() {
        assert_eq!(chain_route("/"), None);
        assert_eq!(chain_route("/ETH"), None);
        assert_eq!(chain_route("/not.a.slug/x"), None);
    }
}
