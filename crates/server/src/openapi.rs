// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! `OpenAPI` documentation module
//!
//! This module provides the `OpenAPI` specification and `Swagger UI` endpoints for API documentation.

use axum::{Json, response::Html};
use backends::ChainSummary;
use shared_types::CacheStatus;
use utoipa::OpenApi;

use crate::{
    routes::handlers,
    state::{HealthCheck, HealthStatus},
};

/// `OpenAPI` document of the gateway
#[derive(OpenApi)]
#[openapi(
    info(
        title = "NullRPC",
        description = "Multi-chain JSON-RPC gateway with routing, response caching and per-plan rate limits"
    ),
    paths(
        handlers::health_handler,
        handlers::rpc_handler,
        handlers::authenticated_rpc_handler,
        handlers::chain_summary_handler,
    ),
    components(schemas(HealthCheck, HealthStatus, ChainSummary, CacheStatus)),
    tags(
        (name = "health", description = "Service health"),
        (name = "rpc", description = "JSON-RPC forwarding and traffic summaries")
    )
)]
pub struct ApiDoc;

/// `OpenAPI` specification endpoint
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Swagger UI endpoint
pub async fn swagger_ui() -> Html<&'static str> {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>NullRPC API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css" />
    <style>
        html { box-sizing: border-box; overflow-y: scroll; }
        *, *:before, *:after { box-sizing: inherit; }
        body { margin:0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: '/api-doc/openapi.json',
                dom_id: '#swagger-ui',
                deepLinking: true
            });
        }
    </script>
</body>
</html>
"#;
    Html(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_gateway_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        assert!(paths.contains(&"/health"));
        assert!(paths.contains(&"/{chain}"));
        assert!(paths.contains(&"/{chain}/{token}"));
        assert_eq!(doc.info.title, "NullRPC");
    }
}
