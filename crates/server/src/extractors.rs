// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Custom extractors
//!
//! Path segments are validated into domain types here so handlers only see
//! well-formed chain slugs and a resolved client address.

use std::{
    convert::Infallible,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path},
    http::{HeaderMap, request::Parts},
};
use shared_types::ChainSlug;
use tracing::debug;

use crate::{error::ServerError, state::ServerState};

/// Header carrying the original client address behind a proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Address the public rate limit is applied to
///
/// With `trusted_proxies` enabled the first `X-Forwarded-For` entry wins;
/// otherwise, or when the header is absent or unparseable, the socket peer
/// address is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl FromRequestParts<ServerState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        if state.config().trusted_proxies
            && let Some(ip) = forwarded_for(&parts.headers)
        {
            return Ok(Self(ip));
        }

        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| {
                addr.ip()
            });
        Ok(Self(ip))
    }
}

/// First address of `X-Forwarded-For`
pub fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get(FORWARDED_FOR_HEADER)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    match first.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            debug!(value, "unparseable x-forwarded-for header");
            None
        }
    }
}

/// Validate a chain path segment
pub fn parse_chain(chain: &str) -> Result<ChainSlug, ServerError> {
    ChainSlug::new(chain).map_err(|source| ServerError::InvalidChain {
        chain: chain.to_string(),
        source,
    })
}

/// Chain slug taken from the first path parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPath(pub ChainSlug);

impl<S> FromRequestParts<S> for ChainPath
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(chain) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ServerError::InvalidPath {
                message: e.body_text(),
            })?;
        parse_chain(&chain).map(Self)
    }
}

/// Chain slug and access token taken from the path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPath {
    /// Addressed chain
    pub chain: ChainSlug,
    /// Caller's access token
    pub token: String,
}

impl<S> FromRequestParts<S> for TokenPath
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((chain, token)) = Path::<(String, String)>::from_request_parts(parts, state)
            .await
            .map_err(|e| ServerError::InvalidPath {
                message: e.body_text(),
            })?;
        Ok(Self {
            chain: parse_chain(&chain)?,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_for(&headers), None);

        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(
            forwarded_for(&headers),
            Some("203.0.113.7".parse().unwrap())
        );

        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("2001:db8::1"));
        assert_eq!(forwarded_for(&headers), Some("2001:db8::1".parse().unwrap()));

        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("unknown"));
        assert_eq!(forwarded_for(&headers), None);
    }

    #[test]
    fn chain_segments_are_validated() {
        assert_eq!(parse_chain("eth").unwrap(), ChainSlug::new("eth").unwrap());
        assert!(matches!(
            parse_chain("Eth!"),
            Err(ServerError::InvalidChain { .. })
        ));
        assert!(parse_chain(&"a".repeat(33)).is_err());
    }
}
