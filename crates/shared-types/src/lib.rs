// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the NullRPC gateway
//!
//! This crate provides common types that are shared across multiple crates
//! in the gateway workspace, avoiding circular dependencies.

pub mod chains;
pub mod plans;
pub mod rpc;

pub use chains::{ChainConfig, ChainSlug, ChainSlugParseError};
pub use plans::{Plan, PlanParseError};
pub use rpc::{CacheStatus, RequestEnvelope, RoutingCategory, RpcCall, UNKNOWN_METHOD};
