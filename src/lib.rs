//! # Stash MCP - Model Context Protocol server for a Stash media catalogue
//!
//! Exposes a Stash instance to MCP clients over stdio:
//! - Filter compilation from loosely-typed tool arguments to remote predicates
//! - A shared TTL cache with single-flight fetches and hit/miss statistics
//! - A GraphQL gateway with bounded startup retry
//! - Derived reports: performer analysis, batch insights, library statistics,
//!   keyword recommendations
//! - JSON-RPC 2.0 tools, prompts and resources
//!
//! ## Architecture
//!
//! ```text
//!   stdin  → StdioServer → StashServer ─┬─ tools ───────────┐
//!   stdout ←                            ├─ prompts          │
//!                                       └─ resources ─┐     │
//!                                                     ▼     ▼
//!                         AnalysisEngine ──────→ CatalogService
//!                                                  │  CacheStore (TTL, single-flight)
//!                                                  ▼
//!                                             StashGateway (GraphQL)
//! ```
//!
//! Filters are validated before any remote call; every remote fetch goes
//! through the one [`cache::CacheStore`] owned by [`catalog::CatalogService`].

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod analysis;
pub mod cache;
pub mod catalog;
pub mod filter;
pub mod gateway;
pub mod mcp;
pub mod types;

pub mod observability;

pub use analysis::AnalysisEngine;
pub use catalog::CatalogService;
pub use gateway::{Connector, GraphqlGateway, StashGateway};
pub use mcp::{StashServer, StdioServer};
pub use types::{Config, Error, Result};
