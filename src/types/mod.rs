//! Core types for the Stash MCP server.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (PerformerId, SceneId, TagId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the connection, cache and analysis

mod config;
mod errors;
mod ids;

pub use config::{AnalysisConfig, CacheConfig, Config, ObservabilityConfig, StashConfig};
pub use errors::{Error, Result};
pub use ids::{PerformerId, SceneId, TagId};
