//! Remote query gateway: the only component that talks to Stash.
//!
//! The rest of the crate depends on the [`StashGateway`] trait; the GraphQL
//! client is one implementation, test fakes are others.

mod client;
mod connector;
mod records;

pub use client::GraphqlGateway;
pub use connector::{ConnectionState, Connector};
pub use records::{Performer, PerformerRef, Scene, Tag, TagRef};

use async_trait::async_trait;

use crate::filter::Predicate;
use crate::types::Result;

/// Read-only access to the Stash catalogue.
///
/// Transport and auth failures surface as `Error::Connectivity`; rejected
/// queries as `Error::Remote`. Lookups by name return `Ok(None)` when nothing
/// matches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StashGateway: Send + Sync {
    /// Server version string; doubles as the connectivity probe.
    async fn version(&self) -> Result<String>;

    /// Case-insensitive exact name match, falling back to aliases.
    async fn find_performer(&self, name: &str) -> Result<Option<Performer>>;

    async fn find_performers(&self, predicate: &Predicate) -> Result<Vec<Performer>>;

    async fn find_scenes(&self, predicate: &Predicate) -> Result<Vec<Scene>>;

    async fn find_tag(&self, name: &str) -> Result<Option<Tag>>;

    /// Base URL, for health reporting.
    fn endpoint(&self) -> String;
}
