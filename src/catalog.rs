//! Cached catalogue operations.
//!
//! [`CatalogService`] is the single entry point to remote data for both the
//! tool adapters and the analysis engine. Every operation derives a
//! [`CacheKey`] and goes through one shared [`CacheStore`], so an analysis
//! that needs a listing a tool call already fetched does not hit Stash again.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKey, CacheStats, CacheStore};
use crate::filter::{
    performer_predicate, performer_scenes_predicate, FilterSet, Predicate, SceneQuery,
};
use crate::gateway::{Performer, Scene, StashGateway, Tag};
use crate::types::{CacheConfig, Error, Result, TagId};

const OP_PERFORMER: &str = "performer";
const OP_PERFORMERS: &str = "performers";
const OP_FAVORITES: &str = "favorite_performers";
const OP_SCENES: &str = "scenes";
const OP_PERFORMER_SCENES: &str = "performer_scenes";
const OP_TAG: &str = "tag";

/// Values held by the shared cache. Listings are reference-counted so hits
/// are cheap to hand out.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Performer(Option<Arc<Performer>>),
    Performers(Arc<Vec<Performer>>),
    Scenes(Arc<Vec<Scene>>),
    Tag(Option<Tag>),
}

pub struct CatalogService {
    gateway: Arc<dyn StashGateway>,
    cache: CacheStore<CachedValue>,
    ttl: CacheConfig,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("endpoint", &self.gateway.endpoint())
            .field("cache", &self.cache)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CatalogService {
    pub fn new(gateway: Arc<dyn StashGateway>, ttl: CacheConfig) -> Self {
        Self {
            gateway,
            cache: CacheStore::new(),
            ttl,
        }
    }

    pub fn endpoint(&self) -> String {
        self.gateway.endpoint()
    }

    /// Uncached connectivity probe.
    pub async fn ping(&self) -> Result<String> {
        self.gateway.version().await
    }

    /// Performer by name or alias. A miss is cached like any other answer.
    pub async fn performer(&self, name: &str) -> Result<Option<Arc<Performer>>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("performer name must not be empty"));
        }
        let key = CacheKey::builder(OP_PERFORMER)
            .param("name", name.to_lowercase())
            .build();
        let gateway = Arc::clone(&self.gateway);
        let value = self
            .cache
            .get_or_fetch(&key, self.ttl.lookup_ttl, || async move {
                let found = gateway.find_performer(name).await?;
                Ok(CachedValue::Performer(found.map(Arc::new)))
            })
            .await?;
        match value {
            CachedValue::Performer(found) => Ok(found),
            other => Err(mismatch(&key, &other)),
        }
    }

    /// Performer listing for a compiled filter set.
    pub async fn performers(&self, filters: &FilterSet) -> Result<Arc<Vec<Performer>>> {
        let key = CacheKey::builder(OP_PERFORMERS).filters(filters).build();
        tracing::debug!(filters = %filters.describe(), "performer listing");
        self.performer_listing(key, filters, self.ttl.listing_ttl).await
    }

    /// All favorite performers, held for the longer statistics TTL.
    pub async fn favorite_performers(&self) -> Result<Arc<Vec<Performer>>> {
        let filters = FilterSet::new().favorites_only(true);
        let key = CacheKey::builder(OP_FAVORITES).filters(&filters).build();
        self.performer_listing(key, &filters, self.ttl.stats_ttl).await
    }

    async fn performer_listing(
        &self,
        key: CacheKey,
        filters: &FilterSet,
        ttl: Duration,
    ) -> Result<Arc<Vec<Performer>>> {
        let predicate = performer_predicate(filters);
        let gateway = Arc::clone(&self.gateway);
        let value = self
            .cache
            .get_or_fetch(&key, ttl, || async move {
                let performers = gateway.find_performers(&predicate).await?;
                Ok(CachedValue::Performers(Arc::new(performers)))
            })
            .await?;
        match value {
            CachedValue::Performers(list) => Ok(list),
            other => Err(mismatch(&key, &other)),
        }
    }

    /// Scene listing. Tag names are resolved to ids first; an unknown tag is
    /// reported as `NotFound` and nothing is fetched.
    pub async fn scenes(&self, query: &SceneQuery) -> Result<Arc<Vec<Scene>>> {
        let mut tag_ids: Vec<TagId> = Vec::new();
        if let Some(tags) = query.tags() {
            let lookups = futures::future::try_join_all(tags.names.iter().map(|n| self.tag(n))).await?;
            for (name, tag) in tags.names.iter().zip(lookups) {
                match tag {
                    Some(tag) => tag_ids.push(tag.id),
                    None => return Err(Error::not_found(format!("tag '{name}'"))),
                }
            }
        }

        let key = CacheKey::builder(OP_SCENES).scene_query(query).build();
        let predicate = query.to_predicate(&tag_ids);
        self.scene_listing(key, predicate, self.ttl.listing_ttl).await
    }

    /// Scenes featuring one performer, optionally organized only.
    pub async fn performer_scenes(&self, name: &str, organized_only: bool) -> Result<Arc<Vec<Scene>>> {
        let name = name.trim();
        let key = CacheKey::builder(OP_PERFORMER_SCENES)
            .param("name", name.to_lowercase())
            .param("organized_only", organized_only)
            .build();
        let predicate = performer_scenes_predicate(name, organized_only);
        self.scene_listing(key, predicate, self.ttl.listing_ttl).await
    }

    async fn scene_listing(
        &self,
        key: CacheKey,
        predicate: Predicate,
        ttl: Duration,
    ) -> Result<Arc<Vec<Scene>>> {
        let gateway = Arc::clone(&self.gateway);
        let value = self
            .cache
            .get_or_fetch(&key, ttl, || async move {
                let scenes = gateway.find_scenes(&predicate).await?;
                Ok(CachedValue::Scenes(Arc::new(scenes)))
            })
            .await?;
        match value {
            CachedValue::Scenes(list) => Ok(list),
            other => Err(mismatch(&key, &other)),
        }
    }

    /// Tag by name or alias.
    pub async fn tag(&self, name: &str) -> Result<Option<Tag>> {
        let name = name.trim();
        let key = CacheKey::builder(OP_TAG)
            .param("name", name.to_lowercase())
            .build();
        let gateway = Arc::clone(&self.gateway);
        let value = self
            .cache
            .get_or_fetch(&key, self.ttl.lookup_ttl, || async move {
                Ok(CachedValue::Tag(gateway.find_tag(name).await?))
            })
            .await?;
        match value {
            CachedValue::Tag(tag) => Ok(tag),
            other => Err(mismatch(&key, &other)),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached entry; returns how many were removed.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        tracing::info!(removed, "cache cleared");
        removed
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.cache.invalidate(key)
    }

    /// Evict expired entries eagerly.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

fn mismatch(key: &CacheKey, value: &CachedValue) -> Error {
    Error::internal(format!("cache entry {key} holds unexpected {value:?}"))
}
