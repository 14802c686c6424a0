//! Analysis engine: derived reports composed from cached catalogue fetches.
//!
//! Reports are never cached themselves. Their inputs come from
//! [`CatalogService`], so recomputing a report over warm inputs costs no
//! remote calls.
//!
//! | Report | Inputs |
//! |---|---|
//! | [`PerformerReport`] | performer, similar listing, performer scenes |
//! | [`BatchReport`] | one performer lookup per name |
//! | [`LibraryStats`] | favorite listing |
//! | [`RecommendationReport`] | favorite listing |

mod batch;
mod library;
mod performer;
mod recommend;

pub use batch::{select_names, BatchOutcome, BatchReport, BatchSummary, Demographics};
pub use library::{LibraryStats, MeasureSummary};
pub use performer::{
    AnalysisOptions, PerformerReport, ProfileSummary, RatedScene, RatingBuckets, SceneAnalysis,
    SimilarPerformer, TagCount,
};
pub use recommend::{keywords, Recommendation, RecommendationReport};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::CatalogService;
use crate::types::AnalysisConfig;

/// Bucket label for performers without a recorded value.
pub const UNKNOWN: &str = "Unknown";

/// Entry point for all derived reports.
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    catalog: Arc<CatalogService>,
    config: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(catalog: Arc<CatalogService>, config: AnalysisConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Arc<CatalogService> {
        &self.catalog
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}

/// One value of a categorical distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub value: String,
    pub count: usize,
}

/// Count values, folding missing ones into [`UNKNOWN`].
///
/// Ordered by count descending, ties alphabetically, so the counts always
/// sum to the number of inputs.
pub fn distribution<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Vec<Bucket> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value.unwrap_or(UNKNOWN)).or_default() += 1;
    }
    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(value, count)| Bucket {
            value: value.to_string(),
            count,
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    buckets
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory gateway for analysis tests.
    //!
    //! Understands the predicate subset the catalogue produces: favorites,
    //! text `EQUALS` criteria, and performer-name scene filters.

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::catalog::CatalogService;
    use crate::filter::Predicate;
    use crate::gateway::{Performer, Scene, StashGateway, Tag};
    use crate::types::{AnalysisConfig, CacheConfig, Error, Result};

    use super::AnalysisEngine;

    #[derive(Debug, Default)]
    pub struct FakeGateway {
        pub performers: Vec<Performer>,
        pub scenes: Vec<Scene>,
        pub tags: Vec<Tag>,
        pub fail_scenes: bool,
        pub fail_listings: bool,
        pub fail_lookup_for: Option<String>,
        pub calls: AtomicUsize,
    }

    pub fn performer(id: &str, name: &str, extra: Value) -> Performer {
        let mut record = json!({"id": id, "name": name});
        if let (Some(base), Some(extra)) = (record.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(record).unwrap()
    }

    pub fn scene(id: &str, rating: Option<i64>, organized: bool, performer: &str, tags: &[&str]) -> Scene {
        let tags: Vec<Value> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| json!({"id": format!("t{i}-{t}"), "name": t}))
            .collect();
        serde_json::from_value(json!({
            "id": id,
            "title": format!("Scene {id}"),
            "rating100": rating,
            "organized": organized,
            "performers": [{"id": "p", "name": performer}],
            "tags": tags,
        }))
        .unwrap()
    }

    fn text_matches(performer: &Performer, key: &str, criterion: &Value) -> bool {
        let Some(field) = key.parse::<crate::filter::FilterField>().ok() else {
            return true;
        };
        let expected = criterion.get("value").and_then(Value::as_str).unwrap_or_default();
        performer
            .text(field)
            .is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
    }

    #[async_trait]
    impl StashGateway for FakeGateway {
        async fn version(&self) -> Result<String> {
            Ok("fake".to_string())
        }

        async fn find_performer(&self, name: &str) -> Result<Option<Performer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_lookup_for.as_deref() == Some(name) {
                return Err(Error::connectivity("lookup timed out"));
            }
            Ok(self.performers.iter().find(|p| p.answers_to(name)).cloned())
        }

        async fn find_performers(&self, predicate: &Predicate) -> Result<Vec<Performer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listings {
                return Err(Error::connectivity("listing refused"));
            }
            let filter = predicate.as_json();
            let favorites = filter.get("filter_favorites").and_then(Value::as_bool).unwrap_or(false);
            Ok(self
                .performers
                .iter()
                .filter(|p| !favorites || p.favorite)
                .filter(|p| {
                    filter
                        .as_object()
                        .into_iter()
                        .flatten()
                        .filter(|(k, _)| k.as_str() != "filter_favorites")
                        .all(|(k, v)| text_matches(p, k, v))
                })
                .cloned()
                .collect())
        }

        async fn find_scenes(&self, predicate: &Predicate) -> Result<Vec<Scene>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_scenes {
                return Err(Error::remote("scene query rejected"));
            }
            let name = predicate
                .get("performers_filter")
                .and_then(|f| f.pointer("/name/value"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let organized = predicate.get("organized").and_then(Value::as_bool).unwrap_or(false);
            Ok(self
                .scenes
                .iter()
                .filter(|s| !organized || s.organized)
                .filter(|s| {
                    name.as_deref()
                        .map_or(true, |n| s.performers.iter().any(|p| p.name.eq_ignore_ascii_case(n)))
                })
                .cloned()
                .collect())
        }

        async fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
            Ok(self.tags.iter().find(|t| t.answers_to(name)).cloned())
        }

        fn endpoint(&self) -> String {
            "http://fake".to_string()
        }
    }

    pub fn engine(gateway: FakeGateway) -> (AnalysisEngine, Arc<FakeGateway>) {
        let gateway = Arc::new(gateway);
        let catalog = Arc::new(CatalogService::new(
            Arc::clone(&gateway) as Arc<dyn StashGateway>,
            CacheConfig::default(),
        ));
        (AnalysisEngine::new(catalog, AnalysisConfig::default()), gateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_orders_and_counts_unknown() {
        let buckets = distribution([Some("USA"), None, Some("Japan"), Some("USA"), Some("Brazil"), None]);
        let pairs: Vec<(&str, usize)> = buckets.iter().map(|b| (b.value.as_str(), b.count)).collect();
        assert_eq!(
            pairs,
            vec![("USA", 2), ("Unknown", 2), ("Brazil", 1), ("Japan", 1)]
        );
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 6);
    }

    #[test]
    fn test_distribution_empty() {
        assert!(distribution(std::iter::empty()).is_empty());
    }
}
