//! Canonical cache keys.
//!
//! A key is `operation` plus three sorted term lists: criteria
//! `(field, modifier, value, value2)`, request flags, and extra scalar
//! parameters. Sorting makes the key independent of construction order; every
//! term is rendered as compact JSON so values cannot collide with separators.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::filter::{FilterSet, SceneQuery};

/// Deterministic key for one cached fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(operation: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            operation: operation.to_string(),
            criteria: Vec::new(),
            flags: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operation name the key was built for.
    pub fn operation(&self) -> &str {
        self.0.split('|').next().unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects key terms; ordering of calls does not affect the result.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    operation: String,
    criteria: Vec<String>,
    flags: Vec<String>,
    params: Vec<String>,
}

impl CacheKeyBuilder {
    /// Add every criterion and both toggles of a filter set.
    pub fn filters(mut self, filters: &FilterSet) -> Self {
        for criterion in filters.criteria() {
            let term = Value::Array(vec![
                Value::from(criterion.field().as_str()),
                Value::from(criterion.modifier().as_str()),
                serde_json::to_value(criterion.value()).unwrap_or(Value::Null),
                criterion
                    .value2()
                    .and_then(|v| serde_json::to_value(v).ok())
                    .unwrap_or(Value::Null),
            ]);
            self.criteria.push(term.to_string());
        }
        self.flags
            .push(format!("favorites_only={}", filters.is_favorites_only()));
        self.flags
            .push(format!("organized_only={}", filters.is_organized_only()));
        self
    }

    /// Add a scene query: its filter set plus the tag filter.
    pub fn scene_query(self, query: &SceneQuery) -> Self {
        let mut builder = self.filters(query.filters());
        if let Some(tags) = query.tags() {
            let mut names: Vec<&str> = tags.names.iter().map(String::as_str).collect();
            names.sort_unstable();
            names.dedup();
            let mode = serde_json::to_value(tags.mode).unwrap_or(Value::Null);
            builder = builder.param("tags", serde_json::json!([mode, names]));
        }
        builder
    }

    /// Add an extra scalar parameter.
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.push(format!("{}={}", name, value.into()));
        self
    }

    pub fn build(mut self) -> CacheKey {
        self.criteria.sort();
        self.flags.sort();
        self.params.sort();
        CacheKey(format!(
            "{}|c[{}]|f[{}]|p[{}]",
            self.operation,
            self.criteria.join(";"),
            self.flags.join(";"),
            self.params.join(";"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCriterion, FilterField, FilterModifier, FilterValue};
    use proptest::prelude::*;

    fn criteria() -> Vec<FilterCriterion> {
        vec![
            FilterCriterion::text_equals(FilterField::Country, "USA").unwrap(),
            FilterCriterion::text_equals(FilterField::Ethnicity, "Asian").unwrap(),
            FilterCriterion::typed(
                FilterField::HeightCm,
                FilterModifier::Between,
                FilterValue::Int(160),
                Some(FilterValue::Int(175)),
            )
            .unwrap(),
            FilterCriterion::typed(
                FilterField::Weight,
                FilterModifier::LessThan,
                FilterValue::Int(60),
                None,
            )
            .unwrap(),
            FilterCriterion::parse("tattoos", None, &serde_json::json!("rose"), None).unwrap(),
        ]
    }

    fn key_for(order: &[usize], favorites: bool) -> CacheKey {
        let all = criteria();
        let mut set = FilterSet::new().favorites_only(favorites);
        for &i in order {
            set.insert(all[i].clone());
        }
        CacheKey::builder("performers").filters(&set).build()
    }

    #[test]
    fn test_key_shape() {
        let key = key_for(&[1, 0], true);
        assert_eq!(
            key.as_str(),
            r#"performers|c[["country","EQUALS","USA",null];["ethnicity","EQUALS","Asian",null]]|f[favorites_only=true;organized_only=false]|p[]"#
        );
        assert_eq!(key.operation(), "performers");
    }

    #[test]
    fn test_flags_and_params_change_key() {
        assert_ne!(key_for(&[0], true), key_for(&[0], false));
        let a = CacheKey::builder("performer").param("name", "Jane").build();
        let b = CacheKey::builder("performer").param("name", "Janet").build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_param_order_irrelevant() {
        let a = CacheKey::builder("scenes_for")
            .param("name", "Jane")
            .param("organized_only", true)
            .build();
        let b = CacheKey::builder("scenes_for")
            .param("organized_only", true)
            .param("name", "Jane")
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_separator_in_value_does_not_collide() {
        let a = CacheKey::builder("performer").param("name", "a;b=c").build();
        let b = CacheKey::builder("performer")
            .param("name", "a")
            .param("b", "c")
            .build();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_construction_order_does_not_change_key(
            order in Just(vec![0usize, 1, 2, 3, 4]).prop_shuffle(),
            favorites in any::<bool>(),
        ) {
            prop_assert_eq!(key_for(&order, favorites), key_for(&[0, 1, 2, 3, 4], favorites));
        }
    }
}
