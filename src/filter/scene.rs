//! Scene listing filters: organized toggle, tag inclusion/exclusion, rating range.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::compiler::{bool_param, criterion_predicate, FilterSet, Predicate};
use super::criterion::{FilterCriterion, FilterError, FilterField, FilterModifier, FilterValue};
use crate::types::TagId;

const SCENE_PARAMS: [&str; 5] = [
    "organized_only",
    "include_tags",
    "exclude_tags",
    "min_rating",
    "max_rating",
];

/// Whether listed tags must be present or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagMode {
    Includes,
    Excludes,
}

/// Tag names to include or exclude; resolved to ids just before the fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFilter {
    pub mode: TagMode,
    pub names: Vec<String>,
}

/// A compiled scene listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SceneQuery {
    filters: FilterSet,
    tags: Option<TagFilter>,
}

impl SceneQuery {
    pub fn new(filters: FilterSet, tags: Option<TagFilter>) -> Self {
        Self { filters, tags }
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn tags(&self) -> Option<&TagFilter> {
        self.tags.as_ref()
    }

    /// Serialize with tag names already resolved to `tag_ids`.
    ///
    /// Scenes without any tag are always excluded.
    pub fn to_predicate(&self, tag_ids: &[TagId]) -> Predicate {
        let mut predicate = Predicate::new();
        if self.filters.is_organized_only() {
            predicate.set("organized", Value::Bool(true));
        }
        predicate.set("tag_count", json!({"value": 0, "modifier": "GREATER_THAN"}));
        if let Some(tags) = &self.tags {
            predicate.set("tags", json!({"value": tag_ids, "modifier": tags.mode}));
        }
        for criterion in self.filters.criteria() {
            predicate.set(criterion.field().as_str(), criterion_predicate(criterion));
        }
        predicate
    }
}

/// Compile scene listing parameters.
pub fn compile_scene_filters(params: &Map<String, Value>) -> Result<SceneQuery, FilterError> {
    if let Some(unknown) = params.keys().find(|k| !SCENE_PARAMS.contains(&k.as_str())) {
        return Err(FilterError::InvalidField {
            field: unknown.clone(),
        });
    }

    let organized_only = bool_param(params, "organized_only")?.unwrap_or(true);
    let mut filters = FilterSet::new().organized_only(organized_only);

    let min = rating_param(params, "min_rating")?;
    let max = rating_param(params, "max_rating")?;
    if let Some(rating) = rating_criterion(min, max)? {
        filters.insert(rating);
    }

    let include = tag_names(params, "include_tags")?;
    let exclude = tag_names(params, "exclude_tags")?;
    let tags = match (include, exclude) {
        (Some(names), exclude) => {
            if exclude.is_some() {
                tracing::warn!("include_tags and exclude_tags both given; include takes precedence");
            }
            Some(TagFilter {
                mode: TagMode::Includes,
                names,
            })
        }
        (None, Some(names)) => Some(TagFilter {
            mode: TagMode::Excludes,
            names,
        }),
        (None, None) => None,
    };

    Ok(SceneQuery { filters, tags })
}

/// Inclusive rating bounds to a `rating100` criterion.
///
/// Both bounds → `BETWEEN`; a lone minimum → `GREATER_THAN min-1`; a lone
/// maximum → `LESS_THAN max+1`. A lone minimum of 0 admits every rating and
/// yields no criterion. `min > max` is an [`FilterError::InvalidValue`].
pub fn rating_criterion(
    min: Option<i64>,
    max: Option<i64>,
) -> Result<Option<FilterCriterion>, FilterError> {
    let (modifier, value, value2) = match (min, max) {
        (Some(lo), Some(hi)) if lo > hi => {
            return Err(FilterError::invalid_value(
                "min_rating",
                &Value::from(lo),
                format!("must not exceed max_rating ({hi})"),
            ))
        }
        (Some(lo), Some(hi)) => (FilterModifier::Between, lo, Some(hi)),
        (Some(0), None) => return Ok(None),
        (Some(lo), None) => (FilterModifier::GreaterThan, lo - 1, None),
        (None, Some(hi)) => (FilterModifier::LessThan, hi + 1, None),
        (None, None) => return Ok(None),
    };
    FilterCriterion::typed(
        FilterField::Rating100,
        modifier,
        FilterValue::Int(value),
        value2.map(FilterValue::Int),
    )
    .map(Some)
}

fn rating_param(params: &Map<String, Value>, key: &str) -> Result<Option<i64>, FilterError> {
    let Some(raw) = params.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if (0..=100).contains(&n) => Ok(Some(n)),
        Some(_) => Err(FilterError::invalid_value(key, raw, "rating must be between 0 and 100")),
        None => Err(FilterError::invalid_value(key, raw, "expected an integer")),
    }
}

/// Comma-separated names (or a JSON array of names), trimmed, blanks dropped.
fn tag_names(params: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>, FilterError> {
    let names: Vec<String> = match params.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| FilterError::invalid_value(key, v, "tag names must be strings"))
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(FilterError::invalid_value(
                key,
                other,
                "expected comma-separated tag names",
            ))
        }
    };
    let names: Vec<String> = names.into_iter().filter(|n| !n.is_empty()).collect();
    Ok((!names.is_empty()).then_some(names))
}
