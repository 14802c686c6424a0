//! Filter compiler: raw tool parameters to [`FilterSet`] to remote predicate.
//!
//! Tool callers send flat parameters (`height_cm`, `height_cm_modifier`,
//! `height_cm_value2`). The compiler groups them into one [`FieldFilter`] per
//! field and validates each group as a unit, so a modifier can never be
//! applied to the wrong field. Any validation failure aborts the whole
//! compilation; no partial predicate is produced.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::criterion::{FilterCriterion, FilterError, FilterField, FilterModifier, FilterValue};

const MODIFIER_SUFFIX: &str = "_modifier";
const VALUE2_SUFFIX: &str = "_value2";

// =============================================================================
// Filter set
// =============================================================================

/// Validated criteria for one request plus request-scoped toggles.
///
/// At most one criterion per field; inserting a second replaces the first in
/// place so construction order is otherwise preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSet {
    criteria: Vec<FilterCriterion>,
    favorites_only: bool,
    organized_only: bool,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn favorites_only(mut self, on: bool) -> Self {
        self.favorites_only = on;
        self
    }

    pub fn organized_only(mut self, on: bool) -> Self {
        self.organized_only = on;
        self
    }

    pub fn with(mut self, criterion: FilterCriterion) -> Self {
        self.insert(criterion);
        self
    }

    pub fn insert(&mut self, criterion: FilterCriterion) {
        match self
            .criteria
            .iter_mut()
            .find(|c| c.field() == criterion.field())
        {
            Some(existing) => *existing = criterion,
            None => self.criteria.push(criterion),
        }
    }

    pub fn criteria(&self) -> &[FilterCriterion] {
        &self.criteria
    }

    pub fn get(&self, field: FilterField) -> Option<&FilterCriterion> {
        self.criteria.iter().find(|c| c.field() == field)
    }

    pub fn is_favorites_only(&self) -> bool {
        self.favorites_only
    }

    pub fn is_organized_only(&self) -> bool {
        self.organized_only
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Short description for logs, e.g. `favorites, country EQUALS USA`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.favorites_only {
            parts.push("favorites".to_string());
        }
        if self.organized_only {
            parts.push("organized".to_string());
        }
        parts.extend(self.criteria.iter().map(FilterCriterion::describe));
        parts.join(", ")
    }
}

// =============================================================================
// Predicate
// =============================================================================

/// Predicate object in the shape the remote query layer expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Predicate(Map<String, Value>);

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Remote predicate object for one criterion.
#[derive(Debug, Serialize)]
struct CriterionInput<'a> {
    value: &'a FilterValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    value2: Option<&'a FilterValue>,
    modifier: &'static str,
}

/// Map one criterion to its predicate object.
///
/// Equality and inclusion carry one value; `GREATER_THAN` / `LESS_THAN` set a
/// single open bound; `BETWEEN` / `NOT_BETWEEN` carry the closed range
/// `[value, value2]`.
pub fn criterion_predicate(criterion: &FilterCriterion) -> Value {
    let input = CriterionInput {
        value: criterion.value(),
        value2: criterion
            .modifier()
            .takes_second_operand()
            .then(|| criterion.value2())
            .flatten(),
        modifier: criterion.modifier().as_str(),
    };
    serde_json::to_value(input).unwrap_or(Value::Null)
}

/// Serialize a performer filter set. Favorites is a top-level toggle.
pub fn performer_predicate(filters: &FilterSet) -> Predicate {
    let mut predicate = Predicate::new();
    for criterion in filters.criteria() {
        predicate.set(criterion.field().as_str(), criterion_predicate(criterion));
    }
    if filters.is_favorites_only() {
        predicate.set("filter_favorites", Value::Bool(true));
    }
    predicate
}

/// Scenes linked to a performer by exact name.
pub fn performer_scenes_predicate(performer_name: &str, organized_only: bool) -> Predicate {
    let mut predicate = Predicate::new();
    predicate.set(
        "performers_filter",
        json!({ "name": { "value": performer_name, "modifier": "EQUALS" } }),
    );
    if organized_only {
        predicate.set("organized", Value::Bool(true));
    }
    predicate
}

// =============================================================================
// Performer parameter compilation
// =============================================================================

/// One field's parameters, grouped from the flat tool arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    pub value: Option<Value>,
    pub modifier: Option<String>,
    pub value2: Option<Value>,
}

impl FieldFilter {
    /// Compile into a criterion, or `None` when no primary value was given.
    pub fn compile(&self, field: FilterField) -> Result<Option<FilterCriterion>, FilterError> {
        let Some(value) = self.value.as_ref().filter(|v| !v.is_null()) else {
            if self.modifier.is_some() || self.value2.is_some() {
                tracing::debug!(field = %field, "ignoring modifier/value2 without a value");
            }
            return Ok(None);
        };
        FilterCriterion::parse(
            field.as_str(),
            self.modifier.as_deref(),
            value,
            self.value2.as_ref(),
        )
        .map(Some)
    }
}

/// Group flat `<field>`, `<field>_modifier`, `<field>_value2` parameters.
///
/// Keys listed in `reserved` are skipped (request flags). Any other key that
/// does not resolve to a known field is an [`FilterError::InvalidField`].
pub fn group_field_params(
    params: &Map<String, Value>,
    fields: &[FilterField],
    reserved: &[&str],
) -> Result<BTreeMap<FilterField, FieldFilter>, FilterError> {
    let mut grouped: BTreeMap<FilterField, FieldFilter> = BTreeMap::new();

    for (key, value) in params {
        if reserved.contains(&key.as_str()) {
            continue;
        }
        let (base, slot) = if let Some(base) = key.strip_suffix(MODIFIER_SUFFIX) {
            (base, Slot::Modifier)
        } else if let Some(base) = key.strip_suffix(VALUE2_SUFFIX) {
            (base, Slot::Value2)
        } else {
            (key.as_str(), Slot::Value)
        };

        let field = base
            .parse::<FilterField>()
            .ok()
            .filter(|f| fields.contains(f))
            .filter(|f| slot != Slot::Modifier || f.accepts_modifier_param())
            .ok_or_else(|| FilterError::InvalidField { field: key.clone() })?;

        let entry = grouped.entry(field).or_default();
        match slot {
            Slot::Value => entry.value = Some(value.clone()),
            Slot::Value2 => entry.value2 = Some(value.clone()),
            Slot::Modifier => {
                entry.modifier = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => {
                        return Err(FilterError::InvalidModifier {
                            field: field.as_str().to_string(),
                            modifier: other.to_string(),
                            reason: "modifier must be a string".to_string(),
                        })
                    }
                }
            }
        }
    }

    Ok(grouped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Value,
    Modifier,
    Value2,
}

/// Compile performer listing parameters.
///
/// `favorites_only` falls back to `favorites_default` when absent or null.
/// Criteria are emitted in field declaration order.
pub fn compile_performer_filters(
    params: &Map<String, Value>,
    favorites_default: bool,
) -> Result<FilterSet, FilterError> {
    let favorites_only = bool_param(params, "favorites_only")?.unwrap_or(favorites_default);
    let grouped = group_field_params(params, &FilterField::PERFORMER_FIELDS, &["favorites_only"])?;

    let mut set = FilterSet::new().favorites_only(favorites_only);
    for field in FilterField::PERFORMER_FIELDS {
        if let Some(group) = grouped.get(&field) {
            if let Some(criterion) = group.compile(field)? {
                set.insert(criterion);
            }
        }
    }
    Ok(set)
}

/// Read an optional boolean flag.
pub(crate) fn bool_param(params: &Map<String, Value>, key: &str) -> Result<Option<bool>, FilterError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(other) => Err(FilterError::invalid_value(key, other, "expected a boolean")),
    }
}

// =============================================================================
// Tests
// =============================================================================
