//! Filter criterion model: fields, modifiers and operand validation.
//!
//! A [`FilterCriterion`] can only be obtained through [`FilterCriterion::parse`]
//! or [`FilterCriterion::typed`], both of which run the full rule set:
//!
//! 1. unknown field → [`FilterError::InvalidField`]
//! 2. modifier not applicable to the field's kind → [`FilterError::InvalidModifier`]
//! 3. missing / unexpected second operand → [`FilterError::MissingOperand`] /
//!    [`FilterError::UnexpectedOperand`]
//! 4. numeric operand that does not parse → [`FilterError::InvalidValue`]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Validation failures raised while building criteria.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter field '{field}'")]
    InvalidField { field: String },

    #[error("invalid modifier '{modifier}' for field '{field}': {reason}")]
    InvalidModifier {
        field: String,
        modifier: String,
        reason: String,
    },

    #[error("modifier {modifier} on field '{field}' requires a second value ({field}_value2)")]
    MissingOperand { field: String, modifier: String },

    #[error("modifier {modifier} on field '{field}' does not take a second value")]
    UnexpectedOperand { field: String, modifier: String },

    #[error("invalid value {value} for field '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl FilterError {
    /// Field (or parameter) the error refers to.
    pub fn field(&self) -> &str {
        match self {
            FilterError::InvalidField { field }
            | FilterError::InvalidModifier { field, .. }
            | FilterError::MissingOperand { field, .. }
            | FilterError::UnexpectedOperand { field, .. }
            | FilterError::InvalidValue { field, .. } => field,
        }
    }

    /// Error class name as reported to protocol clients.
    pub fn code(&self) -> &'static str {
        match self {
            FilterError::InvalidField { .. } => "InvalidFieldError",
            FilterError::InvalidModifier { .. } => "InvalidModifierError",
            FilterError::MissingOperand { .. } => "MissingOperandError",
            FilterError::UnexpectedOperand { .. } => "UnexpectedOperandError",
            FilterError::InvalidValue { .. } => "InvalidValueError",
        }
    }

    pub(crate) fn invalid_value(field: &str, value: &Value, reason: impl Into<String>) -> Self {
        FilterError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Fields
// =============================================================================

/// Value kind a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueKind {
    Text,
    Numeric,
}

/// Filterable fields known to the remote query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Country,
    Ethnicity,
    EyeColor,
    HairColor,
    HeightCm,
    Measurements,
    Piercings,
    Tattoos,
    Weight,
    Rating100,
}

impl FilterField {
    /// Fields accepted by performer listings, in parameter order.
    pub const PERFORMER_FIELDS: [FilterField; 9] = [
        FilterField::Country,
        FilterField::Ethnicity,
        FilterField::EyeColor,
        FilterField::HairColor,
        FilterField::HeightCm,
        FilterField::Measurements,
        FilterField::Piercings,
        FilterField::Tattoos,
        FilterField::Weight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterField::Country => "country",
            FilterField::Ethnicity => "ethnicity",
            FilterField::EyeColor => "eye_color",
            FilterField::HairColor => "hair_color",
            FilterField::HeightCm => "height_cm",
            FilterField::Measurements => "measurements",
            FilterField::Piercings => "piercings",
            FilterField::Tattoos => "tattoos",
            FilterField::Weight => "weight",
            FilterField::Rating100 => "rating100",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            FilterField::HeightCm | FilterField::Weight | FilterField::Rating100 => {
                ValueKind::Numeric
            }
            _ => ValueKind::Text,
        }
    }

    /// Piercings and tattoos are free-text descriptions matched by substring;
    /// they take no `_modifier` parameter.
    pub fn accepts_modifier_param(self) -> bool {
        !matches!(self, FilterField::Piercings | FilterField::Tattoos)
    }

    /// Modifier used when the caller does not name one.
    pub fn default_modifier(self) -> FilterModifier {
        if self.accepts_modifier_param() {
            FilterModifier::Equals
        } else {
            FilterModifier::Includes
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterField {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "country" => FilterField::Country,
            "ethnicity" => FilterField::Ethnicity,
            "eye_color" => FilterField::EyeColor,
            "hair_color" => FilterField::HairColor,
            "height_cm" => FilterField::HeightCm,
            "measurements" => FilterField::Measurements,
            "piercings" => FilterField::Piercings,
            "tattoos" => FilterField::Tattoos,
            "weight" => FilterField::Weight,
            "rating100" => FilterField::Rating100,
            _ => {
                return Err(FilterError::InvalidField {
                    field: s.to_string(),
                })
            }
        };
        Ok(field)
    }
}

// =============================================================================
// Modifiers
// =============================================================================

/// Comparison modifier applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterModifier {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Between,
    NotBetween,
    Includes,
}

impl FilterModifier {
    pub const ALL: [FilterModifier; 7] = [
        FilterModifier::Equals,
        FilterModifier::NotEquals,
        FilterModifier::GreaterThan,
        FilterModifier::LessThan,
        FilterModifier::Between,
        FilterModifier::NotBetween,
        FilterModifier::Includes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterModifier::Equals => "EQUALS",
            FilterModifier::NotEquals => "NOT_EQUALS",
            FilterModifier::GreaterThan => "GREATER_THAN",
            FilterModifier::LessThan => "LESS_THAN",
            FilterModifier::Between => "BETWEEN",
            FilterModifier::NotBetween => "NOT_BETWEEN",
            FilterModifier::Includes => "INCLUDES",
        }
    }

    /// Whether the modifier can be used with a field of `kind`.
    pub fn applies_to(self, kind: ValueKind) -> bool {
        match self {
            FilterModifier::Equals | FilterModifier::NotEquals => true,
            FilterModifier::GreaterThan
            | FilterModifier::LessThan
            | FilterModifier::Between
            | FilterModifier::NotBetween => kind == ValueKind::Numeric,
            FilterModifier::Includes => kind == ValueKind::Text,
        }
    }

    pub fn takes_second_operand(self) -> bool {
        matches!(self, FilterModifier::Between | FilterModifier::NotBetween)
    }

    /// Modifiers valid for a field, for schema generation.
    pub fn applicable(kind: ValueKind) -> Vec<FilterModifier> {
        Self::ALL
            .iter()
            .copied()
            .filter(|m| m.applies_to(kind))
            .collect()
    }
}

impl fmt::Display for FilterModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses case-insensitively; the error carries no field, callers attach it.
impl FromStr for FilterModifier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == upper)
            .ok_or(())
    }
}

// =============================================================================
// Values
// =============================================================================

/// A validated operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl FilterValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FilterValue::Int(n) => Some(*n),
            FilterValue::Text(_) => None,
        }
    }

    fn parse(field: FilterField, raw: &Value) -> Result<Self, FilterError> {
        match field.kind() {
            ValueKind::Numeric => parse_numeric(field, raw).map(FilterValue::Int),
            ValueKind::Text => match raw {
                Value::String(s) => Ok(FilterValue::Text(s.trim().to_string())),
                Value::Number(n) => Ok(FilterValue::Text(n.to_string())),
                Value::Bool(b) => Ok(FilterValue::Text(b.to_string())),
                other => Err(FilterError::invalid_value(
                    field.as_str(),
                    other,
                    "expected a text value",
                )),
            },
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Int(n) => write!(f, "{}", n),
            FilterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

fn parse_numeric(field: FilterField, raw: &Value) -> Result<i64, FilterError> {
    let parsed = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n >= 0 => Ok(n),
        Some(_) => Err(FilterError::invalid_value(
            field.as_str(),
            raw,
            "must not be negative",
        )),
        None => Err(FilterError::invalid_value(
            field.as_str(),
            raw,
            "expected an integer",
        )),
    }
}

// =============================================================================
// Criterion
// =============================================================================

/// One validated `{field, modifier, value, value2?}` filter condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterCriterion {
    field: FilterField,
    modifier: FilterModifier,
    value: FilterValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    value2: Option<FilterValue>,
}

impl FilterCriterion {
    /// Validate raw parameters into a criterion.
    ///
    /// `modifier` defaults to the field's default modifier when `None`.
    /// A JSON `null` second operand counts as absent.
    pub fn parse(
        field: &str,
        modifier: Option<&str>,
        value: &Value,
        value2: Option<&Value>,
    ) -> Result<Self, FilterError> {
        let field: FilterField = field.parse()?;

        let modifier = match modifier {
            None => field.default_modifier(),
            Some(raw) => raw.parse().map_err(|_| FilterError::InvalidModifier {
                field: field.as_str().to_string(),
                modifier: raw.to_string(),
                reason: "unknown modifier".to_string(),
            })?,
        };
        check_applicable(field, modifier)?;

        let value2 = value2.filter(|v| !v.is_null());
        check_operands(field, modifier, value2.is_some())?;

        let value = FilterValue::parse(field, value)?;
        let value2 = value2.map(|v| FilterValue::parse(field, v)).transpose()?;

        Ok(Self {
            field,
            modifier,
            value,
            value2,
        })
    }

    /// Validate already-typed parts (used when composing filters internally).
    pub fn typed(
        field: FilterField,
        modifier: FilterModifier,
        value: FilterValue,
        value2: Option<FilterValue>,
    ) -> Result<Self, FilterError> {
        check_applicable(field, modifier)?;
        check_operands(field, modifier, value2.is_some())?;
        for v in std::iter::once(&value).chain(value2.iter()) {
            let kind_ok = match (field.kind(), v) {
                (ValueKind::Numeric, FilterValue::Int(n)) => *n >= 0,
                (ValueKind::Text, FilterValue::Text(_)) => true,
                _ => false,
            };
            if !kind_ok {
                return Err(FilterError::InvalidValue {
                    field: field.as_str().to_string(),
                    value: v.to_string(),
                    reason: format!("does not match {:?} field kind", field.kind()),
                });
            }
        }
        Ok(Self {
            field,
            modifier,
            value,
            value2,
        })
    }

    /// Shorthand for an equality criterion on a text field.
    pub fn text_equals(field: FilterField, value: impl Into<String>) -> Result<Self, FilterError> {
        Self::typed(
            field,
            FilterModifier::Equals,
            FilterValue::Text(value.into()),
            None,
        )
    }

    pub fn field(&self) -> FilterField {
        self.field
    }

    pub fn modifier(&self) -> FilterModifier {
        self.modifier
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    pub fn value2(&self) -> Option<&FilterValue> {
        self.value2.as_ref()
    }

    /// Human-readable form, e.g. `height_cm BETWEEN 170..180`.
    pub fn describe(&self) -> String {
        match &self.value2 {
            Some(v2) => format!("{} {} {}..{}", self.field, self.modifier, self.value, v2),
            None => format!("{} {} {}", self.field, self.modifier, self.value),
        }
    }
}

fn check_applicable(field: FilterField, modifier: FilterModifier) -> Result<(), FilterError> {
    if modifier.applies_to(field.kind()) {
        return Ok(());
    }
    let reason = match field.kind() {
        ValueKind::Text => format!("{} requires a numeric field", modifier),
        ValueKind::Numeric => format!("{} requires a text field", modifier),
    };
    Err(FilterError::InvalidModifier {
        field: field.as_str().to_string(),
        modifier: modifier.as_str().to_string(),
        reason,
    })
}

fn check_operands(
    field: FilterField,
    modifier: FilterModifier,
    has_value2: bool,
) -> Result<(), FilterError> {
    match (modifier.takes_second_operand(), has_value2) {
        (true, false) => Err(FilterError::MissingOperand {
            field: field.as_str().to_string(),
            modifier: modifier.as_str().to_string(),
        }),
        (false, true) => Err(FilterError::UnexpectedOperand {
            field: field.as_str().to_string(),
            modifier: modifier.as_str().to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_modifier_is_equals() {
        let c = FilterCriterion::parse("country", None, &json!("USA"), None).unwrap();
        assert_eq!(c.field(), FilterField::Country);
        assert_eq!(c.modifier(), FilterModifier::Equals);
        assert_eq!(c.value(), &FilterValue::Text("USA".into()));
        assert!(c.value2().is_none());
    }

    #[test]
    fn test_fixed_fields_default_to_includes() {
        let c = FilterCriterion::parse("tattoos", None, &json!("sleeve"), None).unwrap();
        assert_eq!(c.modifier(), FilterModifier::Includes);
    }

    #[test]
    fn test_between_with_both_operands() {
        let c = FilterCriterion::parse("height_cm", Some("BETWEEN"), &json!(170), Some(&json!(180)))
            .unwrap();
        assert_eq!(c.value().as_int(), Some(170));
        assert_eq!(c.value2().and_then(FilterValue::as_int), Some(180));
        assert_eq!(c.describe(), "height_cm BETWEEN 170..180");
    }

    #[test]
    fn test_numeric_strings_parse() {
        let c = FilterCriterion::parse("weight", Some("less_than"), &json!(" 60 "), None).unwrap();
        assert_eq!(c.modifier(), FilterModifier::LessThan);
        assert_eq!(c.value(), &FilterValue::Int(60));
    }

    #[test]
    fn test_rule_1_unknown_field() {
        let err = FilterCriterion::parse("hair_length", Some("GREATER_THAN"), &json!(1), None)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidFieldError");
        assert_eq!(err.field(), "hair_length");
    }

    #[test]
    fn test_rule_2_numeric_modifier_on_text_field() {
        let err = FilterCriterion::parse("country", Some("GREATER_THAN"), &json!("USA"), None)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidModifierError");
        assert!(err.to_string().contains("requires a numeric field"));
    }

    #[test]
    fn test_rule_2_unknown_modifier() {
        let err =
            FilterCriterion::parse("country", Some("LIKE"), &json!("USA"), None).unwrap_err();
        assert_eq!(err.code(), "InvalidModifierError");
    }

    #[test]
    fn test_rule_2_includes_on_numeric_field() {
        let err =
            FilterCriterion::parse("weight", Some("INCLUDES"), &json!(50), None).unwrap_err();
        assert_eq!(err.code(), "InvalidModifierError");
    }

    #[test]
    fn test_rule_3_missing_second_operand() {
        let err = FilterCriterion::parse("height_cm", Some("NOT_BETWEEN"), &json!(170), None)
            .unwrap_err();
        assert_eq!(err.code(), "MissingOperandError");

        // Explicit null is the same as absent.
        let err = FilterCriterion::parse(
            "height_cm",
            Some("BETWEEN"),
            &json!(170),
            Some(&Value::Null),
        )
        .unwrap_err();
        assert_eq!(err.code(), "MissingOperandError");
    }

    #[test]
    fn test_rule_3_unexpected_second_operand() {
        let err = FilterCriterion::parse(
            "height_cm",
            Some("GREATER_THAN"),
            &json!(170),
            Some(&json!(180)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FilterError::UnexpectedOperand {
                field: "height_cm".into(),
                modifier: "GREATER_THAN".into(),
            }
        );
    }

    #[test]
    fn test_rule_4_unparsable_numbers() {
        for raw in [json!("tall"), json!(170.5), json!(-3), json!(true)] {
            let err = FilterCriterion::parse("height_cm", None, &raw, None).unwrap_err();
            assert_eq!(err.code(), "InvalidValueError", "value {raw}");
        }
        let err =
            FilterCriterion::parse("weight", Some("BETWEEN"), &json!(50), Some(&json!("x")))
                .unwrap_err();
        assert_eq!(err.code(), "InvalidValueError");
    }

    #[test]
    fn test_rules_apply_in_order() {
        // Text field + BETWEEN + missing value2 + bad value: modifier wins.
        let err = FilterCriterion::parse("country", Some("BETWEEN"), &json!(null), None)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidModifierError");

        // Numeric field + GREATER_THAN + value2 + bad value: operand count wins.
        let err = FilterCriterion::parse(
            "weight",
            Some("GREATER_THAN"),
            &json!("heavy"),
            Some(&json!(1)),
        )
        .unwrap_err();
        assert_eq!(err.code(), "UnexpectedOperandError");
    }

    #[test]
    fn test_every_valid_combination_builds() {
        for field in FilterField::PERFORMER_FIELDS {
            for modifier in FilterModifier::applicable(field.kind()) {
                let value = match field.kind() {
                    ValueKind::Numeric => json!(10),
                    ValueKind::Text => json!("x"),
                };
                let value2 = modifier.takes_second_operand().then(|| json!(20));
                let result = FilterCriterion::parse(
                    field.as_str(),
                    Some(modifier.as_str()),
                    &value,
                    value2.as_ref(),
                );
                assert!(result.is_ok(), "{field} {modifier}: {result:?}");
            }
        }
    }

    #[test]
    fn test_typed_rejects_kind_mismatch() {
        let err = FilterCriterion::typed(
            FilterField::HeightCm,
            FilterModifier::Equals,
            FilterValue::Text("tall".into()),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code(), "InvalidValueError");
    }
}
