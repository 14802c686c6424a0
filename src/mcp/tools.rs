//! Tool catalog: typed parameter metadata, JSON-schema generation and
//! argument validation.
//!
//! The catalog owns tool *metadata*; dispatch lives in the handler. Every
//! `tools/call` is checked against the entry here before it reaches the
//! catalogue or the analysis engine.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::filter::{FilterField, FilterModifier, ValueKind};
use crate::types::{AnalysisConfig, Error};

pub const GET_PERFORMER_INFO: &str = "get_performer_info";
pub const GET_ALL_PERFORMERS: &str = "get_all_performers";
pub const GET_ALL_SCENES: &str = "get_all_scenes";
pub const GET_ALL_SCENES_FROM_PERFORMER: &str = "get_all_scenes_from_performer";
pub const HEALTH_CHECK: &str = "health_check";
pub const CLEAR_CACHE: &str = "clear_cache";
pub const ADVANCED_PERFORMER_ANALYSIS: &str = "advanced_performer_analysis";
pub const BATCH_PERFORMER_INSIGHTS: &str = "batch_performer_insights";
pub const LIBRARY_STATISTICS: &str = "library_statistics";
pub const RECOMMEND_PERFORMERS: &str = "recommend_performers";

// =============================================================================
// Parameter types
// =============================================================================

/// Parameter type for tool inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Bool,
    StringList,
    /// Accepts a value matching any of the listed types.
    OneOf(Vec<ParamType>),
    Optional(Box<ParamType>),
}

impl ParamType {
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    pub fn one_of(types: impl IntoIterator<Item = ParamType>) -> Self {
        ParamType::OneOf(types.into_iter().collect())
    }

    /// Validate a JSON value against this parameter type.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            ParamType::String => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(format!("expected string, got {}", value_type_name(value)))
                }
            }
            ParamType::Int => {
                if value.is_i64() || value.is_u64() {
                    Ok(())
                } else {
                    Err(format!("expected integer, got {}", value_type_name(value)))
                }
            }
            ParamType::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("expected boolean, got {}", value_type_name(value)))
                }
            }
            ParamType::StringList => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| format!("expected array, got {}", value_type_name(value)))?;
                for (i, item) in arr.iter().enumerate() {
                    if !item.is_string() {
                        return Err(format!(
                            "expected string at index {}, got {}",
                            i,
                            value_type_name(item)
                        ));
                    }
                }
                Ok(())
            }
            ParamType::OneOf(types) => {
                if types.iter().any(|t| t.validate(value).is_ok()) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {}, got {}",
                        self.display_name(),
                        value_type_name(value)
                    ))
                }
            }
            ParamType::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.validate(value)
                }
            }
        }
    }

    /// JSON-schema fragment for `inputSchema`.
    pub fn json_schema(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Int => json!({"type": "integer"}),
            ParamType::Bool => json!({"type": "boolean"}),
            ParamType::StringList => json!({"type": "array", "items": {"type": "string"}}),
            ParamType::OneOf(types) => {
                let any_of: Vec<Value> = types.iter().map(ParamType::json_schema).collect();
                json!({ "anyOf": any_of })
            }
            ParamType::Optional(inner) => inner.json_schema(),
        }
    }

    /// Human-readable type name.
    pub fn display_name(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Int => "integer".to_string(),
            ParamType::Bool => "boolean".to_string(),
            ParamType::StringList => "string[]".to_string(),
            ParamType::OneOf(types) => types
                .iter()
                .map(ParamType::display_name)
                .collect::<Vec<_>>()
                .join("|"),
            ParamType::Optional(inner) => format!("{}?", inner.display_name()),
        }
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Parameter definition
// =============================================================================

/// A single parameter definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && !matches!(self.param_type, ParamType::Optional(_))
    }

    fn schema(&self) -> Value {
        let mut schema = self.param_type.json_schema();
        schema["description"] = json!(self.description);
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

// =============================================================================
// Tool entry
// =============================================================================

/// Complete tool metadata entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub parameters: Vec<ParamDef>,
}

impl ToolEntry {
    pub fn new(id: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, def: ParamDef) -> Self {
        self.parameters.push(def);
        self
    }

    /// JSON-schema object describing the arguments.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Entry as listed by `tools/list`. Every tool is read-only.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.id,
            "title": self.title,
            "description": self.description,
            "inputSchema": self.input_schema(),
            "annotations": {
                "title": self.title,
                "readOnlyHint": true,
                "openWorldHint": false,
            },
        })
    }

    /// One-line signature, e.g. `- get_performer_info(performer_name: string): ...`
    pub fn to_prompt_line(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let optional = if p.is_required() { "" } else { "?" };
                format!("{}{}: {}", p.name, optional, p.param_type.display_name())
            })
            .collect();

        format!("- {}({}): {}", self.id, params.join(", "), self.description)
    }
}

// =============================================================================
// Tool catalog
// =============================================================================

/// In-memory tool catalog. Owns metadata, not implementations.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    entries: HashMap<String, ToolEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a tool entry.
    pub fn register(&mut self, entry: ToolEntry) -> crate::types::Result<()> {
        if entry.id.is_empty() {
            return Err(Error::validation("Tool id cannot be empty"));
        }
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    pub fn get(&self, tool_id: &str) -> Option<&ToolEntry> {
        self.entries.get(tool_id)
    }

    pub fn has_tool(&self, tool_id: &str) -> bool {
        self.entries.contains_key(tool_id)
    }

    /// All entries, sorted by id.
    pub fn list_entries(&self) -> Vec<&ToolEntry> {
        let mut entries: Vec<&ToolEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Validate arguments against a tool's parameter definitions.
    ///
    /// Returns a list of validation errors (empty = valid).
    pub fn validate_params(&self, tool_id: &str, params: &Value) -> crate::types::Result<Vec<String>> {
        let entry = self
            .entries
            .get(tool_id)
            .ok_or_else(|| Error::not_found(format!("Unknown tool: {}", tool_id)))?;

        let param_map = params
            .as_object()
            .ok_or_else(|| Error::validation("Arguments must be a JSON object"))?;

        let mut errors = Vec::new();

        for param_def in &entry.parameters {
            if param_def.is_required() && !param_map.contains_key(&param_def.name) {
                errors.push(format!("Missing required parameter: {}", param_def.name));
            }
        }

        let known_names: HashMap<&str, &ParamDef> = entry
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect();

        for (key, value) in param_map {
            if let Some(param_def) = known_names.get(key.as_str()) {
                if let Err(e) = param_def.param_type.validate(value) {
                    errors.push(format!("Parameter '{}': {}", key, e));
                }
            } else {
                errors.push(format!("Unknown parameter: {}", key));
            }
        }

        Ok(errors)
    }

    /// Fill in default values for missing optional parameters.
    pub fn fill_defaults(&self, tool_id: &str, params: &mut Value) -> crate::types::Result<()> {
        let entry = self
            .entries
            .get(tool_id)
            .ok_or_else(|| Error::not_found(format!("Unknown tool: {}", tool_id)))?;

        if let Some(map) = params.as_object_mut() {
            for param_def in &entry.parameters {
                if !map.contains_key(&param_def.name) {
                    if let Some(default) = &param_def.default {
                        map.insert(param_def.name.clone(), default.clone());
                    }
                }
            }
        }

        Ok(())
    }

    /// Signature listing used by prompt templates.
    pub fn generate_prompt(&self) -> String {
        let entries = self.list_entries();
        if entries.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(entries.len() + 1);
        lines.push("Available tools:".to_string());
        for entry in entries {
            lines.push(entry.to_prompt_line());
        }
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Stash tools
// =============================================================================

fn performer_name_param() -> ParamDef {
    ParamDef::new(
        "performer_name",
        ParamType::String,
        "Exact performer name (aliases are also matched)",
    )
}

fn modifier_names(kind: ValueKind) -> String {
    FilterModifier::applicable(kind)
        .into_iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Integer, or a string the filter compiler parses.
fn numeric_param() -> ParamType {
    ParamType::one_of([ParamType::Int, ParamType::String])
}

/// `<field>`, `<field>_modifier` and `<field>_value2` for every performer field.
fn performer_field_params() -> Vec<ParamDef> {
    let mut params = Vec::new();
    for field in FilterField::PERFORMER_FIELDS {
        let name = field.as_str();
        let kind = field.kind();
        let value_type = match kind {
            ValueKind::Numeric => numeric_param(),
            ValueKind::Text => ParamType::String,
        };
        let description = if field.accepts_modifier_param() {
            format!("Filter on {name}")
        } else {
            format!("Substring match on {name}")
        };
        params.push(ParamDef::new(name, ParamType::optional(value_type), description));

        if field.accepts_modifier_param() {
            params.push(ParamDef::new(
                format!("{name}_modifier"),
                ParamType::optional(ParamType::String),
                format!(
                    "Comparison applied to {name}, one of {} (default EQUALS)",
                    modifier_names(kind)
                ),
            ));
        }
        if kind == ValueKind::Numeric {
            params.push(ParamDef::new(
                format!("{name}_value2"),
                ParamType::optional(numeric_param()),
                format!("Upper bound for BETWEEN / NOT_BETWEEN on {name}"),
            ));
        }
    }
    params
}

/// Catalog of every tool the server exposes, with defaults drawn from `config`.
pub fn stash_tools(config: &AnalysisConfig) -> crate::types::Result<ToolCatalog> {
    let organized_only = || {
        ParamDef::new("organized_only", ParamType::Bool, "Restrict to organized scenes")
            .with_default(json!(true))
    };

    let tag_names =
        || ParamType::optional(ParamType::one_of([ParamType::String, ParamType::StringList]));

    let mut all_performers = ToolEntry::new(
        GET_ALL_PERFORMERS,
        "Get All Performers",
        "Return a list of performers with advanced filtering options",
    )
    .param(
        ParamDef::new("favorites_only", ParamType::Bool, "Restrict to favorite performers")
            .with_default(json!(config.favorites_only_default)),
    );
    all_performers.parameters.extend(performer_field_params());

    let entries = vec![
        ToolEntry::new(
            GET_PERFORMER_INFO,
            "Get Performer Information",
            "Return detailed information for a single performer",
        )
        .param(performer_name_param()),
        all_performers,
        ToolEntry::new(
            GET_ALL_SCENES,
            "Get All Scenes",
            "Return all scenes with advanced filtering options",
        )
        .param(organized_only())
        .param(ParamDef::new(
            "include_tags",
            tag_names(),
            "Tag names a scene must carry, comma-separated or as a list",
        ))
        .param(ParamDef::new(
            "exclude_tags",
            tag_names(),
            "Tag names a scene must not carry (ignored when include_tags is set)",
        ))
        .param(ParamDef::new(
            "min_rating",
            ParamType::optional(numeric_param()),
            "Minimum rating, 0-100 inclusive",
        ))
        .param(ParamDef::new(
            "max_rating",
            ParamType::optional(numeric_param()),
            "Maximum rating, 0-100 inclusive",
        )),
        ToolEntry::new(
            GET_ALL_SCENES_FROM_PERFORMER,
            "Get All Scenes from Performer",
            "Return all scenes for a given performer",
        )
        .param(performer_name_param())
        .param(organized_only()),
        ToolEntry::new(
            HEALTH_CHECK,
            "Health Check",
            "Return connectivity, cache and tool call statistics",
        ),
        ToolEntry::new(
            CLEAR_CACHE,
            "Clear Cache",
            "Drop every cached catalogue response",
        ),
        ToolEntry::new(
            ADVANCED_PERFORMER_ANALYSIS,
            "Advanced Performer Analysis",
            "Analyse a performer: profile, similar performers and optional scene statistics",
        )
        .param(performer_name_param())
        .param(
            ParamDef::new("include_similar", ParamType::Bool, "Include similar performers")
                .with_default(json!(true)),
        )
        .param(
            ParamDef::new(
                "deep_scene_analysis",
                ParamType::Bool,
                "Fetch all scenes for ratings and tag frequency",
            )
            .with_default(json!(false)),
        ),
        ToolEntry::new(
            BATCH_PERFORMER_INSIGHTS,
            "Batch Performer Insights",
            "Generate insights for several performers with per-name outcomes",
        )
        .param(ParamDef::new(
            "performer_names",
            ParamType::StringList,
            "Performer names to analyse",
        ))
        .param(
            ParamDef::new("max_performers", ParamType::Int, "Maximum number of names processed")
                .with_default(json!(config.max_batch_performers)),
        ),
        ToolEntry::new(
            LIBRARY_STATISTICS,
            "Library Statistics",
            "Country, ethnicity and physical statistics over favorite performers",
        ),
        ToolEntry::new(
            RECOMMEND_PERFORMERS,
            "Recommend Performers",
            "Shortlist favorite performers matching free-text preferences",
        )
        .param(ParamDef::new(
            "preferences",
            ParamType::String,
            "Free-text description of what to look for",
        ))
        .param(
            ParamDef::new("limit", ParamType::Int, "Maximum recommendations returned")
                .with_default(json!(config.recommendation_limit)),
        ),
    ];

    let mut catalog = ToolCatalog::new();
    for entry in entries {
        catalog.register(entry)?;
    }
    Ok(catalog)
}

// =============================================================================
// Tests
// =============================================================================
