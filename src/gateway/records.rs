//! Entity records as returned by the Stash GraphQL API.
//!
//! Stash reports unset text attributes as either `null` or `""`; the
//! accessors on [`Performer`] fold both into `None`.

use serde::{Deserialize, Serialize};

use crate::filter::FilterField;
use crate::types::{PerformerId, SceneId, TagId};

/// Tag reference embedded in performer and scene records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: TagId,
    pub name: String,
}

/// Performer reference embedded in scene records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerRef {
    pub id: PerformerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub id: PerformerId,
    pub name: String,
    #[serde(default)]
    pub alias_list: Vec<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub ethnicity: Option<String>,
    #[serde(default)]
    pub eye_color: Option<String>,
    #[serde(default)]
    pub hair_color: Option<String>,
    #[serde(default)]
    pub height_cm: Option<i64>,
    #[serde(default)]
    pub measurements: Option<String>,
    #[serde(default)]
    pub piercings: Option<String>,
    #[serde(default)]
    pub tattoos: Option<String>,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub scene_count: Option<u32>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

impl Performer {
    /// Text attribute by filter field; blank values read as `None`.
    pub fn text(&self, field: FilterField) -> Option<&str> {
        let raw = match field {
            FilterField::Country => &self.country,
            FilterField::Ethnicity => &self.ethnicity,
            FilterField::EyeColor => &self.eye_color,
            FilterField::HairColor => &self.hair_color,
            FilterField::Measurements => &self.measurements,
            FilterField::Piercings => &self.piercings,
            FilterField::Tattoos => &self.tattoos,
            FilterField::HeightCm | FilterField::Weight | FilterField::Rating100 => return None,
        };
        non_blank(raw.as_deref())
    }

    pub fn country(&self) -> Option<&str> {
        self.text(FilterField::Country)
    }

    pub fn ethnicity(&self) -> Option<&str> {
        self.text(FilterField::Ethnicity)
    }

    pub fn details(&self) -> Option<&str> {
        non_blank(self.details.as_deref())
    }

    /// Positive height in centimetres; zero means unset in Stash.
    pub fn height(&self) -> Option<i64> {
        self.height_cm.filter(|h| *h > 0)
    }

    pub fn weight(&self) -> Option<i64> {
        self.weight.filter(|w| *w > 0)
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    /// Case-insensitive match against the name or any alias.
    pub fn answers_to(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name)
            || self.alias_list.iter().any(|a| a.trim().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub rating100: Option<i64>,
    #[serde(default)]
    pub organized: bool,
    #[serde(default)]
    pub performers: Vec<PerformerRef>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

impl Scene {
    /// Title, or the id when the scene is untitled.
    pub fn display_title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub scene_count: Option<u32>,
}

impl Tag {
    pub fn answers_to(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.trim().eq_ignore_ascii_case(name))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
