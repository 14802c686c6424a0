//! Prompt catalog: templated instructions that steer a client through the
//! tools.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::types::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// One prompt and its template. `{name}` placeholders are replaced by the
/// argument of the same name.
#[derive(Debug, Clone, Serialize)]
pub struct PromptEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
    #[serde(skip)]
    template: &'static str,
}

impl PromptEntry {
    /// Render with `args`; every required argument must be a non-blank string.
    pub fn render(&self, args: &Map<String, Value>) -> Result<String> {
        let mut text = self.template.to_string();
        for arg in &self.arguments {
            let value = match args.get(arg.name) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
                Some(Value::String(_)) | None if !arg.required => "",
                Some(Value::String(_)) | None => {
                    return Err(Error::validation(format!(
                        "prompt '{}' requires argument '{}'",
                        self.name, arg.name
                    )))
                }
                Some(other) => {
                    return Err(Error::validation(format!(
                        "prompt argument '{}' must be a string, got {}",
                        arg.name, other
                    )))
                }
            };
            text = text.replace(&format!("{{{}}}", arg.name), value);
        }
        Ok(text)
    }
}

const ANALYZE_PERFORMER: &str = "\
Build a complete profile of the performer '{performer_name}' with the Stash tools.

1. Profile: call `get_performer_info` with performer_name='{performer_name}' and report \
country, ethnicity, physical characteristics, measurements, tattoos and piercings.
2. Scenes: call `advanced_performer_analysis` with performer_name='{performer_name}' and \
deep_scene_analysis=true. Report the scene count, organized ratio, average rating, rating \
buckets and the top-rated scenes (rating above 80).
3. Tags: from the tag frequency, list the ten most frequent tags and group them by theme.
4. Similar performers: present up to five similar performers and the tags they share.
5. Suggestions: name the scenes to watch first and the popular tags missing from the collection.

Answer in markdown with clear numbers, and point out anything unusual.";

const LIBRARY_INSIGHTS: &str = "\
Give a strategic overview of the Stash library using the available tools.

1. Health: call `health_check` and summarise connectivity and cache efficiency.
2. Favorites: call `library_statistics` for the country, ethnicity, height and weight \
distributions of favorite performers.
3. Coverage: compare `get_all_performers` with favorites_only=true and favorites_only=false \
and report the share of favorites.
4. Content: for a sample of favorites, call `get_all_scenes_from_performer` and report the \
most common tags and ratings.
5. Gaps: point out under-represented countries, ethnicities and physical ranges.
6. Organisation: suggest tagging conventions and filters that would help discovery.

Answer in markdown with concrete statistics and actionable recommendations.";

const RECOMMEND_SCENES: &str = "\
Recommend scenes for these preferences: \"{preferences}\"

1. Interpret the preferences: physical traits, tags or genres, countries or ethnicities.
2. Candidates: call `recommend_performers` with preferences=\"{preferences}\". If a trait maps \
to a filter, refine with `get_all_performers`.
3. Scenes: for each candidate, call `get_all_scenes_from_performer` and keep scenes rated \
above 75 whose tags match the preferences. `get_all_scenes` with include_tags and min_rating \
can widen the search.
4. Scoring: weigh preference match 40%, scene rating 30%, performer popularity 20% and \
variety 10%.
5. Selection: pick the ten best scenes, mixing safe favorites with new discoveries.

For each scene give the title, performers, rating, matching tags, a match percentage and \
why it fits. Close with a short \"Discoveries\" section.";

const DISCOVER_PERFORMERS: &str = "\
Find performers matching these criteria: \"{criteria}\"

1. Map the criteria onto `get_all_performers` filters: height_cm and weight (with \
GREATER_THAN, LESS_THAN or BETWEEN), country, ethnicity, hair_color, eye_color, \
measurements, tattoos and piercings.
2. Search in three passes: every criterion, then the main criteria only, then related values.
3. For each hit, call `advanced_performer_analysis` for the profile, scene count and \
similar performers.
4. Group results as perfect matches, strong matches, interesting discoveries and alternatives.
5. Keep the selection varied.

For each performer give demographics, physical characteristics, scene statistics, how the \
criteria are met and a recommendation level (high, medium, exploratory). Finish with the top \
three picks, the filters applied and how to refine the search.";

fn argument(name: &'static str, description: &'static str) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required: true,
    }
}

/// The fixed set of prompts served by `prompts/list` and `prompts/get`.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    entries: Vec<PromptEntry>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptCatalog {
    pub fn new() -> Self {
        let entries = vec![
            PromptEntry {
                name: "analyze-performer",
                description: "Complete analysis of a performer: statistics, top scenes, \
                              frequent tags and similar performers",
                arguments: vec![argument("performer_name", "Name of the performer to analyse")],
                template: ANALYZE_PERFORMER,
            },
            PromptEntry {
                name: "library-insights",
                description: "Library trends, metadata gaps and organisation advice",
                arguments: Vec::new(),
                template: LIBRARY_INSIGHTS,
            },
            PromptEntry {
                name: "recommend-scenes",
                description: "Scene recommendations with an explanation for each pick",
                arguments: vec![argument("preferences", "Tags, traits or themes of interest")],
                template: RECOMMEND_SCENES,
            },
            PromptEntry {
                name: "discover-performers",
                description: "Discover performers matching specific criteria",
                arguments: vec![argument("criteria", "Search criteria in plain words")],
                template: DISCOVER_PERFORMERS,
            },
        ];
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&PromptEntry> {
        self.entries.iter().find(|p| p.name == name)
    }

    pub fn list(&self) -> &[PromptEntry] {
        &self.entries
    }

    /// `prompts/get` result for `name`.
    pub fn render(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        let entry = self
            .get(name)
            .ok_or_else(|| Error::not_found(format!("prompt '{name}'")))?;
        let text = entry.render(args)?;
        Ok(json!({
            "description": entry.description,
            "messages": [{
                "role": "user",
                "content": {"type": "text", "text": text},
            }],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_four_prompts_listed() {
        let catalog = PromptCatalog::new();
        let names: Vec<&str> = catalog.list().iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec!["analyze-performer", "library-insights", "recommend-scenes", "discover-performers"]
        );
        let listed = serde_json::to_value(catalog.list()).unwrap();
        assert_eq!(listed[0]["arguments"][0]["name"], "performer_name");
        assert!(listed[0].get("template").is_none());
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let catalog = PromptCatalog::new();
        let result = catalog
            .render("analyze-performer", &args(&[("performer_name", " Ava ")]))
            .unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("'Ava'"));
        assert!(!text.contains("{performer_name}"));
        assert_eq!(result["messages"][0]["role"], "user");
    }

    #[test]
    fn test_prompts_reference_existing_tools() {
        let tools = crate::mcp::tools::stash_tools(&Default::default()).unwrap();
        let catalog = PromptCatalog::new();
        for entry in catalog.list() {
            for word in entry.template.split('`').skip(1).step_by(2) {
                assert!(tools.has_tool(word), "{} references unknown tool {word}", entry.name);
            }
        }
    }

    #[test]
    fn test_missing_argument_rejected() {
        let catalog = PromptCatalog::new();
        let err = catalog.render("recommend-scenes", &Map::new()).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("preferences"));

        let err = catalog
            .render("discover-performers", &[("criteria".to_string(), json!(3))].into_iter().collect())
            .unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_unknown_prompt() {
        let err = PromptCatalog::new().render("nope", &Map::new()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_argumentless_prompt() {
        let result = PromptCatalog::new().render("library-insights", &Map::new()).unwrap();
        let text = result["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("library_statistics"));
    }
}
