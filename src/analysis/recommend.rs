//! Keyword recommendations over the cached favorite listing.
//!
//! Each preference keyword scores a performer once, at its strongest match:
//! a tag name containing it scores 3, a country/ethnicity/hair/eye attribute
//! 2, free text (details, tattoos, piercings, measurements) 1. Performers are
//! ranked by score, then name.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use super::AnalysisEngine;
use crate::filter::FilterField;
use crate::gateway::Performer;
use crate::types::{Error, PerformerId, Result};

const TAG_WEIGHT: u32 = 3;
const ATTRIBUTE_WEIGHT: u32 = 2;
const TEXT_WEIGHT: u32 = 1;
const MIN_KEYWORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "and", "any", "are", "but", "for", "from", "good", "like", "love", "more", "most", "not",
    "prefer", "some", "that", "the", "their", "them", "they", "this", "very", "want", "who",
    "with", "would",
];

const ATTRIBUTE_FIELDS: [FilterField; 4] = [
    FilterField::Country,
    FilterField::Ethnicity,
    FilterField::HairColor,
    FilterField::EyeColor,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: PerformerId,
    pub name: String,
    pub score: u32,
    pub matched_keywords: Vec<String>,
    pub matched_tags: Vec<String>,
    pub country: Option<String>,
    pub ethnicity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationReport {
    pub preferences: String,
    pub keywords: Vec<String>,
    pub candidates_considered: usize,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

/// Lowercase keywords in first-seen order, short words and stopwords dropped.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn contains(haystack: &str, keyword: &str) -> bool {
    haystack.to_lowercase().contains(keyword)
}

fn score(performer: &Performer, keywords: &[String]) -> Option<Recommendation> {
    let mut total = 0;
    let mut matched_keywords = Vec::new();
    let mut matched_tags: Vec<String> = Vec::new();

    for keyword in keywords {
        let tags: Vec<&str> = performer.tag_names().filter(|t| contains(t, keyword)).collect();
        let weight = if !tags.is_empty() {
            for tag in tags {
                if !matched_tags.iter().any(|m| m == tag) {
                    matched_tags.push(tag.to_string());
                }
            }
            TAG_WEIGHT
        } else if ATTRIBUTE_FIELDS
            .iter()
            .filter_map(|f| performer.text(*f))
            .any(|v| contains(v, keyword))
        {
            ATTRIBUTE_WEIGHT
        } else if [
            performer.details(),
            performer.text(FilterField::Tattoos),
            performer.text(FilterField::Piercings),
            performer.text(FilterField::Measurements),
        ]
        .into_iter()
        .flatten()
        .any(|v| contains(v, keyword))
        {
            TEXT_WEIGHT
        } else {
            continue;
        };
        total += weight;
        matched_keywords.push(keyword.clone());
    }

    (total > 0).then(|| Recommendation {
        id: performer.id.clone(),
        name: performer.name.clone(),
        score: total,
        matched_keywords,
        matched_tags,
        country: performer.country().map(str::to_string),
        ethnicity: performer.ethnicity().map(str::to_string),
    })
}

/// Rank `performers` against `keywords`; deterministic for identical input.
pub fn rank(performers: &[Performer], keywords: &[String], limit: usize) -> Vec<Recommendation> {
    let mut ranked: Vec<Recommendation> = performers.iter().filter_map(|p| score(p, keywords)).collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    ranked
}

impl AnalysisEngine {
    /// Shortlist favorite performers matching free-text preferences. Only the
    /// cached favorite listing is consulted.
    pub async fn recommend(&self, preferences: &str, limit: usize) -> Result<RecommendationReport> {
        let keywords = keywords(preferences);
        let performers = self
            .catalog()
            .favorite_performers()
            .await
            .map_err(|e| Error::sub_fetch("favorite_performers", e))?;
        let recommendations = rank(&performers, &keywords, limit);
        tracing::debug!(
            keywords = keywords.len(),
            candidates = performers.len(),
            matched = recommendations.len(),
            "recommendations ranked"
        );
        Ok(RecommendationReport {
            preferences: preferences.to_string(),
            keywords,
            candidates_considered: performers.len(),
            recommendations,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{engine, performer, FakeGateway};
    use super::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn favorites() -> Vec<Performer> {
        vec![
            performer("1", "Zoe", json!({"favorite": true, "hair_color": "Blonde", "country": "Sweden"})),
            performer("2", "Ava", json!({"favorite": true, "tags": [{"id": "t", "name": "Blonde Hair"}], "details": "Loves hiking outdoors"})),
            performer("3", "Mia", json!({"favorite": true, "tattoos": "small star on wrist", "country": "Brazil"})),
            performer("4", "Eve", json!({"favorite": true, "hair_color": "Blonde"})),
            performer("5", "Kim", json!({"favorite": true, "country": "Korea"})),
        ]
    }

    #[test]
    fn test_keywords_normalized() {
        assert_eq!(
            keywords("I'd like Blonde, blonde & tattooed performers from Sweden!"),
            vec!["blonde", "tattooed", "performers", "sweden"]
        );
        assert!(keywords("a an of").is_empty());
    }

    #[test]
    fn test_ranking_weights_and_ties() {
        let ranked = rank(&favorites(), &keywords("blonde outdoors star"), 10);
        let order: Vec<(&str, u32)> = ranked.iter().map(|r| (r.name.as_str(), r.score)).collect();
        assert_eq!(order, vec![("Ava", 4), ("Eve", 2), ("Zoe", 2), ("Mia", 1)]);
        assert_eq!(ranked[0].matched_tags, vec!["Blonde Hair"]);
        assert_eq!(ranked[0].matched_keywords, vec!["blonde", "outdoors"]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let words = keywords("blonde sweden brazil");
        let mut reversed = favorites();
        reversed.reverse();
        assert_eq!(rank(&favorites(), &words, 3), rank(&reversed, &words, 3));
    }

    #[tokio::test]
    async fn test_recommend_uses_only_the_cached_listing() {
        let (engine, gateway) = engine(FakeGateway {
            performers: favorites(),
            ..FakeGateway::default()
        });
        let first = engine.recommend("Korean or Brazil", 2).await.unwrap();
        engine.recommend("blonde", 2).await.unwrap();

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.candidates_considered, 5);
        let names: Vec<&str> = first.recommendations.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Mia"]);
    }

    #[tokio::test]
    async fn test_no_keywords_yields_empty_shortlist() {
        let (engine, _) = engine(FakeGateway {
            performers: favorites(),
            ..FakeGateway::default()
        });
        let report = engine.recommend("the and", 5).await.unwrap();
        assert!(report.keywords.is_empty());
        assert!(report.recommendations.is_empty());
    }
}
