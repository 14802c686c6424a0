//! Single-performer analysis.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::AnalysisEngine;
use crate::filter::{FilterCriterion, FilterField, FilterSet};
use crate::gateway::{Performer, Scene};
use crate::types::{Error, PerformerId, Result, SceneId};

const TOP_RATED_THRESHOLD: i64 = 80;
const TOP_RATED_LIMIT: usize = 5;
const TAG_FREQUENCY_LIMIT: usize = 10;

/// Which optional sub-fetches an analysis performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub include_similar: bool,
    pub deep_scene_analysis: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_similar: true,
            deep_scene_analysis: false,
        }
    }
}

/// Profile fields carried in every report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub id: PerformerId,
    pub name: String,
    pub aliases: Vec<String>,
    pub country: Option<String>,
    pub ethnicity: Option<String>,
    pub eye_color: Option<String>,
    pub hair_color: Option<String>,
    pub height_cm: Option<i64>,
    pub weight: Option<i64>,
    pub measurements: Option<String>,
    pub tattoos: Option<String>,
    pub piercings: Option<String>,
    pub favorite: bool,
    pub tags: Vec<String>,
    pub details: Option<String>,
}

impl From<&Performer> for ProfileSummary {
    fn from(p: &Performer) -> Self {
        let text = |field| p.text(field).map(str::to_string);
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            aliases: p.alias_list.clone(),
            country: text(FilterField::Country),
            ethnicity: text(FilterField::Ethnicity),
            eye_color: text(FilterField::EyeColor),
            hair_color: text(FilterField::HairColor),
            height_cm: p.height(),
            weight: p.weight(),
            measurements: text(FilterField::Measurements),
            tattoos: text(FilterField::Tattoos),
            piercings: text(FilterField::Piercings),
            favorite: p.favorite,
            tags: p.tag_names().map(str::to_string).collect(),
            details: p.details().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPerformer {
    pub id: PerformerId,
    pub name: String,
    pub country: Option<String>,
    pub ethnicity: Option<String>,
    pub shared_tag_count: usize,
    pub shared_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedScene {
    pub id: SceneId,
    pub title: String,
    pub rating100: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Rated scenes by band: excellent >90, good 70..=90, average 50..=69,
/// below average <50.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RatingBuckets {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub below_average: usize,
}

impl RatingBuckets {
    fn record(&mut self, rating: i64) {
        match rating {
            r if r > 90 => self.excellent += 1,
            70..=90 => self.good += 1,
            50..=69 => self.average += 1,
            _ => self.below_average += 1,
        }
    }
}

/// Statistics over a performer's scenes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneAnalysis {
    pub total_scenes: usize,
    pub organized_scenes: usize,
    pub organized_ratio: f64,
    pub rated_scenes: usize,
    /// Mean over rated scenes only; `None` when nothing is rated.
    pub average_rating: Option<f64>,
    pub top_rated: Vec<RatedScene>,
    pub tag_frequency: Vec<TagCount>,
    pub rating_buckets: RatingBuckets,
}

impl SceneAnalysis {
    pub fn from_scenes(scenes: &[Scene]) -> Self {
        let total = scenes.len();
        let organized = scenes.iter().filter(|s| s.organized).count();

        let mut buckets = RatingBuckets::default();
        let mut rated: Vec<RatedScene> = Vec::new();
        for scene in scenes {
            if let Some(rating) = scene.rating100 {
                buckets.record(rating);
                rated.push(RatedScene {
                    id: scene.id.clone(),
                    title: scene.display_title().to_string(),
                    rating100: rating,
                });
            }
        }
        let average_rating = (!rated.is_empty())
            .then(|| rated.iter().map(|s| s.rating100 as f64).sum::<f64>() / rated.len() as f64);

        let rated_scenes = rated.len();
        let mut top_rated: Vec<RatedScene> = rated
            .into_iter()
            .filter(|s| s.rating100 > TOP_RATED_THRESHOLD)
            .collect();
        top_rated.sort_by(|a, b| b.rating100.cmp(&a.rating100).then_with(|| a.title.cmp(&b.title)));
        top_rated.truncate(TOP_RATED_LIMIT);

        Self {
            total_scenes: total,
            organized_scenes: organized,
            organized_ratio: if total == 0 {
                0.0
            } else {
                organized as f64 / total as f64
            },
            rated_scenes,
            average_rating,
            top_rated,
            tag_frequency: tag_frequency(scenes, TAG_FREQUENCY_LIMIT),
            rating_buckets: buckets,
        }
    }
}

/// Most frequent scene tags, count descending then name ascending.
pub fn tag_frequency(scenes: &[Scene], limit: usize) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in scenes.iter().flat_map(|s| s.tags.iter()) {
        *counts.entry(tag.name.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformerReport {
    pub performer: ProfileSummary,
    /// Scenes analysed when deep analysis ran, otherwise the count Stash
    /// reports on the performer record.
    pub scene_count: Option<usize>,
    /// Only known when deep analysis fetched the scene list.
    pub organized_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_performers: Option<Vec<SimilarPerformer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_analysis: Option<SceneAnalysis>,
    pub include_similar: bool,
    pub deep_scene_analysis: bool,
    pub generated_at: DateTime<Utc>,
}

/// Rank candidates by tags shared with `subject`, ties by name.
pub fn rank_similar(subject: &Performer, candidates: &[Performer], limit: usize) -> Vec<SimilarPerformer> {
    let subject_tags: BTreeSet<&str> = subject.tag_names().collect();
    let mut ranked: Vec<SimilarPerformer> = candidates
        .iter()
        .filter(|c| c.id != subject.id && !c.name.eq_ignore_ascii_case(&subject.name))
        .map(|c| {
            let shared: Vec<String> = c
                .tag_names()
                .filter(|t| subject_tags.contains(t))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(str::to_string)
                .collect();
            SimilarPerformer {
                id: c.id.clone(),
                name: c.name.clone(),
                country: c.country().map(str::to_string),
                ethnicity: c.ethnicity().map(str::to_string),
                shared_tag_count: shared.len(),
                shared_tags: shared,
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.shared_tag_count
            .cmp(&a.shared_tag_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(limit);
    ranked
}

impl AnalysisEngine {
    /// Analyse one performer. `Ok(None)` when no performer answers to `name`.
    ///
    /// Sub-fetch failures are reported as `Error::SubFetch` naming the
    /// failed stage; nothing is silently replaced with empty data.
    pub async fn analyze_performer(
        &self,
        name: &str,
        options: AnalysisOptions,
    ) -> Result<Option<PerformerReport>> {
        tracing::debug!(name, ?options, "analysing performer");
        let catalog = self.catalog();
        let Some(performer) = catalog
            .performer(name)
            .await
            .map_err(|e| stage_error("performer", e))?
        else {
            return Ok(None);
        };

        let similar_performers = if options.include_similar {
            let filters = similarity_filters(&performer)?;
            let candidates = catalog
                .performers(&filters)
                .await
                .map_err(|e| Error::sub_fetch("similar_performers", e))?;
            Some(rank_similar(&performer, &candidates, self.config().similar_limit))
        } else {
            None
        };

        let scene_analysis = if options.deep_scene_analysis {
            let scenes = catalog
                .performer_scenes(&performer.name, false)
                .await
                .map_err(|e| Error::sub_fetch("performer_scenes", e))?;
            Some(SceneAnalysis::from_scenes(&scenes))
        } else {
            None
        };

        Ok(Some(PerformerReport {
            performer: ProfileSummary::from(performer.as_ref()),
            scene_count: scene_analysis
                .as_ref()
                .map(|a| a.total_scenes)
                .or(performer.scene_count.map(|c| c as usize)),
            organized_ratio: scene_analysis.as_ref().map(|a| a.organized_ratio),
            similar_performers,
            scene_analysis,
            include_similar: options.include_similar,
            deep_scene_analysis: options.deep_scene_analysis,
            generated_at: Utc::now(),
        }))
    }
}

/// Non-favorite listing sharing the subject's country and ethnicity.
fn similarity_filters(subject: &Performer) -> Result<FilterSet> {
    let mut filters = FilterSet::new().favorites_only(false);
    for field in [FilterField::Country, FilterField::Ethnicity] {
        if let Some(value) = subject.text(field) {
            filters.insert(FilterCriterion::text_equals(field, value)?);
        }
    }
    Ok(filters)
}

/// Validation errors pass through untouched; remote failures are tagged.
fn stage_error(stage: &'static str, err: Error) -> Error {
    match err {
        Error::Validation(_) | Error::Filter(_) => err,
        other => Error::sub_fetch(stage, other),
    }
}
