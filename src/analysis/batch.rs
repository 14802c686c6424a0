//! Batch insights across several performers.
//!
//! Per-name failures are recorded, never propagated: a batch always yields
//! one outcome per processed name.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use super::performer::{AnalysisOptions, ProfileSummary};
use super::{distribution, AnalysisEngine, Bucket};

/// Result for one requested name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Analyzed {
        name: String,
        performer: ProfileSummary,
        scene_count: Option<usize>,
    },
    NotFound {
        name: String,
    },
    Failed {
        name: String,
        reason: String,
    },
}

impl BatchOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Analyzed { name, .. } | Self::NotFound { name } | Self::Failed { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub analyzed: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Mean over analysed performers with a known scene count.
    pub average_scene_count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Demographics {
    pub country_distribution: Vec<Bucket>,
    pub ethnicity_distribution: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub max_performers: usize,
    /// Distinct names beyond the cap that were not processed.
    pub skipped: usize,
    pub outcomes: Vec<BatchOutcome>,
    pub summary: BatchSummary,
    pub demographics: Demographics,
    pub generated_at: DateTime<Utc>,
}

/// First `max` distinct names in input order. Names are trimmed and compared
/// case-insensitively. Returns the selection and the number of distinct names
/// left over.
pub fn select_names(names: &[String], max: usize) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = names
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| seen.insert(n.to_lowercase()))
        .collect();
    let skipped = distinct.len().saturating_sub(max);
    (distinct.into_iter().take(max).collect(), skipped)
}

impl AnalysisEngine {
    /// Analyse at most `max_performers` distinct names without deep scene
    /// analysis.
    pub async fn batch_insights(&self, names: &[String], max_performers: usize) -> BatchReport {
        let (selected, skipped) = select_names(names, max_performers);
        if skipped > 0 {
            tracing::warn!(
                requested = names.len(),
                max_performers,
                skipped,
                "batch truncated"
            );
        }

        let options = AnalysisOptions {
            include_similar: false,
            deep_scene_analysis: false,
        };
        let total = selected.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, name) in selected.into_iter().enumerate() {
            tracing::info!(index = index + 1, total, name = %name, "batch progress");
            let outcome = if name.is_empty() {
                BatchOutcome::Failed {
                    name,
                    reason: "performer name must not be empty".to_string(),
                }
            } else {
                match self.analyze_performer(&name, options).await {
                    Ok(Some(report)) => BatchOutcome::Analyzed {
                        name,
                        performer: report.performer,
                        scene_count: report.scene_count,
                    },
                    Ok(None) => BatchOutcome::NotFound { name },
                    Err(err) => {
                        tracing::warn!(name = %name, error = %err, "batch entry failed");
                        BatchOutcome::Failed {
                            name,
                            reason: err.to_string(),
                        }
                    }
                }
            };
            outcomes.push(outcome);
        }

        let analyzed: Vec<(&ProfileSummary, Option<usize>)> = outcomes
            .iter()
            .filter_map(|o| match o {
                BatchOutcome::Analyzed {
                    performer,
                    scene_count,
                    ..
                } => Some((performer, *scene_count)),
                _ => None,
            })
            .collect();
        let counts: Vec<usize> = analyzed.iter().filter_map(|(_, count)| *count).collect();
        let summary = BatchSummary {
            analyzed: analyzed.len(),
            not_found: outcomes
                .iter()
                .filter(|o| matches!(o, BatchOutcome::NotFound { .. }))
                .count(),
            failed: outcomes
                .iter()
                .filter(|o| matches!(o, BatchOutcome::Failed { .. }))
                .count(),
            average_scene_count: (!counts.is_empty())
                .then(|| counts.iter().sum::<usize>() as f64 / counts.len() as f64),
        };
        let demographics = Demographics {
            country_distribution: distribution(analyzed.iter().map(|(p, _)| p.country.as_deref())),
            ethnicity_distribution: distribution(analyzed.iter().map(|(p, _)| p.ethnicity.as_deref())),
        };

        tracing::info!(
            analyzed = summary.analyzed,
            not_found = summary.not_found,
            failed = summary.failed,
            "batch complete"
        );
        BatchReport {
            requested: names.len(),
            max_performers,
            skipped,
            outcomes,
            summary,
            demographics,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{engine, performer, FakeGateway};
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn gateway() -> FakeGateway {
        FakeGateway {
            performers: vec![
                performer("1", "A", json!({"country": "USA", "scene_count": 10})),
                performer("2", "B", json!({"country": "Japan", "ethnicity": "Asian", "scene_count": 4})),
                performer("3", "C", json!({"country": "USA"})),
            ],
            ..FakeGateway::default()
        }
    }

    #[test]
    fn test_select_names_dedupes_in_order() {
        let (picked, skipped) = select_names(&names(&["a", " A ", "b", "c", "B", "d"]), 3);
        assert_eq!(picked, vec!["a", "b", "c"]);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn test_cap_respected() {
        let (engine, _) = engine(gateway());
        let input = names(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"]);
        let report = engine.batch_insights(&input, 3).await;

        assert_eq!(report.outcomes.len(), 3);
        let processed: Vec<&str> = report.outcomes.iter().map(BatchOutcome::name).collect();
        assert_eq!(processed, vec!["A", "B", "C"]);
        assert_eq!(report.skipped, 7);
        assert_eq!(report.requested, 10);
    }

    #[tokio::test]
    async fn test_partial_failures_recorded_per_name() {
        let mut gw = gateway();
        gw.fail_lookup_for = Some("C".to_string());
        let (engine, _) = engine(gw);
        let report = engine.batch_insights(&names(&["A", "Nobody", "C", "  ", "B"]), 10).await;

        assert_eq!(report.outcomes.len(), 5);
        assert!(matches!(&report.outcomes[1], BatchOutcome::NotFound { name } if name == "Nobody"));
        assert!(matches!(&report.outcomes[2], BatchOutcome::Failed { reason, .. } if reason.contains("unreachable")));
        assert!(matches!(&report.outcomes[3], BatchOutcome::Failed { .. }));
        assert_eq!(report.summary.analyzed, 2);
        assert_eq!(report.summary.not_found, 1);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.summary.average_scene_count, Some(7.0));

        let countries: Vec<(&str, usize)> = report
            .demographics
            .country_distribution
            .iter()
            .map(|b| (b.value.as_str(), b.count))
            .collect();
        assert_eq!(countries, vec![("Japan", 1), ("USA", 1)]);
        let ethnicities = &report.demographics.ethnicity_distribution;
        assert_eq!(ethnicities.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_outcome_serialization_is_tagged() {
        let (engine, _) = engine(gateway());
        let report = engine.batch_insights(&names(&["A", "Z"]), 5).await;
        let value = serde_json::to_value(&report.outcomes).unwrap();
        assert_eq!(value[0]["status"], "analyzed");
        assert_eq!(value[0]["performer"]["name"], "A");
        assert_eq!(value[1], json!({"status": "not_found", "name": "Z"}));
    }
}
