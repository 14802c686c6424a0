//! Library-wide statistics over the favorite performers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{distribution, AnalysisEngine, Bucket, UNKNOWN};
use crate::gateway::Performer;
use crate::types::{Error, Result};

/// Min / max / mean over the values that are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeasureSummary {
    /// Performers with a recorded value.
    pub count: usize,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub mean: Option<f64>,
}

impl MeasureSummary {
    pub fn from_values(values: impl IntoIterator<Item = Option<i64>>) -> Self {
        let present: Vec<i64> = values.into_iter().flatten().collect();
        if present.is_empty() {
            return Self::default();
        }
        let sum: i64 = present.iter().sum();
        Self {
            count: present.len(),
            min: present.iter().min().copied(),
            max: present.iter().max().copied(),
            mean: Some(sum as f64 / present.len() as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryStats {
    pub total_performers: usize,
    /// Countries other than the unknown bucket.
    pub distinct_countries: usize,
    pub distinct_ethnicities: usize,
    pub country_distribution: Vec<Bucket>,
    pub ethnicity_distribution: Vec<Bucket>,
    pub height_cm: MeasureSummary,
    pub weight: MeasureSummary,
    pub generated_at: DateTime<Utc>,
}

impl LibraryStats {
    pub fn from_performers(performers: &[Performer]) -> Self {
        let country_distribution = distribution(performers.iter().map(Performer::country));
        let ethnicity_distribution = distribution(performers.iter().map(Performer::ethnicity));
        let known = |buckets: &[Bucket]| buckets.iter().filter(|b| b.value != UNKNOWN).count();
        Self {
            total_performers: performers.len(),
            distinct_countries: known(&country_distribution),
            distinct_ethnicities: known(&ethnicity_distribution),
            country_distribution,
            ethnicity_distribution,
            height_cm: MeasureSummary::from_values(performers.iter().map(Performer::height)),
            weight: MeasureSummary::from_values(performers.iter().map(Performer::weight)),
            generated_at: Utc::now(),
        }
    }
}

impl AnalysisEngine {
    pub async fn library_statistics(&self) -> Result<LibraryStats> {
        let performers = self
            .catalog()
            .favorite_performers()
            .await
            .map_err(|e| Error::sub_fetch("favorite_performers", e))?;
        tracing::debug!(total = performers.len(), "computing library statistics");
        Ok(LibraryStats::from_performers(&performers))
    }
}
