//! Per-tool call metrics.
//!
//! In-memory sliding window per tool, reported by `health_check`. Calls
//! rejected for bad input (`validation`, `not_found`) are counted but do not
//! degrade a tool's status; remote and internal failures do.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

// =============================================================================
// Configuration
// =============================================================================

/// Status thresholds.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Minimum success rate for `healthy` (default: 0.95).
    pub success_rate_healthy: f64,
    /// Minimum success rate for `degraded` (default: 0.80).
    pub success_rate_degraded: f64,
    /// Minimum calls before a status is assessed (default: 5).
    pub min_calls_for_assessment: usize,
    /// Calls kept per tool (default: 100).
    pub window_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            success_rate_healthy: 0.95,
            success_rate_degraded: 0.80,
            min_calls_for_assessment: 5,
            window_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

// =============================================================================
// Per-tool window
// =============================================================================

#[derive(Debug, Clone)]
struct CallRecord {
    latency_ms: u64,
    /// `Error::kind()` of a failed call.
    error_kind: Option<&'static str>,
}

impl CallRecord {
    fn is_failure(&self) -> bool {
        matches!(self.error_kind, Some(kind) if kind != "validation" && kind != "not_found")
    }
}

#[derive(Debug)]
struct ToolWindow {
    records: VecDeque<CallRecord>,
    window_size: usize,
    lifetime_calls: u64,
}

impl ToolWindow {
    fn new(window_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(window_size),
            window_size,
            lifetime_calls: 0,
        }
    }

    fn record(&mut self, latency_ms: u64, error_kind: Option<&'static str>) {
        if self.records.len() >= self.window_size {
            self.records.pop_front();
        }
        self.records.push_back(CallRecord {
            latency_ms,
            error_kind,
        });
        self.lifetime_calls += 1;
    }

    fn failures(&self) -> usize {
        self.records.iter().filter(|r| r.is_failure()).count()
    }

    fn success_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        1.0 - self.failures() as f64 / self.records.len() as f64
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.records.iter().map(|r| r.latency_ms).sum();
        sum as f64 / self.records.len() as f64
    }

    fn error_kinds(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for kind in self.records.iter().filter_map(|r| r.error_kind) {
            *counts.entry(kind).or_default() += 1;
        }
        let mut kinds: Vec<(String, usize)> =
            counts.into_iter().map(|(k, n)| (k.to_string(), n)).collect();
        kinds.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        kinds
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallReport {
    pub tool: String,
    pub status: ToolStatus,
    pub total_calls: u64,
    /// Calls in the current window.
    pub window_calls: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub error_kinds: Vec<(String, usize)>,
}

// =============================================================================
// Tracker
// =============================================================================

/// Sliding-window call metrics for every tool.
#[derive(Debug, Default)]
pub struct CallMetrics {
    config: MetricsConfig,
    windows: HashMap<String, ToolWindow>,
}

impl CallMetrics {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    pub fn record(&mut self, tool: &str, latency_ms: u64, error_kind: Option<&'static str>) {
        let window_size = self.config.window_size;
        self.windows
            .entry(tool.to_string())
            .or_insert_with(|| ToolWindow::new(window_size))
            .record(latency_ms, error_kind);
    }

    pub fn tool_report(&self, tool: &str) -> Option<ToolCallReport> {
        let window = self.windows.get(tool)?;
        let success_rate = window.success_rate();
        let status = if window.records.len() < self.config.min_calls_for_assessment {
            ToolStatus::Unknown
        } else if success_rate >= self.config.success_rate_healthy {
            ToolStatus::Healthy
        } else if success_rate >= self.config.success_rate_degraded {
            ToolStatus::Degraded
        } else {
            ToolStatus::Unhealthy
        };
        Some(ToolCallReport {
            tool: tool.to_string(),
            status,
            total_calls: window.lifetime_calls,
            window_calls: window.records.len(),
            success_rate,
            avg_latency_ms: window.avg_latency_ms(),
            error_kinds: window.error_kinds(),
        })
    }

    /// Reports for every tool called so far, sorted by name.
    pub fn report(&self) -> Vec<ToolCallReport> {
        let mut names: Vec<&String> = self.windows.keys().collect();
        names.sort();
        names.into_iter().filter_map(|n| self.tool_report(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_until_enough_calls() {
        let mut metrics = CallMetrics::default();
        metrics.record("health_check", 3, None);
        let report = metrics.tool_report("health_check").unwrap();
        assert_eq!(report.status, ToolStatus::Unknown);
        assert_eq!(report.total_calls, 1);
        assert!(metrics.tool_report("library_statistics").is_none());
    }

    #[test]
    fn test_bad_input_does_not_degrade() {
        let mut metrics = CallMetrics::default();
        for _ in 0..5 {
            metrics.record("get_all_performers", 10, Some("validation"));
        }
        metrics.record("get_all_performers", 20, Some("not_found"));
        let report = metrics.tool_report("get_all_performers").unwrap();
        assert_eq!(report.status, ToolStatus::Healthy);
        assert_eq!(report.success_rate, 1.0);
        assert_eq!(
            report.error_kinds,
            vec![("validation".to_string(), 5), ("not_found".to_string(), 1)]
        );
    }

    #[test]
    fn test_remote_failures_degrade() {
        let mut metrics = CallMetrics::default();
        for _ in 0..9 {
            metrics.record("get_all_scenes", 10, None);
        }
        metrics.record("get_all_scenes", 30, Some("connectivity"));
        let report = metrics.tool_report("get_all_scenes").unwrap();
        assert_eq!(report.status, ToolStatus::Degraded);
        assert!((report.success_rate - 0.9).abs() < 1e-9);
        assert!((report.avg_latency_ms - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_slides() {
        let mut metrics = CallMetrics::new(MetricsConfig {
            window_size: 3,
            ..MetricsConfig::default()
        });
        metrics.record("clear_cache", 1, Some("internal"));
        for _ in 0..3 {
            metrics.record("clear_cache", 1, None);
        }
        let report = metrics.tool_report("clear_cache").unwrap();
        assert_eq!(report.window_calls, 3);
        assert_eq!(report.total_calls, 4);
        assert!(report.error_kinds.is_empty());
    }

    #[test]
    fn test_report_sorted() {
        let mut metrics = CallMetrics::default();
        metrics.record("recommend_performers", 1, None);
        metrics.record("clear_cache", 1, None);
        let names: Vec<String> = metrics.report().into_iter().map(|r| r.tool).collect();
        assert_eq!(names, vec!["clear_cache", "recommend_performers"]);
    }
}
