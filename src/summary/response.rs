use serde::Serialize;
use tracing::error;

use crate::error::SummaryResult;
use crate::summary::{Summary, SummaryEntry};

pub const NOT_AVAILABLE: &str = "Not Available";
pub const ALL_VALUES: &str = "(ALL)";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRow {
    /// One value per summary dimension, `(ALL)` where the slice does not fix it.
    pub names: Vec<String>,
    pub baseline_value: f64,
    pub current_value: f64,
    pub change_ratio: Option<f64>,
    pub contribution: f64,
    pub cost: f64,
}

impl ResponseRow {
    fn from_entry(entry: &SummaryEntry, dimensions: &[String]) -> Self {
        Self {
            names: dimensions
                .iter()
                .map(|d| entry.value_of(d).unwrap_or(ALL_VALUES).to_string())
                .collect(),
            baseline_value: entry.baseline_value,
            current_value: entry.current_value,
            change_ratio: entry.change_ratio,
            contribution: entry.contribution_share,
            cost: entry.score,
        }
    }
}

/// Client-facing form of a summary. Failures become the "Not Available"
/// sentinel instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub metric_name: Option<String>,
    pub available: bool,
    pub dimensions: Vec<String>,
    pub baseline_total: f64,
    pub current_total: f64,
    pub global_ratio: Option<f64>,
    pub response_rows: Vec<ResponseRow>,
}

impl SummaryResponse {
    pub fn not_available() -> Self {
        Self {
            metric_name: Some(NOT_AVAILABLE.to_string()),
            available: false,
            dimensions: Vec::new(),
            baseline_total: 0.0,
            current_total: 0.0,
            global_ratio: None,
            response_rows: Vec::new(),
        }
    }

    pub fn from_summary(summary: &Summary) -> Self {
        Self {
            metric_name: summary.metric_name.clone(),
            available: true,
            dimensions: summary.dimensions.clone(),
            baseline_total: summary.baseline_total,
            current_total: summary.current_total,
            global_ratio: summary.global_ratio,
            response_rows: summary
                .entries
                .iter()
                .map(|entry| ResponseRow::from_entry(entry, &summary.dimensions))
                .collect(),
        }
    }

    pub fn from_outcome(outcome: SummaryResult<Summary>) -> Self {
        match outcome {
            Ok(summary) => Self::from_summary(&summary),
            Err(e) => {
                error!("Exception while generating difference summary: {}", e);
                Self::not_available()
            }
        }
    }
}
