pub mod response;
pub mod selector;

use serde::Serialize;

use crate::cost::CostModel;
use crate::cube::{Assignment, Cube};

pub use response::{ResponseRow, SummaryResponse, NOT_AVAILABLE};
pub use selector::SummarySelector;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    pub path: Vec<Assignment>,
    pub baseline_value: f64,
    pub current_value: f64,
    /// `current / baseline`; absent when the baseline is zero.
    pub change_ratio: Option<f64>,
    /// Signed fraction of the overall change carried by this slice.
    pub contribution_share: f64,
    pub score: f64,
}

impl SummaryEntry {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn change(&self) -> f64 {
        self.current_value - self.baseline_value
    }

    pub fn label(&self) -> String {
        self.path
            .iter()
            .map(Assignment::to_string)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn value_of(&self, dimension: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|a| a.dimension == dimension)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub metric_name: Option<String>,
    pub dimensions: Vec<String>,
    pub baseline_total: f64,
    pub current_total: f64,
    pub global_ratio: Option<f64>,
    pub entries: Vec<SummaryEntry>,
}

impl Summary {
    pub fn compute(
        cube: &Cube,
        cost: CostModel,
        summary_size: usize,
        one_side_error: bool,
    ) -> Self {
        let root = cube.root();
        let entries = SummarySelector::new(cube, cost).select(summary_size, one_side_error);
        Self {
            metric_name: None,
            dimensions: cube.dimensions().names().to_vec(),
            baseline_total: root.baseline(),
            current_total: root.current(),
            global_ratio: selector::ratio(root.baseline(), root.current()),
            entries,
        }
    }

    pub fn with_metric_name(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = Some(metric_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
