pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cube::Assignment;
use crate::error::GatewayError;

pub use memory::InMemoryGateway;

/// Aggregated metric value per value of the grouped dimension.
pub type GroupedValues = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRangeKind {
    Baseline,
    Current,
}

impl fmt::Display for TimeRangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRangeKind::Baseline => write!(f, "baseline"),
            TimeRangeKind::Current => write!(f, "current"),
        }
    }
}

/// Half-open range of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_inclusive: i64,
    pub end_exclusive: i64,
}

impl TimeRange {
    pub fn new(start_inclusive: i64, end_exclusive: i64) -> Self {
        Self {
            start_inclusive,
            end_exclusive,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start_inclusive && timestamp < self.end_exclusive
    }
}

/// One grouped aggregate request: the metric over `range`, restricted to
/// `fixed`, grouped by `next_dimension`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub table: String,
    pub kind: TimeRangeKind,
    pub range: TimeRange,
    pub timezone: String,
    pub fixed: Vec<Assignment>,
    pub next_dimension: String,
}

/// The table, time windows and timezone shared by every query of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryScope {
    pub table: String,
    pub baseline: TimeRange,
    pub current: TimeRange,
    pub timezone: String,
}

impl QueryScope {
    pub fn query(
        &self,
        kind: TimeRangeKind,
        fixed: &[Assignment],
        next_dimension: &str,
    ) -> AggregateQuery {
        let range = match kind {
            TimeRangeKind::Baseline => self.baseline,
            TimeRangeKind::Current => self.current,
        };
        AggregateQuery {
            table: self.table.clone(),
            kind,
            range,
            timezone: self.timezone.clone(),
            fixed: fixed.to_vec(),
            next_dimension: next_dimension.to_string(),
        }
    }
}

/// Capability the cube builder needs from an OLAP backend.
#[async_trait]
pub trait AggregateGateway: Send + Sync {
    async fn column_names(&self, table: &str) -> Result<Vec<String>, GatewayError>;

    async fn grouped_aggregate(
        &self,
        query: &AggregateQuery,
    ) -> Result<GroupedValues, GatewayError>;
}
