use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::GatewayError;
use crate::gateway::{AggregateGateway, AggregateQuery, GroupedValues};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Count,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRow {
    pub timestamp: i64,
    pub metric: f64,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactTable {
    pub columns: Vec<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub rows: Vec<FactRow>,
}

impl FactTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            aggregation: Aggregation::Sum,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, timestamp: i64, metric: f64, dimensions: &[(&str, &str)]) {
        self.rows.push(FactRow {
            timestamp,
            metric,
            dimensions: dimensions
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        });
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub tables: BTreeMap<String, FactTable>,
}

/// Gateway answering grouped aggregates from fact tables held in memory.
pub struct InMemoryGateway {
    dataset: Dataset,
}

impl InMemoryGateway {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn with_table(name: impl Into<String>, table: FactTable) -> Self {
        let mut dataset = Dataset::default();
        dataset.tables.insert(name.into(), table);
        Self::new(dataset)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let content = fs::read(path).await.map_err(|e| GatewayError::Dataset {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let dataset: Dataset = serde_json::from_slice(&content).map_err(|e| GatewayError::Dataset {
            reason: format!("failed to parse {}: {}", path.display(), e),
        })?;
        debug!("Loaded dataset {} with {} tables", path.display(), dataset.tables.len());
        Ok(Self::new(dataset))
    }

    fn table(&self, name: &str) -> Result<&FactTable, GatewayError> {
        self.dataset.tables.get(name).ok_or_else(|| GatewayError::UnknownTable {
            table: name.to_string(),
        })
    }
}

#[async_trait]
impl AggregateGateway for InMemoryGateway {
    async fn column_names(&self, table: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn grouped_aggregate(
        &self,
        query: &AggregateQuery,
    ) -> Result<GroupedValues, GatewayError> {
        let table = self.table(&query.table)?;
        let referenced = query
            .fixed
            .iter()
            .map(|a| a.dimension.as_str())
            .chain(std::iter::once(query.next_dimension.as_str()));
        for column in referenced {
            if !table.columns.iter().any(|c| c == column) {
                return Err(GatewayError::UnknownColumn {
                    table: query.table.clone(),
                    column: column.to_string(),
                });
            }
        }

        let mut groups = GroupedValues::new();
        for row in &table.rows {
            if !query.range.contains(row.timestamp) {
                continue;
            }
            let matches = query
                .fixed
                .iter()
                .all(|a| row.dimensions.get(&a.dimension) == Some(&a.value));
            if !matches {
                continue;
            }
            // Rows without a value for the grouped column are dropped, like SQL NULL groups.
            let Some(value) = row.dimensions.get(&query.next_dimension) else {
                continue;
            };
            let contribution = match table.aggregation {
                Aggregation::Sum => row.metric,
                Aggregation::Count => 1.0,
            };
            *groups.entry(value.clone()).or_insert(0.0) += contribution;
        }

        debug!(
            "{} {} by {} (tz {}) -> {} groups",
            query.table,
            query.kind,
            query.next_dimension,
            query.timezone,
            groups.len()
        );
        Ok(groups)
    }
}
