use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::cube::stats::BuildStats;
use crate::error::{GatewayError, SummaryError, SummaryResult};
use crate::gateway::{AggregateGateway, AggregateQuery, GroupedValues};

/// Bounded set of in-flight gateway queries, owned by a single build.
///
/// Every batch is joined before `run_all` returns. On the first failure the
/// remaining tasks are aborted; dropping the future aborts them as well.
pub struct QueryPool {
    gateway: Arc<dyn AggregateGateway>,
    permits: Arc<Semaphore>,
    stats: Arc<BuildStats>,
}

impl QueryPool {
    pub fn new(gateway: Arc<dyn AggregateGateway>, size: usize, stats: Arc<BuildStats>) -> Self {
        Self {
            gateway,
            permits: Arc::new(Semaphore::new(size.max(1))),
            stats,
        }
    }

    /// Runs `queries` concurrently; results come back in query order.
    pub async fn run_all(&self, queries: Vec<AggregateQuery>) -> SummaryResult<Vec<GroupedValues>> {
        let total = queries.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let table = queries[0].table.clone();
        let mut dimensions: Vec<String> =
            queries.iter().map(|q| q.next_dimension.clone()).collect();
        dimensions.sort();
        dimensions.dedup();

        let mut tasks = JoinSet::new();
        for (index, query) in queries.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let permits = Arc::clone(&self.permits);
            let stats = Arc::clone(&self.stats);
            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        stats.query_issued();
                        gateway.grouped_aggregate(&query).await
                    }
                    Err(_) => Err(GatewayError::Backend {
                        reason: "query pool closed".to_string(),
                    }),
                };
                (index, query, outcome)
            });
        }
        debug!("Dispatched {} queries on {}", total, table);

        let mut results: Vec<Option<GroupedValues>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(values))) => results[index] = Some(values),
                Ok((_, query, Err(source))) => {
                    self.stats.query_failed();
                    tasks.abort_all();
                    error!(
                        "{} query on {} grouped by {} failed: {}",
                        query.kind, query.table, query.next_dimension, source
                    );
                    return Err(SummaryError::aggregate_query(
                        query.table,
                        format!("{} grouped by {}", query.kind, query.next_dimension),
                        source,
                    ));
                }
                Err(join_error) => {
                    self.stats.query_failed();
                    tasks.abort_all();
                    error!("Query task on {} failed: {}", table, join_error);
                    return Err(SummaryError::aggregate_query(
                        table,
                        format!("grouped by {}", dimensions.join(",")),
                        GatewayError::Backend {
                            reason: format!("query task failed: {}", join_error),
                        },
                    ));
                }
            }
        }

        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                SummaryError::aggregate_query(
                    table,
                    format!("grouped by {}", dimensions.join(",")),
                    GatewayError::Backend {
                        reason: "query result missing".to_string(),
                    },
                )
            })
    }
}
