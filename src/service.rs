//! Entry points building a difference summary for one request.
//!
//! Both entry points take an explicit [`SummaryContext`] holding the resolved
//! gateway and configuration. Each call builds its own cube and query pool,
//! and nothing is kept between calls.

use std::sync::Arc;

use tracing::info;

use crate::config::SummaryConfig;
use crate::cube::CubeBuilder;
use crate::dimensions::set::normalize;
use crate::dimensions::{DimensionSet, Hierarchy};
use crate::error::{SummaryError, SummaryResult};
use crate::gateway::{AggregateGateway, QueryScope, TimeRange};
use crate::summary::Summary;

pub struct SummaryContext {
    gateway: Arc<dyn AggregateGateway>,
    config: SummaryConfig,
}

impl SummaryContext {
    pub fn new(gateway: Arc<dyn AggregateGateway>, config: SummaryConfig) -> Self {
        Self { gateway, config }
    }

    /// Column names of `table` minus the configured non-dimension columns.
    pub async fn candidate_dimensions(&self, table: &str) -> SummaryResult<Vec<String>> {
        let columns = self
            .gateway
            .column_names(table)
            .await
            .map_err(|source| SummaryError::aggregate_query(table, "column names", source))?;
        Ok(columns
            .into_iter()
            .filter(|column| !self.config.is_excluded_column(column))
            .collect())
    }

    fn scope(
        &self,
        table: &str,
        baseline: TimeRange,
        current: TimeRange,
        timezone: Option<&str>,
    ) -> QueryScope {
        let timezone = timezone
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or(&self.config.default_timezone);
        QueryScope {
            table: table.to_string(),
            baseline,
            current,
            timezone: timezone.to_string(),
        }
    }

    fn builder(&self, scope: QueryScope) -> CubeBuilder {
        CubeBuilder::new(Arc::clone(&self.gateway), scope, &self.config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoSummaryRequest {
    pub table: String,
    pub baseline: TimeRange,
    pub current: TimeRange,
    /// Candidates to choose from; `None` uses the table's columns.
    pub dimensions: Option<Vec<String>>,
    pub summary_size: i64,
    /// `None` uses the configured default.
    pub top_dimensions: Option<i64>,
    pub hierarchy: Hierarchy,
    pub one_side_error: bool,
    pub timezone: Option<String>,
}

impl AutoSummaryRequest {
    pub fn new(
        table: impl Into<String>,
        baseline: TimeRange,
        current: TimeRange,
        summary_size: i64,
    ) -> Self {
        Self {
            table: table.into(),
            baseline,
            current,
            dimensions: None,
            summary_size,
            top_dimensions: None,
            hierarchy: Hierarchy::default(),
            one_side_error: false,
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualSummaryRequest {
    pub metric: String,
    pub table: String,
    pub baseline: TimeRange,
    pub current: TimeRange,
    /// Drill-down order; `None` uses the table's columns in declared order.
    pub dimensions: Option<Vec<String>>,
    pub summary_size: i64,
    pub one_side_error: bool,
    pub timezone: Option<String>,
}

impl ManualSummaryRequest {
    pub fn new(
        metric: impl Into<String>,
        table: impl Into<String>,
        baseline: TimeRange,
        current: TimeRange,
        summary_size: i64,
    ) -> Self {
        Self {
            metric: metric.into(),
            table: table.into(),
            baseline,
            current,
            dimensions: None,
            summary_size,
            one_side_error: false,
            timezone: None,
        }
    }
}

/// Requested sizes below one mean one entry.
pub fn clamp_summary_size(requested: i64) -> usize {
    if requested < 1 {
        1
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}

pub async fn build_auto_ordered_summary(
    ctx: &SummaryContext,
    request: AutoSummaryRequest,
) -> SummaryResult<Summary> {
    let summary_size = clamp_summary_size(request.summary_size);
    let top_dimensions = request
        .top_dimensions
        .unwrap_or(ctx.config.default_top_dimensions as i64);
    let candidates = match request.dimensions {
        Some(names) => normalize(names)?,
        None => ctx.candidate_dimensions(&request.table).await?,
    };
    info!(
        "Auto-ordered summary on {} over {} candidates (top {}, size {})",
        request.table,
        candidates.len(),
        top_dimensions,
        summary_size
    );

    let scope = ctx.scope(
        &request.table,
        request.baseline,
        request.current,
        request.timezone.as_deref(),
    );
    let cube = ctx
        .builder(scope)
        .build_with_auto_order(&candidates, top_dimensions, &request.hierarchy)
        .await?;
    Ok(Summary::compute(&cube, ctx.config.cost_model(), summary_size, request.one_side_error))
}

pub async fn build_manual_ordered_summary(
    ctx: &SummaryContext,
    request: ManualSummaryRequest,
) -> SummaryResult<Summary> {
    let summary_size = clamp_summary_size(request.summary_size);
    let mut names = match request.dimensions {
        Some(names) => names,
        None => ctx.candidate_dimensions(&request.table).await?,
    };
    names.truncate(ctx.config.max_manual_dimensions.max(1));
    let dimensions = DimensionSet::from_manual_order(names)?;
    info!(
        "Manual summary of {} on {} by {:?} (size {})",
        request.metric,
        request.table,
        dimensions.names(),
        summary_size
    );

    let scope = ctx.scope(
        &request.table,
        request.baseline,
        request.current,
        request.timezone.as_deref(),
    );
    let cube = ctx.builder(scope).build_with_manual_order(dimensions).await?;
    Ok(Summary::compute(&cube, ctx.config.cost_model(), summary_size, request.one_side_error)
        .with_metric_name(request.metric))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::memory::FactTable;
    use crate::gateway::{AggregateQuery, GroupedValues, InMemoryGateway};
    use crate::summary::SummaryResponse;
    use async_trait::async_trait;

    const BASELINE: TimeRange = TimeRange {
        start_inclusive: 0,
        end_exclusive: 5,
    };
    const CURRENT: TimeRange = TimeRange {
        start_inclusive: 5,
        end_exclusive: 15,
    };

    fn context() -> SummaryContext {
        let mut table = FactTable::new(vec![
            "country".to_string(),
            "device".to_string(),
            "METRIC".to_string(),
            "datetime_flag".to_string(),
        ]);
        table.push(0, 600.0, &[("country", "US"), ("device", "ios")]);
        table.push(0, 400.0, &[("country", "EU"), ("device", "web")]);
        table.push(10, 850.0, &[("country", "US"), ("device", "ios")]);
        table.push(10, 350.0, &[("country", "EU"), ("device", "web")]);
        SummaryContext::new(
            Arc::new(InMemoryGateway::with_table("sales", table)),
            SummaryConfig::default(),
        )
    }

    /// Country explains the change; device moves evenly everywhere.
    fn balanced() -> SummaryContext {
        let mut table = FactTable::new(vec![
            "country".to_string(),
            "device".to_string(),
            "METRIC".to_string(),
        ]);
        for (ts, us, eu) in [(0, 300.0, 200.0), (10, 425.0, 175.0)] {
            table.push(ts, us, &[("country", "US"), ("device", "ios")]);
            table.push(ts, us, &[("country", "US"), ("device", "web")]);
            table.push(ts, eu, &[("country", "EU"), ("device", "ios")]);
            table.push(ts, eu, &[("country", "EU"), ("device", "web")]);
        }
        SummaryContext::new(
            Arc::new(InMemoryGateway::with_table("sales", table)),
            SummaryConfig::default(),
        )
    }

    struct Unreachable;

    #[async_trait]
    impl AggregateGateway for Unreachable {
        async fn column_names(&self, _table: &str) -> Result<Vec<String>, GatewayError> {
            Ok(vec!["country".to_string()])
        }

        async fn grouped_aggregate(
            &self,
            _query: &AggregateQuery,
        ) -> Result<GroupedValues, GatewayError> {
            Err(GatewayError::Backend {
                reason: "connection refused".to_string(),
            })
        }
    }

    fn auto(top_dimensions: i64, summary_size: i64) -> AutoSummaryRequest {
        let mut request = AutoSummaryRequest::new("sales", BASELINE, CURRENT, summary_size);
        request.top_dimensions = Some(top_dimensions);
        request
    }

    fn manual(dimensions: &[&str], summary_size: i64) -> ManualSummaryRequest {
        let mut request =
            ManualSummaryRequest::new("revenue", "sales", BASELINE, CURRENT, summary_size);
        request.dimensions = Some(dimensions.iter().map(|d| d.to_string()).collect());
        request
    }

    fn labels(summary: &Summary) -> Vec<String> {
        summary.entries.iter().map(|e| e.label()).collect()
    }

    #[tokio::test]
    async fn auto_summary_finds_the_driving_country() {
        let summary = build_auto_ordered_summary(&balanced(), auto(1, 1)).await.unwrap();
        assert_eq!(summary.dimensions, vec!["country"]);
        assert_eq!(labels(&summary), vec!["country=US"]);
        assert_eq!(summary.baseline_total, 1000.0);
        assert_eq!(summary.current_total, 1200.0);
        assert_eq!(summary.global_ratio, Some(1.2));
        assert_eq!(summary.entries[0].contribution_share, 1.25);
    }

    #[tokio::test]
    async fn deeper_slices_are_discounted() {
        let summary = build_auto_ordered_summary(&balanced(), auto(2, 3)).await.unwrap();
        assert_eq!(summary.dimensions, vec!["country", "device"]);
        assert_eq!(
            labels(&summary),
            vec!["country=US", "country=US/device=ios", "country=US/device=web"]
        );
    }

    #[tokio::test]
    async fn hierarchy_parent_comes_first() {
        let mut request = auto(2, 5);
        request.hierarchy = Hierarchy::from_json(r#"[["device", "country"]]"#).unwrap();
        let summary = build_auto_ordered_summary(&balanced(), request).await.unwrap();
        assert_eq!(summary.dimensions, vec!["device", "country"]);
    }

    #[tokio::test]
    async fn auto_summary_rejects_empty_candidates() {
        let mut request = auto(2, 5);
        request.dimensions = Some(Vec::new());
        let err = build_auto_ordered_summary(&balanced(), request).await.unwrap_err();
        assert!(err.is_invalid_dimension());
    }

    #[tokio::test]
    async fn one_side_error_drops_opposing_slices() {
        let ctx = balanced();
        let both = build_manual_ordered_summary(&ctx, manual(&["country"], 10)).await.unwrap();
        assert_eq!(labels(&both), vec!["country=US", "country=EU"]);

        let mut request = manual(&["country"], 10);
        request.one_side_error = true;
        let one_sided = build_manual_ordered_summary(&ctx, request).await.unwrap();
        assert_eq!(labels(&one_sided), vec!["country=US"]);
    }

    #[tokio::test]
    async fn one_side_error_keeps_everything_without_overall_change() {
        let mut table = FactTable::new(vec!["country".to_string()]);
        table.push(0, 100.0, &[("country", "US")]);
        table.push(0, 100.0, &[("country", "EU")]);
        table.push(10, 150.0, &[("country", "US")]);
        table.push(10, 50.0, &[("country", "EU")]);
        let ctx = SummaryContext::new(
            Arc::new(InMemoryGateway::with_table("sales", table)),
            SummaryConfig::default(),
        );
        let mut request = manual(&["country"], 10);
        request.one_side_error = true;
        let summary = build_manual_ordered_summary(&ctx, request).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary.global_ratio, Some(1.0));
    }

    #[tokio::test]
    async fn summary_length_is_bounded_by_qualifying_slices() {
        let ctx = balanced();
        let summary = build_manual_ordered_summary(&ctx, manual(&["country", "device"], 100))
            .await
            .unwrap();
        assert_eq!(summary.len(), 6);

        let summary = build_manual_ordered_summary(&ctx, manual(&["country", "device"], -5))
            .await
            .unwrap();
        assert_eq!(summary.len(), 1);
    }

    #[tokio::test]
    async fn repeated_builds_agree() {
        let ctx = balanced();
        let first = build_auto_ordered_summary(&ctx, auto(2, 10)).await.unwrap();
        let second = build_auto_ordered_summary(&ctx, auto(2, 10)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unreachable_backend_yields_sentinel() {
        let ctx = SummaryContext::new(Arc::new(Unreachable), SummaryConfig::default());

        let err = build_manual_ordered_summary(&ctx, manual(&["country"], 3)).await.unwrap_err();
        assert!(err.is_aggregate_query());
        assert!(err.to_string().contains("connection refused"));

        let outcome = build_auto_ordered_summary(&ctx, auto(1, 3)).await;
        assert!(matches!(outcome, Err(SummaryError::AggregateQuery { .. })));
        assert_eq!(SummaryResponse::from_outcome(outcome), SummaryResponse::not_available());
    }

    #[test]
    fn summary_size_is_clamped() {
        assert_eq!(clamp_summary_size(-3), 1);
        assert_eq!(clamp_summary_size(0), 1);
        assert_eq!(clamp_summary_size(7), 7);
    }

    #[tokio::test]
    async fn candidates_skip_metric_columns() {
        let ctx = context();
        let candidates = ctx.candidate_dimensions("sales").await.unwrap();
        assert_eq!(candidates, vec!["country", "device"]);
    }

    #[tokio::test]
    async fn missing_table_is_a_query_error() {
        let ctx = context();
        let err = ctx.candidate_dimensions("nope").await.unwrap_err();
        assert!(err.is_aggregate_query());
    }

    #[tokio::test]
    async fn manual_summary_is_stamped_with_metric() {
        let ctx = context();
        let mut request = ManualSummaryRequest::new("revenue", "sales", BASELINE, CURRENT, 0);
        request.dimensions = Some(vec!["country".to_string()]);
        let summary = build_manual_ordered_summary(&ctx, request).await.unwrap();
        assert_eq!(summary.metric_name.as_deref(), Some("revenue"));
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.entries[0].label(), "country=US");
    }

    #[tokio::test]
    async fn manual_summary_rejects_empty_dimensions() {
        let ctx = context();
        let mut request = ManualSummaryRequest::new("revenue", "sales", BASELINE, CURRENT, 3);
        request.dimensions = Some(Vec::new());
        let err = build_manual_ordered_summary(&ctx, request).await.unwrap_err();
        assert!(err.is_invalid_dimension());
    }

    #[tokio::test]
    async fn manual_summary_defaults_to_table_columns() {
        let ctx = context();
        let request = ManualSummaryRequest::new("revenue", "sales", BASELINE, CURRENT, 10);
        let summary = build_manual_ordered_summary(&ctx, request).await.unwrap();
        assert_eq!(summary.dimensions, vec!["country", "device"]);
    }

    #[tokio::test]
    async fn manual_order_is_truncated_before_validation() {
        let mut table = FactTable::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        table.push(0, 10.0, &[("a", "a1"), ("b", "b1"), ("c", "c1")]);
        table.push(10, 20.0, &[("a", "a1"), ("b", "b1"), ("c", "c1")]);
        let ctx = SummaryContext::new(
            Arc::new(InMemoryGateway::with_table("sales", table)),
            SummaryConfig::default(),
        );
        let summary = build_manual_ordered_summary(&ctx, manual(&["a", "b", "c", "a"], 10))
            .await
            .unwrap();
        assert_eq!(summary.dimensions, vec!["a", "b", "c"]);

        let err = build_manual_ordered_summary(&ctx, manual(&["a", "b", "a"], 10))
            .await
            .unwrap_err();
        assert!(err.is_invalid_dimension());
    }

    #[test]
    fn default_timezone_applies_to_blank_input() {
        let ctx = context();
        let scope = ctx.scope("sales", BASELINE, CURRENT, Some("  "));
        assert_eq!(scope.timezone, "UTC");
        let scope = ctx.scope("sales", BASELINE, CURRENT, Some("America/Los_Angeles"));
        assert_eq!(scope.timezone, "America/Los_Angeles");
    }
}
