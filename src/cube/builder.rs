use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::SummaryConfig;
use crate::cost::CostModel;
use crate::cube::pool::QueryPool;
use crate::cube::slice::{Assignment, Remainder, Slice, SliceId};
use crate::cube::stats::BuildStats;
use crate::cube::Cube;
use crate::dimensions::{DimensionScores, DimensionSet, Hierarchy};
use crate::error::{SummaryError, SummaryResult};
use crate::gateway::{AggregateGateway, GroupedValues, QueryScope, TimeRangeKind};

/// Root-level baseline and current groups per dimension.
type RootGroups = BTreeMap<String, Vec<GroupedValues>>;

/// One value of the dimension being expanded, before pruning.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    value: String,
    baseline: f64,
    current: f64,
}

impl Candidate {
    fn change(&self) -> f64 {
        self.current - self.baseline
    }
}

/// Materializes a cube level by level through a query pool scoped to this
/// builder. Consumed by the build, so the pool never outlives it.
pub struct CubeBuilder {
    pool: QueryPool,
    scope: QueryScope,
    cost: CostModel,
    breadth_limit: usize,
    min_expand_share: f64,
    tolerance: f64,
    stats: Arc<BuildStats>,
}

impl CubeBuilder {
    pub fn new(
        gateway: Arc<dyn AggregateGateway>,
        scope: QueryScope,
        config: &SummaryConfig,
    ) -> Self {
        let stats = Arc::new(BuildStats::new());
        Self {
            pool: QueryPool::new(gateway, config.worker_pool_size, Arc::clone(&stats)),
            scope,
            cost: config.cost_model(),
            breadth_limit: config.breadth_limit.max(1),
            min_expand_share: config.min_expand_share,
            tolerance: config.consistency_tolerance,
            stats,
        }
    }

    pub async fn build_with_manual_order(self, dimensions: DimensionSet) -> SummaryResult<Cube> {
        self.build(dimensions, &Hierarchy::default()).await
    }

    /// Scores every candidate, picks the order, then builds. The root query
    /// of the chosen first dimension is reused as the first level.
    pub async fn build_with_auto_order(
        self,
        candidates: &[String],
        top_dimensions: i64,
        hierarchy: &Hierarchy,
    ) -> SummaryResult<Cube> {
        let mut roots = self.query_roots(candidates).await?;
        let scores = self.score_roots(&roots);
        let dimensions =
            DimensionSet::from_auto_order(candidates, top_dimensions, hierarchy, &scores)?;
        info!("Auto dimension order for {}: {:?}", self.scope.table, dimensions.names());
        let first_level = dimensions.get(0).and_then(|first| roots.remove(first));
        self.build_from(dimensions, hierarchy, first_level).await
    }

    /// Baseline and current groups of each candidate split alone, keyed by
    /// trimmed name.
    async fn query_roots(&self, candidates: &[String]) -> SummaryResult<RootGroups> {
        let names: BTreeSet<&str> = candidates
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        let mut queries = Vec::with_capacity(names.len() * 2);
        for dimension in &names {
            queries.push(self.scope.query(TimeRangeKind::Baseline, &[], dimension));
            queries.push(self.scope.query(TimeRangeKind::Current, &[], dimension));
        }
        let results = self.pool.run_all(queries).await?;

        let mut roots = RootGroups::new();
        for (dimension, pair) in names.into_iter().zip(results.chunks(2)) {
            roots.insert(dimension.to_string(), pair.to_vec());
        }
        Ok(roots)
    }

    /// Sum of the impacts of each dimension's top values.
    fn score_roots(&self, roots: &RootGroups) -> DimensionScores {
        let mut scores = DimensionScores::new();
        for (dimension, pair) in roots {
            let values = merge_groups(&pair[0], &pair[1]);
            let root_baseline: f64 = values.iter().map(|c| c.baseline).sum();
            let root_current: f64 = values.iter().map(|c| c.current).sum();
            let mut impacts: Vec<f64> = values
                .iter()
                .map(|c| self.cost.impact(c.baseline, c.current, root_baseline, root_current))
                .collect();
            impacts.sort_by(|a, b| b.total_cmp(a));
            let score: f64 = impacts.iter().take(self.breadth_limit).sum();
            debug!("Dimension {} scored {:.4} over {} values", dimension, score, values.len());
            scores.insert(dimension.clone(), score);
        }
        scores
    }

    pub async fn build(
        self,
        dimensions: DimensionSet,
        hierarchy: &Hierarchy,
    ) -> SummaryResult<Cube> {
        self.build_from(dimensions, hierarchy, None).await
    }

    /// `first_level` holds the already fetched baseline and current groups of
    /// the first dimension at the root.
    async fn build_from(
        self,
        dimensions: DimensionSet,
        hierarchy: &Hierarchy,
        mut first_level: Option<Vec<GroupedValues>>,
    ) -> SummaryResult<Cube> {
        if dimensions.is_empty() {
            return Err(SummaryError::invalid_dimension("dimension list is empty"));
        }
        hierarchy.check_order(&dimensions)?;

        let mut slices = vec![Slice::root()];
        let mut frontier = vec![SliceId::ROOT];
        let mut root_change = 0.0;

        for (level, dimension) in dimensions.names().iter().enumerate() {
            if frontier.is_empty() {
                break;
            }
            let results = match first_level.take() {
                Some(groups) if level == 0 => groups,
                _ => {
                    let mut queries = Vec::with_capacity(frontier.len() * 2);
                    for id in &frontier {
                        let path = &slices[id.0].path;
                        queries.push(self.scope.query(TimeRangeKind::Baseline, path, dimension));
                        queries.push(self.scope.query(TimeRangeKind::Current, path, dimension));
                    }
                    self.pool.run_all(queries).await?
                }
            };

            let last_level = level + 1 == dimensions.len();
            let mut next_frontier = Vec::new();
            for (parent, pair) in frontier.iter().zip(results.chunks(2)) {
                let candidates = merge_groups(&pair[0], &pair[1]);
                if level == 0 {
                    let root = &mut slices[SliceId::ROOT.0];
                    root.baseline = candidates.iter().map(|c| c.baseline).sum();
                    root.current = candidates.iter().map(|c| c.current).sum();
                    root_change = root.change();
                }

                let (kept, pruned) = prune(candidates, self.breadth_limit);
                self.stats.slices_retained(kept.len() as u64);
                self.stats.values_pruned(pruned.values as u64);
                {
                    let parent_slice = &mut slices[parent.0];
                    parent_slice.pruned = pruned;
                    parent_slice.expanded = true;
                }

                for candidate in kept {
                    let id = SliceId(slices.len());
                    let mut path = slices[parent.0].path.clone();
                    path.push(Assignment::new(dimension.as_str(), candidate.value.as_str()));
                    if !last_level && !self.is_negligible(candidate.change(), root_change) {
                        next_frontier.push(id);
                    }
                    slices.push(Slice {
                        id,
                        parent: Some(*parent),
                        path,
                        baseline: candidate.baseline,
                        current: candidate.current,
                        children: Vec::new(),
                        pruned: Remainder::default(),
                        expanded: false,
                    });
                    slices[parent.0].children.push(id);
                }
            }
            self.stats.level_built();
            debug!(
                "Level {} ({}) expanded {} slices, {} to expand next",
                level,
                dimension,
                frontier.len(),
                next_frontier.len()
            );
            frontier = next_frontier;
        }

        let cube = Cube::new(dimensions, slices, self.stats.snapshot());
        for id in cube.verify_consistency(self.tolerance) {
            if let Some(slice) = cube.slice(id) {
                error!(
                    "Slice {} disagrees with its children: baseline={} current={}",
                    slice.label(),
                    slice.baseline(),
                    slice.current()
                );
            }
        }
        let stats = cube.stats();
        info!(
            "Built cube on {} with {} slices ({} queries, {} values pruned) in {}ms",
            self.scope.table,
            cube.len(),
            stats.queries_issued,
            stats.values_pruned,
            stats.elapsed_millis
        );
        Ok(cube)
    }

    fn is_negligible(&self, change: f64, root_change: f64) -> bool {
        change.abs() < self.min_expand_share * root_change.abs()
    }
}

/// Joins baseline and current groups; a value missing on one side counts as zero.
fn merge_groups(baseline: &GroupedValues, current: &GroupedValues) -> Vec<Candidate> {
    let mut values: Vec<&String> = baseline.keys().chain(current.keys()).collect();
    values.sort();
    values.dedup();
    values
        .into_iter()
        .map(|value| Candidate {
            value: value.clone(),
            baseline: baseline.get(value).copied().unwrap_or(0.0),
            current: current.get(value).copied().unwrap_or(0.0),
        })
        .collect()
}

/// Keeps the `limit` candidates with the largest absolute change (ties by
/// value) and folds the rest into a remainder.
fn prune(mut candidates: Vec<Candidate>, limit: usize) -> (Vec<Candidate>, Remainder) {
    candidates.sort_by(|a, b| {
        b.change()
            .abs()
            .total_cmp(&a.change().abs())
            .then_with(|| a.value.cmp(&b.value))
    });
    let dropped = if candidates.len() > limit {
        candidates.split_off(limit)
    } else {
        Vec::new()
    };
    let remainder = Remainder {
        baseline: dropped.iter().map(|c| c.baseline).sum(),
        current: dropped.iter().map(|c| c.current).sum(),
        values: dropped.len(),
    };
    (candidates, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::FactTable;
    use crate::gateway::{InMemoryGateway, TimeRange};
    use proptest::prelude::*;

    fn scope() -> QueryScope {
        QueryScope {
            table: "facts".to_string(),
            baseline: TimeRange::new(0, 10),
            current: TimeRange::new(10, 20),
            timezone: "UTC".to_string(),
        }
    }

    fn builder(table: FactTable, breadth_limit: usize) -> CubeBuilder {
        let config = SummaryConfig {
            breadth_limit,
            ..SummaryConfig::default()
        };
        CubeBuilder::new(Arc::new(InMemoryGateway::with_table("facts", table)), scope(), &config)
    }

    fn wide_table() -> FactTable {
        let mut table = FactTable::new(vec!["item".to_string()]);
        for i in 0..1000 {
            let value = format!("v{:03}", i);
            table.push(1, i as f64, &[("item", value.as_str())]);
            table.push(11, (2 * i) as f64, &[("item", value.as_str())]);
        }
        table
    }

    fn candidate(value: &str, baseline: f64, current: f64) -> Candidate {
        Candidate {
            value: value.to_string(),
            baseline,
            current,
        }
    }

    #[test]
    fn merge_fills_missing_sides_with_zero() {
        let baseline: GroupedValues =
            [("a".to_string(), 1.0), ("b".to_string(), 2.0)].into_iter().collect();
        let current: GroupedValues =
            [("b".to_string(), 3.0), ("c".to_string(), 4.0)].into_iter().collect();
        let merged = merge_groups(&baseline, &current);
        assert_eq!(
            merged,
            vec![candidate("a", 1.0, 0.0), candidate("b", 2.0, 3.0), candidate("c", 0.0, 4.0)]
        );
    }

    #[test]
    fn prune_keeps_largest_changes() {
        let candidates = vec![
            candidate("a", 10.0, 11.0),
            candidate("b", 10.0, 30.0),
            candidate("c", 10.0, 2.0),
            candidate("d", 5.0, 5.0),
        ];
        let (kept, remainder) = prune(candidates, 2);
        let names: Vec<_> = kept.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(remainder.values, 2);
        assert_eq!(remainder.baseline, 15.0);
        assert_eq!(remainder.current, 16.0);
    }

    #[test]
    fn prune_breaks_ties_by_value() {
        let candidates = vec![
            candidate("z", 0.0, 1.0),
            candidate("a", 1.0, 0.0),
            candidate("m", 0.0, 1.0),
        ];
        let (kept, _) = prune(candidates, 2);
        let names: Vec<_> = kept.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(names, vec!["a", "m"]);
    }

    #[test]
    fn prune_under_limit_keeps_everything() {
        let (kept, remainder) = prune(vec![candidate("a", 1.0, 2.0)], 5);
        assert_eq!(kept.len(), 1);
        assert!(remainder.is_empty());
    }

    #[tokio::test]
    async fn wide_dimension_is_pruned_to_breadth_limit() {
        let cube = builder(wide_table(), 3)
            .build_with_manual_order(DimensionSet::from_manual_order(["item"]).unwrap())
            .await
            .unwrap();

        let labels: Vec<String> = cube.children(SliceId::ROOT).map(|s| s.label()).collect();
        assert_eq!(labels, vec!["item=v999", "item=v998", "item=v997"]);
        assert_eq!(cube.stats().queries_issued, 2);
        assert_eq!(cube.stats().values_pruned, 997);
        assert_eq!(cube.root().pruned().values, 997);
        assert_eq!(cube.root().baseline(), 499500.0);
        assert!(cube.verify_consistency(1e-9).is_empty());
    }

    #[tokio::test]
    async fn negligible_slices_are_not_expanded() {
        let mut table = FactTable::new(vec!["country".to_string(), "device".to_string()]);
        table.push(1, 1000.0, &[("country", "US"), ("device", "ios")]);
        table.push(11, 2000.0, &[("country", "US"), ("device", "ios")]);
        table.push(1, 500.0, &[("country", "EU"), ("device", "web")]);
        table.push(11, 501.0, &[("country", "EU"), ("device", "web")]);
        let dimensions = DimensionSet::from_manual_order(["country", "device"]).unwrap();
        let cube = builder(table, 10).build_with_manual_order(dimensions).await.unwrap();

        let eu = cube.slices().find(|s| s.label() == "country=EU").unwrap();
        assert!(!eu.is_expanded());
        assert!(eu.children().is_empty());
        let us = cube.slices().find(|s| s.label() == "country=US").unwrap();
        assert!(us.is_expanded());
        assert_eq!(us.children().len(), 1);
    }

    #[tokio::test]
    async fn auto_order_prefers_explanatory_dimension() {
        let mut table = FactTable::new(vec!["country".to_string(), "device".to_string()]);
        for (ts, us, eu) in [(1, 300.0, 200.0), (11, 425.0, 175.0)] {
            table.push(ts, us, &[("country", "US"), ("device", "ios")]);
            table.push(ts, us, &[("country", "US"), ("device", "web")]);
            table.push(ts, eu, &[("country", "EU"), ("device", "ios")]);
            table.push(ts, eu, &[("country", "EU"), ("device", "web")]);
        }
        let builder = builder(table, 10);
        let candidates = vec!["device".to_string(), "country".to_string()];
        let scores = builder.score_roots(&builder.query_roots(&candidates).await.unwrap());
        assert!(scores["country"] > scores["device"]);

        let cube = builder
            .build_with_auto_order(&candidates, 1, &Hierarchy::default())
            .await
            .unwrap();
        assert_eq!(cube.dimensions().names(), ["country"]);
        // Four scoring queries; the first level reuses the country pair.
        assert_eq!(cube.stats().queries_issued, 4);
        assert_eq!(cube.children(SliceId::ROOT).count(), 2);
        assert!(cube.verify_consistency(1e-9).is_empty());
    }

    #[tokio::test]
    async fn first_level_reuses_scoring_queries() {
        let mut table = FactTable::new(vec!["country".to_string(), "device".to_string()]);
        table.push(1, 100.0, &[("country", "US"), ("device", "ios")]);
        table.push(11, 300.0, &[("country", "US"), ("device", "ios")]);
        table.push(1, 100.0, &[("country", "EU"), ("device", "web")]);
        table.push(11, 90.0, &[("country", "EU"), ("device", "web")]);
        let candidates = vec!["country".to_string(), "device".to_string()];
        let cube = builder(table, 10)
            .build_with_auto_order(&candidates, 2, &Hierarchy::default())
            .await
            .unwrap();
        // Four scoring queries, then one pair per country at the second level.
        assert_eq!(cube.stats().queries_issued, 8);
        assert_eq!(cube.stats().levels_built, 2);
        assert_eq!(cube.root().baseline(), 200.0);
        assert_eq!(cube.root().current(), 390.0);
    }

    fn geography() -> FactTable {
        let mut table = FactTable::new(vec!["continent".to_string(), "country".to_string()]);
        for (ts, us, ca) in [(1, 100.0, 100.0), (11, 250.0, 50.0)] {
            table.push(ts, us, &[("continent", "NA"), ("country", "US")]);
            table.push(ts, ca, &[("continent", "NA"), ("country", "CA")]);
            table.push(ts, 100.0, &[("continent", "EU"), ("country", "FR")]);
            table.push(ts, 100.0, &[("continent", "EU"), ("country", "DE")]);
        }
        table
    }

    #[tokio::test]
    async fn no_slice_fixes_child_without_its_parent() {
        let hierarchy = Hierarchy::from_json(r#"[["continent", "country"]]"#).unwrap();
        let candidates = vec!["country".to_string(), "continent".to_string()];

        let scorer = builder(geography(), 10);
        let scores = scorer.score_roots(&scorer.query_roots(&candidates).await.unwrap());
        assert!(scores["country"] > scores["continent"]);

        for top_dimensions in [1, 2] {
            let cube = builder(geography(), 10)
                .build_with_auto_order(&candidates, top_dimensions, &hierarchy)
                .await
                .unwrap();
            assert_eq!(cube.dimensions().get(0), Some("continent"));
            for slice in cube.slices() {
                let fixes = |dimension: &str| slice.path().iter().any(|a| a.dimension == dimension);
                assert!(
                    !fixes("country") || fixes("continent"),
                    "{} fixes country without continent",
                    slice.label()
                );
            }
        }
    }

    #[tokio::test]
    async fn auto_order_rejects_bad_requests() {
        let err = builder(wide_table(), 3)
            .build_with_auto_order(&["item".to_string()], 0, &Hierarchy::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_dimension());

        let err = builder(wide_table(), 3)
            .build_with_auto_order(&[], 2, &Hierarchy::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_dimension());
    }

    #[tokio::test]
    async fn unknown_dimension_fails_the_build() {
        let err = builder(wide_table(), 3)
            .build_with_manual_order(DimensionSet::from_manual_order(["browser"]).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_aggregate_query());
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every expanded slice equals its children plus the pruned remainder,
        /// and the root equals the whole window.
        #[test]
        fn prop_slices_sum_to_parent(
            rows in prop::collection::vec((0usize..5, 0usize..4, 0u32..1000, any::<bool>()), 0..60),
            breadth_limit in 1usize..5,
        ) {
            let mut table = FactTable::new(vec!["a".to_string(), "b".to_string()]);
            let mut baseline_total = 0.0;
            for (a, b, metric, current) in &rows {
                let a = format!("a{}", a);
                let b = format!("b{}", b);
                let ts = if *current { 11 } else { 1 };
                if !*current {
                    baseline_total += *metric as f64;
                }
                table.push(ts, *metric as f64, &[("a", a.as_str()), ("b", b.as_str())]);
            }

            let dimensions = DimensionSet::from_manual_order(["a", "b"]).unwrap();
            let cube = runtime()
                .block_on(builder(table, breadth_limit).build_with_manual_order(dimensions))
                .unwrap();

            prop_assert!(cube.verify_consistency(1e-9).is_empty());
            prop_assert_eq!(cube.root().baseline(), baseline_total);
            prop_assert!(cube.children(SliceId::ROOT).count() <= breadth_limit);
        }

        #[test]
        fn prop_builds_are_deterministic(
            rows in prop::collection::vec((0usize..6, 0u32..100, any::<bool>()), 1..40),
        ) {
            let mut table = FactTable::new(vec!["a".to_string()]);
            for (a, metric, current) in &rows {
                let a = format!("a{}", a);
                table.push(if *current { 11 } else { 1 }, *metric as f64, &[("a", a.as_str())]);
            }

            let runtime = runtime();
            let labels = |table: FactTable| {
                let dimensions = DimensionSet::from_manual_order(["a"]).unwrap();
                let cube = runtime
                    .block_on(builder(table, 2).build_with_manual_order(dimensions))
                    .unwrap();
                cube.slices().map(|s| (s.label(), s.baseline(), s.current())).collect::<Vec<_>>()
            };
            prop_assert_eq!(labels(table.clone()), labels(table));
        }
    }
}
