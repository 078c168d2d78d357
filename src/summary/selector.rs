use std::cmp::Ordering;

use crate::cost::{contribution_share, CostModel};
use crate::cube::{Cube, Slice};
use crate::summary::SummaryEntry;

/// Ranks the non-root slices of a built cube.
pub struct SummarySelector<'a> {
    cube: &'a Cube,
    cost: CostModel,
}

impl<'a> SummarySelector<'a> {
    pub fn new(cube: &'a Cube, cost: CostModel) -> Self {
        Self { cube, cost }
    }

    /// Top `summary_size` slices by descending score, fewer fixed dimensions
    /// and then path order breaking ties. With `one_side_error`, slices moving
    /// against the overall change are left out.
    pub fn select(&self, summary_size: usize, one_side_error: bool) -> Vec<SummaryEntry> {
        let root = self.cube.root();
        let root_change = root.change();

        let mut entries: Vec<SummaryEntry> = self
            .cube
            .slices()
            .filter(|slice| !slice.is_root())
            .filter(|slice| !one_side_error || agrees(slice.change(), root_change))
            .map(|slice| self.entry(slice, root))
            .collect();

        entries.sort_by(rank);
        entries.truncate(summary_size);
        entries
    }

    fn entry(&self, slice: &Slice, root: &Slice) -> SummaryEntry {
        let impact = self
            .cost
            .impact(slice.baseline(), slice.current(), root.baseline(), root.current());
        SummaryEntry {
            path: slice.path().to_vec(),
            baseline_value: slice.baseline(),
            current_value: slice.current(),
            change_ratio: ratio(slice.baseline(), slice.current()),
            contribution_share: contribution_share(
                slice.baseline(),
                slice.current(),
                root.baseline(),
                root.current(),
            ),
            score: self.cost.score(impact, slice.depth()),
        }
    }
}

fn agrees(change: f64, root_change: f64) -> bool {
    !(change > 0.0 && root_change < 0.0 || change < 0.0 && root_change > 0.0)
}

fn rank(a: &SummaryEntry, b: &SummaryEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.depth().cmp(&b.depth()))
        .then_with(|| a.path.cmp(&b.path))
}

pub(crate) fn ratio(baseline: f64, current: f64) -> Option<f64> {
    if baseline == 0.0 {
        None
    } else {
        Some(current / baseline)
    }
}
