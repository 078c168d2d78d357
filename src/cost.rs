//! Scoring of slices against the overall change.
//!
//! A slice's impact is its share of the overall change, amplified by how much
//! the slice moved relative to its own size. The score then discounts impact
//! geometrically per fixed dimension beyond the first, so a shallow slice wins
//! over a deeper one that explains about as much.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub change_weight: f64,
    pub complexity_discount: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(1.0, 0.75)
    }
}

impl CostModel {
    pub fn new(change_weight: f64, complexity_discount: f64) -> Self {
        Self {
            change_weight,
            complexity_discount,
        }
    }

    pub fn impact(
        &self,
        baseline: f64,
        current: f64,
        root_baseline: f64,
        root_current: f64,
    ) -> f64 {
        let change = (current - baseline).abs();
        if change == 0.0 {
            return 0.0;
        }
        let root_change = (root_current - root_baseline).abs();
        let share = if root_change > f64::EPSILON {
            change / root_change
        } else {
            change / root_baseline.abs().max(1.0)
        };
        share * (1.0 + self.change_weight * relative_change(baseline, current))
    }

    pub fn score(&self, impact: f64, depth: usize) -> f64 {
        let extra = depth.saturating_sub(1).min(i32::MAX as usize) as i32;
        impact * self.complexity_discount.powi(extra)
    }
}

/// Symmetric relative change, in `[0, 2]`.
pub fn relative_change(baseline: f64, current: f64) -> f64 {
    let mean = (baseline.abs() + current.abs()) / 2.0;
    if mean == 0.0 {
        0.0
    } else {
        (current - baseline).abs() / mean
    }
}

/// Share of the overall change carried by a slice, signed by agreement.
pub fn contribution_share(
    baseline: f64,
    current: f64,
    root_baseline: f64,
    root_current: f64,
) -> f64 {
    let root_change = root_current - root_baseline;
    if root_change.abs() <= f64::EPSILON {
        0.0
    } else {
        (current - baseline) / root_change
    }
}
