//! The cube of aggregated slices explaining a baseline/current change.
//!
//! A [`Cube`] is an arena of [`Slice`]s rooted at [`SliceId::ROOT`]. Each
//! slice fixes values for a prefix of the cube's [`DimensionSet`]; its
//! children fix one more. Breadth pruning drops children but keeps their
//! totals in the parent's [`Remainder`], so every expanded slice still equals
//! its retained children plus that remainder.

pub mod builder;
mod pool;
pub mod slice;
mod stats;

pub use builder::CubeBuilder;
pub use slice::{Assignment, Remainder, Slice, SliceId};
pub use stats::BuildSnapshot;

use crate::dimensions::DimensionSet;

#[derive(Debug, Clone)]
pub struct Cube {
    dimensions: DimensionSet,
    slices: Vec<Slice>,
    stats: BuildSnapshot,
}

impl Cube {
    pub(crate) fn new(dimensions: DimensionSet, slices: Vec<Slice>, stats: BuildSnapshot) -> Self {
        Self {
            dimensions,
            slices,
            stats,
        }
    }

    pub fn dimensions(&self) -> &DimensionSet {
        &self.dimensions
    }

    pub fn root(&self) -> &Slice {
        &self.slices[SliceId::ROOT.0]
    }

    pub fn slice(&self, id: SliceId) -> Option<&Slice> {
        self.slices.get(id.0)
    }

    /// All slices, parents before children.
    pub fn slices(&self) -> impl Iterator<Item = &Slice> {
        self.slices.iter()
    }

    pub fn children(&self, id: SliceId) -> impl Iterator<Item = &Slice> {
        self.slice(id)
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |child| self.slice(*child))
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.len() <= 1
    }

    pub fn stats(&self) -> &BuildSnapshot {
        &self.stats
    }

    /// Expanded slices whose values differ from their children plus the
    /// pruned remainder by more than `tolerance` (relative, floored at 1).
    pub fn verify_consistency(&self, tolerance: f64) -> Vec<SliceId> {
        self.slices
            .iter()
            .filter(|slice| slice.expanded)
            .filter(|slice| {
                let (baseline, current) = self.children(slice.id).fold(
                    (slice.pruned.baseline, slice.pruned.current),
                    |(b, c), child| (b + child.baseline, c + child.current),
                );
                !approx_eq(slice.baseline, baseline, tolerance)
                    || !approx_eq(slice.current, current, tolerance)
            })
            .map(|slice| slice.id)
            .collect()
    }
}

pub(crate) fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
}
