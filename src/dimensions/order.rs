use std::collections::{BTreeMap, BTreeSet};

use crate::dimensions::hierarchy::Hierarchy;
use crate::dimensions::set::{normalize, DimensionSet};
use crate::error::{SummaryError, SummaryResult};

/// Explanatory score per candidate dimension; higher means split earlier.
pub type DimensionScores = BTreeMap<String, f64>;

impl DimensionSet {
    /// Picks at most `top_dimensions` candidates by descending score (ties by
    /// name) and orders them so that hierarchy parents precede their children.
    ///
    /// A picked dimension brings along every hierarchy predecessor that is also
    /// a candidate. When those do not fit in the remaining budget the dimension
    /// is passed over for the next one in rank order.
    pub fn from_auto_order<S: AsRef<str>>(
        candidates: &[S],
        top_dimensions: i64,
        hierarchy: &Hierarchy,
        scores: &DimensionScores,
    ) -> SummaryResult<Self> {
        if top_dimensions < 1 {
            return Err(SummaryError::invalid_dimension(format!(
                "top dimensions must be at least 1, got {}",
                top_dimensions
            )));
        }
        let candidates = dedup(normalize(candidates)?);
        if candidates.is_empty() {
            return Err(SummaryError::invalid_dimension("no candidate dimensions"));
        }

        let mut ranked = candidates;
        ranked.sort_by(|a, b| {
            let score_a = scores.get(a).copied().unwrap_or(0.0);
            let score_b = scores.get(b).copied().unwrap_or(0.0);
            score_b.total_cmp(&score_a).then_with(|| a.cmp(b))
        });
        let budget = usize::try_from(top_dimensions).unwrap_or(usize::MAX);
        let selected = select_with_predecessors(&ranked, budget, hierarchy);
        if selected.is_empty() {
            return Err(SummaryError::invalid_dimension(format!(
                "no candidate fits in {} dimensions together with its hierarchy parents",
                budget
            )));
        }

        let ordered = respect_hierarchy(selected, hierarchy)?;
        Ok(DimensionSet::from_validated(ordered))
    }
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

/// Walks the ranking, taking each dimension together with the predecessors it
/// still lacks. Result keeps rank order.
fn select_with_predecessors(
    ranked: &[String],
    budget: usize,
    hierarchy: &Hierarchy,
) -> Vec<String> {
    let mut selected: BTreeSet<&str> = BTreeSet::new();
    for name in ranked {
        if selected.len() >= budget {
            break;
        }
        if selected.contains(name.as_str()) {
            continue;
        }
        let missing: Vec<&str> = required_with(name, ranked, hierarchy)
            .into_iter()
            .filter(|n| !selected.contains(n))
            .collect();
        if selected.len() + missing.len() <= budget {
            selected.extend(missing);
        }
    }
    ranked
        .iter()
        .filter(|n| selected.contains(n.as_str()))
        .cloned()
        .collect()
}

/// `name` plus its transitive predecessors among the candidates. Chain members
/// that are not candidates impose nothing.
fn required_with<'a>(
    name: &'a str,
    ranked: &'a [String],
    hierarchy: &'a Hierarchy,
) -> BTreeSet<&'a str> {
    let mut required = BTreeSet::from([name]);
    let mut pending = vec![name];
    while let Some(next) = pending.pop() {
        for pred in hierarchy.predecessors(next) {
            if ranked.iter().any(|r| r == pred) && required.insert(pred) {
                pending.push(pred);
            }
        }
    }
    required
}

/// Repeatedly places the best-ranked dimension whose selected predecessors
/// are already placed.
fn respect_hierarchy(ranked: Vec<String>, hierarchy: &Hierarchy) -> SummaryResult<Vec<String>> {
    let mut remaining = ranked;
    let mut placed = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let next = remaining.iter().position(|candidate| {
            hierarchy
                .predecessors(candidate)
                .iter()
                .all(|pred| !remaining.iter().any(|r| r.as_str() == *pred))
        });
        match next {
            Some(index) => placed.push(remaining.remove(index)),
            None => {
                return Err(SummaryError::invalid_dimension(format!(
                    "hierarchies form a cycle among {}",
                    remaining.join(", ")
                )))
            }
        }
    }
    Ok(placed)
}
