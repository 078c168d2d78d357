use std::collections::BTreeSet;

use serde::Serialize;

use crate::dimensions::set::{normalize, DimensionSet};
use crate::error::{SummaryError, SummaryResult};

pub const DEFAULT_HIERARCHIES: &str = "[]";

/// Chains of dimensions from coarse to fine, e.g. `[continent, country, city]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Hierarchy {
    chains: Vec<Vec<String>>,
}

impl Hierarchy {
    pub fn new(chains: Vec<Vec<String>>) -> SummaryResult<Self> {
        let mut normalized = Vec::with_capacity(chains.len());
        for chain in chains {
            let chain = normalize(chain)?;
            let mut seen = BTreeSet::new();
            for name in &chain {
                if !seen.insert(name.as_str()) {
                    return Err(SummaryError::invalid_dimension(format!(
                        "dimension {} repeated in hierarchy chain",
                        name
                    )));
                }
            }
            if chain.len() > 1 {
                normalized.push(chain);
            }
        }
        Ok(Self { chains: normalized })
    }

    pub fn from_json(payload: &str) -> SummaryResult<Self> {
        let chains: Vec<Vec<String>> = serde_json::from_str(payload)
            .map_err(|e| SummaryError::invalid_dimension(format!("malformed hierarchies: {}", e)))?;
        Self::new(chains)
    }

    pub fn chains(&self) -> &[Vec<String>] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Every dimension listed before `dimension` in some chain.
    pub fn predecessors(&self, dimension: &str) -> BTreeSet<&str> {
        let mut result = BTreeSet::new();
        for chain in &self.chains {
            if let Some(pos) = chain.iter().position(|n| n == dimension) {
                result.extend(chain[..pos].iter().map(String::as_str));
            }
        }
        result
    }

    /// Fails when `dimensions` places a dimension before one of its chain
    /// predecessors. Names absent from `dimensions` are unconstrained.
    pub fn check_order(&self, dimensions: &DimensionSet) -> SummaryResult<()> {
        for chain in &self.chains {
            let mut last: Option<(&str, usize)> = None;
            for name in chain {
                let Some(pos) = dimensions.position(name) else {
                    continue;
                };
                if let Some((parent, parent_pos)) = last {
                    if parent_pos > pos {
                        return Err(SummaryError::invalid_dimension(format!(
                            "dimension {} must come after {}",
                            name, parent
                        )));
                    }
                }
                last = Some((name, pos));
            }
        }
        Ok(())
    }
}
