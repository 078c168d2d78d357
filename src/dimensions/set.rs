use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{SummaryError, SummaryResult};

/// Ordered, duplicate-free dimension names. The order is the drill-down order
/// of the cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DimensionSet {
    names: Vec<String>,
}

impl DimensionSet {
    pub fn from_manual_order<I, S>(names: I) -> SummaryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = normalize(names)?;
        if names.is_empty() {
            return Err(SummaryError::invalid_dimension("dimension list is empty"));
        }
        let mut seen = BTreeSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(SummaryError::invalid_dimension(format!(
                    "duplicate dimension {}",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    pub(crate) fn from_validated(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

/// Trims names and rejects blank ones.
pub(crate) fn normalize<I, S>(names: I) -> SummaryResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() {
                Err(SummaryError::invalid_dimension("blank dimension name"))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}
