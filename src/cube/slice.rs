use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete value fixed for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub dimension: String,
    pub value: String,
}

impl Assignment {
    pub fn new(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.dimension, self.value)
    }
}

/// Index of a slice in its cube's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SliceId(pub(crate) usize);

impl SliceId {
    pub const ROOT: SliceId = SliceId(0);
}

/// Aggregate of the child values dropped by the breadth limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Remainder {
    pub baseline: f64,
    pub current: f64,
    pub values: usize,
}

impl Remainder {
    pub fn is_empty(&self) -> bool {
        self.values == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Slice {
    pub(crate) id: SliceId,
    pub(crate) parent: Option<SliceId>,
    pub(crate) path: Vec<Assignment>,
    pub(crate) baseline: f64,
    pub(crate) current: f64,
    pub(crate) children: Vec<SliceId>,
    pub(crate) pruned: Remainder,
    pub(crate) expanded: bool,
}

impl Slice {
    pub(crate) fn root() -> Self {
        Self {
            id: SliceId::ROOT,
            parent: None,
            path: Vec::new(),
            baseline: 0.0,
            current: 0.0,
            children: Vec::new(),
            pruned: Remainder::default(),
            expanded: false,
        }
    }

    pub fn id(&self) -> SliceId {
        self.id
    }

    pub fn parent(&self) -> Option<SliceId> {
        self.parent
    }

    pub fn path(&self) -> &[Assignment] {
        &self.path
    }

    /// Number of dimensions fixed.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn change(&self) -> f64 {
        self.current - self.baseline
    }

    pub fn children(&self) -> &[SliceId] {
        &self.children
    }

    pub fn pruned(&self) -> Remainder {
        self.pruned
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn label(&self) -> String {
        if self.path.is_empty() {
            "ALL".to_string()
        } else {
            self.path
                .iter()
                .map(Assignment::to_string)
                .collect::<Vec<_>>()
                .join("/")
        }
    }
}
