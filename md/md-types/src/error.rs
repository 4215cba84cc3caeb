//! Error types for graph construction and node queries.

use thiserror::Error;

/// Errors surfaced by the graph engine.
///
/// All of these arise at construction time or at the single query call that
/// provoked them; evaluation paths are infallible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A node with the given name already exists.
    #[error("duplicate node name: {name}")]
    DuplicateName {
        /// The offending name.
        name: String,
    },

    /// A named parent is not present at add time.
    #[error("unknown parent '{parent}' referenced by node '{node}'")]
    UnknownParent {
        /// The missing parent name.
        parent: String,
        /// The node that referenced it.
        node: String,
    },

    /// A typed lookup or a declared input width did not match reality.
    #[error("node '{name}' is not a {expected}")]
    TypeMismatch {
        /// The node that was looked up.
        name: String,
        /// What the caller expected it to be.
        expected: String,
    },

    /// A consumer expects a producer width different from the actual one.
    #[error("node '{node}' expects input width {expected}, got {actual}")]
    SizeMismatch {
        /// The consumer node.
        node: String,
        /// Width the consumer declared.
        expected: usize,
        /// Width the producer actually has.
        actual: usize,
    },

    /// More upstream slots were requested for one element than the
    /// reverse-autodiff kernel supports.
    #[error("per-element {family} slot capacity exceeded (cap {cap})")]
    SlotCapacityExceeded {
        /// Which slot family overflowed (`"primary"` or `"secondary"`).
        family: &'static str,
        /// The fixed capacity of that family.
        cap: usize,
    },

    /// `get_value_by_name` was given a key the node does not serve.
    #[error("no value named '{key}' is implemented")]
    UnknownValueName {
        /// The unrecognised key.
        key: String,
    },
}

impl EngineError {
    /// Create a duplicate-name error.
    #[must_use]
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Create an unknown-parent error.
    #[must_use]
    pub fn unknown_parent(parent: impl Into<String>, node: impl Into<String>) -> Self {
        Self::UnknownParent {
            parent: parent.into(),
            node: node.into(),
        }
    }

    /// Create a type-mismatch error.
    #[must_use]
    pub fn type_mismatch(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
        }
    }

    /// Create a size-mismatch error.
    #[must_use]
    pub fn size_mismatch(node: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            node: node.into(),
            expected,
            actual,
        }
    }

    /// Create an unknown-value-name error.
    #[must_use]
    pub fn unknown_value(key: impl Into<String>) -> Self {
        Self::UnknownValueName { key: key.into() }
    }

    /// Check if this is a construction-ordering error (duplicate or missing
    /// name), as opposed to a shape or capacity problem.
    #[must_use]
    pub fn is_name_error(&self) -> bool {
        matches!(self, Self::DuplicateName { .. } | Self::UnknownParent { .. })
    }
}
