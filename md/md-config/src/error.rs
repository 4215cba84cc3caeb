//! Error types for configuration parsing and engine materialisation.

use md_types::EngineError;
use thiserror::Error;

/// Errors that can occur while reading configuration or building an engine
/// from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No registry prefix matches a config-specified node type.
    #[error("no registered node type matches '{0}'")]
    UnknownNodeType(String),

    /// Creation-function arity disagrees with the declared parent count.
    #[error("node '{node}': expected {expected} argument(s), got {actual}")]
    ArgCountMismatch {
        /// The node being created.
        node: String,
        /// Arity the creation function declares (as text, to cover the
        /// variadic form).
        expected: String,
        /// Number of parents the configuration declared.
        actual: usize,
    },

    /// Missing required attribute.
    #[error("missing required attribute: {attribute} in group '{group}'")]
    MissingAttribute {
        /// The missing attribute name.
        attribute: &'static str,
        /// The group that should have carried it.
        group: String,
    },

    /// Invalid attribute value.
    #[error("invalid value for {attribute} in group '{group}': {message}")]
    InvalidAttribute {
        /// The attribute with the invalid value.
        attribute: &'static str,
        /// The group containing the attribute.
        group: String,
        /// Description of why the value is invalid.
        message: String,
    },

    /// Missing required dataset.
    #[error("missing required dataset: {dataset} in group '{group}'")]
    MissingDataset {
        /// The missing dataset name.
        dataset: &'static str,
        /// The group that should have carried it.
        group: String,
    },

    /// Invalid dataset contents.
    #[error("invalid dataset {dataset} in group '{group}': {message}")]
    InvalidDataset {
        /// The dataset with the invalid contents.
        dataset: &'static str,
        /// The group containing the dataset.
        group: String,
        /// Description of why the contents are invalid.
        message: String,
    },

    /// JSON parse error.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph construction failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ConfigError {
    /// Create a missing-attribute error.
    pub fn missing_attribute(attribute: &'static str, group: impl Into<String>) -> Self {
        Self::MissingAttribute {
            attribute,
            group: group.into(),
        }
    }

    /// Create an invalid-attribute error.
    pub fn invalid_attribute(
        attribute: &'static str,
        group: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            attribute,
            group: group.into(),
            message: message.into(),
        }
    }

    /// Create a missing-dataset error.
    pub fn missing_dataset(dataset: &'static str, group: impl Into<String>) -> Self {
        Self::MissingDataset {
            dataset,
            group: group.into(),
        }
    }

    /// Create an invalid-dataset error.
    pub fn invalid_dataset(
        dataset: &'static str,
        group: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidDataset {
            dataset,
            group: group.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
