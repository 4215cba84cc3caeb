//! The hierarchical configuration tree.
//!
//! A [`ConfigGroup`] is a tree-of-arrays: named groups carrying scalar
//! attributes, shaped numeric datasets, and ordered child groups. The engine
//! treats the tree as opaque; only concrete node creation functions parse
//! their own subgroup. JSON is the on-disk carrier.

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A scalar or small-list attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// List of strings (e.g. parent-node names).
    StrList(Vec<String>),
    /// List of floats.
    FloatList(Vec<f64>),
}

/// Numeric payload of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetData {
    /// Integer data (indices, counts).
    Int(Vec<i64>),
    /// Floating-point data.
    Float(Vec<f32>),
}

/// A shaped numeric array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Optional logical shape; empty means flat. When present, its product
    /// must match the data length.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<usize>,
    /// The flattened values.
    pub data: DatasetData,
}

impl Dataset {
    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            DatasetData::Int(values) => values.len(),
            DatasetData::Float(values) => values.len(),
        }
    }

    /// Whether the dataset holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One group of the configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigGroup {
    /// Group name. For potential subgroups this doubles as the node name
    /// and the registry lookup key.
    pub name: String,
    /// Scalar attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
    /// Shaped numeric datasets.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub datasets: BTreeMap<String, Dataset>,
    /// Ordered child groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<ConfigGroup>,
}

impl ConfigGroup {
    /// Create an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            datasets: BTreeMap::new(),
            groups: Vec::new(),
        }
    }

    /// Parse a group from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let group: Self = serde_json::from_str(text)?;
        group.validate_shapes()?;
        Ok(group)
    }

    /// Parse a group from a JSON reader.
    pub fn from_json_reader(reader: impl Read) -> Result<Self> {
        let group: Self = serde_json::from_reader(reader)?;
        group.validate_shapes()?;
        Ok(group)
    }

    fn validate_shapes(&self) -> Result<()> {
        for (key, dataset) in &self.datasets {
            if !dataset.shape.is_empty() {
                let product: usize = dataset.shape.iter().product();
                if product != dataset.len() {
                    return Err(ConfigError::InvalidDataset {
                        dataset: "shape",
                        group: self.name.clone(),
                        message: format!(
                            "dataset '{key}' declares shape {:?} but holds {} values",
                            dataset.shape,
                            dataset.len()
                        ),
                    });
                }
            }
        }
        for child in &self.groups {
            child.validate_shapes()?;
        }
        Ok(())
    }

    /// Child group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&ConfigGroup> {
        self.groups.iter().find(|child| child.name == name)
    }

    /// Required string attribute.
    pub fn attr_str(&self, key: &'static str) -> Result<&str> {
        match self.attrs.get(key) {
            Some(AttrValue::Str(value)) => Ok(value),
            Some(_) => Err(ConfigError::invalid_attribute(
                key,
                &self.name,
                "expected a string",
            )),
            None => Err(ConfigError::missing_attribute(key, &self.name)),
        }
    }

    /// Required string-list attribute. A lone string is accepted as a
    /// one-element list.
    pub fn attr_str_list(&self, key: &'static str) -> Result<Vec<String>> {
        match self.attrs.get(key) {
            Some(AttrValue::StrList(values)) => Ok(values.clone()),
            Some(AttrValue::Str(value)) => Ok(vec![value.clone()]),
            Some(_) => Err(ConfigError::invalid_attribute(
                key,
                &self.name,
                "expected a list of strings",
            )),
            None => Err(ConfigError::missing_attribute(key, &self.name)),
        }
    }

    /// Required numeric attribute, coerced to `f32`.
    pub fn attr_f32(&self, key: &'static str) -> Result<f32> {
        match self.attrs.get(key) {
            Some(AttrValue::Float(value)) => Ok(*value as f32),
            Some(AttrValue::Int(value)) => Ok(*value as f32),
            Some(_) => Err(ConfigError::invalid_attribute(
                key,
                &self.name,
                "expected a number",
            )),
            None => Err(ConfigError::missing_attribute(key, &self.name)),
        }
    }

    /// Numeric attribute with a default for the missing case.
    pub fn attr_f32_or(&self, key: &'static str, default: f32) -> Result<f32> {
        if self.attrs.contains_key(key) {
            self.attr_f32(key)
        } else {
            Ok(default)
        }
    }

    /// Required dataset.
    pub fn dataset(&self, key: &'static str) -> Result<&Dataset> {
        self.datasets
            .get(key)
            .ok_or_else(|| ConfigError::missing_dataset(key, &self.name))
    }

    /// Required dataset coerced to `f32` values.
    pub fn dataset_f32(&self, key: &'static str) -> Result<Vec<f32>> {
        match &self.dataset(key)?.data {
            DatasetData::Float(values) => Ok(values.clone()),
            DatasetData::Int(values) => Ok(values.iter().map(|&v| v as f32).collect()),
        }
    }

    /// Required integer dataset interpreted as element indices below
    /// `bound`.
    pub fn dataset_indices(&self, key: &'static str, bound: usize) -> Result<Vec<usize>> {
        let DatasetData::Int(values) = &self.dataset(key)?.data else {
            return Err(ConfigError::invalid_dataset(
                key,
                &self.name,
                "expected integer indices",
            ));
        };
        values
            .iter()
            .map(|&value| {
                usize::try_from(value)
                    .ok()
                    .filter(|&index| index < bound)
                    .ok_or_else(|| {
                        ConfigError::invalid_dataset(
                            key,
                            &self.name,
                            format!("index {value} outside [0, {bound})"),
                        )
                    })
            })
            .collect()
    }
}
