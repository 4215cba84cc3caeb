//! Configuration loading for the molecular potential engine.
//!
//! This crate is the external interface of the engine core: it parses the
//! hierarchical configuration tree, resolves node types through a
//! prefix-keyed [`NodeRegistry`], and materialises an
//! [`Engine`](md_core::Engine) with [`initialize_from_config`].
//!
//! # Example
//!
//! ```
//! use md_config::{initialize_from_config, ConfigGroup, NodeRegistry};
//! use md_types::{ComputeMode, Vector3};
//!
//! let config = ConfigGroup::from_json_str(r#"{
//!     "name": "potential",
//!     "groups": [
//!         {
//!             "name": "pos_spring",
//!             "attrs": { "arguments": ["pos"] },
//!             "datasets": {
//!                 "atom": { "data": [0] },
//!                 "x0": { "data": [0.0, 0.0, 0.0] },
//!                 "spring_const": { "data": [1.0] }
//!             }
//!         }
//!     ]
//! }"#).unwrap();
//!
//! let registry = NodeRegistry::with_standard_nodes();
//! let mut engine = initialize_from_config(1, &config, &registry).unwrap();
//!
//! engine.position_mut().set_vec3(0, Vector3::new(2.0, 0.0, 0.0));
//! engine.compute(ComputeMode::PotentialAndDeriv);
//! assert_eq!(engine.potential(), 2.0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::cast_precision_loss,       // i64/usize to f32 coercions are config-sized
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,        // error docs added where non-obvious
)]

mod builder;
mod error;
mod registry;
mod standard;
mod tree;

pub use builder::initialize_from_config;
pub use error::{ConfigError, Result};
pub use registry::{Arity, CreationFn, NodeRegistry, RegistryEntry};
pub use standard::register_standard_nodes;
pub use tree::{AttrValue, ConfigGroup, Dataset, DatasetData};
