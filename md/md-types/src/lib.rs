//! Core types for the differentiable molecular potential engine.
//!
//! This crate provides the foundational types shared by the graph engine and
//! its collaborators:
//!
//! - [`CoordArray`] - SIMD-friendly coordinate storage (positions, sensitivities)
//! - [`ComputeMode`] - what a forward pass must make exact
//! - [`EngineError`] - construction-time failures of the graph engine
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no graph semantics, no
//! differentiation, no integration. They're the common language between:
//!
//! - The graph engine (md-core)
//! - Concrete potential terms
//! - Configuration loading (md-config)
//! - Test harnesses and analysis tools
//!
//! # Example
//!
//! ```
//! use md_types::CoordArray;
//! use nalgebra::Vector3;
//!
//! // Three atoms, Cartesian width
//! let mut pos = CoordArray::new(3, 3);
//! pos.set_vec3(1, Vector3::new(1.0, 2.0, 3.0));
//!
//! assert_eq!(pos.get(2, 1), 3.0);
//! assert_eq!(pos.vec3(0), Vector3::zeros());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // accessor constness is not worth the churn
    clippy::cast_precision_loss,       // usize to f32/f64 is fine for counts
    clippy::missing_errors_doc,        // error docs added where non-obvious
)]

mod coord;
mod error;
mod mode;

pub use coord::CoordArray;
pub use error::EngineError;
pub use mode::ComputeMode;

// Re-export math types for convenience
pub use nalgebra::Vector3;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
