//! Differentiable computation graph for molecular potentials.
//!
//! This crate provides the evaluation core: a user-assembled DAG of nodes is
//! evaluated forward (coordinate transforms, then scalar potential terms)
//! and backward (sensitivities propagated to atomic positions), and a
//! symplectic integrator consumes the resulting forces.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! │  Node table, name lookup, forward/reverse orchestration     │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SlotLedger                               │
//! │  Per-producer tape of slot reservations + flat accumulator  │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Integrator                               │
//! │  Verlet / five-kick schedules, force clipping, recentering  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Evaluation Model
//!
//! Nodes fire in level order: parents before children going forward,
//! children before parents going backward, with insertion order breaking
//! ties so trajectories are bitwise reproducible. All buffers are allocated
//! during construction; evaluation performs no heap allocation.
//!
//! # Quick Start
//!
//! ```
//! use md_core::{Engine, nodes::{PosSpring, Restraint}};
//! use md_types::{ComputeMode, EngineError, Vector3};
//!
//! let mut engine = Engine::new(2);
//! engine.position_mut().set_vec3(0, Vector3::new(1.0, 2.0, 3.0));
//!
//! // Harmonic well around the origin for both atoms
//! let restraints = (0..2)
//!     .map(|atom| Restraint {
//!         atom,
//!         equil_pos: Vector3::zeros(),
//!         spring_const: 1.0,
//!     })
//!     .collect();
//! engine
//!     .add_node::<_, EngineError>("well", &["pos"], |ctx| {
//!         Ok(Box::new(PosSpring::new(ctx, restraints)?))
//!     })
//!     .unwrap();
//!
//! engine.compute(ComputeMode::PotentialAndDeriv);
//! assert_eq!(engine.potential(), 7.0);
//! assert_eq!(engine.position_sens().vec3(0), Vector3::new(1.0, 2.0, 3.0));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // accessor constness is not worth the churn
    clippy::cast_precision_loss,       // usize to f32/f64 is fine for counts
    clippy::cast_possible_truncation,  // tape indices fit their stored widths
    clippy::missing_errors_doc,        // error docs added where non-obvious
)]

pub mod autodiff;
mod engine;
pub mod finite_diff;
mod integrator;
mod ledger;
mod node;
pub mod nodes;

pub use engine::{Engine, GraphContext, Node, POS_NODE_NAME};
pub use integrator::{integration_stage, recenter, IntegratorType};
pub use ledger::{DerivRecord, Slot, SlotLedger};
pub use node::{
    CoordData, DerivComputation, InputView, NodeData, NodeSpec, OutputView, SensView,
};

// Re-export the shared data types for convenience
pub use md_types::{ComputeMode, CoordArray, EngineError, Result, Vector3};
