//! Compute mode for forward evaluation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a forward pass must make exact.
///
/// Derivatives are always propagated; the mode only governs whether nodes
/// must also make their potential values exact. Terms that share work between
/// the value and the gradient are free to skip value-only bookkeeping in
/// [`ComputeMode::Deriv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ComputeMode {
    /// Only the derivative must be correct; the potential value may be
    /// approximate. Used by the integrator, which consumes forces only.
    Deriv,
    /// Both the potential value and the derivative must be correct.
    PotentialAndDeriv,
}

impl ComputeMode {
    /// Whether the potential value must be exact in this mode.
    #[must_use]
    pub fn needs_potential(self) -> bool {
        matches!(self, Self::PotentialAndDeriv)
    }
}
