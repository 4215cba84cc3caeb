//! Reverse-autodiff kernel for nodes on the generic slot path.
//!
//! Nodes whose per-element dependency pattern is small and fixed can skip
//! hand-written propagation: they record their reserved slots in an
//! [`AutoDiffParams`] per output element, cache their Jacobian blocks during
//! the forward pass, and let [`deposit_weighted_jacobian`] do the reverse
//! deposit. The per-element slot capacities are a fixed part of the
//! contract: they bound the kernel's working set, and exceeding them is a
//! construction-time error, never a silent truncation.

use md_types::{CoordArray, EngineError, Result};

use crate::ledger::Slot;
use crate::node::InputView;

/// Maximum slots per element into the first parent's ledger.
pub const SLOT_CAP_PRIMARY: usize = 6;

/// Maximum slots per element into the second parent's ledger.
pub const SLOT_CAP_SECONDARY: usize = 5;

/// Fixed-capacity slot lists for one output element.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDiffParams {
    n_primary: u8,
    n_secondary: u8,
    primary: [u32; SLOT_CAP_PRIMARY],
    secondary: [u32; SLOT_CAP_SECONDARY],
}

impl AutoDiffParams {
    /// Record a slot in the first parent's ledger.
    pub fn push_primary(&mut self, slot: Slot) -> Result<()> {
        let n = self.n_primary as usize;
        if n == SLOT_CAP_PRIMARY {
            return Err(EngineError::SlotCapacityExceeded {
                family: "primary",
                cap: SLOT_CAP_PRIMARY,
            });
        }
        self.primary[n] = slot as u32;
        self.n_primary += 1;
        Ok(())
    }

    /// Record a slot in the second parent's ledger.
    pub fn push_secondary(&mut self, slot: Slot) -> Result<()> {
        let n = self.n_secondary as usize;
        if n == SLOT_CAP_SECONDARY {
            return Err(EngineError::SlotCapacityExceeded {
                family: "secondary",
                cap: SLOT_CAP_SECONDARY,
            });
        }
        self.secondary[n] = slot as u32;
        self.n_secondary += 1;
        Ok(())
    }

    /// Recorded slots into the first parent's ledger.
    #[must_use]
    pub fn primary(&self) -> &[u32] {
        &self.primary[..self.n_primary as usize]
    }

    /// Recorded slots into the second parent's ledger.
    #[must_use]
    pub fn secondary(&self) -> &[u32] {
        &self.secondary[..self.n_secondary as usize]
    }
}

/// Deposit sensitivity-weighted Jacobian rows into the parents' ledgers.
///
/// `params` holds one entry per output element of the owning node; `sens` is
/// that node's gathered output sensitivity (width `W`); `jac` holds the
/// Jacobian blocks cached during the forward pass, laid out per element as
/// the primary blocks in registration order followed by the secondary
/// blocks, each block `W × parent_width` with the output dimension varying
/// slowest. For element `a`, slot `s`, and output dimension `k`, row `s + k`
/// of the parent ledger receives `sens[a][k] · J_block_row(k)`.
pub fn deposit_weighted_jacobian(
    params: &[AutoDiffParams],
    sens: &CoordArray,
    jac: &[f32],
    inputs: &mut [InputView<'_>],
) {
    let own_width = sens.elem_width();
    let mut cursor = 0;
    for (elem, entry) in params.iter().enumerate() {
        cursor = deposit_family(entry.primary(), elem, own_width, sens, jac, cursor, &mut inputs[0]);
        if !entry.secondary().is_empty() {
            cursor =
                deposit_family(entry.secondary(), elem, own_width, sens, jac, cursor, &mut inputs[1]);
        }
    }
    debug_assert_eq!(cursor, jac.len());
}

fn deposit_family(
    slots: &[u32],
    elem: usize,
    own_width: usize,
    sens: &CoordArray,
    jac: &[f32],
    mut cursor: usize,
    input: &mut InputView<'_>,
) -> usize {
    let parent_width = input.output.elem_width();
    let block_len = own_width * parent_width;
    for &slot in slots {
        let block = &jac[cursor..cursor + block_len];
        cursor += block_len;
        for k in 0..own_width {
            let weight = sens.get(k, elem);
            let row = input.ledger.slot_row_mut(slot as usize, k);
            for (dim, out) in row.iter_mut().enumerate() {
                *out = weight * block[k * parent_width + dim];
            }
        }
    }
    cursor
}
