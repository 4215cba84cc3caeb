//! The sensitivity ledger ("slot machine").
//!
//! Every coordinate node owns a [`SlotLedger`]. During graph construction,
//! each downstream consumer that depends on one of the producer's elements
//! registers a request and is handed back a *slot*: a reserved, contiguous
//! region of the ledger's flat accumulation buffer. During the reverse pass,
//! consumers write sensitivity-weighted Jacobian rows into their slots, and
//! the producer's gather step sums every slot back onto the owning element.
//!
//! Because the graph is fully built before any evaluation, the tape and the
//! accumulation buffer are frozen at compute time; only the numbers stored in
//! the buffer change between passes.

use md_types::CoordArray;

/// Offset of a reserved region in a ledger's accumulation buffer, counted in
/// rows of the producer's element width.
pub type Slot = usize;

/// One consumer request against a producer element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivRecord {
    /// Producer-side element index the request targets.
    pub atom: u32,
    /// Starting row of the reserved region inside `accum`.
    pub loc: u32,
    /// Consumer-side output width: the number of rows reserved.
    pub output_width: u16,
}

/// Per-coordinate-node sensitivity ledger.
///
/// Holds a fixed producer width, an append-only tape of [`DerivRecord`]s, and
/// a flat accumulation buffer sized `Σ output_width × width`. Slot offsets
/// are monotone and never overlap.
#[derive(Debug, Clone)]
pub struct SlotLedger {
    width: usize,
    n_elem: usize,
    offset: usize,
    tape: Vec<DerivRecord>,
    accum: Vec<f32>,
}

impl SlotLedger {
    /// Create an empty ledger for a producer of the given shape.
    #[must_use]
    pub fn new(width: usize, n_elem: usize) -> Self {
        Self {
            width,
            n_elem,
            offset: 0,
            tape: Vec::new(),
            accum: Vec::new(),
        }
    }

    /// Producer element width; every row of `accum` holds this many floats.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Producer element count.
    #[must_use]
    pub fn n_elem(&self) -> usize {
        self.n_elem
    }

    /// Register a consumer's interest in producer element `atom` with an
    /// output contribution of `output_width` rows. Returns the reserved slot.
    ///
    /// Construction-time only; the tape is read-only during evaluation.
    pub fn add_request(&mut self, output_width: usize, atom: usize) -> Slot {
        debug_assert!(atom < self.n_elem);
        let loc = self.offset;
        self.tape.push(DerivRecord {
            atom: atom as u32,
            loc: loc as u32,
            output_width: output_width as u16,
        });
        self.offset += output_width;
        self.accum.resize(self.offset * self.width, 0.0);
        loc
    }

    /// The recorded tape.
    #[must_use]
    pub fn tape(&self) -> &[DerivRecord] {
        &self.tape
    }

    /// Total rows reserved so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.offset
    }

    /// Read/write view of the whole accumulation buffer.
    pub fn accum_view(&mut self) -> &mut [f32] {
        &mut self.accum
    }

    /// Length of the accumulation buffer in floats.
    #[must_use]
    pub fn accum_len(&self) -> usize {
        self.accum.len()
    }

    /// Mutable view of row `slot + k` of the accumulation buffer.
    #[inline]
    pub fn slot_row_mut(&mut self, slot: Slot, k: usize) -> &mut [f32] {
        let start = (slot + k) * self.width;
        &mut self.accum[start..start + self.width]
    }

    /// Zero the accumulation buffer. Called at the start of every reverse
    /// pass, before any consumer deposits.
    pub fn zero_accum(&mut self) {
        self.accum.fill(0.0);
    }

    /// Gather step of the reverse pass: for every record and every reserved
    /// row, add the row's `width`-vector onto `sens` at the recorded element.
    pub fn collect_sens(&self, sens: &mut CoordArray) {
        debug_assert_eq!(sens.elem_width(), self.width);
        for record in &self.tape {
            let atom = record.atom as usize;
            for k in 0..record.output_width as usize {
                let start = (record.loc as usize + k) * self.width;
                let row = &self.accum[start..start + self.width];
                for (dim, &value) in row.iter().enumerate() {
                    sens.add(dim, atom, value);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_monotone_and_disjoint() {
        let mut ledger = SlotLedger::new(3, 4);
        let s0 = ledger.add_request(1, 0);
        let s1 = ledger.add_request(3, 2);
        let s2 = ledger.add_request(2, 0);

        assert_eq!((s0, s1, s2), (0, 1, 4));
        assert_eq!(ledger.rows(), 6);
        assert_eq!(ledger.accum_len(), 6 * 3);

        for record in ledger.tape() {
            let end = (record.loc as usize + record.output_width as usize) * ledger.width();
            assert!(end <= ledger.accum_len());
        }
    }

    #[test]
    fn test_collect_sens_sums_rows_per_atom() {
        let mut ledger = SlotLedger::new(3, 2);
        let s0 = ledger.add_request(2, 1);
        let s1 = ledger.add_request(1, 1);

        ledger.slot_row_mut(s0, 0).copy_from_slice(&[1.0, 0.0, 0.0]);
        ledger.slot_row_mut(s0, 1).copy_from_slice(&[0.0, 2.0, 0.0]);
        ledger.slot_row_mut(s1, 0).copy_from_slice(&[0.5, 0.5, 0.5]);

        let mut sens = CoordArray::new(3, 2);
        ledger.collect_sens(&mut sens);

        assert_eq!(sens.vec3(0), nalgebra::Vector3::zeros());
        assert_eq!(sens.vec3(1), nalgebra::Vector3::new(1.5, 2.5, 0.5));
    }

    #[test]
    fn test_zero_accum() {
        let mut ledger = SlotLedger::new(3, 1);
        let slot = ledger.add_request(1, 0);
        ledger.slot_row_mut(slot, 0).copy_from_slice(&[1.0, 1.0, 1.0]);
        ledger.zero_accum();
        assert!(ledger.accum_view().iter().all(|&v| v == 0.0));
    }
}
