//! Coordinate array storage.
//!
//! A [`CoordArray`] holds one `f32` value per (dimension, element) pair, with
//! the element count padded up to a multiple of four so that per-dimension
//! rows stay aligned for vectorised loops. It backs node outputs, sensitivity
//! buffers, and momentum arrays.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pad an element count up to the next multiple of four.
#[inline]
fn round_up(n: usize) -> usize {
    (n + 3) & !3
}

/// A two-dimensional `f32` buffer shaped `(elem_width, n_elem)`.
///
/// Each element is one logical entity of the array: a Cartesian atom
/// (`elem_width = 3`), a rigid-body derivative (`6`), a rigid-body state
/// (`7`), or whatever per-element dimensionality a node chooses. Storage is
/// dimension-major: row `d` holds that component for every element, padded
/// to a multiple of four elements.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordArray {
    elem_width: usize,
    n_elem: usize,
    padded: usize,
    data: Vec<f32>,
}

impl CoordArray {
    /// Create a zero-filled array of the given shape.
    #[must_use]
    pub fn new(elem_width: usize, n_elem: usize) -> Self {
        let padded = round_up(n_elem);
        Self {
            elem_width,
            n_elem,
            padded,
            data: vec![0.0; elem_width * padded],
        }
    }

    /// Per-element dimensionality.
    #[must_use]
    pub fn elem_width(&self) -> usize {
        self.elem_width
    }

    /// Number of logical elements (excluding padding).
    #[must_use]
    pub fn n_elem(&self) -> usize {
        self.n_elem
    }

    /// Number of stored elements per row, including padding.
    #[must_use]
    pub fn padded_elems(&self) -> usize {
        self.padded
    }

    /// Read one component of one element.
    #[inline]
    #[must_use]
    pub fn get(&self, dim: usize, elem: usize) -> f32 {
        debug_assert!(dim < self.elem_width && elem < self.n_elem);
        self.data[dim * self.padded + elem]
    }

    /// Write one component of one element.
    #[inline]
    pub fn set(&mut self, dim: usize, elem: usize, value: f32) {
        debug_assert!(dim < self.elem_width && elem < self.n_elem);
        self.data[dim * self.padded + elem] = value;
    }

    /// Add into one component of one element.
    #[inline]
    pub fn add(&mut self, dim: usize, elem: usize, value: f32) {
        debug_assert!(dim < self.elem_width && elem < self.n_elem);
        self.data[dim * self.padded + elem] += value;
    }

    /// Read the first three components of an element as a vector.
    ///
    /// Requires `elem_width >= 3`.
    #[inline]
    #[must_use]
    pub fn vec3(&self, elem: usize) -> Vector3<f32> {
        debug_assert!(self.elem_width >= 3);
        Vector3::new(self.get(0, elem), self.get(1, elem), self.get(2, elem))
    }

    /// Write the first three components of an element from a vector.
    #[inline]
    pub fn set_vec3(&mut self, elem: usize, value: Vector3<f32>) {
        debug_assert!(self.elem_width >= 3);
        self.set(0, elem, value.x);
        self.set(1, elem, value.y);
        self.set(2, elem, value.z);
    }

    /// Add a vector into the first three components of an element.
    #[inline]
    pub fn add_vec3(&mut self, elem: usize, value: Vector3<f32>) {
        debug_assert!(self.elem_width >= 3);
        self.add(0, elem, value.x);
        self.add(1, elem, value.y);
        self.add(2, elem, value.z);
    }

    /// One full (padded) row of components for dimension `dim`.
    #[must_use]
    pub fn row(&self, dim: usize) -> &[f32] {
        &self.data[dim * self.padded..(dim + 1) * self.padded]
    }

    /// Mutable row of components for dimension `dim`.
    pub fn row_mut(&mut self, dim: usize) -> &mut [f32] {
        &mut self.data[dim * self.padded..(dim + 1) * self.padded]
    }

    /// Set every component (padding included) to `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Copy the logical contents into a flat element-major buffer.
    ///
    /// `buffer` must hold at least `n_elem * elem_width` values; layout is
    /// `buffer[elem * elem_width + dim]`. Padding is not copied.
    pub fn copy_to_buffer(&self, buffer: &mut [f32]) {
        debug_assert!(buffer.len() >= self.n_elem * self.elem_width);
        for elem in 0..self.n_elem {
            for dim in 0..self.elem_width {
                buffer[elem * self.elem_width + dim] = self.get(dim, elem);
            }
        }
    }

    /// The logical contents as a freshly allocated element-major vector.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.n_elem * self.elem_width];
        self.copy_to_buffer(&mut out);
        out
    }

    /// Overwrite the logical contents from a flat element-major buffer.
    pub fn copy_from_buffer(&mut self, buffer: &[f32]) {
        debug_assert!(buffer.len() >= self.n_elem * self.elem_width);
        for elem in 0..self.n_elem {
            for dim in 0..self.elem_width {
                self.set(dim, elem, buffer[elem * self.elem_width + dim]);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        let arr = CoordArray::new(3, 5);
        assert_eq!(arr.n_elem(), 5);
        assert_eq!(arr.padded_elems(), 8);
        assert_eq!(arr.row(0).len(), 8);

        // exact multiples are left alone
        assert_eq!(CoordArray::new(3, 8).padded_elems(), 8);
        assert_eq!(CoordArray::new(7, 1).padded_elems(), 4);
    }

    #[test]
    fn test_get_set_add() {
        let mut arr = CoordArray::new(6, 2);
        arr.set(4, 1, 2.5);
        arr.add(4, 1, 0.5);
        assert_eq!(arr.get(4, 1), 3.0);
        assert_eq!(arr.get(4, 0), 0.0);
    }

    #[test]
    fn test_vec3_accessors() {
        let mut arr = CoordArray::new(3, 3);
        arr.set_vec3(2, Vector3::new(1.0, -2.0, 3.0));
        arr.add_vec3(2, Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(arr.vec3(2), Vector3::new(1.0, -1.0, 3.0));
    }

    #[test]
    fn test_flat_round_trip() {
        let mut arr = CoordArray::new(3, 2);
        arr.set_vec3(0, Vector3::new(1.0, 2.0, 3.0));
        arr.set_vec3(1, Vector3::new(4.0, 5.0, 6.0));

        let flat = arr.to_flat();
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut back = CoordArray::new(3, 2);
        back.copy_from_buffer(&flat);
        assert_eq!(back, arr);
    }

    #[test]
    fn test_fill() {
        let mut arr = CoordArray::new(3, 2);
        arr.fill(1.5);
        assert_eq!(arr.get(1, 1), 1.5);
        arr.fill(0.0);
        assert_eq!(arr.vec3(0), Vector3::zeros());
    }
}
