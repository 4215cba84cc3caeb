//! Finite-difference gradient checking.
//!
//! Central differences against the engine's reverse-mode gradients are the
//! standard acceptance test for new terms: evaluate the scalar at `x ± ε e_i`
//! for every component and compare against the propagated sensitivity.

/// Central-difference derivative of a scalar function.
///
/// Returns `(f(x + ε e_i) − f(x − ε e_i)) / 2ε` for every component of
/// `input`. Single precision limits how small `eps` can usefully be; `1e-2`
/// works well for potentials of order one.
pub fn central_difference_deriv<F>(mut f: F, input: &[f32], eps: f32) -> Vec<f32>
where
    F: FnMut(&[f32]) -> f32,
{
    let mut scratch = input.to_vec();
    let mut deriv = Vec::with_capacity(input.len());
    for i in 0..input.len() {
        scratch[i] = input[i] + eps;
        let plus = f(&scratch);
        scratch[i] = input[i] - eps;
        let minus = f(&scratch);
        scratch[i] = input[i];
        deriv.push((plus - minus) / (2.0 * eps));
    }
    deriv
}

/// Relative root-mean-square deviation of `actual` from `reference`.
///
/// `sqrt(Σ (r_i − a_i)² / Σ r_i²)`; both slices must have the same length.
#[must_use]
pub fn relative_rms_deviation(reference: &[f32], actual: &[f32]) -> f64 {
    assert_eq!(
        reference.len(),
        actual.len(),
        "deviation operands must have equal length"
    );
    let mut diff_mag2 = 0.0f64;
    let mut ref_mag2 = 0.0f64;
    for (&r, &a) in reference.iter().zip(actual) {
        diff_mag2 += f64::from(r - a) * f64::from(r - a);
        ref_mag2 += f64::from(r) * f64::from(r);
    }
    (diff_mag2 / ref_mag2).sqrt()
}
