//! Vector geometry over `f64` slices
//!
//! Magnitudes are computed with a max-abs rescale so vectors with very large
//! components do not overflow to infinity before the square root.

/// Euclidean norm of `v`
pub fn magnitude(v: &[f64]) -> f64 {
    let scale = v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum: f64 = v.iter().map(|x| (x / scale) * (x / scale)).sum();
    scale * sum.sqrt()
}

/// Dot product of two equal-length slices
///
/// Callers check lengths; extra elements of the longer slice are ignored.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean distance between two equal-length slices
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    let diff: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    magnitude(&diff)
}

/// Cosine of the angle between `a` and `b`, clamped to `[-1, 1]`
///
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    // Divide before multiplying so the dot product cannot overflow.
    let cos: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x / mag_a) * (y / mag_b))
        .sum();
    cos.clamp(-1.0, 1.0)
}
