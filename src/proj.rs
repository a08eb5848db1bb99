//! Sparsity projections over score vectors.
//!
//! These are the pure selection operators the gated optimizers use to keep
//! only the `k` most important adapter gates active.

use candle_core::Tensor;

use crate::error::{OptimError, Result};

/// Signature of a gate projection: `(scores, k)` to projected scores.
pub type GateProjection = fn(&Tensor, usize) -> Result<Tensor>;

/// Signature of a mask application: `(scores, mask)` to masked scores.
pub type MaskProjection = fn(&Tensor, &Tensor) -> Result<Tensor>;

/// Keep the `k` largest entries of a 1-D vector by signed value, zero the rest.
///
/// Selection is by value, not magnitude: a strongly negative entry is
/// dropped before a small positive one. `k >= n` is a no-op and `k == 0`
/// yields the zero vector. Ties are broken by position (stable ordering),
/// so the result is deterministic for a fixed input.
///
/// # Errors
///
/// Returns an error if `x` is not 1-D.
pub fn keep_top_values(x: &Tensor, k: usize) -> Result<Tensor> {
    let n = match *x.dims() {
        [n] => n,
        ref dims => {
            return Err(OptimError::DimensionMismatch {
                message: format!("top-value projection expects a 1-D vector, got {dims:?}"),
            })
        }
    };
    if k >= n {
        return Ok(x.clone());
    }
    let mut values = x.to_vec1::<f32>()?;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    for &i in order.iter().take(n - k) {
        values[i] = 0.0;
    }
    Ok(Tensor::from_vec(values, (n,), x.device())?)
}

/// Build a 0/1 mask with ones at the `k` largest entries by signed value.
///
/// Accepts 1-D and 2-D tensors; a 2-D input is ranked over its flattened
/// entries and the mask is returned in the input shape.
///
/// # Errors
///
/// Returns an error for tensors of any other rank.
pub fn top_values_mask(x: &Tensor, k: usize) -> Result<Tensor> {
    let dims = x.dims().to_vec();
    if dims.len() > 2 {
        return Err(OptimError::DimensionMismatch {
            message: format!("top-value mask expects a 1-D or 2-D tensor, got {dims:?}"),
        });
    }
    let flat = x.flatten_all()?;
    let values = flat.to_vec1::<f32>()?;
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    let mut mask = vec![0.0f32; n];
    for &i in order.iter().take(k.min(n)) {
        mask[i] = 1.0;
    }
    Ok(Tensor::from_vec(mask, (n,), x.device())?.reshape(dims)?)
}

/// Apply a precomputed 0/1 mask elementwise.
///
/// # Errors
///
/// Returns an error if the shapes are incompatible.
pub fn apply_mask(x: &Tensor, mask: &Tensor) -> Result<Tensor> {
    Ok(x.mul(mask)?)
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    fn vector(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), (values.len(),), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_keep_top_values_basic() {
        let x = vector(&[0.5, 2.0, -1.0, 1.5]);
        let out = keep_top_values(&x, 2).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(out, vec![0.0, 2.0, 0.0, 1.5]);
    }

    #[test]
    fn test_keep_top_values_by_value_not_magnitude() {
        // -5 has the largest magnitude but the smallest value; it is dropped first.
        let x = vector(&[-5.0, 0.1, 3.0, -0.2]);
        let out = keep_top_values(&x, 2).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(out, vec![0.0, 0.1, 3.0, 0.0]);
    }

    #[test]
    fn test_keep_top_values_k_edges() {
        let x = vector(&[1.0, -2.0, 3.0]);
        let all = keep_top_values(&x, 3).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(all, vec![1.0, -2.0, 3.0]);

        let oversized = keep_top_values(&x, 10).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(oversized, vec![1.0, -2.0, 3.0]);

        let none = keep_top_values(&x, 0).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(none, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_keep_top_values_exact_count() {
        let x = vector(&[0.3, 0.1, 0.4, 0.1, 0.5, 0.9, 0.2]);
        for k in 0..=7 {
            let out = keep_top_values(&x, k).unwrap().to_vec1::<f32>().unwrap();
            let nonzero = out.iter().filter(|v| **v != 0.0).count();
            assert_eq!(nonzero, k.min(7));
        }
    }

    #[test]
    fn test_keep_top_values_rejects_matrix() {
        let x = Tensor::zeros((2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(keep_top_values(&x, 1).is_err());
    }

    #[test]
    fn test_top_values_mask_1d() {
        let x = vector(&[0.5, 2.0, -1.0, 1.5]);
        let mask = top_values_mask(&x, 2).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(mask, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_top_values_mask_2d_flattens() {
        let x = Tensor::from_vec(vec![0.5f32, 2.0, -1.0, 1.5], (2, 2), &Device::Cpu).unwrap();
        let mask = top_values_mask(&x, 2).unwrap();
        assert_eq!(mask.dims(), &[2, 2]);
        let flat = mask.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(flat, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_top_values_mask_rejects_3d() {
        let x = Tensor::zeros((2, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(top_values_mask(&x, 1).is_err());
    }

    #[test]
    fn test_apply_mask() {
        let x = vector(&[1.0, 2.0, 3.0]);
        let mask = vector(&[1.0, 0.0, 1.0]);
        let out = apply_mask(&x, &mask).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(out, vec![1.0, 0.0, 3.0]);
    }
}
