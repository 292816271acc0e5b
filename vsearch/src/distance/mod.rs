/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use ndarray::{ArrayView1, Axis};
use rayon::prelude::*;

use crate::distance_type::DistanceType;
use crate::error::{check_dtype, check_shape, Error, Result};
use crate::resources::Resources;
use crate::tensor::ManagedTensor;

#[inline]
pub(crate) fn l2_squared(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

#[inline]
pub(crate) fn inner_product(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.dot(&b)
}

/// Compute pairwise distances between X and Y
///
/// # Arguments
///
/// * `res` - Resources to use
/// * `x` - A matrix in host or device memory - shape (m, k)
/// * `y` - A matrix in host or device memory - shape (n, k)
/// * `distances` - A float32 matrix that receives the output distances - shape (m, n)
/// * `metric` - DistanceType to use
pub fn pairwise_distance(
    res: &Resources,
    x: &ManagedTensor,
    y: &ManagedTensor,
    distances: &mut ManagedTensor,
    metric: DistanceType,
) -> Result<()> {
    check_dtype(x.dtype(), y.dtype())?;
    let x = x.to_f32_matrix("x")?;
    let y = y.to_f32_matrix("y")?;
    if x.ncols() != y.ncols() {
        return Err(Error::DimensionMismatch {
            expected: x.ncols(),
            actual: y.ncols(),
        });
    }
    check_shape(&[x.nrows(), y.nrows()], distances.shape())?;
    let n = y.nrows();
    let out = distances.as_mut_slice::<f32>()?;

    res.install(|| {
        out.par_chunks_mut(n.max(1))
            .zip(x.axis_iter(Axis(0)).collect::<Vec<_>>())
            .for_each(|(row_out, xi)| {
                for (dst, yj) in row_out.iter_mut().zip(y.rows()) {
                    *dst = metric.finalize(metric.rank_distance(xi, yj));
                }
            });
    });
    Ok(())
}
