/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Helpers shared by the index tests

use std::collections::HashSet;

use ndarray::{Array2, ArrayBase, Data, Ix2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Element types that random test datasets can be generated for
pub(crate) trait GenerateData: Sized {
    fn generate_data(shape: (usize, usize)) -> Array2<Self>;
}

impl GenerateData for f32 {
    fn generate_data(shape: (usize, usize)) -> Array2<f32> {
        Array2::random(shape, Uniform::new(0., 1.0))
    }
}

impl GenerateData for i8 {
    fn generate_data(shape: (usize, usize)) -> Array2<i8> {
        Array2::random(shape, Uniform::new_inclusive(i8::MIN, i8::MAX))
    }
}

impl GenerateData for u8 {
    fn generate_data(shape: (usize, usize)) -> Array2<u8> {
        Array2::random(shape, Uniform::new_inclusive(u8::MIN, u8::MAX))
    }
}

pub(crate) fn generate_data<T: GenerateData>(shape: (usize, usize)) -> Array2<T> {
    T::generate_data(shape)
}

/// Fraction of the predicted ids found in the reference row, averaged over rows
pub(crate) fn calc_recall<A, B, S1, S2>(
    predicted: &ArrayBase<S1, Ix2>,
    reference: &ArrayBase<S2, Ix2>,
) -> f64
where
    A: Copy + Into<i64>,
    B: Copy + Into<i64>,
    S1: Data<Elem = A>,
    S2: Data<Elem = B>,
{
    let mut found = 0usize;
    let mut total = 0usize;
    for (pred, reference) in predicted.rows().into_iter().zip(reference.rows()) {
        let expected: HashSet<i64> = reference.iter().map(|&id| id.into()).collect();
        found += pred
            .iter()
            .filter(|&&id| expected.contains(&Into::<i64>::into(id)))
            .count();
        total += pred.len();
    }
    if total == 0 {
        return 0.0;
    }
    found as f64 / total as f64
}

#[test]
fn test_calc_recall() {
    let predicted = ndarray::array![[0u32, 1, 2], [3, 4, 5]];
    let reference = ndarray::array![[0i64, 1, 7], [3, 4, 5]];
    assert!((calc_recall(&predicted, &reference) - 5.0 / 6.0).abs() < 1e-12);

    let data = generate_data::<u8>((4, 3));
    assert_eq!(data.shape(), &[4, 3]);
}
