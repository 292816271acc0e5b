/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Product quantization shared by the IVF-PQ index and VPQ dataset compression.
//!
//! A vector of `dim` features is split into `pq_dim` subspaces of `sub_dim =
//! ceil(dim / pq_dim)` consecutive features (the last subspace may be narrower).
//! Each subspace has its own codebook of up to `2^pq_bits` codewords trained with
//! k-means, and a vector is stored as one byte per subspace.

mod vpq;

pub(crate) use vpq::VpqDataset;

use std::ops::Range;

use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::cluster::kmeans;
use crate::distance::l2_squared;
use crate::distance_type::DistanceType;
use crate::error::{check_param, Result};
use crate::resources::Resources;

#[derive(Debug, Clone)]
pub(crate) struct ProductQuantizer {
    dim: usize,
    sub_dim: usize,
    /// one (n_codes, subspace width) matrix per subspace
    codebooks: Vec<Array2<f32>>,
}

impl ProductQuantizer {
    /// Trains the codebooks on `data`.
    ///
    /// `pq_dim == 0` selects `ceil(dim / 2)` subspaces. At most
    /// `max_train_points` rows of `data` are used.
    pub(crate) fn train(
        res: &Resources,
        data: ArrayView2<f32>,
        pq_bits: u32,
        pq_dim: usize,
        n_iters: u32,
        max_train_points: usize,
        seed: u64,
    ) -> Result<ProductQuantizer> {
        let dim = data.ncols();
        check_param((4..=8).contains(&pq_bits), || {
            format!("pq_bits must be in [4, 8], got {}", pq_bits)
        })?;
        check_param(pq_dim <= dim, || {
            format!("pq_dim ({}) must not exceed the dimension ({})", pq_dim, dim)
        })?;
        check_param(data.nrows() > 0, || "no rows to train the codebooks on".to_string())?;

        let pq_dim = if pq_dim == 0 { dim.div_ceil(2) } else { pq_dim };
        let sub_dim = dim.div_ceil(pq_dim);
        let pq_dim = dim.div_ceil(sub_dim);

        let trainset = subsample(data, max_train_points.max(1));
        let n_codes = (1usize << pq_bits).min(trainset.nrows());

        let codebooks = res.install(|| {
            (0..pq_dim)
                .into_par_iter()
                .map(|m| {
                    let range = subspace(dim, sub_dim, m);
                    let sub = trainset.slice(s![.., range]);
                    kmeans::train(
                        res,
                        DistanceType::L2Expanded,
                        sub,
                        n_codes,
                        n_iters,
                        seed.wrapping_add(m as u64),
                    )
                })
                .collect::<Result<Vec<_>>>()
        })?;

        debug!(
            "trained {} pq codebooks of {} codewords over {} rows (sub_dim {})",
            pq_dim,
            n_codes,
            trainset.nrows(),
            sub_dim
        );
        Ok(ProductQuantizer {
            dim,
            sub_dim,
            codebooks,
        })
    }

    pub(crate) fn pq_dim(&self) -> usize {
        self.codebooks.len()
    }

    pub(crate) fn n_codes(&self) -> usize {
        self.codebooks.first().map_or(0, |c| c.nrows())
    }

    pub(crate) fn subspace(&self, m: usize) -> Range<usize> {
        subspace(self.dim, self.sub_dim, m)
    }

    pub(crate) fn codebook(&self, m: usize) -> ArrayView2<f32> {
        self.codebooks[m].view()
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        self.codebooks.iter().map(|c| c.len()).sum::<usize>() * std::mem::size_of::<f32>()
    }

    /// Nearest codeword of every subspace
    pub(crate) fn encode(&self, v: ArrayView1<f32>, codes: &mut [u8]) {
        for (m, (code, book)) in codes.iter_mut().zip(&self.codebooks).enumerate() {
            let sub = v.slice(s![self.subspace(m)]);
            let mut best = (0u8, f32::INFINITY);
            for (k, codeword) in book.rows().into_iter().enumerate() {
                let d = l2_squared(sub, codeword);
                if d < best.1 {
                    best = (k as u8, d);
                }
            }
            *code = best.0;
        }
    }

    /// Encodes every row of `data` into `pq_dim` consecutive bytes
    pub(crate) fn encode_rows(&self, data: ArrayView2<f32>) -> Vec<u8> {
        let pq_dim = self.pq_dim();
        let mut codes = vec![0u8; data.nrows() * pq_dim];
        codes
            .par_chunks_mut(pq_dim.max(1))
            .enumerate()
            .for_each(|(i, out)| self.encode(data.row(i), out));
        codes
    }

    /// Adds the codewords selected by `codes` to `out`
    pub(crate) fn decode_add(&self, codes: &[u8], mut out: ArrayViewMut1<f32>) {
        for (m, &code) in codes.iter().enumerate() {
            let mut dst = out.slice_mut(s![self.subspace(m)]);
            dst += &self.codebooks[m].row(code as usize);
        }
    }
}

fn subspace(dim: usize, sub_dim: usize, m: usize) -> Range<usize> {
    let start = (m * sub_dim).min(dim);
    start..((m + 1) * sub_dim).min(dim)
}

/// Copies at most `max_rows` rows of `data`, taken with a constant stride
pub(crate) fn subsample(data: ArrayView2<f32>, max_rows: usize) -> Array2<f32> {
    let n = data.nrows();
    if n <= max_rows {
        return data.to_owned();
    }
    let rows: Vec<usize> = (0..max_rows).map(|i| i * n / max_rows).collect();
    data.select(Axis(0), &rows)
}

/// Number of rows selected by a trainset fraction. Zero selects every row.
pub(crate) fn trainset_size(n: usize, fraction: f64) -> usize {
    if fraction <= 0.0 || fraction >= 1.0 {
        n
    } else {
        ((n as f64 * fraction).ceil() as usize).clamp(1, n)
    }
}
