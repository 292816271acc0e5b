/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! VPQ dataset compression: every vector is stored as the label of its
//! nearest VQ center plus the PQ codes of its residual.

use ndarray::{Array2, ArrayView2, ArrayViewMut1};
use tracing::debug;

use super::{subsample, trainset_size, ProductQuantizer};
use crate::cagra::CompressionParams;
use crate::cluster::kmeans;
use crate::distance_type::DistanceType;
use crate::error::Result;
use crate::resources::Resources;

/// Training rows per PQ codeword
const PQ_POINTS_PER_CODE: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct VpqDataset {
    vq_centers: Array2<f32>,
    pq: ProductQuantizer,
    labels: Vec<u32>,
    /// `pq_dim` bytes per vector
    codes: Vec<u8>,
}

impl VpqDataset {
    /// Trains the VQ centers and the PQ codebooks on `data`. The returned
    /// dataset holds no vectors.
    pub(crate) fn train(
        res: &Resources,
        params: &CompressionParams,
        data: ArrayView2<f32>,
        seed: u64,
    ) -> Result<VpqDataset> {
        let (n, dim) = data.dim();
        params.validate(dim)?;

        let vq_n_centers = match params.vq_n_centers {
            0 => ((n as f64).sqrt().round() as usize).clamp(1, n),
            c => (c as usize).min(n),
        };
        let vq_trainset = subsample(data, trainset_size(n, params.vq_kmeans_trainset_fraction));
        let vq_centers = kmeans::train(
            res,
            DistanceType::L2Expanded,
            vq_trainset.view(),
            vq_n_centers,
            params.kmeans_n_iters,
            seed,
        )?;

        let pq_trainset = subsample(data, trainset_size(n, params.pq_kmeans_trainset_fraction));
        let labels = kmeans::assign(res, DistanceType::L2Expanded, pq_trainset.view(), vq_centers.view());
        let residuals = residuals(pq_trainset.view(), vq_centers.view(), labels.iter().map(|l| l.0));
        let pq = ProductQuantizer::train(
            res,
            residuals.view(),
            params.pq_bits,
            params.pq_dim as usize,
            params.kmeans_n_iters,
            PQ_POINTS_PER_CODE << params.pq_bits,
            seed.wrapping_add(1),
        )?;

        debug!(
            "trained vpq compression: {} vq centers, pq_dim {}, {} codewords",
            vq_n_centers,
            pq.pq_dim(),
            pq.n_codes()
        );
        Ok(VpqDataset {
            vq_centers,
            pq,
            labels: Vec::new(),
            codes: Vec::new(),
        })
    }

    /// Encodes and stores `rows` after the current vectors
    pub(crate) fn append(&mut self, res: &Resources, rows: ArrayView2<f32>) {
        let labels = kmeans::assign(res, DistanceType::L2Expanded, rows, self.vq_centers.view());
        let residuals = residuals(rows, self.vq_centers.view(), labels.iter().map(|l| l.0));
        let pq = &self.pq;
        let codes = res.install(|| pq.encode_rows(residuals.view()));
        self.labels.extend(labels.iter().map(|l| l.0));
        self.codes.extend_from_slice(&codes);
    }

    pub(crate) fn len(&self) -> usize {
        self.labels.len()
    }

    pub(crate) fn dim(&self) -> usize {
        self.vq_centers.ncols()
    }

    pub(crate) fn pq_dim(&self) -> usize {
        self.pq.pq_dim()
    }

    /// Writes the decoded vector `i` into `out`
    pub(crate) fn reconstruct(&self, i: usize, mut out: ArrayViewMut1<f32>) {
        let pq_dim = self.pq_dim();
        out.assign(&self.vq_centers.row(self.labels[i] as usize));
        self.pq
            .decode_add(&self.codes[i * pq_dim..(i + 1) * pq_dim], out);
    }

    /// Bytes used by one encoded vector
    pub(crate) fn bytes_per_row(&self) -> usize {
        self.pq_dim() + std::mem::size_of::<u32>()
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        self.vq_centers.len() * std::mem::size_of::<f32>()
            + self.pq.size_in_bytes()
            + self.len() * self.bytes_per_row()
    }
}

fn residuals(
    data: ArrayView2<f32>,
    centers: ArrayView2<f32>,
    labels: impl Iterator<Item = u32>,
) -> Array2<f32> {
    let mut out = data.to_owned();
    for (mut row, label) in out.rows_mut().into_iter().zip(labels) {
        row -= &centers.row(label as usize);
    }
    out
}
