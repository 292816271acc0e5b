/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::distance_type::DistanceType;
use crate::error::{Error, Result};
use crate::quantization::VpqDataset;
use crate::resources::Resources;

/// Vectors of the graph nodes, in node order
#[derive(Debug, Clone)]
pub(crate) enum Storage {
    Full(Array2<f32>),
    Compressed(VpqDataset),
}

impl Storage {
    pub(crate) fn dim(&self) -> usize {
        match self {
            Storage::Full(data) => data.ncols(),
            Storage::Compressed(vpq) => vpq.dim(),
        }
    }

    pub(crate) fn is_compressed(&self) -> bool {
        matches!(self, Storage::Compressed(_))
    }

    /// Bytes needed to store one more vector
    pub(crate) fn bytes_per_row(&self) -> usize {
        match self {
            Storage::Full(data) => data.ncols() * std::mem::size_of::<f32>(),
            Storage::Compressed(vpq) => vpq.bytes_per_row(),
        }
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        match self {
            Storage::Full(data) => data.len() * std::mem::size_of::<f32>(),
            Storage::Compressed(vpq) => vpq.size_in_bytes(),
        }
    }

    pub(crate) fn append(&mut self, res: &Resources, rows: ArrayView2<f32>) -> Result<()> {
        match self {
            Storage::Full(data) => data
                .append(Axis(0), rows)
                .map_err(|e| Error::InvalidParameter(format!("failed to store vectors: {}", e))),
            Storage::Compressed(vpq) => {
                vpq.append(res, rows);
                Ok(())
            }
        }
    }

    /// Ranking distance between `query` and node `i`. `scratch` holds the
    /// decoded vector of compressed storage and must have `dim` entries.
    #[inline]
    pub(crate) fn distance(
        &self,
        metric: DistanceType,
        query: ArrayView1<f32>,
        i: u32,
        scratch: &mut Array1<f32>,
    ) -> f32 {
        match self {
            Storage::Full(data) => metric.rank_distance(query, data.row(i as usize)),
            Storage::Compressed(vpq) => {
                vpq.reconstruct(i as usize, scratch.view_mut());
                metric.rank_distance(query, scratch.view())
            }
        }
    }

    /// Ranking distance between nodes `a` and `b`
    pub(crate) fn pair_distance(&self, metric: DistanceType, a: u32, b: u32) -> f32 {
        match self {
            Storage::Full(data) => metric.rank_distance(data.row(a as usize), data.row(b as usize)),
            Storage::Compressed(vpq) => {
                let mut va = Array1::zeros(vpq.dim());
                vpq.reconstruct(a as usize, va.view_mut());
                let mut vb = Array1::zeros(vpq.dim());
                vpq.reconstruct(b as usize, vb.view_mut());
                metric.rank_distance(va.view(), vb.view())
            }
        }
    }
}
