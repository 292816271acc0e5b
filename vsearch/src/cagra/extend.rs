/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::HashSet;
use std::time::Instant;

use ndarray::{s, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, info};

use super::graph::{merge_back_links, prune_list};
use super::index::Index;
use super::search::search_rows;
use super::SearchParams;
use crate::error::{check_dtype, check_param, check_shape, Error, Result};
use crate::resources::Resources;
use crate::tensor::{DataType, ManagedTensor};

/// Smallest number of rows inserted at once when the chunk size is automatic
const MIN_AUTO_CHUNK: usize = 256;

/// Supplemental parameters to extend CAGRA Index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendParams {
    pub max_chunk_size: usize,
}

impl ExtendParams {
    /// Returns a new ExtendParams
    pub fn new() -> Result<ExtendParams> {
        Ok(ExtendParams::default())
    }

    /// Number of rows inserted into the graph at once. New rows only link to
    /// nodes of earlier chunks, so smaller chunks give better graphs. Auto
    /// select when 0.
    pub fn set_max_chunk_size(mut self, max_chunk_size: usize) -> ExtendParams {
        self.max_chunk_size = max_chunk_size;
        self
    }

    fn chunk_size(&self, index_size: usize) -> usize {
        match self.max_chunk_size {
            0 => MIN_AUTO_CHUNK.max(index_size / 8),
            size => size,
        }
    }
}

impl Index {
    /// Adds new vectors to the index
    ///
    /// An index built without data gets its graph built from the first batch.
    /// Nothing is modified when an error is returned.
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `params` - Parameters for extending the index
    /// * `new_vectors` - A matrix with the same dtype and dimension as the index
    /// * `new_ids` - Optional uint32 vector with one id per row. When `None`,
    ///   ids continue after the largest id of the index.
    pub fn extend(
        &mut self,
        res: &Resources,
        params: &ExtendParams,
        new_vectors: &ManagedTensor,
        new_ids: Option<&ManagedTensor>,
    ) -> Result<()> {
        check_dtype(self.dtype, new_vectors.dtype())?;
        let data = new_vectors.to_f32_matrix("new_vectors")?;
        if data.ncols() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: data.ncols(),
            });
        }
        let n_new = data.nrows();
        check_param(self.size() + n_new <= u32::MAX as usize, || {
            format!(
                "index would hold {} rows, at most {} are supported",
                self.size() + n_new,
                u32::MAX
            )
        })?;

        let ids = match new_ids {
            Some(tensor) => {
                check_dtype(DataType::UInt32, tensor.dtype())?;
                check_shape(&[n_new], tensor.shape())?;
                tensor.view1::<u32>("new_ids")?.to_vec()
            }
            None => {
                let first = self.ids.iter().max().map_or(0, |&id| id as u64 + 1);
                check_param(first + n_new as u64 <= u32::MAX as u64 + 1, || {
                    "no ids left to assign, pass new_ids explicitly".to_string()
                })?;
                (first..first + n_new as u64).map(|id| id as u32).collect()
            }
        };
        let mut batch = HashSet::with_capacity(n_new);
        for &id in &ids {
            if self.id_set.contains(&id) || !batch.insert(id) {
                return Err(Error::IdCollision(id));
            }
        }
        if n_new == 0 {
            return Ok(());
        }
        if self.size() == 0 {
            return self.build_graph(res, data.view(), ids);
        }

        let reservation = res.reserve(self.bytes_for(n_new))?;
        let start = Instant::now();
        let mut offset = 0;
        while offset < n_new {
            let end = (offset + params.chunk_size(self.size())).min(n_new);
            self.insert_chunk(res, data.slice(s![offset..end, ..]), &ids[offset..end])?;
            offset = end;
        }
        self.reservations.push(reservation);
        info!(
            "added {} vectors to cagra index ({} total) in {:?}",
            n_new,
            self.size(),
            start.elapsed()
        );
        Ok(())
    }

    fn insert_chunk(&mut self, res: &Resources, data: ArrayView2<f32>, ids: &[u32]) -> Result<()> {
        let current = self.size();
        let degree = self.graph_degree;
        let n_candidates = self.intermediate_graph_degree.min(current);
        let search_params = SearchParams::default().set_itopk_size(n_candidates.max(64));

        let candidates = search_rows(&self.view(), res, &search_params, data, n_candidates);

        let graph = self.graph.as_slice();
        let neighbors_of = move |c: u32| graph[c as usize].as_slice();
        let lists: Vec<Vec<u32>> = res.install(|| {
            candidates
                .par_iter()
                .map_init(
                    || vec![u32::MAX; current],
                    |ranks, cand| {
                        let nodes: Vec<u32> = cand.iter().map(|&(_, node)| node).collect();
                        prune_list(&nodes, degree, neighbors_of, ranks)
                    },
                )
                .collect()
        });

        let mut proposals = Vec::new();
        for (i, (list, cand)) in lists.iter().zip(&candidates).enumerate() {
            let source = (current + i) as u32;
            for &target in list {
                if let Some(&(dist, _)) = cand.iter().find(|&&(_, node)| node == target) {
                    proposals.push((target, source, dist));
                }
            }
        }
        debug!(
            "inserting {} nodes with {} back-link proposals",
            lists.len(),
            proposals.len()
        );

        self.storage.append(res, data)?;
        self.graph.extend(lists);
        let storage = &self.storage;
        let metric = self.metric;
        merge_back_links(res, &mut self.graph, proposals, degree, |a, b| {
            storage.pair_distance(metric, a, b)
        });
        self.ids.extend_from_slice(ids);
        self.id_set.extend(ids.iter().copied());
        Ok(())
    }
}
