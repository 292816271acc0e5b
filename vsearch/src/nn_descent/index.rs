/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::Instant;

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::distance_type::DistanceType;
use crate::error::{check_param, Result};
use crate::nn_descent::IndexParams;
use crate::resources::Resources;
use crate::tensor::ManagedTensor;

/// Upper bound on the new (and old) candidates sampled per node and iteration
const MAX_CANDIDATES: usize = 48;

/// Nodes whose local joins are evaluated before their proposals are merged
const JOIN_CHUNK: usize = 512;

/// kNN graph built with NN-descent
#[derive(Debug)]
pub struct Index {
    metric: DistanceType,
    graph: Array2<u32>,
    distances: Array2<f32>,
}

impl Index {
    /// Builds a new kNN graph from the dataset.
    ///
    /// When the dataset has fewer than `graph_degree + 1` rows the degree is
    /// reduced to `n_rows - 1`.
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `params` - Parameters for building the graph
    /// * `dataset` - A row-major matrix on either the host or device
    pub fn build<T: Into<ManagedTensor>>(
        res: &Resources,
        params: &IndexParams,
        dataset: T,
    ) -> Result<Index> {
        let dataset: ManagedTensor = dataset.into();
        let data = dataset.to_f32_matrix("dataset")?;
        params.validate()?;
        check_param(data.nrows() >= 2, || {
            format!("NN-descent needs at least 2 rows, got {}", data.nrows())
        })?;
        let mut k = params.graph_degree;
        if k > data.nrows() - 1 {
            warn!(
                "graph_degree {} reduced to {} for a dataset of {} rows",
                k,
                data.nrows() - 1,
                data.nrows()
            );
            k = data.nrows() - 1;
        }
        let (graph, mut distances) = build_knn_graph(res, params, data.view(), k)?;
        distances.mapv_inplace(|d| params.metric.finalize(d));
        Ok(Index {
            metric: params.metric,
            graph,
            distances,
        })
    }

    /// Neighbor ids, one row per dataset row, nearest first
    pub fn graph(&self) -> ArrayView2<u32> {
        self.graph.view()
    }

    /// Distances matching `graph`
    pub fn distances(&self) -> ArrayView2<f32> {
        self.distances.view()
    }

    pub fn metric(&self) -> DistanceType {
        self.metric
    }
}

#[derive(Debug, Clone, Copy)]
struct Neighbor {
    dist: f32,
    id: u32,
    is_new: bool,
}

/// Neighbor list sorted by (distance, id), holding at most `capacity` entries
#[derive(Debug, Clone)]
struct NeighborList {
    entries: Vec<Neighbor>,
    capacity: usize,
}

impl NeighborList {
    fn new(capacity: usize) -> Self {
        NeighborList {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    fn worst(&self) -> f32 {
        match self.entries.last() {
            Some(last) if self.entries.len() >= self.capacity => last.dist,
            _ => f32::INFINITY,
        }
    }

    fn insert(&mut self, id: u32, dist: f32) -> bool {
        if dist >= self.worst() || self.entries.iter().any(|n| n.id == id) {
            return false;
        }
        let pos = self
            .entries
            .partition_point(|n| n.dist < dist || (n.dist == dist && n.id < id));
        self.entries.insert(
            pos,
            Neighbor {
                dist,
                id,
                is_new: true,
            },
        );
        self.entries.truncate(self.capacity);
        true
    }
}

/// Builds a `k` nearest neighbors graph of `data` (self excluded). Returns the
/// neighbor ids and their ranking distances, nearest first.
///
/// `k` must be smaller than the number of rows.
pub(crate) fn build_knn_graph(
    res: &Resources,
    params: &IndexParams,
    data: ArrayView2<f32>,
    k: usize,
) -> Result<(Array2<u32>, Array2<f32>)> {
    let n = data.nrows();
    check_param(k >= 1 && k < n, || {
        format!("NN-descent degree must be in [1, {}), got {}", n, k)
    })?;
    check_param(params.max_iterations >= 1, || {
        "max_iterations must be positive".to_string()
    })?;
    let capacity = params.intermediate_graph_degree.max(k).min(n - 1);
    let max_candidates = capacity.min(MAX_CANDIDATES);
    let metric = params.metric;
    let start = Instant::now();

    let lists = res.install(|| {
        let mut lists = init_random_lists(metric, data, capacity, params.seed);
        for iteration in 0..params.max_iterations {
            let (new_cand, old_cand) = sample_candidates(&mut lists, max_candidates);
            let updates = local_join(metric, data, &mut lists, &new_cand, &old_cand);
            debug!("nn-descent iteration {}: {} updates", iteration, updates);
            if updates as f64 <= params.termination_threshold as f64 * (n * capacity) as f64 {
                break;
            }
        }
        lists
    });

    let mut graph = Array2::<u32>::zeros((n, k));
    let mut distances = Array2::<f32>::zeros((n, k));
    for (v, list) in lists.iter().enumerate() {
        for (j, neighbor) in list.entries.iter().take(k).enumerate() {
            graph[[v, j]] = neighbor.id;
            distances[[v, j]] = neighbor.dist;
        }
    }
    info!(
        "built nn-descent graph of {} rows with degree {} in {:?}",
        n,
        k,
        start.elapsed()
    );
    Ok((graph, distances))
}

fn init_random_lists(
    metric: DistanceType,
    data: ArrayView2<f32>,
    capacity: usize,
    seed: u64,
) -> Vec<NeighborList> {
    let n = data.nrows();
    (0..n)
        .into_par_iter()
        .map(|v| {
            let mut rng = StdRng::seed_from_u64(seed ^ (v as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let mut list = NeighborList::new(capacity);
            for x in rand::seq::index::sample(&mut rng, n - 1, capacity).iter() {
                // skip v itself
                let u = if x >= v { x + 1 } else { x };
                list.insert(u as u32, metric.rank_distance(data.row(v), data.row(u)));
            }
            list
        })
        .collect()
}

/// Splits every neighbor list into new and old candidates, then adds the
/// reverse candidates. New candidates are marked old in their list.
fn sample_candidates(
    lists: &mut [NeighborList],
    max_candidates: usize,
) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let forward: Vec<(Vec<u32>, Vec<u32>)> = lists
        .par_iter_mut()
        .map(|list| {
            let mut new = Vec::with_capacity(max_candidates);
            let mut old = Vec::with_capacity(max_candidates);
            for neighbor in list.entries.iter_mut() {
                if neighbor.is_new {
                    if new.len() < max_candidates {
                        new.push(neighbor.id);
                        neighbor.is_new = false;
                    }
                } else if old.len() < max_candidates {
                    old.push(neighbor.id);
                }
            }
            (new, old)
        })
        .collect();

    let mut new_cand: Vec<Vec<u32>> = forward.iter().map(|(new, _)| new.clone()).collect();
    let mut old_cand: Vec<Vec<u32>> = forward.iter().map(|(_, old)| old.clone()).collect();
    let mut reverse_new = vec![0usize; lists.len()];
    let mut reverse_old = vec![0usize; lists.len()];
    for (v, (new, old)) in forward.iter().enumerate() {
        for &u in new {
            if reverse_new[u as usize] < max_candidates {
                new_cand[u as usize].push(v as u32);
                reverse_new[u as usize] += 1;
            }
        }
        for &u in old {
            if reverse_old[u as usize] < max_candidates {
                old_cand[u as usize].push(v as u32);
                reverse_old[u as usize] += 1;
            }
        }
    }

    new_cand
        .par_iter_mut()
        .zip(old_cand.par_iter_mut())
        .for_each(|(new, old)| {
            new.sort_unstable();
            new.dedup();
            old.sort_unstable();
            old.dedup();
            old.retain(|id| new.binary_search(id).is_err());
        });
    (new_cand, old_cand)
}

/// Compares every new candidate with the other new and the old candidates of
/// the same node, and offers each pair to both lists. Proposals are grouped
/// by target list before they are merged, so no list is shared between
/// workers. Returns the number of accepted proposals.
fn local_join(
    metric: DistanceType,
    data: ArrayView2<f32>,
    lists: &mut [NeighborList],
    new_cand: &[Vec<u32>],
    old_cand: &[Vec<u32>],
) -> usize {
    let n = lists.len();
    let mut updates = 0;
    for chunk_start in (0..n).step_by(JOIN_CHUNK) {
        let chunk_end = (chunk_start + JOIN_CHUNK).min(n);
        let worst: Vec<f32> = lists.par_iter().map(NeighborList::worst).collect();

        let proposals: Vec<Vec<(u32, u32, f32)>> = (chunk_start..chunk_end)
            .into_par_iter()
            .map(|v| {
                let new = &new_cand[v];
                let old = &old_cand[v];
                let mut out = Vec::new();
                for (i, &a) in new.iter().enumerate() {
                    for &b in new[i + 1..].iter().chain(old.iter()) {
                        if a == b {
                            continue;
                        }
                        let d = metric.rank_distance(data.row(a as usize), data.row(b as usize));
                        if d < worst[a as usize] {
                            out.push((a, b, d));
                        }
                        if d < worst[b as usize] {
                            out.push((b, a, d));
                        }
                    }
                }
                out
            })
            .collect();

        let mut buckets: Vec<Vec<(u32, f32)>> = vec![Vec::new(); n];
        for (target, id, d) in proposals.into_iter().flatten() {
            buckets[target as usize].push((id, d));
        }
        updates += lists
            .par_iter_mut()
            .zip(buckets.par_iter())
            .map(|(list, bucket)| {
                bucket
                    .iter()
                    .filter(|&&(id, d)| list.insert(id, d))
                    .count()
            })
            .sum::<usize>();
    }
    updates
}
