/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Greedy beam search over the CAGRA graph.
//!
//! Every query keeps an internal top-k buffer of `max(itopk_size, k)`
//! candidates, seeded with random nodes. Each iteration expands the
//! `search_width` best candidates that were not expanded yet, scoring their
//! unvisited neighbors. The search ends once every candidate in the buffer has
//! been expanded or the iteration limit is reached.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::storage::Storage;
use super::SearchParams;
use crate::distance_type::DistanceType;
use crate::resources::Resources;
use crate::visited::VisitedSet;

/// The parts of an index a traversal reads
pub(super) struct GraphView<'a> {
    pub(super) graph: &'a [Vec<u32>],
    pub(super) storage: &'a Storage,
    pub(super) metric: DistanceType,
}

impl GraphView<'_> {
    #[inline]
    fn distance(&self, query: ArrayView1<f32>, node: u32, scratch: &mut Array1<f32>) -> f32 {
        self.storage.distance(self.metric, query, node, scratch)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist: f32,
    node: u32,
    expanded: bool,
}

/// Candidates sorted by (distance, node), holding at most `capacity` entries
struct TopK {
    entries: Vec<Candidate>,
    capacity: usize,
}

impl TopK {
    fn new(capacity: usize) -> Self {
        TopK {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    fn insert(&mut self, dist: f32, node: u32) {
        if self.entries.len() == self.capacity {
            match self.entries.last() {
                Some(worst) if dist > worst.dist || (dist == worst.dist && node > worst.node) => {
                    return
                }
                None => return,
                _ => {}
            }
        }
        let precedes = |c: &Candidate| c.dist < dist || (c.dist == dist && c.node < node);
        let pos = self.entries.partition_point(precedes);
        self.entries.insert(
            pos,
            Candidate {
                dist,
                node,
                expanded: false,
            },
        );
        self.entries.truncate(self.capacity);
    }
}

/// Per worker state reused across queries
struct Scratch {
    visited: VisitedSet,
    n_visited: usize,
    vector: Array1<f32>,
}

/// Approximate k nearest nodes of every query, as (ranking distance, node)
/// pairs sorted ascending. `k` must not exceed the number of nodes.
pub(super) fn search_rows(
    view: &GraphView,
    res: &Resources,
    params: &SearchParams,
    queries: ArrayView2<f32>,
    k: usize,
) -> Vec<Vec<(f32, u32)>> {
    let n = view.graph.len();
    let n_queries = queries.nrows();
    let dim = queries.ncols();
    let batch = match params.max_queries {
        0 => n_queries.max(1),
        b => b,
    };

    res.install(|| {
        let mut results = Vec::with_capacity(n_queries);
        for start in (0..n_queries).step_by(batch) {
            let end = (start + batch).min(n_queries);
            let found: Vec<Vec<(f32, u32)>> = (start..end)
                .into_par_iter()
                .map_init(
                    || Scratch {
                        visited: VisitedSet::new(n),
                        n_visited: 0,
                        vector: Array1::zeros(dim),
                    },
                    |scratch, row| search_one(view, params, queries.row(row), row as u64, k, scratch),
                )
                .collect();
            results.extend(found);
        }
        results
    })
}

fn search_one(
    view: &GraphView,
    params: &SearchParams,
    query: ArrayView1<f32>,
    row: u64,
    k: usize,
    scratch: &mut Scratch,
) -> Vec<(f32, u32)> {
    let n = view.graph.len();
    let itopk = params.itopk_size.max(k);
    let width = params.search_width.max(1);
    let max_iterations = params.iteration_limit(itopk);

    scratch.visited.reset(n);
    scratch.n_visited = 0;
    let mut rng = StdRng::seed_from_u64(params.rand_xor_mask ^ row);
    let mut topk = TopK::new(itopk);

    let n_seeds = (params.num_random_samplings.max(1) as usize).saturating_mul(itopk);
    if n_seeds >= n {
        for node in 0..n as u32 {
            visit(view, query, node, scratch, &mut topk);
        }
    } else {
        add_random_seeds(view, query, n_seeds, &mut rng, scratch, &mut topk);
    }

    let mut parents = Vec::with_capacity(width);
    for iteration in 0..max_iterations {
        parents.clear();
        for candidate in topk.entries.iter_mut().filter(|c| !c.expanded).take(width) {
            candidate.expanded = true;
            parents.push(candidate.node);
        }
        if parents.is_empty() {
            if iteration < params.min_iterations && scratch.n_visited < n {
                add_random_seeds(view, query, width, &mut rng, scratch, &mut topk);
                continue;
            }
            break;
        }
        for &parent in &parents {
            for &node in &view.graph[parent as usize] {
                visit(view, query, node, scratch, &mut topk);
            }
        }
    }

    if topk.entries.len() < k {
        // Nothing was evicted, so every visited node is in the buffer. The
        // unreached part of the graph is scanned exactly.
        for node in 0..n as u32 {
            visit(view, query, node, scratch, &mut topk);
        }
    }

    topk.entries
        .iter()
        .take(k)
        .map(|c| (c.dist, c.node))
        .collect()
}

#[inline]
fn visit(view: &GraphView, query: ArrayView1<f32>, node: u32, scratch: &mut Scratch, topk: &mut TopK) {
    if scratch.visited.insert(node) {
        scratch.n_visited += 1;
        let dist = view.distance(query, node, &mut scratch.vector);
        topk.insert(dist, node);
    }
}

fn add_random_seeds(
    view: &GraphView,
    query: ArrayView1<f32>,
    count: usize,
    rng: &mut StdRng,
    scratch: &mut Scratch,
    topk: &mut TopK,
) {
    let n = view.graph.len();
    for _ in 0..count {
        let node = rng.gen_range(0..n) as u32;
        visit(view, query, node, scratch, topk);
    }
}
