/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Graph optimization: turns a knn graph into the CAGRA search graph.
//!
//! Every knn list is pruned by counting detours. For a node `v` with
//! candidates `L` sorted nearest first, the edge to `L[j]` has a detour through
//! `L[i]` (`i < j`) when `L[j]` also appears in the list of `L[i]` at a
//! position before `j`. Edges with few detours are kept, since they are the
//! ones that can't be replaced by a two hop path. Reverse edges are then mixed
//! in so that nodes far from everything else remain reachable.

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::resources::Resources;

const ABSENT: u32 = u32::MAX;

/// Prunes `candidates` (nearest first, distinct, without the node itself) to
/// at most `degree` edges, ordered by (detour count, candidate rank).
///
/// `ranks` is a scratch array with one `u32::MAX` entry per node. It is
/// restored before returning.
pub(crate) fn prune_list<'a, F>(
    candidates: &[u32],
    degree: usize,
    neighbors_of: F,
    ranks: &mut [u32],
) -> Vec<u32>
where
    F: Fn(u32) -> &'a [u32],
{
    let k = candidates.len();
    for (r, &c) in candidates.iter().enumerate() {
        ranks[c as usize] = r as u32;
    }

    let mut detours = vec![0u32; k];
    for (i, &c) in candidates.iter().enumerate().take(k.saturating_sub(1)) {
        for (j, &b) in neighbors_of(c).iter().enumerate() {
            let r = ranks[b as usize];
            if r != ABSENT && r as usize > i.max(j) {
                detours[r as usize] += 1;
            }
        }
    }

    for &c in candidates {
        ranks[c as usize] = ABSENT;
    }

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by_key(|&r| (detours[r], r));
    order.into_iter().take(degree).map(|r| candidates[r]).collect()
}

/// Builds the search graph of degree `degree` from a knn graph whose rows
/// are sorted nearest first
pub(crate) fn optimize(res: &Resources, knn: ArrayView2<u32>, degree: usize) -> Vec<Vec<u32>> {
    let (n, k) = knn.dim();
    let flat: Vec<u32> = knn.iter().copied().collect();
    let flat = flat.as_slice();
    let row = move |v: u32| &flat[v as usize * k..(v as usize + 1) * k];

    res.install(|| {
        let pruned: Vec<Vec<u32>> = (0..n)
            .into_par_iter()
            .map_init(
                || vec![ABSENT; n],
                |ranks, v| prune_list(row(v as u32), degree, row, ranks),
            )
            .collect();

        let reverse = reverse_edges(&pruned, degree);
        pruned
            .into_par_iter()
            .zip(reverse.into_par_iter())
            .map(|(forward, reverse)| merge_edges(&forward, &reverse, degree))
            .collect()
    })
}

/// Reverse of every edge, collected by increasing rank of the forward edge so
/// that the strongest links claim the limited slots first
fn reverse_edges(graph: &[Vec<u32>], degree: usize) -> Vec<Vec<u32>> {
    let mut reverse: Vec<Vec<u32>> = vec![Vec::new(); graph.len()];
    for rank in 0..degree {
        for (v, edges) in graph.iter().enumerate() {
            if let Some(&u) = edges.get(rank) {
                let list = &mut reverse[u as usize];
                if list.len() < degree {
                    list.push(v as u32);
                }
            }
        }
    }
    reverse
}

/// First half of the forward edges, then the reverse edges, then the rest of
/// the forward edges, without duplicates
fn merge_edges(forward: &[u32], reverse: &[u32], degree: usize) -> Vec<u32> {
    let protected = forward.len().min(degree / 2);
    let mut merged = Vec::with_capacity(degree);
    for &u in forward[..protected]
        .iter()
        .chain(reverse)
        .chain(&forward[protected..])
    {
        if merged.len() == degree {
            break;
        }
        if !merged.contains(&u) {
            merged.push(u);
        }
    }
    merged
}

/// Adds the edges `(target, source)` of `proposals` to `graph`. Each target
/// keeps its first `degree / 2` edges, the rest of its list is refilled with
/// the nearest of its remaining edges and its proposals. Targets are updated
/// independently, so the merge runs in parallel without conflicts.
pub(crate) fn merge_back_links<F>(
    res: &Resources,
    graph: &mut [Vec<u32>],
    proposals: Vec<(u32, u32, f32)>,
    degree: usize,
    distance: F,
) where
    F: Fn(u32, u32) -> f32 + Sync,
{
    let mut buckets: Vec<Vec<(f32, u32)>> = vec![Vec::new(); graph.len()];
    for (target, source, dist) in proposals {
        buckets[target as usize].push((dist, source));
    }

    res.install(|| {
        graph
            .par_iter_mut()
            .zip(buckets.into_par_iter())
            .enumerate()
            .for_each(|(target, (edges, proposed))| {
                if proposed.is_empty() {
                    return;
                }
                let protected = edges.len().min(degree / 2);
                let mut tail: Vec<(f32, u32)> = edges[protected..]
                    .iter()
                    .map(|&u| (distance(target as u32, u), u))
                    .chain(proposed)
                    .collect();
                tail.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

                edges.truncate(protected);
                for (_, u) in tail {
                    if edges.len() == degree {
                        break;
                    }
                    if u as usize != target && !edges.contains(&u) {
                        edges.push(u);
                    }
                }
            });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force;
    use crate::distance_type::DistanceType;
    use crate::test_utils::generate_data;
    use ndarray::Array2;

    #[test]
    fn test_prune_list_counts_detours() {
        // node 0 lists 1, 2, 3. Node 1 reaches 2 first, so 0 -> 2 is a detour
        // through 1 and drops behind 0 -> 3. Node 3 sits too far down the
        // lists of 1 and 2 to count.
        let lists: Vec<Vec<u32>> = vec![vec![1, 2, 3], vec![2, 0, 3], vec![1, 0, 3], vec![2, 1, 0]];
        let mut ranks = vec![ABSENT; 4];
        let pruned = prune_list(&lists[0], 3, |c| lists[c as usize].as_slice(), &mut ranks);
        assert_eq!(pruned, vec![1, 3, 2]);
        assert!(ranks.iter().all(|&r| r == ABSENT));

        let pruned = prune_list(&lists[0], 2, |c| lists[c as usize].as_slice(), &mut ranks);
        assert_eq!(pruned, vec![1, 3]);
    }

    #[test]
    fn test_merge_edges() {
        assert_eq!(merge_edges(&[1, 2, 3, 4], &[9, 2, 8], 4), vec![1, 2, 9, 8]);
        assert_eq!(merge_edges(&[1, 2], &[], 4), vec![1, 2]);
        assert_eq!(merge_edges(&[], &[5, 6, 7], 2), vec![5, 6]);
    }

    #[test]
    fn test_optimize_invariants() {
        let res = Resources::new().unwrap();
        let data = generate_data::<f32>((500, 6));
        let k = 24;
        let rows: Vec<u32> = brute_force::knn(&res, DistanceType::L2Expanded, data.view(), data.view(), k + 1)
            .into_iter()
            .flat_map(|row| row.into_iter().skip(1).map(|(_, id)| id))
            .collect();
        let knn = Array2::from_shape_vec((500, k), rows).unwrap();

        let graph = optimize(&res, knn.view(), 12);
        assert_eq!(graph.len(), 500);
        for (v, edges) in graph.iter().enumerate() {
            assert!(!edges.is_empty() && edges.len() <= 12);
            assert!(edges.iter().all(|&u| u as usize != v && (u as usize) < 500));
            let mut sorted = edges.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), edges.len());
            // the nearest neighbor is never a detour
            assert_eq!(edges[0], knn[[v, 0]]);
        }
    }

    #[test]
    fn test_merge_back_links() {
        let res = Resources::new().unwrap();
        let mut graph: Vec<Vec<u32>> = vec![vec![1, 2, 3, 4], vec![0], vec![0], vec![0], vec![0], vec![]];
        let dist = |a: u32, b: u32| (a as f32 - b as f32).abs();

        // node 5 proposes itself to 0 and 1
        merge_back_links(&res, &mut graph, vec![(0, 5, 2.5), (1, 5, 4.0)], 4, dist);
        assert_eq!(graph[0], vec![1, 2, 5, 3]);
        assert_eq!(graph[1], vec![0, 5]);
        assert_eq!(graph[2], vec![0]);
    }
}
