/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Builders of the intermediate knn graph that CAGRA optimizes.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::debug;

use super::index_params::{BuildAlgo, IvfPqBuildParams};
use crate::brute_force;
use crate::distance_type::DistanceType;
use crate::error::{check_param, Error, Result};
use crate::resources::Resources;
use crate::tensor::DataType;
use crate::{ivf_pq, nn_descent};

pub(crate) trait KnnGraphBuilder {
    /// Returns the `k` approximate nearest neighbors of every row of `dataset`,
    /// nearest first, excluding the row itself. `k` must be smaller than the
    /// number of rows.
    fn build_knn_graph(
        &self,
        res: &Resources,
        dataset: ArrayView2<f32>,
        metric: DistanceType,
        k: usize,
    ) -> Result<Array2<u32>>;
}

impl BuildAlgo {
    pub(crate) fn builder(&self) -> &dyn KnnGraphBuilder {
        match self {
            BuildAlgo::IvfPq(params) => params,
            BuildAlgo::NnDescent(params) => params,
        }
    }
}

impl KnnGraphBuilder for IvfPqBuildParams {
    fn build_knn_graph(
        &self,
        res: &Resources,
        dataset: ArrayView2<f32>,
        metric: DistanceType,
        k: usize,
    ) -> Result<Array2<u32>> {
        let n = dataset.nrows();
        check_param(k >= 1 && k < n, || {
            format!("knn graph degree must be in [1, {}), got {}", n, k)
        })?;
        let build_params = self
            .build_params
            .clone()
            .set_metric(metric)
            .set_add_data_on_build(false);
        let mut ivf = ivf_pq::Index::train(res, &build_params, DataType::Float32, dataset)?;
        ivf.extend_array(res, dataset, None)?;

        // one extra candidate for the row itself
        let n_candidates = (((k + 1) as f32 * self.refinement_rate).ceil() as usize).clamp(k + 1, n);
        let n_probes = (self.search_params.n_probes as usize).max(1);
        let candidates = ivf.search_rows(res, n_probes, dataset, n_candidates);
        debug!(
            "ivf-pq graph builder: {} lists, {} candidates per row",
            ivf.n_lists(),
            n_candidates
        );

        let rows: Vec<Vec<u32>> = res.install(|| {
            candidates
                .par_iter()
                .enumerate()
                .map(|(v, cand)| {
                    let mut refined: Vec<(f32, u32)> = cand
                        .iter()
                        .filter(|&&(_, id)| id as usize != v)
                        .map(|&(_, id)| {
                            let d = metric.rank_distance(dataset.row(v), dataset.row(id as usize));
                            (d, id as u32)
                        })
                        .collect();
                    refined.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                    if refined.len() < k {
                        // not enough candidates scanned, fall back to an exact scan
                        let query = dataset.slice(ndarray::s![v..v + 1, ..]);
                        refined = brute_force::knn(res, metric, dataset, query, k + 1)
                            .pop()
                            .unwrap_or_default()
                            .into_iter()
                            .filter(|&(_, id)| id as usize != v)
                            .collect();
                    }
                    refined.into_iter().take(k).map(|(_, id)| id).collect()
                })
                .collect()
        });
        to_graph(rows, k)
    }
}

impl KnnGraphBuilder for nn_descent::IndexParams {
    fn build_knn_graph(
        &self,
        res: &Resources,
        dataset: ArrayView2<f32>,
        metric: DistanceType,
        k: usize,
    ) -> Result<Array2<u32>> {
        let params = self
            .clone()
            .set_metric(metric)
            .set_graph_degree(k)
            .set_intermediate_graph_degree(self.intermediate_graph_degree.max(k + k / 2));
        let (graph, _) = nn_descent::build_knn_graph(res, &params, dataset, k)?;
        Ok(graph)
    }
}

fn to_graph(rows: Vec<Vec<u32>>, k: usize) -> Result<Array2<u32>> {
    let n = rows.len();
    let flat: Vec<u32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, k), flat)
        .map_err(|e| Error::InvalidParameter(format!("incomplete knn graph: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{calc_recall, generate_data};

    fn exact_graph(res: &Resources, data: ArrayView2<f32>, k: usize) -> Array2<u32> {
        let rows: Vec<Vec<u32>> = brute_force::knn(res, DistanceType::L2Expanded, data, data, k + 1)
            .into_iter()
            .map(|row| row.into_iter().skip(1).map(|(_, id)| id).collect())
            .collect();
        to_graph(rows, k).unwrap()
    }

    fn check_builder(builder: &dyn KnnGraphBuilder, min_recall: f64) {
        let res = Resources::new().unwrap();
        let data = generate_data::<f32>((1000, 8));
        let k = 16;

        let graph = builder
            .build_knn_graph(&res, data.view(), DistanceType::L2Expanded, k)
            .unwrap();
        assert_eq!(graph.dim(), (1000, k));
        for (v, row) in graph.rows().into_iter().enumerate() {
            assert!(row.iter().all(|&u| u as usize != v && (u as usize) < 1000));
        }

        let reference = exact_graph(&res, data.view(), k);
        let recall = calc_recall(&graph, &reference);
        assert!(recall > min_recall, "recall {} too low", recall);
    }

    #[test]
    fn test_ivf_pq_builder() {
        check_builder(&IvfPqBuildParams::default(), 0.8);
    }

    #[test]
    fn test_nn_descent_builder() {
        check_builder(&nn_descent::IndexParams::default(), 0.9);
    }

    #[test]
    fn test_builder_dispatch() {
        let algo: BuildAlgo = "nn_descent".parse().unwrap();
        let res = Resources::new().unwrap();
        let data = generate_data::<f32>((50, 4));
        let graph = algo
            .builder()
            .build_knn_graph(&res, data.view(), DistanceType::InnerProduct, 8)
            .unwrap();
        assert_eq!(graph.dim(), (50, 8));
        assert!(algo
            .builder()
            .build_knn_graph(&res, data.view(), DistanceType::L2Expanded, 50)
            .is_err());
    }
}
