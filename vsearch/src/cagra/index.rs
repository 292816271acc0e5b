/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::HashSet;
use std::time::Instant;

use ndarray::{Array2, ArrayView2};
use tracing::{debug, info, warn};

use super::graph;
use super::index_params::BuildAlgo;
use super::search::{search_rows, GraphView};
use super::storage::Storage;
use crate::cagra::{IndexParams, SearchParams};
use crate::distance_type::DistanceType;
use crate::error::{check_dtype, check_param, check_shape, Error, Result};
use crate::quantization::VpqDataset;
use crate::resources::{Reservation, Resources};
use crate::tensor::{DataType, ManagedTensor};

/// CAGRA ANN Index
#[derive(Debug)]
pub struct Index {
    pub(super) metric: DistanceType,
    pub(super) dtype: DataType,
    pub(super) graph_degree: usize,
    pub(super) intermediate_graph_degree: usize,
    pub(super) build_algo: BuildAlgo,
    pub(super) storage: Storage,
    /// adjacency list of every node
    pub(super) graph: Vec<Vec<u32>>,
    /// external id of every node
    pub(super) ids: Vec<u32>,
    pub(super) id_set: HashSet<u32>,
    pub(super) reservations: Vec<Reservation>,
}

impl Index {
    /// Builds a new Index from the dataset for efficient search.
    ///
    /// Rows get the ids `0..n_rows`. When the dataset has fewer rows than the
    /// configured degrees, the degrees are reduced to `n_rows - 1`.
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `params` - Parameters for building the index
    /// * `dataset` - A row-major float32, int8 or uint8 matrix on either the host or device to index
    pub fn build<T: Into<ManagedTensor>>(
        res: &Resources,
        params: &IndexParams,
        dataset: T,
    ) -> Result<Index> {
        let dataset: ManagedTensor = dataset.into();
        params.validate()?;
        let dtype = dataset.dtype();
        let data = dataset.to_f32_matrix("dataset")?;
        let (n, dim) = data.dim();
        check_param(n > 0 && dim > 0, || {
            format!("dataset must not be empty, got shape {:?}", data.shape())
        })?;
        check_param(n <= u32::MAX as usize, || {
            format!("dataset has {} rows, at most {} are supported", n, u32::MAX)
        })?;
        if let Some(compression) = &params.compression {
            compression.validate(dim)?;
        }
        if params.metric == DistanceType::InnerProduct && dtype != DataType::Float32 {
            warn!(
                "inner product on {:?} vectors ranks raw integer values, normalize the data if cosine ranking is expected",
                dtype
            );
        }

        let storage = match &params.compression {
            Some(compression) => {
                Storage::Compressed(VpqDataset::train(res, compression, data.view(), params.seed)?)
            }
            None => Storage::Full(Array2::zeros((0, dim))),
        };
        let mut index = Index {
            metric: params.metric,
            dtype,
            graph_degree: params.graph_degree,
            intermediate_graph_degree: params.intermediate_graph_degree,
            build_algo: params.build_algo.clone(),
            storage,
            graph: Vec::new(),
            ids: Vec::new(),
            id_set: HashSet::new(),
            reservations: Vec::new(),
        };
        if params.add_data_on_build {
            index.build_graph(res, data.view(), (0..n as u32).collect())?;
        }
        Ok(index)
    }

    /// Builds the graph of an empty index over `data`
    pub(super) fn build_graph(
        &mut self,
        res: &Resources,
        data: ArrayView2<f32>,
        ids: Vec<u32>,
    ) -> Result<()> {
        let n = data.nrows();
        let reservation = res.reserve(self.bytes_for(n))?;
        let start = Instant::now();

        let graph = if n == 1 {
            vec![Vec::new()]
        } else {
            let mut intermediate_degree = self.intermediate_graph_degree;
            let mut degree = self.graph_degree;
            if intermediate_degree > n - 1 {
                warn!(
                    "graph degrees ({}, intermediate {}) reduced to at most {} for {} rows",
                    degree,
                    intermediate_degree,
                    n - 1,
                    n
                );
                intermediate_degree = n - 1;
                degree = degree.min(n - 1);
            }
            let knn = self
                .build_algo
                .builder()
                .build_knn_graph(res, data, self.metric, intermediate_degree)?;
            debug!(
                "{} knn graph of degree {} built in {:?}",
                self.build_algo.name(),
                intermediate_degree,
                start.elapsed()
            );
            graph::optimize(res, knn.view(), degree)
        };

        self.storage.append(res, data)?;
        self.graph = graph;
        self.id_set = ids.iter().copied().collect();
        self.ids = ids;
        self.reservations.push(reservation);
        info!(
            "built cagra index of {} rows (graph degree {}, {} dataset of {} bytes) in {:?}",
            n,
            self.graph_degree,
            if self.storage.is_compressed() { "vpq compressed" } else { "uncompressed" },
            self.storage.size_in_bytes(),
            start.elapsed()
        );
        Ok(())
    }

    /// Device memory needed to hold `n_rows` more nodes
    pub(super) fn bytes_for(&self, n_rows: usize) -> usize {
        let per_row = self.storage.bytes_per_row()
            + (self.graph_degree + 1) * std::mem::size_of::<u32>();
        n_rows.saturating_mul(per_row)
    }

    pub(super) fn view(&self) -> GraphView<'_> {
        GraphView {
            graph: &self.graph,
            storage: &self.storage,
            metric: self.metric,
        }
    }

    /// Number of indexed vectors
    pub fn size(&self) -> usize {
        self.graph.len()
    }

    pub fn dim(&self) -> usize {
        self.storage.dim()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn metric(&self) -> DistanceType {
        self.metric
    }

    /// Maximum number of edges of a node
    pub fn graph_degree(&self) -> usize {
        self.graph_degree
    }

    pub fn intermediate_graph_degree(&self) -> usize {
        self.intermediate_graph_degree
    }

    /// Whether the vectors are stored VPQ compressed
    pub fn is_compressed(&self) -> bool {
        self.storage.is_compressed()
    }

    /// Adjacency list of every node, as node positions
    pub fn graph(&self) -> &[Vec<u32>] {
        &self.graph
    }

    /// External id of every node
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Perform a Approximate Nearest Neighbors search on the Index
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `params` - Parameters to use in searching the index
    /// * `queries` - A matrix in host or device memory to query for
    /// * `neighbors` - uint32 matrix (n_queries, k) that receives the ids of the nearest neighbors
    /// * `distances` - float32 matrix (n_queries, k) that receives the distances of the nearest neighbors
    pub fn search(
        &self,
        res: &Resources,
        params: &SearchParams,
        queries: &ManagedTensor,
        neighbors: &mut ManagedTensor,
        distances: &mut ManagedTensor,
    ) -> Result<()> {
        params.validate()?;
        check_dtype(self.dtype, queries.dtype())?;
        let queries = queries.to_f32_matrix("queries")?;
        if queries.ncols() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: queries.ncols(),
            });
        }
        check_dtype(DataType::UInt32, neighbors.dtype())?;
        check_dtype(DataType::Float32, distances.dtype())?;
        let (_, k) = neighbors.matrix_shape("neighbors")?;
        check_shape(&[queries.nrows(), k], neighbors.shape())?;
        check_shape(&[queries.nrows(), k], distances.shape())?;
        if self.size() == 0 {
            return Err(Error::EmptyIndex);
        }
        check_param(k > 0 && k <= self.size(), || {
            format!("k must be in [1, {}], got {}", self.size(), k)
        })?;

        let start = Instant::now();
        let results = search_rows(&self.view(), res, params, queries.view(), k);

        let out_idx = neighbors.as_mut_slice::<u32>()?;
        for (out, row) in out_idx.chunks_mut(k).zip(&results) {
            for (dst, &(_, node)) in out.iter_mut().zip(row) {
                *dst = self.ids[node as usize];
            }
        }
        let out_dist = distances.as_mut_slice::<f32>()?;
        for (out, row) in out_dist.chunks_mut(k).zip(&results) {
            for (dst, &(dist, _)) in out.iter_mut().zip(row) {
                *dst = self.metric.finalize(dist);
            }
        }
        debug!(
            "searched {} queries for {} neighbors in {:?}",
            queries.nrows(),
            k,
            start.elapsed()
        );
        Ok(())
    }

    /// Searches the index and returns newly allocated `(neighbors, distances)`
    /// tensors of shape (n_queries, k), placed in the same memory as `queries`.
    pub fn search_alloc(
        &self,
        res: &Resources,
        params: &SearchParams,
        queries: &ManagedTensor,
        k: usize,
    ) -> Result<(ManagedTensor, ManagedTensor)> {
        let (n_queries, _) = queries.matrix_shape("queries")?;
        let memory = queries.memory_type();
        let mut neighbors = ManagedTensor::zeros::<u32>(res, &[n_queries, k], memory)?;
        let mut distances = ManagedTensor::zeros::<f32>(res, &[n_queries, k], memory)?;
        self.search(res, params, queries, &mut neighbors, &mut distances)?;
        Ok((neighbors, distances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force;
    use crate::cagra::{CompressionParams, ExtendParams};
    use crate::tensor::{IntoDtype, MemoryType};
    use crate::test_utils::{calc_recall, generate_data, GenerateData};
    use mark_flaky_tests::flaky;
    use ndarray::s;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn test_cagra(build_params: IndexParams) {
        let res = Resources::new().unwrap();

        // Create a new random dataset to index
        let n_datapoints = 256;
        let n_features = 16;
        let dataset =
            ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));

        // build the cagra index
        let index =
            Index::build(&res, &build_params, &dataset).expect("failed to create cagra index");

        // use the first 4 points from the dataset as queries : will test that we get them back
        // as their own nearest neighbor
        let n_queries = 4;
        let queries = dataset.slice(s![0..n_queries, ..]);

        let k = 10;

        // copy query data over to the device, and allocate device memory for the
        // distances/ neighbors outputs
        let queries = ManagedTensor::from(&queries).to_device(&res).unwrap();
        let mut neighbors_host = ndarray::Array::<u32, _>::zeros((n_queries, k));
        let mut neighbors = ManagedTensor::from(&neighbors_host)
            .to_device(&res)
            .unwrap();

        let mut distances_host = ndarray::Array::<f32, _>::zeros((n_queries, k));
        let mut distances = ManagedTensor::from(&distances_host)
            .to_device(&res)
            .unwrap();

        let search_params = SearchParams::new().unwrap();

        index
            .search(&res, &search_params, &queries, &mut neighbors, &mut distances)
            .unwrap();

        // Copy back to host memory
        distances.to_host(&res, &mut distances_host).unwrap();
        neighbors.to_host(&res, &mut neighbors_host).unwrap();

        // nearest neighbors should be themselves, since queries are from the
        // dataset
        assert_eq!(neighbors_host[[0, 0]], 0);
        assert_eq!(neighbors_host[[1, 0]], 1);
        assert_eq!(neighbors_host[[2, 0]], 2);
        assert_eq!(neighbors_host[[3, 0]], 3);
    }

    #[test]
    fn test_cagra_index() {
        let build_params = IndexParams::new().unwrap();
        test_cagra(build_params);
    }

    #[test]
    fn test_cagra_nn_descent() {
        let build_params = IndexParams::new()
            .unwrap()
            .set_build_algo(BuildAlgo::NnDescent(Default::default()))
            .set_nn_descent_niter(10);
        test_cagra(build_params);
    }

    #[test]
    fn test_cagra_compression() {
        let build_params = IndexParams::new()
            .unwrap()
            .set_compression(CompressionParams::new().unwrap());
        test_cagra(build_params);
    }

    fn search_host(
        index: &Index,
        res: &Resources,
        params: &SearchParams,
        queries: &ManagedTensor,
        k: usize,
    ) -> (Array2<u32>, Array2<f32>) {
        let n_queries = queries.shape()[0];
        let mut neighbors = ManagedTensor::zeros::<u32>(res, &[n_queries, k], MemoryType::Host).unwrap();
        let mut distances = ManagedTensor::zeros::<f32>(res, &[n_queries, k], MemoryType::Host).unwrap();
        index
            .search(res, params, queries, &mut neighbors, &mut distances)
            .unwrap();
        let mut neighbors_host = Array2::<u32>::zeros((n_queries, k));
        let mut distances_host = Array2::<f32>::zeros((n_queries, k));
        neighbors.to_host(res, &mut neighbors_host).unwrap();
        distances.to_host(res, &mut distances_host).unwrap();
        (neighbors_host, distances_host)
    }

    fn exact_neighbors<T: IntoDtype>(
        res: &Resources,
        metric: DistanceType,
        dataset: &Array2<T>,
        queries: &ManagedTensor,
        k: usize,
    ) -> (Array2<i64>, Array2<f32>) {
        let index = brute_force::Index::build(res, metric, dataset).unwrap();
        let n_queries = queries.shape()[0];
        let mut neighbors = ManagedTensor::zeros::<i64>(res, &[n_queries, k], MemoryType::Host).unwrap();
        let mut distances = ManagedTensor::zeros::<f32>(res, &[n_queries, k], MemoryType::Host).unwrap();
        index
            .search(res, queries, &mut neighbors, &mut distances)
            .unwrap();
        let mut neighbors_host = Array2::<i64>::zeros((n_queries, k));
        let mut distances_host = Array2::<f32>::zeros((n_queries, k));
        neighbors.to_host(res, &mut neighbors_host).unwrap();
        distances.to_host(res, &mut distances_host).unwrap();
        (neighbors_host, distances_host)
    }

    /// Builds an index over random data and checks the recall of both search
    /// entry points, which must agree exactly
    fn check_recall<T: IntoDtype + GenerateData>(build_params: IndexParams, min_recall: f64) {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<T>((1000, 16));
        let index = Index::build(&res, &build_params, &dataset).unwrap();
        assert_eq!(index.size(), 1000);
        assert_eq!(index.dtype(), T::dtype());

        let k = 10;
        let queries = ManagedTensor::from(&dataset.slice(s![..100, ..]));
        let search_params = SearchParams::new().unwrap();
        let (neighbors, distances) = search_host(&index, &res, &search_params, &queries, k);

        let (alloc_neighbors, alloc_distances) =
            index.search_alloc(&res, &search_params, &queries, k).unwrap();
        assert_eq!(alloc_neighbors.memory_type(), MemoryType::Host);
        let mut alloc_host = Array2::<u32>::zeros((100, k));
        alloc_neighbors.to_host(&res, &mut alloc_host).unwrap();
        let mut alloc_dist_host = Array2::<f32>::zeros((100, k));
        alloc_distances.to_host(&res, &mut alloc_dist_host).unwrap();
        assert_eq!(alloc_host, neighbors);
        assert_eq!(alloc_dist_host, distances);

        let (reference, _) = exact_neighbors(&res, build_params.metric, &dataset, &queries, k);
        let recall = calc_recall(&neighbors, &reference);
        assert!(recall >= min_recall, "recall {} below {}", recall, min_recall);
        for row in distances.rows() {
            assert!(row.iter().zip(row.iter().skip(1)).all(|(a, b)| a <= b));
        }
    }

    fn ivf_pq_params() -> IndexParams {
        IndexParams::new().unwrap()
    }

    fn nn_descent_params() -> IndexParams {
        IndexParams::new()
            .unwrap()
            .set_build_algo("nn_descent".parse().unwrap())
    }

    #[flaky]
    #[test]
    fn test_recall_f32_ivf_pq() {
        check_recall::<f32>(ivf_pq_params(), 0.9);
    }

    #[flaky]
    #[test]
    fn test_recall_f32_nn_descent() {
        check_recall::<f32>(nn_descent_params(), 0.9);
    }

    #[flaky]
    #[test]
    fn test_recall_i8_ivf_pq() {
        check_recall::<i8>(ivf_pq_params(), 0.9);
    }

    #[flaky]
    #[test]
    fn test_recall_i8_nn_descent() {
        check_recall::<i8>(nn_descent_params(), 0.9);
    }

    #[flaky]
    #[test]
    fn test_recall_u8_ivf_pq() {
        check_recall::<u8>(ivf_pq_params(), 0.9);
    }

    #[flaky]
    #[test]
    fn test_recall_u8_nn_descent() {
        check_recall::<u8>(nn_descent_params(), 0.9);
    }

    #[flaky]
    #[test]
    fn test_recall_small_graph_degree() {
        let params = IndexParams::new()
            .unwrap()
            .set_graph_degree(32)
            .set_intermediate_graph_degree(64);
        check_recall::<f32>(params, 0.85);
    }

    #[flaky]
    #[test]
    fn test_recall_inner_product() {
        let params = IndexParams::new()
            .unwrap()
            .set_metric(DistanceType::InnerProduct);
        check_recall::<f32>(params, 0.8);
    }

    #[test]
    fn test_inner_product_on_integers() {
        let params = IndexParams::new()
            .unwrap()
            .set_metric(DistanceType::InnerProduct);
        let res = Resources::new().unwrap();
        let dataset = generate_data::<u8>((200, 8));
        let index = Index::build(&res, &params, &dataset).unwrap();
        assert_eq!(index.metric(), DistanceType::InnerProduct);
        assert_eq!(index.size(), 200);
    }

    #[flaky]
    #[test]
    fn test_euclidean_distances() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((1000, 10));
        let params = IndexParams::new()
            .unwrap()
            .set_metric("euclidean".parse().unwrap());
        let index = Index::build(&res, &params, &dataset).unwrap();

        let queries = ManagedTensor::from(&dataset.slice(s![..20, ..]));
        let (neighbors, distances) =
            search_host(&index, &res, &SearchParams::new().unwrap(), &queries, 5);
        let (ref_neighbors, ref_distances) =
            exact_neighbors(&res, DistanceType::L2SqrtExpanded, &dataset, &queries, 5);
        for i in 0..20 {
            assert_eq!(neighbors[[i, 0]] as i64, ref_neighbors[[i, 0]]);
            assert!(distances[[i, 0]].abs() < 1e-3);
            assert!((distances[[i, 4]] - ref_distances[[i, 4]]).abs() < 1e-4 || distances[[i, 4]] > ref_distances[[i, 4]]);
        }
    }

    #[flaky]
    #[test]
    fn test_vpq_compressed_recall() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((2000, 64));
        let params = IndexParams::new()
            .unwrap()
            .set_compression(CompressionParams::new().unwrap().set_pq_dim(32));
        let index = Index::build(&res, &params, &dataset).unwrap();
        assert!(index.is_compressed());
        assert_eq!(index.dim(), 64);

        let queries = ManagedTensor::from(&dataset.slice(s![..100, ..]));
        let (neighbors, _) = search_host(&index, &res, &SearchParams::new().unwrap(), &queries, 10);
        let (reference, _) = exact_neighbors(&res, DistanceType::L2Expanded, &dataset, &queries, 10);
        let recall = calc_recall(&neighbors, &reference);
        assert!(recall > 0.6, "recall {} too low", recall);
    }

    #[flaky]
    #[test]
    fn test_euclidean_10k() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((10_000, 10));
        let params = IndexParams::new()
            .unwrap()
            .set_metric(DistanceType::L2SqrtExpanded);
        let index = Index::build(&res, &params, &dataset).unwrap();
        assert_eq!(index.size(), 10_000);
        assert!(index.graph().iter().all(|edges| edges.len() <= 64));

        let queries = ManagedTensor::from(&generate_data::<f32>((100, 10)));
        let (neighbors, _) = search_host(&index, &res, &SearchParams::new().unwrap(), &queries, 10);
        let (reference, _) =
            exact_neighbors(&res, DistanceType::L2SqrtExpanded, &dataset, &queries, 10);
        let recall = calc_recall(&neighbors, &reference);
        assert!(recall > 0.7, "recall {} too low", recall);
    }

    #[flaky]
    #[test]
    fn test_two_phase_extend() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((10_000, 10));
        let params = IndexParams::new()
            .unwrap()
            .set_metric(DistanceType::L2SqrtExpanded)
            .set_add_data_on_build(false);

        let mut index = Index::build(&res, &params, &dataset.slice(s![..5000, ..])).unwrap();
        assert_eq!(index.size(), 0);

        let extend_params = ExtendParams::new().unwrap();
        let first = ManagedTensor::from(&dataset.slice(s![..5000, ..]));
        index.extend(&res, &extend_params, &first, None).unwrap();
        assert_eq!(index.size(), 5000);

        let second = ManagedTensor::from(&dataset.slice(s![5000.., ..]));
        index.extend(&res, &extend_params, &second, None).unwrap();
        assert_eq!(index.size(), 10_000);
        assert_eq!(index.ids()[9999], 9999);

        let queries = ManagedTensor::from(&generate_data::<f32>((100, 10)));
        let (neighbors, _) = search_host(&index, &res, &SearchParams::new().unwrap(), &queries, 10);
        let (reference, _) =
            exact_neighbors(&res, DistanceType::L2SqrtExpanded, &dataset, &queries, 10);
        let recall = calc_recall(&neighbors, &reference);
        assert!(recall >= 0.65, "recall {} too low", recall);
    }

    #[test]
    fn test_search_is_deterministic() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((500, 8));
        let index = Index::build(&res, &IndexParams::new().unwrap(), &dataset).unwrap();
        let queries = ManagedTensor::from(&generate_data::<f32>((30, 8)));
        let params = SearchParams::new().unwrap().set_itopk_size(16);

        let first = search_host(&index, &res, &params, &queries, 8);
        let second = search_host(&index, &res, &params, &queries, 8);
        assert_eq!(first, second);

        let batched = search_host(&index, &res, &params.clone().set_max_queries(7), &queries, 8);
        assert_eq!(first, batched);
    }

    #[test]
    fn test_k_equals_size() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((40, 4));
        let index = Index::build(&res, &IndexParams::new().unwrap(), &dataset).unwrap();
        assert!(index.graph().iter().all(|edges| edges.len() <= 39));

        let queries = ManagedTensor::from(&dataset.slice(s![..3, ..]));
        let (neighbors, distances) = search_host(&index, &res, &SearchParams::new().unwrap(), &queries, 40);
        for (ids, dists) in neighbors.rows().into_iter().zip(distances.rows()) {
            let mut sorted = ids.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..40).collect::<Vec<u32>>());
            assert!(dists.iter().zip(dists.iter().skip(1)).all(|(a, b)| a <= b));
        }
    }

    #[test]
    fn test_single_row() {
        let res = Resources::new().unwrap();
        let dataset = ndarray::arr2(&[[1.0f32, 2.0, 3.0]]);
        let index = Index::build(&res, &IndexParams::new().unwrap(), &dataset).unwrap();
        assert_eq!(index.graph(), &[Vec::<u32>::new()]);

        let queries = ManagedTensor::from(&ndarray::arr2(&[[1.0f32, 2.0, 4.0]]));
        let (neighbors, distances) = search_host(&index, &res, &SearchParams::new().unwrap(), &queries, 1);
        assert_eq!(neighbors[[0, 0]], 0);
        assert_eq!(distances[[0, 0]], 1.0);
    }

    fn check_graph_invariants(index: &Index) {
        let n = index.size();
        for (v, edges) in index.graph().iter().enumerate() {
            assert!(edges.len() <= index.graph_degree());
            let mut seen = HashSet::new();
            for &u in edges {
                assert!((u as usize) < n);
                assert_ne!(u as usize, v);
                assert!(seen.insert(u));
            }
        }
        let ids: HashSet<u32> = index.ids().iter().copied().collect();
        assert_eq!(ids.len(), n);
    }

    #[test]
    fn test_graph_invariants() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((600, 8));
        let params = IndexParams::new()
            .unwrap()
            .set_graph_degree(16)
            .set_intermediate_graph_degree(32);
        let index = Index::build(&res, &params, &dataset).unwrap();
        check_graph_invariants(&index);
        assert!(index.graph().iter().all(|edges| !edges.is_empty()));
    }

    #[test]
    fn test_empty_index() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((100, 8));
        let params = IndexParams::new().unwrap().set_add_data_on_build(false);
        let index = Index::build(&res, &params, &dataset).unwrap();
        assert_eq!(index.size(), 0);
        assert_eq!(index.dim(), 8);

        let queries = ManagedTensor::from(&dataset.slice(s![..2, ..]));
        assert_eq!(
            index
                .search_alloc(&res, &SearchParams::new().unwrap(), &queries, 1)
                .unwrap_err(),
            Error::EmptyIndex
        );
    }

    #[test]
    fn test_build_errors() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((100, 8));

        let params = IndexParams::new().unwrap().set_graph_degree(200);
        assert!(matches!(
            Index::build(&res, &params, &dataset),
            Err(Error::InvalidParameter(_))
        ));

        let empty = Array2::<f32>::zeros((0, 8));
        assert!(matches!(
            Index::build(&res, &IndexParams::new().unwrap(), &empty),
            Err(Error::InvalidParameter(_))
        ));

        let labels = Array2::<i32>::zeros((10, 8));
        assert!(matches!(
            Index::build(&res, &IndexParams::new().unwrap(), &labels),
            Err(Error::InvalidParameter(_))
        ));

        let params = IndexParams::new()
            .unwrap()
            .set_compression(CompressionParams::new().unwrap().set_pq_dim(16));
        assert!(matches!(
            Index::build(&res, &params, &dataset),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_search_errors() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((100, 8));
        let index = Index::build(&res, &IndexParams::new().unwrap(), &dataset).unwrap();
        let params = SearchParams::new().unwrap();
        let queries = ManagedTensor::from(&dataset.slice(s![..4, ..]));

        assert!(matches!(
            index.search_alloc(&res, &params, &queries, 0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            index.search_alloc(&res, &params, &queries, 101),
            Err(Error::InvalidParameter(_))
        ));

        let wrong_dim = ManagedTensor::from(&generate_data::<f32>((4, 6)));
        assert_eq!(
            index.search_alloc(&res, &params, &wrong_dim, 5).unwrap_err(),
            Error::DimensionMismatch {
                expected: 8,
                actual: 6
            }
        );

        let wrong_dtype = ManagedTensor::from(&generate_data::<u8>((4, 8)));
        assert!(matches!(
            index.search_alloc(&res, &params, &wrong_dtype, 5),
            Err(Error::DtypeMismatch { .. })
        ));

        let mut neighbors = ManagedTensor::zeros::<u32>(&res, &[4, 5], MemoryType::Host).unwrap();
        let mut distances = ManagedTensor::zeros::<f32>(&res, &[4, 6], MemoryType::Host).unwrap();
        assert!(matches!(
            index.search(&res, &params, &queries, &mut neighbors, &mut distances),
            Err(Error::SizeMismatch { .. })
        ));

        let mut wide_ids = ManagedTensor::zeros::<i64>(&res, &[4, 5], MemoryType::Host).unwrap();
        let mut distances = ManagedTensor::zeros::<f32>(&res, &[4, 5], MemoryType::Host).unwrap();
        assert!(matches!(
            index.search(&res, &params, &queries, &mut wide_ids, &mut distances),
            Err(Error::DtypeMismatch { .. })
        ));

        assert!(matches!(
            index.search_alloc(&res, &params.set_search_width(0), &queries, 5),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_device_outputs_follow_queries() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((200, 8));
        let index = Index::build(&res, &IndexParams::new().unwrap(), &dataset).unwrap();
        let used = res.device_memory_used();

        let queries = ManagedTensor::from(&dataset.slice(s![..4, ..]))
            .to_device(&res)
            .unwrap();
        let (neighbors, distances) = index
            .search_alloc(&res, &SearchParams::new().unwrap(), &queries, 3)
            .unwrap();
        assert_eq!(neighbors.memory_type(), MemoryType::Device);
        assert_eq!(distances.memory_type(), MemoryType::Device);
        assert_eq!(res.device_memory_used(), used + 4 * 8 * 4 + 2 * 4 * 3 * 4);

        let mut host = Array2::<u32>::zeros((4, 3));
        neighbors.to_host(&res, &mut host).unwrap();
        assert_eq!(host.column(0).to_vec(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_memory_limit() {
        let res = Resources::new().unwrap();
        let dataset = generate_data::<f32>((500, 8));

        res.set_device_memory_limit(Some(1024));
        assert!(matches!(
            Index::build(&res, &IndexParams::new().unwrap(), &dataset),
            Err(Error::ResourceExhausted(_))
        ));
        assert_eq!(res.device_memory_used(), 0);

        res.set_device_memory_limit(None);
        let index = Index::build(&res, &IndexParams::new().unwrap(), &dataset).unwrap();
        assert_eq!(res.device_memory_used(), index.bytes_for(500));
        drop(index);
        assert_eq!(res.device_memory_used(), 0);
    }
}
