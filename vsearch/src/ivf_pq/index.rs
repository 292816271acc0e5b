/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::BinaryHeap;
use std::time::Instant;

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cluster::kmeans;
use crate::distance::l2_squared;
use crate::distance_type::DistanceType;
use crate::error::{check_dtype, check_param, check_shape, Error, Result};
use crate::ivf_pq::{IndexParams, SearchParams};
use crate::quantization::{subsample, trainset_size, ProductQuantizer};
use crate::resources::Resources;
use crate::tensor::{DataType, ManagedTensor};

#[derive(Debug, Default, Clone)]
struct InvertedList {
    ids: Vec<i64>,
    /// `pq_dim` bytes per vector
    codes: Vec<u8>,
}

/// Ivf-Pq ANN Index
#[derive(Debug)]
pub struct Index {
    metric: DistanceType,
    dtype: DataType,
    centers: Array2<f32>,
    pq: ProductQuantizer,
    /// `||r||^2 + 2 <c, r>` for every list center `c` and codeword `r`, laid out
    /// as (pq_dim, n_codes) per list. Empty for inner product.
    precomputed: Vec<Vec<f32>>,
    lists: Vec<InvertedList>,
    size: usize,
}

impl Index {
    /// Builds a new Index from the dataset for efficient search.
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `params` - Parameters for building the index
    /// * `dataset` - A row-major matrix on either the host or device to index
    pub fn build<T: Into<ManagedTensor>>(
        res: &Resources,
        params: &IndexParams,
        dataset: T,
    ) -> Result<Index> {
        let dataset: ManagedTensor = dataset.into();
        let data = dataset.to_f32_matrix("dataset")?;
        let mut index = Index::train(res, params, dataset.dtype(), data.view())?;
        if params.add_data_on_build {
            index.extend_array(res, data.view(), None)?;
        }
        Ok(index)
    }

    /// Trains the coarse centers and the PQ codebooks. The returned index holds no vectors.
    pub(crate) fn train(
        res: &Resources,
        params: &IndexParams,
        dtype: DataType,
        data: ArrayView2<f32>,
    ) -> Result<Index> {
        params.validate()?;
        let (n, dim) = data.dim();
        check_param(n > 0 && dim > 0, || {
            format!("dataset must not be empty, got shape {:?}", data.shape())
        })?;
        let n_lists = match params.n_lists {
            0 => ((n as f64).sqrt().round() as usize).clamp(1, 1024),
            n_lists => n_lists as usize,
        };
        check_param(n_lists <= n, || {
            format!("n_lists ({}) must not exceed the number of rows ({})", n_lists, n)
        })?;

        let start = Instant::now();
        let trainset = subsample(
            data,
            trainset_size(n, params.kmeans_trainset_fraction).max(n_lists),
        );
        let centers = kmeans::train(
            res,
            DistanceType::L2Expanded,
            trainset.view(),
            n_lists,
            params.kmeans_n_iters,
            params.seed,
        )?;
        let labels = kmeans::assign(res, DistanceType::L2Expanded, trainset.view(), centers.view());
        let residuals = residuals(trainset.view(), centers.view(), &labels);
        let max_train_points = (params.max_train_points_per_pq_code as usize) << params.pq_bits;
        let pq = ProductQuantizer::train(
            res,
            residuals.view(),
            params.pq_bits,
            params.pq_dim as usize,
            params.kmeans_n_iters,
            max_train_points,
            params.seed.wrapping_add(1),
        )?;
        let precomputed = match params.metric {
            DistanceType::InnerProduct => Vec::new(),
            _ => res.install(|| precompute_terms(centers.view(), &pq)),
        };
        debug!(
            "trained ivf-pq quantizers: {} lists, pq_dim {}, {} codes in {:?}",
            n_lists,
            pq.pq_dim(),
            pq.n_codes(),
            start.elapsed()
        );

        Ok(Index {
            metric: params.metric,
            dtype,
            centers,
            pq,
            precomputed,
            lists: vec![InvertedList::default(); n_lists],
            size: 0,
        })
    }

    /// Adds new vectors to the index
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `new_vectors` - A matrix with the same dtype and dimension as the index
    /// * `new_indices` - Optional int64 vector with one id per row. When `None`,
    ///   ids continue from the current index size.
    pub fn extend(
        &mut self,
        res: &Resources,
        new_vectors: &ManagedTensor,
        new_indices: Option<&ManagedTensor>,
    ) -> Result<()> {
        check_dtype(self.dtype, new_vectors.dtype())?;
        let data = new_vectors.to_f32_matrix("new_vectors")?;
        let ids = match new_indices {
            Some(tensor) => {
                let ids = tensor.view1::<i64>("new_indices")?;
                check_shape(&[data.nrows()], tensor.shape())?;
                Some(ids.to_vec())
            }
            None => None,
        };
        self.extend_array(res, data.view(), ids)
    }

    pub(crate) fn extend_array(
        &mut self,
        res: &Resources,
        data: ArrayView2<f32>,
        ids: Option<Vec<i64>>,
    ) -> Result<()> {
        if data.ncols() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: data.ncols(),
            });
        }
        let first = self.size as i64;
        let ids = ids.unwrap_or_else(|| (first..first + data.nrows() as i64).collect());

        let labels = kmeans::assign(res, DistanceType::L2Expanded, data, self.centers.view());
        let residuals = residuals(data, self.centers.view(), &labels);
        let pq = &self.pq;
        let codes = res.install(|| pq.encode_rows(residuals.view()));

        for ((&(label, _), id), code) in labels
            .iter()
            .zip(ids)
            .zip(codes.chunks(self.pq.pq_dim()))
        {
            let list = &mut self.lists[label as usize];
            list.ids.push(id);
            list.codes.extend_from_slice(code);
        }
        self.size += data.nrows();

        let largest = self.lists.iter().map(|l| l.ids.len()).max().unwrap_or(0);
        info!(
            "added {} vectors to ivf-pq index ({} total, largest list {})",
            data.nrows(),
            self.size,
            largest
        );
        Ok(())
    }

    /// Number of indexed vectors
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> usize {
        self.centers.ncols()
    }

    pub fn n_lists(&self) -> usize {
        self.lists.len()
    }

    pub fn pq_dim(&self) -> usize {
        self.pq.pq_dim()
    }

    /// Perform a Approximate Nearest Neighbors search on the Index
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `params` - Parameters to use in searching the index
    /// * `queries` - A matrix in host or device memory to query for
    /// * `neighbors` - int64 matrix (n_queries, k) that receives the ids of the nearest neighbors
    /// * `distances` - float32 matrix (n_queries, k) that receives the distances of the nearest neighbors
    pub fn search(
        &self,
        res: &Resources,
        params: &SearchParams,
        queries: &ManagedTensor,
        neighbors: &mut ManagedTensor,
        distances: &mut ManagedTensor,
    ) -> Result<()> {
        check_dtype(self.dtype, queries.dtype())?;
        let queries = queries.to_f32_matrix("queries")?;
        if queries.ncols() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: queries.ncols(),
            });
        }
        let (_, k) = neighbors.matrix_shape("neighbors")?;
        check_shape(&[queries.nrows(), k], neighbors.shape())?;
        check_shape(&[queries.nrows(), k], distances.shape())?;
        if self.size == 0 {
            return Err(Error::EmptyIndex);
        }
        check_param(k > 0 && k <= self.size, || {
            format!("k must be in [1, {}], got {}", self.size, k)
        })?;
        check_param(params.n_probes >= 1, || "n_probes must be positive".to_string())?;

        let results = self.search_rows(res, params.n_probes as usize, queries.view(), k);

        let out_idx = neighbors.as_mut_slice::<i64>()?;
        let out_dist = distances.as_mut_slice::<f32>()?;
        for (i, row) in results.iter().enumerate() {
            for j in 0..k {
                let (dist, id) = row.get(j).copied().unwrap_or((f32::MAX, -1));
                out_idx[i * k + j] = id;
                out_dist[i * k + j] = if id >= 0 { self.metric.finalize(dist) } else { dist };
            }
        }
        Ok(())
    }

    /// Approximate k nearest neighbors of every query, as (ranking distance, id)
    /// pairs sorted ascending
    pub(crate) fn search_rows(
        &self,
        res: &Resources,
        n_probes: usize,
        queries: ArrayView2<f32>,
        k: usize,
    ) -> Vec<Vec<(f32, i64)>> {
        res.install(|| {
            (0..queries.nrows())
                .into_par_iter()
                .map(|i| self.search_one(queries.row(i), n_probes, k))
                .collect()
        })
    }

    fn search_one(&self, query: ArrayView1<f32>, n_probes: usize, k: usize) -> Vec<(f32, i64)> {
        let pq_dim = self.pq.pq_dim();
        let n_codes = self.pq.n_codes();

        // <q_m, r_mk> for every subspace m and codeword k
        let mut lut = vec![0f32; pq_dim * n_codes];
        for m in 0..pq_dim {
            let q_m = query.slice(s![self.pq.subspace(m)]);
            for (code, r) in self.pq.codebook(m).rows().into_iter().enumerate() {
                lut[m * n_codes + code] = q_m.dot(&r);
            }
        }

        let mut probes: Vec<(f32, usize)> = self
            .centers
            .rows()
            .into_iter()
            .enumerate()
            .map(|(l, c)| (self.metric.rank_distance(query, c), l))
            .collect();
        probes.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut heap: BinaryHeap<(OrderedFloat<f32>, i64)> = BinaryHeap::with_capacity(k + 1);
        let mut scanned = 0;
        for (p, &(_, l)) in probes.iter().enumerate() {
            if p >= n_probes && scanned >= k {
                break;
            }
            let list = &self.lists[l];
            if list.ids.is_empty() {
                continue;
            }
            let center = self.centers.row(l);
            for (&id, codes) in list.ids.iter().zip(list.codes.chunks(pq_dim)) {
                let dist = match self.metric {
                    DistanceType::InnerProduct => {
                        let ip: f32 = codes
                            .iter()
                            .enumerate()
                            .map(|(m, &c)| lut[m * n_codes + c as usize])
                            .sum();
                        -(query.dot(&center) + ip)
                    }
                    _ => {
                        let terms = &self.precomputed[l];
                        let correction: f32 = codes
                            .iter()
                            .enumerate()
                            .map(|(m, &c)| {
                                let idx = m * n_codes + c as usize;
                                terms[idx] - 2.0 * lut[idx]
                            })
                            .sum();
                        l2_squared(query, center) + correction
                    }
                };
                let entry = (OrderedFloat(dist), id);
                if heap.len() < k {
                    heap.push(entry);
                } else if heap.peek().is_some_and(|worst| entry < *worst) {
                    heap.pop();
                    heap.push(entry);
                }
            }
            scanned += list.ids.len();
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|(dist, id)| (dist.0, id))
            .collect()
    }
}

fn residuals(data: ArrayView2<f32>, centers: ArrayView2<f32>, labels: &[(u32, f32)]) -> Array2<f32> {
    let mut out = data.to_owned();
    for (mut row, &(label, _)) in out.rows_mut().into_iter().zip(labels) {
        row -= &centers.row(label as usize);
    }
    out
}

fn precompute_terms(centers: ArrayView2<f32>, pq: &ProductQuantizer) -> Vec<Vec<f32>> {
    let pq_dim = pq.pq_dim();
    let n_codes = pq.n_codes();
    (0..centers.nrows())
        .into_par_iter()
        .map(|l| {
            let center = centers.row(l);
            let mut terms = vec![0f32; pq_dim * n_codes];
            for m in 0..pq_dim {
                let c_m = center.slice(s![pq.subspace(m)]);
                for (code, r) in pq.codebook(m).rows().into_iter().enumerate() {
                    terms[m * n_codes + code] = r.dot(&r) + 2.0 * c_m.dot(&r);
                }
            }
            terms
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force;
    use crate::test_utils::calc_recall;
    use mark_flaky_tests::flaky;
    use ndarray::s;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    fn test_ivf_pq() {
        let build_params = IndexParams::new().unwrap().set_n_lists(32);

        let res = Resources::new().unwrap();

        // Create a new random dataset to index
        let n_datapoints = 2048;
        let n_features = 16;
        let dataset =
            ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));

        let dataset_device = ManagedTensor::from(&dataset).to_device(&res).unwrap();

        // build the ivf-pq index
        let index = Index::build(&res, &build_params, dataset_device)
            .expect("failed to create ivf-pq index");
        assert_eq!(index.size(), n_datapoints);
        assert_eq!(index.n_lists(), 32);
        assert_eq!(index.pq_dim(), 8);

        // use the first 4 points from the dataset as queries : will test that we get them back
        // as their own nearest neighbor
        let n_queries = 4;
        let queries = dataset.slice(s![0..n_queries, ..]);

        let k = 10;

        let queries = ManagedTensor::from(&queries).to_device(&res).unwrap();
        let mut neighbors_host = ndarray::Array::<i64, _>::zeros((n_queries, k));
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

    #[flaky]
    #[test]
    fn test_ivf_pq_recall() {
        let res = Resources::new().unwrap();
        let n_features = 8;
        let dataset = ndarray::Array::<f32, _>::random((4000, n_features), Uniform::new(0., 1.0));
        let queries = ndarray::Array::<f32, _>::random((100, n_features), Uniform::new(0., 1.0));

        // one feature per subspace keeps the quantization error small
        let build_params = IndexParams::new()
            .unwrap()
            .set_pq_dim(n_features as u32);
        let index = Index::build(&res, &build_params, &dataset).unwrap();

        let k = 10;
        let queries = ManagedTensor::from(&queries);
        let mut neighbors_host = ndarray::Array::<i64, _>::zeros((100, k));
        let mut neighbors = ManagedTensor::from(&neighbors_host);
        let mut distances = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((100, k)));
        index
            .search(
                &res,
                &SearchParams::new().unwrap(),
                &queries,
                &mut neighbors,
                &mut distances,
            )
            .unwrap();
        neighbors.to_host(&res, &mut neighbors_host).unwrap();

        let exact = brute_force::Index::build(&res, DistanceType::L2Expanded, &dataset).unwrap();
        let mut expected_host = ndarray::Array::<i64, _>::zeros((100, k));
        let mut expected = ManagedTensor::from(&expected_host);
        let mut expected_dist = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((100, k)));
        exact
            .search(&res, &queries, &mut expected, &mut expected_dist)
            .unwrap();
        expected.to_host(&res, &mut expected_host).unwrap();

        let recall = calc_recall(&neighbors_host, &expected_host);
        assert!(recall > 0.7, "recall {} too low", recall);
    }

    #[test]
    fn test_extend_empty_index() {
        let res = Resources::new().unwrap();
        let dataset = ndarray::Array::<f32, _>::random((512, 8), Uniform::new(0., 1.0));
        let build_params = IndexParams::new()
            .unwrap()
            .set_n_lists(8)
            .set_add_data_on_build(false);
        let mut index = Index::build(&res, &build_params, &dataset).unwrap();
        assert_eq!(index.size(), 0);

        let queries = ManagedTensor::from(&dataset.slice(s![0..2, ..]));
        let mut neighbors = ManagedTensor::from(&ndarray::Array::<i64, _>::zeros((2, 1)));
        let mut distances = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((2, 1)));
        let search_params = SearchParams::new().unwrap();
        assert_eq!(
            index.search(&res, &search_params, &queries, &mut neighbors, &mut distances),
            Err(Error::EmptyIndex)
        );

        let ids = ndarray::Array::from_iter(1000..1512i64);
        index
            .extend(&res, &ManagedTensor::from(&dataset), Some(&ManagedTensor::from(&ids)))
            .unwrap();
        assert_eq!(index.size(), 512);

        index
            .search(&res, &search_params, &queries, &mut neighbors, &mut distances)
            .unwrap();
        let mut neighbors_host = ndarray::Array::<i64, _>::zeros((2, 1));
        neighbors.to_host(&res, &mut neighbors_host).unwrap();
        assert_eq!(neighbors_host[[0, 0]], 1000);
        assert_eq!(neighbors_host[[1, 0]], 1001);
    }

    #[test]
    fn test_invalid_params() {
        let res = Resources::new().unwrap();
        let dataset = ndarray::Array::<f32, _>::random((16, 4), Uniform::new(0., 1.0));

        let too_many_lists = IndexParams::new().unwrap().set_n_lists(32);
        assert!(matches!(
            Index::build(&res, &too_many_lists, &dataset),
            Err(Error::InvalidParameter(_))
        ));

        let pq_dim_too_large = IndexParams::new().unwrap().set_n_lists(2).set_pq_dim(5);
        assert!(matches!(
            Index::build(&res, &pq_dim_too_large, &dataset),
            Err(Error::InvalidParameter(_))
        ));

        let index = Index::build(&res, &IndexParams::new().unwrap().set_n_lists(2), &dataset).unwrap();
        let queries = ManagedTensor::from(&ndarray::Array::<u8, _>::zeros((1, 4)));
        let mut neighbors = ManagedTensor::from(&ndarray::Array::<i64, _>::zeros((1, 1)));
        let mut distances = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((1, 1)));
        assert!(matches!(
            index.search(
                &res,
                &SearchParams::new().unwrap(),
                &queries,
                &mut neighbors,
                &mut distances
            ),
            Err(Error::DtypeMismatch { .. })
        ));
    }
}
