/*
 * Copyright (c) 2024, NVIDIA CORPORATION.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
//! Brute Force KNN

use std::collections::BinaryHeap;

use ndarray::{Array2, ArrayView2};
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::distance_type::DistanceType;
use crate::error::{check_dtype, check_param, check_shape, Error, Result};
use crate::resources::Resources;
use crate::tensor::{DataType, ManagedTensor};

/// Brute Force KNN Index
#[derive(Debug)]
pub struct Index {
    metric: DistanceType,
    dtype: DataType,
    dataset: Array2<f32>,
}

impl Index {
    /// Builds a new Brute Force KNN Index from the dataset.
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `metric` - DistanceType to use for building the index
    /// * `dataset` - A row-major matrix on either the host or device to index
    pub fn build<T: Into<ManagedTensor>>(
        _res: &Resources,
        metric: DistanceType,
        dataset: T,
    ) -> Result<Index> {
        let dataset: ManagedTensor = dataset.into();
        let dtype = dataset.dtype();
        let dataset = dataset.to_f32_matrix("dataset")?;
        check_param(dataset.nrows() > 0, || "dataset must not be empty".to_string())?;
        Ok(Index {
            metric,
            dtype,
            dataset,
        })
    }

    /// Number of indexed vectors
    pub fn size(&self) -> usize {
        self.dataset.nrows()
    }

    pub fn dim(&self) -> usize {
        self.dataset.ncols()
    }

    /// Perform an exact Nearest Neighbors search on the Index
    ///
    /// # Arguments
    ///
    /// * `res` - Resources to use
    /// * `queries` - A matrix in host or device memory to query for
    /// * `neighbors` - int64 matrix (n_queries, k) that receives the indices of the nearest neighbors
    /// * `distances` - float32 matrix (n_queries, k) that receives the distances of the nearest neighbors
    pub fn search(
        &self,
        res: &Resources,
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
        check_param(k > 0 && k <= self.size(), || {
            format!("k must be in [1, {}], got {}", self.size(), k)
        })?;

        let results = knn(res, self.metric, self.dataset.view(), queries.view(), k);

        let out_idx = neighbors.as_mut_slice::<i64>()?;
        for (dst, &(_, id)) in out_idx.iter_mut().zip(results.iter().flatten()) {
            *dst = id as i64;
        }
        let out_dist = distances.as_mut_slice::<f32>()?;
        for (dst, &(dist, _)) in out_dist.iter_mut().zip(results.iter().flatten()) {
            *dst = self.metric.finalize(dist);
        }
        Ok(())
    }
}

/// Exact k nearest rows of `dataset` for every query, as (ranking distance, row)
/// pairs sorted ascending. Ties are broken by the smaller row number.
pub(crate) fn knn(
    res: &Resources,
    metric: DistanceType,
    dataset: ArrayView2<f32>,
    queries: ArrayView2<f32>,
    k: usize,
) -> Vec<Vec<(f32, u32)>> {
    res.install(|| {
        (0..queries.nrows())
            .into_par_iter()
            .map(|i| {
                let query = queries.row(i);
                let mut heap: BinaryHeap<(OrderedFloat<f32>, u32)> = BinaryHeap::with_capacity(k + 1);
                for (j, row) in dataset.rows().into_iter().enumerate() {
                    let entry = (OrderedFloat(metric.rank_distance(query, row)), j as u32);
                    if heap.len() < k {
                        heap.push(entry);
                    } else if heap.peek().is_some_and(|worst| entry < *worst) {
                        heap.pop();
                        heap.push(entry);
                    }
                }
                heap.into_sorted_vec()
                    .into_iter()
                    .map(|(dist, id)| (dist.0, id))
                    .collect()
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mark_flaky_tests::flaky;
    use ndarray::s;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn test_bfknn(metric: DistanceType) {
        let res = Resources::new().unwrap();

        // Create a new random dataset to index
        let n_datapoints = 16;
        let n_features = 8;
        let dataset_host =
            ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));

        let dataset = ManagedTensor::from(&dataset_host).to_device(&res).unwrap();

        // build the brute force index
        let index =
            Index::build(&res, metric, dataset).expect("failed to create brute force index");

        // use the first 4 points from the dataset as queries : will test that we get them back
        // as their own nearest neighbor
        let n_queries = 4;
        let queries = dataset_host.slice(s![0..n_queries, ..]);

        let k = 4;

        let queries = ManagedTensor::from(&queries).to_device(&res).unwrap();
        let mut neighbors_host = ndarray::Array::<i64, _>::zeros((n_queries, k));
        let mut neighbors = ManagedTensor::from(&neighbors_host)
            .to_device(&res)
            .unwrap();

        let mut distances_host = ndarray::Array::<f32, _>::zeros((n_queries, k));
        let mut distances = ManagedTensor::from(&distances_host)
            .to_device(&res)
            .unwrap();

        index
            .search(&res, &queries, &mut neighbors, &mut distances)
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

        for row in distances_host.rows() {
            assert!(row.windows(2).into_iter().all(|w| w[0] <= w[1]));
        }
    }

    #[flaky]
    #[test]
    fn test_l2() {
        test_bfknn(DistanceType::L2Expanded);
    }

    #[flaky]
    #[test]
    fn test_euclidean() {
        test_bfknn(DistanceType::L2SqrtExpanded);
    }

    #[test]
    fn test_exact_order() {
        let res = Resources::new().unwrap();
        let dataset = ndarray::array![[0.0f32], [10.0], [3.0], [1.0], [6.0]];
        let index = Index::build(&res, DistanceType::L2Expanded, &dataset).unwrap();

        let queries = ManagedTensor::from(&ndarray::array![[2.0f32]]);
        let mut neighbors_host = ndarray::Array::<i64, _>::zeros((1, 5));
        let mut neighbors = ManagedTensor::from(&neighbors_host);
        let mut distances = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((1, 5)));
        index
            .search(&res, &queries, &mut neighbors, &mut distances)
            .unwrap();
        neighbors.to_host(&res, &mut neighbors_host).unwrap();

        // 1 and 3 are both at distance 1, the smaller row wins the tie
        assert_eq!(neighbors_host.row(0).to_vec(), vec![2, 3, 0, 4, 1]);
    }

    #[test]
    fn test_search_errors() {
        let res = Resources::new().unwrap();
        let dataset = ndarray::Array::<f32, _>::zeros((8, 4));
        let index = Index::build(&res, DistanceType::L2Expanded, &dataset).unwrap();

        let queries = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((2, 3)));
        let mut neighbors = ManagedTensor::from(&ndarray::Array::<i64, _>::zeros((2, 4)));
        let mut distances = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((2, 4)));
        assert!(matches!(
            index.search(&res, &queries, &mut neighbors, &mut distances),
            Err(Error::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));

        let queries = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((2, 4)));
        let mut too_many = ManagedTensor::from(&ndarray::Array::<i64, _>::zeros((2, 9)));
        let mut too_many_dist = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((2, 9)));
        assert!(matches!(
            index.search(&res, &queries, &mut too_many, &mut too_many_dist),
            Err(Error::InvalidParameter(_))
        ));
    }
}
