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

use crate::distance_type::DistanceType;
use crate::error::{check_param, Result};

/// Supplemental parameters to build IVF-PQ Index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub n_lists: u32,
    pub metric: DistanceType,
    pub kmeans_n_iters: u32,
    pub kmeans_trainset_fraction: f64,
    pub pq_bits: u32,
    pub pq_dim: u32,
    pub max_train_points_per_pq_code: u32,
    pub add_data_on_build: bool,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            n_lists: 0,
            metric: DistanceType::L2Expanded,
            kmeans_n_iters: 20,
            kmeans_trainset_fraction: 0.5,
            pq_bits: 8,
            pq_dim: 0,
            max_train_points_per_pq_code: 256,
            add_data_on_build: true,
            seed: 0,
        }
    }
}

impl IndexParams {
    /// Returns a new IndexParams
    pub fn new() -> Result<IndexParams> {
        Ok(IndexParams::default())
    }

    /// The number of clusters used in the coarse quantizer. When zero, the
    /// square root of the dataset size is used (at most 1024).
    pub fn set_n_lists(mut self, n_lists: u32) -> IndexParams {
        self.n_lists = n_lists;
        self
    }

    /// DistanceType to use for building the index
    pub fn set_metric(mut self, metric: DistanceType) -> IndexParams {
        self.metric = metric;
        self
    }

    /// The number of iterations searching for kmeans centers during index building.
    pub fn set_kmeans_n_iters(mut self, kmeans_n_iters: u32) -> IndexParams {
        self.kmeans_n_iters = kmeans_n_iters;
        self
    }

    /// If kmeans_trainset_fraction is less than 1, then the dataset is
    /// subsampled, and only n_samples * kmeans_trainset_fraction rows
    /// are used for training.
    pub fn set_kmeans_trainset_fraction(mut self, kmeans_trainset_fraction: f64) -> IndexParams {
        self.kmeans_trainset_fraction = kmeans_trainset_fraction;
        self
    }

    /// The bit length of the vector element after quantization. In [4, 8].
    /// Codes are stored one byte per subspace regardless of the bit length.
    pub fn set_pq_bits(mut self, pq_bits: u32) -> IndexParams {
        self.pq_bits = pq_bits;
        self
    }

    /// The dimensionality of a the vector after product quantization.
    /// When zero, half of the dataset dimension (rounded up) is used. A smaller
    /// 'pq_dim' results in a smaller index and faster search, but lower recall.
    pub fn set_pq_dim(mut self, pq_dim: u32) -> IndexParams {
        self.pq_dim = pq_dim;
        self
    }

    /// The max number of data points to use per PQ code during PQ codebook training. Using more data
    /// points per PQ code may increase the quality of PQ codebook but may also increase the build
    /// time. We will use `pq_book_size * max_train_points_per_pq_code` training
    /// points to train each codebook.
    pub fn set_max_train_points_per_pq_code(mut self, max_pq_points: u32) -> IndexParams {
        self.max_train_points_per_pq_code = max_pq_points;
        self
    }

    /// After training the coarse and fine quantizers, we will populate
    /// the index with the dataset if add_data_on_build == true, otherwise
    /// the index is left empty, and the extend method can be used
    /// to add new vectors to the index.
    pub fn set_add_data_on_build(mut self, add_data_on_build: bool) -> IndexParams {
        self.add_data_on_build = add_data_on_build;
        self
    }

    /// Seed of the k-means initialization
    pub fn set_seed(mut self, seed: u64) -> IndexParams {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_param((4..=8).contains(&self.pq_bits), || {
            format!("pq_bits must be in [4, 8], got {}", self.pq_bits)
        })?;
        check_param(self.max_train_points_per_pq_code >= 1, || {
            "max_train_points_per_pq_code must be positive".to_string()
        })?;
        check_param(
            self.kmeans_trainset_fraction >= 0.0 && self.kmeans_trainset_fraction <= 1.0,
            || {
                format!(
                    "kmeans_trainset_fraction must be in [0, 1], got {}",
                    self.kmeans_trainset_fraction
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_params() {
        let params = IndexParams::new()
            .unwrap()
            .set_n_lists(128)
            .set_add_data_on_build(false);

        assert_eq!(params.n_lists, 128);
        assert!(!params.add_data_on_build);
        assert!(params.validate().is_ok());
        assert!(params.set_pq_bits(3).validate().is_err());
    }
}
