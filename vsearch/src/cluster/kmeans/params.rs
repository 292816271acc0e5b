/*
 * Copyright (c) 2025, NVIDIA CORPORATION.
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

/// How the initial centroids are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMethod {
    /// Sample centroids with probability proportional to their squared distance
    /// from the centroids chosen so far
    #[default]
    KMeansPlusPlus,
    /// Sample distinct rows uniformly at random
    Random,
    /// Start from the values already stored in the centroids tensor
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub metric: DistanceType,
    pub n_clusters: i32,
    pub init: InitMethod,
    pub max_iter: i32,
    pub tol: f64,
    pub n_init: i32,
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            metric: DistanceType::L2Expanded,
            n_clusters: 8,
            init: InitMethod::KMeansPlusPlus,
            max_iter: 300,
            tol: 1e-4,
            n_init: 1,
            seed: 0,
        }
    }
}

impl Params {
    /// Returns a new Params
    pub fn new() -> Result<Params> {
        Ok(Params::default())
    }

    /// DistanceType to use for fitting kmeans
    pub fn set_metric(mut self, metric: DistanceType) -> Params {
        self.metric = metric;
        self
    }

    /// The number of clusters to form as well as the number of centroids to generate (default:8).
    pub fn set_n_clusters(mut self, n_clusters: i32) -> Params {
        self.n_clusters = n_clusters;
        self
    }

    /// Method used to pick the initial centroids
    pub fn set_init(mut self, init: InitMethod) -> Params {
        self.init = init;
        self
    }

    /// Maximum number of iterations of the k-means algorithm for a single run.
    pub fn set_max_iter(mut self, max_iter: i32) -> Params {
        self.max_iter = max_iter;
        self
    }

    /// Relative tolerance with regards to inertia to declare convergence.
    pub fn set_tol(mut self, tol: f64) -> Params {
        self.tol = tol;
        self
    }

    /// Number of instance k-means algorithm will be run with different seeds.
    pub fn set_n_init(mut self, n_init: i32) -> Params {
        self.n_init = n_init;
        self
    }

    /// Seed of the random number generator used for initialization
    pub fn set_seed(mut self, seed: u64) -> Params {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_param(self.n_clusters >= 1, || {
            format!("n_clusters must be positive, got {}", self.n_clusters)
        })?;
        check_param(self.max_iter >= 1, || {
            format!("max_iter must be positive, got {}", self.max_iter)
        })?;
        check_param(self.n_init >= 1, || {
            format!("n_init must be positive, got {}", self.n_init)
        })?;
        check_param(self.tol >= 0.0, || format!("tol must not be negative, got {}", self.tol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params() {
        let params = Params::new()
            .unwrap()
            .set_n_clusters(128)
            .set_init(InitMethod::Random);

        assert_eq!(params.n_clusters, 128);
        assert_eq!(params.init, InitMethod::Random);
        assert_eq!(params.max_iter, 300);
        assert!(params.validate().is_ok());
        assert!(params.set_n_init(0).validate().is_err());
    }
}
