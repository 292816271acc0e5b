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

use std::str::FromStr;

use crate::distance_type::DistanceType;
use crate::error::{check_param, Error, Result};
use crate::{ivf_pq, nn_descent};

/// Algorithm used to build the intermediate knn graph
#[derive(Debug, Clone, PartialEq)]
pub enum BuildAlgo {
    /// Search an IVF-PQ index with every dataset row and refine the candidates
    IvfPq(IvfPqBuildParams),
    /// Iteratively refine random neighbor lists with NN-descent
    NnDescent(nn_descent::IndexParams),
}

impl Default for BuildAlgo {
    fn default() -> Self {
        BuildAlgo::IvfPq(IvfPqBuildParams::default())
    }
}

impl BuildAlgo {
    /// Name accepted by `FromStr`
    pub fn name(&self) -> &'static str {
        match self {
            BuildAlgo::IvfPq(_) => "ivf_pq",
            BuildAlgo::NnDescent(_) => "nn_descent",
        }
    }
}

impl FromStr for BuildAlgo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ivf_pq" => Ok(BuildAlgo::IvfPq(IvfPqBuildParams::default())),
            "nn_descent" => Ok(BuildAlgo::NnDescent(nn_descent::IndexParams::default())),
            _ => Err(Error::InvalidParameter(format!(
                "unknown build algorithm '{}', expected ivf_pq or nn_descent",
                s
            ))),
        }
    }
}

/// Parameters of the IVF-PQ knn graph builder
#[derive(Debug, Clone, PartialEq)]
pub struct IvfPqBuildParams {
    pub build_params: ivf_pq::IndexParams,
    pub search_params: ivf_pq::SearchParams,
    /// Candidates fetched per row, as a multiple of the intermediate degree,
    /// before they are refined with exact distances
    pub refinement_rate: f32,
}

impl Default for IvfPqBuildParams {
    fn default() -> Self {
        IvfPqBuildParams {
            build_params: ivf_pq::IndexParams::default(),
            search_params: ivf_pq::SearchParams::default(),
            refinement_rate: 2.0,
        }
    }
}

impl IvfPqBuildParams {
    pub fn new() -> Result<IvfPqBuildParams> {
        Ok(IvfPqBuildParams::default())
    }

    pub fn set_build_params(mut self, build_params: ivf_pq::IndexParams) -> IvfPqBuildParams {
        self.build_params = build_params;
        self
    }

    pub fn set_search_params(mut self, search_params: ivf_pq::SearchParams) -> IvfPqBuildParams {
        self.search_params = search_params;
        self
    }

    pub fn set_refinement_rate(mut self, refinement_rate: f32) -> IvfPqBuildParams {
        self.refinement_rate = refinement_rate;
        self
    }
}

/// Parameters of the VPQ compression of the stored dataset
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionParams {
    pub pq_bits: u32,
    pub pq_dim: u32,
    pub vq_n_centers: u32,
    pub kmeans_n_iters: u32,
    pub vq_kmeans_trainset_fraction: f64,
    pub pq_kmeans_trainset_fraction: f64,
}

impl Default for CompressionParams {
    fn default() -> Self {
        CompressionParams {
            pq_bits: 8,
            pq_dim: 0,
            vq_n_centers: 0,
            kmeans_n_iters: 25,
            vq_kmeans_trainset_fraction: 0.0,
            pq_kmeans_trainset_fraction: 0.0,
        }
    }
}

impl CompressionParams {
    /// Returns a new CompressionParams
    pub fn new() -> Result<CompressionParams> {
        Ok(CompressionParams::default())
    }

    /// The bit length of each PQ code, in [4, 8]
    pub fn set_pq_bits(mut self, pq_bits: u32) -> CompressionParams {
        self.pq_bits = pq_bits;
        self
    }

    /// Number of PQ subspaces. Auto select when 0.
    pub fn set_pq_dim(mut self, pq_dim: u32) -> CompressionParams {
        self.pq_dim = pq_dim;
        self
    }

    /// Number of vector quantization centers. Auto select when 0.
    pub fn set_vq_n_centers(mut self, vq_n_centers: u32) -> CompressionParams {
        self.vq_n_centers = vq_n_centers;
        self
    }

    /// Number of k-means iterations used to train both quantizers
    pub fn set_kmeans_n_iters(mut self, kmeans_n_iters: u32) -> CompressionParams {
        self.kmeans_n_iters = kmeans_n_iters;
        self
    }

    /// Fraction of the dataset used to train the VQ centers. Every row when 0.
    pub fn set_vq_kmeans_trainset_fraction(mut self, fraction: f64) -> CompressionParams {
        self.vq_kmeans_trainset_fraction = fraction;
        self
    }

    /// Fraction of the dataset used to train the PQ codebooks. Every row when 0.
    pub fn set_pq_kmeans_trainset_fraction(mut self, fraction: f64) -> CompressionParams {
        self.pq_kmeans_trainset_fraction = fraction;
        self
    }

    pub(crate) fn validate(&self, dim: usize) -> Result<()> {
        check_param((4..=8).contains(&self.pq_bits), || {
            format!("compression pq_bits must be in [4, 8], got {}", self.pq_bits)
        })?;
        check_param(self.pq_dim as usize <= dim, || {
            format!(
                "compression pq_dim ({}) must not exceed the dimension ({})",
                self.pq_dim, dim
            )
        })?;
        for fraction in [self.vq_kmeans_trainset_fraction, self.pq_kmeans_trainset_fraction] {
            check_param((0.0..=1.0).contains(&fraction), || {
                format!("trainset fractions must be in [0, 1], got {}", fraction)
            })?;
        }
        Ok(())
    }
}

/// Supplemental parameters to build CAGRA Index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub metric: DistanceType,
    pub intermediate_graph_degree: usize,
    pub graph_degree: usize,
    pub build_algo: BuildAlgo,
    pub compression: Option<CompressionParams>,
    pub add_data_on_build: bool,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            metric: DistanceType::L2Expanded,
            intermediate_graph_degree: 128,
            graph_degree: 64,
            build_algo: BuildAlgo::default(),
            compression: None,
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

    /// DistanceType to use for building the index
    pub fn set_metric(mut self, metric: DistanceType) -> IndexParams {
        self.metric = metric;
        self
    }

    /// Degree of input graph for pruning
    pub fn set_intermediate_graph_degree(mut self, intermediate_graph_degree: usize) -> IndexParams {
        self.intermediate_graph_degree = intermediate_graph_degree;
        self
    }

    /// Degree of output graph
    pub fn set_graph_degree(mut self, graph_degree: usize) -> IndexParams {
        self.graph_degree = graph_degree;
        self
    }

    /// ANN algorithm to build knn graph
    pub fn set_build_algo(mut self, build_algo: BuildAlgo) -> IndexParams {
        self.build_algo = build_algo;
        self
    }

    /// Number of iterations to run if building with NN_DESCENT. Has no effect
    /// with the IVF-PQ build algorithm.
    pub fn set_nn_descent_niter(mut self, nn_descent_niter: usize) -> IndexParams {
        if let BuildAlgo::NnDescent(params) = &mut self.build_algo {
            params.max_iterations = nn_descent_niter;
        }
        self
    }

    /// Compress the stored dataset with VPQ
    pub fn set_compression(mut self, compression: CompressionParams) -> IndexParams {
        self.compression = Some(compression);
        self
    }

    /// When false, the dataset passed to build only trains the compression and
    /// fixes the dimension and dtype. The index stays empty until extended.
    pub fn set_add_data_on_build(mut self, add_data_on_build: bool) -> IndexParams {
        self.add_data_on_build = add_data_on_build;
        self
    }

    /// Seed of the random number generators used while building
    pub fn set_seed(mut self, seed: u64) -> IndexParams {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_param(self.graph_degree >= 1, || "graph_degree must be positive".to_string())?;
        check_param(self.intermediate_graph_degree >= self.graph_degree, || {
            format!(
                "graph_degree ({}) must not exceed intermediate_graph_degree ({})",
                self.graph_degree, self.intermediate_graph_degree
            )
        })?;
        match &self.build_algo {
            BuildAlgo::IvfPq(params) => {
                params.build_params.validate()?;
                check_param(params.refinement_rate >= 1.0, || {
                    format!(
                        "refinement_rate must be at least 1, got {}",
                        params.refinement_rate
                    )
                })
            }
            BuildAlgo::NnDescent(params) => check_param(params.max_iterations >= 1, || {
                "nn_descent max_iterations must be positive".to_string()
            }),
        }
    }
}
