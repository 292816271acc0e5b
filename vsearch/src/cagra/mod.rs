/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! CAGRA is a graph-based nearest neighbors implementation with state-of-the art
//! query performance for both small- and large-batch sized search.
//!
//! The index is built in two steps: a knn graph of the dataset is computed
//! with IVF-PQ or NN-descent, then optimized into a search graph of a fixed
//! degree by pruning detours and adding reverse edges. Searches walk the
//! graph greedily from random entry points.
//!
//! Example:
//! ```
//!
//! use vsearch::cagra::{Index, IndexParams, SearchParams};
//! use vsearch::{ManagedTensor, MemoryType, Resources, Result};
//!
//! use ndarray::s;
//! use ndarray_rand::rand_distr::Uniform;
//! use ndarray_rand::RandomExt;
//!
//! fn cagra_example() -> Result<()> {
//!     let res = Resources::new()?;
//!
//!     // Create a new random dataset to index
//!     let n_datapoints = 65536;
//!     let n_features = 512;
//!     let dataset =
//!         ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));
//!
//!     // build the cagra index
//!     let build_params = IndexParams::new()?;
//!     let index = Index::build(&res, &build_params, &dataset)?;
//!     println!(
//!         "Indexed {}x{} datapoints into cagra index",
//!         n_datapoints, n_features
//!     );
//!
//!     // use the first 4 points from the dataset as queries : will test that we get them back
//!     // as their own nearest neighbor
//!     let n_queries = 4;
//!     let queries = dataset.slice(s![0..n_queries, ..]);
//!
//!     let k = 10;
//!
//!     // copy query data over to the device, and allocate device memory for the
//!     // distances/ neighbors outputs
//!     let queries = ManagedTensor::from(&queries).to_device(&res)?;
//!     let mut neighbors = ManagedTensor::zeros::<u32>(&res, &[n_queries, k], MemoryType::Device)?;
//!     let mut distances = ManagedTensor::zeros::<f32>(&res, &[n_queries, k], MemoryType::Device)?;
//!
//!     let search_params = SearchParams::new()?;
//!
//!     index.search(&res, &search_params, &queries, &mut neighbors, &mut distances)?;
//!
//!     // Copy back to host memory
//!     let mut neighbors_host = ndarray::Array::<u32, _>::zeros((n_queries, k));
//!     let mut distances_host = ndarray::Array::<f32, _>::zeros((n_queries, k));
//!     distances.to_host(&res, &mut distances_host)?;
//!     neighbors.to_host(&res, &mut neighbors_host)?;
//!
//!     // nearest neighbors should be themselves, since queries are from the
//!     // dataset
//!     println!("Neighbors {:?}", neighbors_host);
//!     println!("Distances {:?}", distances_host);
//!     Ok(())
//! }
//! ```
//!
//! Extend example:
//! ```no_run
//! use vsearch::cagra::{ExtendParams, Index, IndexParams};
//! use vsearch::{ManagedTensor, Resources, Result};
//!
//! fn extend_example(dataset: &ndarray::Array2<f32>, more: &ndarray::Array2<f32>) -> Result<()> {
//!     let res = Resources::new()?;
//!
//!     let mut index = Index::build(&res, &IndexParams::new()?, dataset)?;
//!
//!     // new rows get the ids following the largest id in the index
//!     index.extend(&res, &ExtendParams::new()?, &ManagedTensor::from(more), None)?;
//!     Ok(())
//! }
//! ```

mod build;
mod extend;
mod graph;
mod index;
mod index_params;
mod search;
mod search_params;
mod storage;

pub use extend::ExtendParams;
pub use index::Index;
pub use index_params::{BuildAlgo, CompressionParams, IndexParams, IvfPqBuildParams};
pub use search_params::SearchParams;
