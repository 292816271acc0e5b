/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! IVF-PQ approximate nearest neighbors index.
//!
//! Vectors are assigned to the nearest of `n_lists` k-means centers, and the
//! residual to that center is compressed with product quantization. Search
//! scores the codes of the `n_probes` closest lists with lookup tables.
//!
//! Example:
//! ```
//!
//! use vsearch::ivf_pq::{Index, IndexParams, SearchParams};
//! use vsearch::{ManagedTensor, Resources, Result};
//!
//! use ndarray::s;
//! use ndarray_rand::rand_distr::Uniform;
//! use ndarray_rand::RandomExt;
//!
//! fn ivf_pq_example() -> Result<()> {
//!     let res = Resources::new()?;
//!
//!     // Create a new random dataset to index
//!     let n_datapoints = 4096;
//!     let n_features = 16;
//!     let dataset =
//!         ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));
//!
//!     let build_params = IndexParams::new()?.set_n_lists(64);
//!     let index = Index::build(&res, &build_params, &dataset)?;
//!
//!     let n_queries = 4;
//!     let k = 10;
//!     let queries = ManagedTensor::from(&dataset.slice(s![0..n_queries, ..]));
//!     let mut neighbors_host = ndarray::Array::<i64, _>::zeros((n_queries, k));
//!     let mut neighbors = ManagedTensor::from(&neighbors_host);
//!     let mut distances = ManagedTensor::from(&ndarray::Array::<f32, _>::zeros((n_queries, k)));
//!
//!     index.search(&res, &SearchParams::new()?, &queries, &mut neighbors, &mut distances)?;
//!     neighbors.to_host(&res, &mut neighbors_host)?;
//!     println!("Neighbors {:?}", neighbors_host);
//!     Ok(())
//! }
//! ```

mod index;
mod index_params;
mod search_params;

pub use index::Index;
pub use index_params::IndexParams;
pub use search_params::SearchParams;
