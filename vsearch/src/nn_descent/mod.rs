/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! NN-descent builds an approximate k-nearest neighbors graph by repeatedly
//! joining the neighbors of neighbors, starting from random neighbor lists.
//!
//! Example:
//! ```
//!
//! use vsearch::nn_descent::{Index, IndexParams};
//! use vsearch::{Resources, Result};
//!
//! use ndarray_rand::rand_distr::Uniform;
//! use ndarray_rand::RandomExt;
//!
//! fn nn_descent_example() -> Result<()> {
//!     let res = Resources::new()?;
//!
//!     let dataset = ndarray::Array::<f32, _>::random((2048, 16), Uniform::new(0., 1.0));
//!
//!     let params = IndexParams::new()?
//!         .set_graph_degree(16)
//!         .set_intermediate_graph_degree(32);
//!     let index = Index::build(&res, &params, &dataset)?;
//!     println!("neighbors of row 0: {:?}", index.graph().row(0));
//!     Ok(())
//! }
//! ```

mod index;
mod index_params;

pub use index::Index;
pub use index_params::IndexParams;

pub(crate) use index::build_knn_graph;
