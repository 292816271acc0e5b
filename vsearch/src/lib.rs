/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

//! vsearch: graph-based approximate nearest neighbors search
//!
//! This crate builds CAGRA search graphs over dense vectors and answers
//! k nearest neighbor queries against them, together with the exact,
//! clustering and quantization algorithms the graph construction relies on.
pub mod brute_force;
pub mod cagra;
pub mod cluster;
pub mod distance;
pub mod distance_type;
mod error;
pub mod ivf_pq;
pub mod nn_descent;
mod quantization;
mod resources;
mod tensor;
#[cfg(test)]
mod test_utils;
mod visited;

pub use error::{Error, Result};
pub use resources::Resources;
pub use tensor::{DataType, IntoDtype, ManagedTensor, MemoryType, TensorData};
