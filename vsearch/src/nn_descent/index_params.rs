/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::distance_type::DistanceType;
use crate::error::{check_param, Result};

/// Supplemental parameters to build a kNN graph with NN-descent
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub metric: DistanceType,
    /// Degree of the output graph
    pub graph_degree: usize,
    /// Size of the neighbor lists refined during the iterations
    pub intermediate_graph_degree: usize,
    pub max_iterations: usize,
    pub termination_threshold: f32,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            metric: DistanceType::L2Expanded,
            graph_degree: 64,
            intermediate_graph_degree: 128,
            max_iterations: 20,
            termination_threshold: 0.0001,
            seed: 0,
        }
    }
}

impl IndexParams {
    /// Returns a new IndexParams
    pub fn new() -> Result<IndexParams> {
        Ok(IndexParams::default())
    }

    /// DistanceType to use for building the graph
    pub fn set_metric(mut self, metric: DistanceType) -> IndexParams {
        self.metric = metric;
        self
    }

    /// Degree of output graph
    pub fn set_graph_degree(mut self, graph_degree: usize) -> IndexParams {
        self.graph_degree = graph_degree;
        self
    }

    /// Degree of the neighbor lists kept while iterating
    pub fn set_intermediate_graph_degree(mut self, intermediate_graph_degree: usize) -> IndexParams {
        self.intermediate_graph_degree = intermediate_graph_degree;
        self
    }

    /// Upper limit of local join iterations
    pub fn set_max_iterations(mut self, max_iterations: usize) -> IndexParams {
        self.max_iterations = max_iterations;
        self
    }

    /// Stop once an iteration updates fewer than
    /// `termination_threshold * n_rows * intermediate_graph_degree` entries
    pub fn set_termination_threshold(mut self, termination_threshold: f32) -> IndexParams {
        self.termination_threshold = termination_threshold;
        self
    }

    /// Seed of the random initial neighbor lists
    pub fn set_seed(mut self, seed: u64) -> IndexParams {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_param(self.graph_degree >= 1, || "graph_degree must be positive".to_string())?;
        check_param(self.intermediate_graph_degree >= self.graph_degree, || {
            format!(
                "intermediate_graph_degree ({}) must not be smaller than graph_degree ({})",
                self.intermediate_graph_degree, self.graph_degree
            )
        })?;
        check_param(self.max_iterations >= 1, || {
            "max_iterations must be positive".to_string()
        })?;
        check_param(self.termination_threshold >= 0.0, || {
            format!(
                "termination_threshold must not be negative, got {}",
                self.termination_threshold
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_params() {
        let params = IndexParams::new()
            .unwrap()
            .set_graph_degree(32)
            .set_intermediate_graph_degree(48)
            .set_max_iterations(10);

        assert_eq!(params.graph_degree, 32);
        assert_eq!(params.intermediate_graph_degree, 48);
        assert_eq!(params.max_iterations, 10);
        assert!(params.validate().is_ok());
        assert!(params.set_intermediate_graph_degree(16).validate().is_err());
    }
}
