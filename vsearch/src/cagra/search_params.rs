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

use crate::error::{check_param, Result};

/// Supplemental parameters to search CAGRA index
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub max_queries: usize,
    pub itopk_size: usize,
    pub max_iterations: usize,
    pub min_iterations: usize,
    pub search_width: usize,
    pub num_random_samplings: u32,
    pub rand_xor_mask: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            max_queries: 0,
            itopk_size: 64,
            max_iterations: 0,
            min_iterations: 0,
            search_width: 1,
            num_random_samplings: 1,
            rand_xor_mask: 0x128394,
        }
    }
}

impl SearchParams {
    /// Returns a new SearchParams object
    pub fn new() -> Result<SearchParams> {
        Ok(SearchParams::default())
    }

    /// Maximum number of queries to search at the same time (batch size). Auto select when 0
    pub fn set_max_queries(mut self, max_queries: usize) -> SearchParams {
        self.max_queries = max_queries;
        self
    }

    /// Number of intermediate search results retained during the search.
    /// This is the main knob to adjust trade off between accuracy and search speed.
    /// Higher values improve the search accuracy
    pub fn set_itopk_size(mut self, itopk_size: usize) -> SearchParams {
        self.itopk_size = itopk_size;
        self
    }

    /// Upper limit of search iterations. Auto select when 0.
    pub fn set_max_iterations(mut self, max_iterations: usize) -> SearchParams {
        self.max_iterations = max_iterations;
        self
    }

    /// Lower limit of search iterations.
    pub fn set_min_iterations(mut self, min_iterations: usize) -> SearchParams {
        self.min_iterations = min_iterations;
        self
    }

    /// Number of graph nodes to select as the starting point for the search in each iteration.
    pub fn set_search_width(mut self, search_width: usize) -> SearchParams {
        self.search_width = search_width;
        self
    }

    /// Number of iterations of initial random seed node selection. 1 or more.
    pub fn set_num_random_samplings(mut self, num_random_samplings: u32) -> SearchParams {
        self.num_random_samplings = num_random_samplings;
        self
    }

    /// Bit mask used for initial random seed node selection.
    pub fn set_rand_xor_mask(mut self, rand_xor_mask: u64) -> SearchParams {
        self.rand_xor_mask = rand_xor_mask;
        self
    }

    /// Iteration limit for an internal top-k buffer of `itopk` entries
    pub(crate) fn iteration_limit(&self, itopk: usize) -> usize {
        match self.max_iterations {
            0 => (itopk / self.search_width.max(1)) * 4 + 16,
            n => n.max(self.min_iterations),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_param(self.search_width >= 1, || "search_width must be positive".to_string())?;
        check_param(self.num_random_samplings >= 1, || {
            "num_random_samplings must be positive".to_string()
        })
    }
}
