/*
 * SPDX-FileCopyrightText: Copyright (c) 2024, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::Result;

/// Supplemental parameters to search IVF-PQ index
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub n_probes: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams { n_probes: 20 }
    }
}

impl SearchParams {
    /// Returns a new SearchParams object
    pub fn new() -> Result<SearchParams> {
        Ok(SearchParams::default())
    }

    /// The number of clusters to search. More lists are probed when the
    /// first `n_probes` hold fewer than `k` vectors.
    pub fn set_n_probes(mut self, n_probes: u32) -> SearchParams {
        self.n_probes = n_probes;
        self
    }
}
