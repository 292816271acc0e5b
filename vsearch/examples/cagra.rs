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

use vsearch::cagra::{ExtendParams, Index, IndexParams, SearchParams};
use vsearch::{ManagedTensor, Resources, Result};

use ndarray::s;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Example showing how to index, extend and search data with CAGRA
fn cagra_example() -> Result<()> {
    let res = Resources::new()?;

    // Create a new random dataset to index
    let n_datapoints = 16384;
    let n_features = 64;
    let dataset =
        ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));

    // build the cagra index over the first half, then add the second half
    let half = n_datapoints / 2;
    let build_params = IndexParams::new()?;
    let mut index = Index::build(&res, &build_params, &dataset.slice(s![..half, ..]))?;
    println!("Indexed {}x{} datapoints into cagra index", half, n_features);

    let rest = ManagedTensor::from(&dataset.slice(s![half.., ..]));
    index.extend(&res, &ExtendParams::new()?, &rest, None)?;
    println!("Extended cagra index to {} datapoints", index.size());

    // use the first 4 points from the dataset as queries : will test that we get them back
    // as their own nearest neighbor
    let n_queries = 4;
    let queries = dataset.slice(s![0..n_queries, ..]);
    let queries = ManagedTensor::from(&queries).to_device(&res)?;

    let k = 10;
    let search_params = SearchParams::new()?;
    let (neighbors, distances) = index.search_alloc(&res, &search_params, &queries, k)?;

    // Copy back to host memory
    let mut neighbors_host = ndarray::Array::<u32, _>::zeros((n_queries, k));
    let mut distances_host = ndarray::Array::<f32, _>::zeros((n_queries, k));
    neighbors.to_host(&res, &mut neighbors_host)?;
    distances.to_host(&res, &mut distances_host)?;

    // nearest neighbors should be themselves, since queries are from the
    // dataset
    println!("Neighbors {:?}", neighbors_host);
    println!("Distances {:?}", distances_host);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = cagra_example() {
        println!("Failed to run CAGRA: {:?}", e);
    }
}
