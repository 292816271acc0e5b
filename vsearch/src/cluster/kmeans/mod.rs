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

//! Kmeans clustering API's
//!
//! Example:
//! ```
//!
//! use vsearch::cluster::kmeans;
//! use vsearch::{ManagedTensor, Resources, Result};
//!
//! use ndarray_rand::rand_distr::Uniform;
//! use ndarray_rand::RandomExt;
//!
//! fn kmeans_example() -> Result<()> {
//!     let res = Resources::new()?;
//!
//!     // Create a new random dataset to cluster
//!     let n_datapoints = 4096;
//!     let n_features = 32;
//!     let n_clusters = 8;
//!     let dataset =
//!         ndarray::Array::<f32, _>::random((n_datapoints, n_features), Uniform::new(0., 1.0));
//!     let dataset = ManagedTensor::from(&dataset).to_device(&res)?;
//!
//!     let centroids_host = ndarray::Array::<f32, _>::zeros((n_clusters, n_features));
//!     let mut centroids = ManagedTensor::from(&centroids_host).to_device(&res)?;
//!
//!     // find the centroids with the kmeans index
//!     let kmeans_params = kmeans::Params::new()?.set_n_clusters(n_clusters as i32);
//!     let (inertia, n_iter) = kmeans::fit(&res, &kmeans_params, &dataset, &None, &mut centroids)?;
//!     Ok(())
//! }
//! ```

mod params;

pub use params::{InitMethod, Params};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::distance::l2_squared;
use crate::distance_type::DistanceType;
use crate::error::{check_param, check_shape, Error, Result};
use crate::resources::Resources;
use crate::tensor::ManagedTensor;

/// Find clusters with the k-means algorithm
///
/// # Arguments
///
/// * `res` - Resources to use
/// * `params` - Parameters to use to fit KMeans model
/// * `x` - A matrix in host or device memory - shape (m, k)
/// * `sample_weight` - Optional float32 vector of per row weights - shape (m,)
/// * `centroids` - Output float32 matrix, that has the centroids for each cluster
///   shape (n_clusters, k). Read as the initial centroids when `params.init` is
///   `InitMethod::Array`.
pub fn fit(
    res: &Resources,
    params: &Params,
    x: &ManagedTensor,
    sample_weight: &Option<ManagedTensor>,
    centroids: &mut ManagedTensor,
) -> Result<(f64, i32)> {
    params.validate()?;
    let x = x.to_f32_matrix("x")?;
    check_shape(&[params.n_clusters as usize, x.ncols()], centroids.shape())?;
    let weights = sample_weights(sample_weight, x.nrows())?;
    let initial = match params.init {
        InitMethod::Array => Some(centroids.view2::<f32>("centroids")?.to_owned()),
        _ => None,
    };

    let (fitted, inertia, n_iter) = fit_array(
        res,
        params,
        x.view(),
        weights.as_deref(),
        initial.as_ref().map(|c| c.view()),
    )?;

    let out = centroids.as_mut_slice::<f32>()?;
    for (dst, value) in out.iter_mut().zip(fitted.iter()) {
        *dst = *value;
    }
    Ok((inertia, n_iter))
}

/// Predict clusters with the k-means algorithm
///
/// # Arguments
///
/// * `res` - Resources to use
/// * `params` - Parameters to use to fit KMeans model
/// * `x` - Input matrix in host or device memory - shape (m, k)
/// * `sample_weight` - Optional float32 vector of per row weights - shape (m,)
/// * `centroids` - Centroids calculated by fit, shape (n_clusters, k)
/// * `labels` - preallocated int32 vector shape (m,) to hold the output labels
/// * `normalize_weight` - whether or not to normalize the weights
pub fn predict(
    res: &Resources,
    params: &Params,
    x: &ManagedTensor,
    sample_weight: &Option<ManagedTensor>,
    centroids: &ManagedTensor,
    labels: &mut ManagedTensor,
    normalize_weight: bool,
) -> Result<f64> {
    let x = x.to_f32_matrix("x")?;
    let centroids = centroids.view2::<f32>("centroids")?;
    check_dim(centroids.ncols(), x.ncols())?;
    check_param(centroids.nrows() > 0, || "centroids must not be empty".to_string())?;
    check_shape(&[x.nrows()], labels.shape())?;
    let mut weights = sample_weights(sample_weight, x.nrows())?;
    if normalize_weight {
        if let Some(w) = weights.as_mut() {
            normalize_weights(w);
        }
    }

    let assignments = assign(res, params.metric, x.view(), centroids);
    let out = labels.as_mut_slice::<i32>()?;
    for (dst, &(label, _)) in out.iter_mut().zip(assignments.iter()) {
        *dst = label as i32;
    }
    Ok(inertia(&assignments, weights.as_deref()))
}

/// Compute cluster cost given an input matrix and existing centroids
/// # Arguments
///
/// * `res` - Resources to use
/// * `x` - Input matrix in host or device memory - shape (m, k)
/// * `centroids` - Centroids calculated by fit, shape (n_clusters, k)
pub fn cluster_cost(res: &Resources, x: &ManagedTensor, centroids: &ManagedTensor) -> Result<f64> {
    let x = x.to_f32_matrix("x")?;
    let centroids = centroids.view2::<f32>("centroids")?;
    check_dim(centroids.ncols(), x.ncols())?;
    check_param(centroids.nrows() > 0, || "centroids must not be empty".to_string())?;
    let assignments = assign(res, DistanceType::L2Expanded, x.view(), centroids);
    Ok(inertia(&assignments, None))
}

/// Trains `n_clusters` centers with default settings, as used by the IVF and
/// quantization trainers
pub(crate) fn train(
    res: &Resources,
    metric: DistanceType,
    x: ArrayView2<f32>,
    n_clusters: usize,
    n_iters: u32,
    seed: u64,
) -> Result<Array2<f32>> {
    let params = Params::default()
        .set_metric(metric)
        .set_n_clusters(n_clusters as i32)
        .set_max_iter(n_iters.max(1) as i32)
        .set_seed(seed);
    let (centroids, _, _) = fit_array(res, &params, x, None, None)?;
    Ok(centroids)
}

/// Fits centroids on a host matrix. Returns (centroids, inertia, n_iter) of the
/// best of the `n_init` runs.
pub(crate) fn fit_array(
    res: &Resources,
    params: &Params,
    x: ArrayView2<f32>,
    weights: Option<&[f32]>,
    initial: Option<ArrayView2<f32>>,
) -> Result<(Array2<f32>, f64, i32)> {
    params.validate()?;
    let n = x.nrows();
    let k = params.n_clusters as usize;
    check_param(k <= n, || {
        format!("n_clusters ({}) must not exceed the number of rows ({})", k, n)
    })?;
    let mut weights = weights.map(<[f32]>::to_vec).unwrap_or_else(|| vec![1.0; n]);
    normalize_weights(&mut weights);

    let n_runs = match params.init {
        InitMethod::Array => 1,
        _ => params.n_init as usize,
    };
    let initial = match (params.init, initial) {
        (InitMethod::Array, Some(c)) => {
            check_shape(&[k, x.ncols()], c.shape())?;
            Some(c.to_owned())
        }
        (InitMethod::Array, None) => {
            return Err(Error::InvalidParameter(
                "InitMethod::Array requires initial centroids".to_string(),
            ))
        }
        _ => None,
    };

    res.install(|| {
        let mut best: Option<(Array2<f32>, f64, i32)> = None;
        for run in 0..n_runs {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(run as u64));
            let centroids = match &initial {
                Some(c) => c.clone(),
                None if params.init == InitMethod::Random => init_random(x, k, &mut rng),
                None => init_plus_plus(x, &weights, k, &mut rng),
            };
            let (centroids, inertia, n_iter) = lloyd(params, x, &weights, centroids);
            debug!(
                "kmeans run {} finished after {} iterations, inertia {:.4}",
                run, n_iter, inertia
            );
            if best.as_ref().map_or(true, |(_, best_inertia, _)| inertia < *best_inertia) {
                best = Some((centroids, inertia, n_iter));
            }
        }
        best.ok_or_else(|| Error::InvalidParameter("n_init must be positive".to_string()))
    })
}

/// Nearest centroid of every row, as (label, ranking distance)
pub(crate) fn assign(
    res: &Resources,
    metric: DistanceType,
    x: ArrayView2<f32>,
    centroids: ArrayView2<f32>,
) -> Vec<(u32, f32)> {
    res.install(|| assign_rows(metric, x, centroids))
}

pub(crate) fn nearest_centroid(
    metric: DistanceType,
    v: ArrayView1<f32>,
    centroids: ArrayView2<f32>,
) -> (u32, f32) {
    let mut best = (0u32, f32::INFINITY);
    for (j, c) in centroids.rows().into_iter().enumerate() {
        let d = metric.rank_distance(v, c);
        if d < best.1 {
            best = (j as u32, d);
        }
    }
    best
}

fn assign_rows(
    metric: DistanceType,
    x: ArrayView2<f32>,
    centroids: ArrayView2<f32>,
) -> Vec<(u32, f32)> {
    (0..x.nrows())
        .into_par_iter()
        .map(|i| nearest_centroid(metric, x.row(i), centroids))
        .collect()
}

fn lloyd(
    params: &Params,
    x: ArrayView2<f32>,
    weights: &[f32],
    mut centroids: Array2<f32>,
) -> (Array2<f32>, f64, i32) {
    let mut prev_inertia = f64::INFINITY;
    let mut n_iter = 0;
    for _ in 0..params.max_iter {
        n_iter += 1;
        let assignments = assign_rows(params.metric, x, centroids.view());
        let inertia = inertia(&assignments, Some(weights));
        update_centroids(x, weights, &assignments, &mut centroids);
        if prev_inertia.is_finite() && prev_inertia - inertia <= params.tol * prev_inertia.abs() {
            break;
        }
        prev_inertia = inertia;
    }
    let assignments = assign_rows(params.metric, x, centroids.view());
    (centroids, inertia(&assignments, Some(weights)), n_iter)
}

/// Moves every centroid to the weighted mean of its rows. Empty clusters are
/// reseeded with the rows farthest from their current centroid.
fn update_centroids(
    x: ArrayView2<f32>,
    weights: &[f32],
    assignments: &[(u32, f32)],
    centroids: &mut Array2<f32>,
) {
    let k = centroids.nrows();
    let mut sums = Array2::<f64>::zeros((k, x.ncols()));
    let mut counts = vec![0f64; k];
    for ((row, &(label, _)), &w) in x.axis_iter(Axis(0)).zip(assignments).zip(weights) {
        let label = label as usize;
        counts[label] += w as f64;
        sums.row_mut(label)
            .zip_mut_with(&row, |s, &v| *s += (w * v) as f64);
    }

    let mut far_rows: Vec<usize> = (0..x.nrows()).collect();
    far_rows.sort_by(|&a, &b| assignments[b].1.total_cmp(&assignments[a].1).then(a.cmp(&b)));
    let mut far_rows = far_rows.into_iter();

    for (j, mut centroid) in centroids.axis_iter_mut(Axis(0)).enumerate() {
        if counts[j] > 0.0 {
            let count = counts[j];
            centroid.zip_mut_with(&sums.row(j), |c, &s| *c = (s / count) as f32);
        } else if let Some(row) = far_rows.next() {
            centroid.assign(&x.row(row));
        }
    }
}

fn init_random(x: ArrayView2<f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let rows = rand::seq::index::sample(rng, x.nrows(), k).into_vec();
    x.select(Axis(0), &rows)
}

fn init_plus_plus(x: ArrayView2<f32>, weights: &[f32], k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n = x.nrows();
    let mut centroids = Array2::<f32>::zeros((k, x.ncols()));
    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&x.row(first));
    let mut min_dist: Vec<f32> = (0..n)
        .into_par_iter()
        .map(|i| l2_squared(x.row(i), x.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = min_dist
            .iter()
            .zip(weights)
            .map(|(&d, &w)| (d * w) as f64)
            .sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, (&d, &w)) in min_dist.iter().zip(weights).enumerate() {
                target -= (d * w) as f64;
                if target <= 0.0 && d > 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };
        centroids.row_mut(c).assign(&x.row(chosen));
        let chosen_row = x.row(chosen);
        min_dist
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, d)| *d = d.min(l2_squared(x.row(i), chosen_row)));
    }
    centroids
}

fn inertia(assignments: &[(u32, f32)], weights: Option<&[f32]>) -> f64 {
    match weights {
        Some(w) => assignments
            .iter()
            .zip(w)
            .map(|(&(_, d), &w)| (d * w) as f64)
            .sum(),
        None => assignments.iter().map(|&(_, d)| d as f64).sum(),
    }
}

/// Scales the weights so that they sum to the number of rows
fn normalize_weights(weights: &mut [f32]) {
    let total: f64 = weights.iter().map(|&w| w as f64).sum();
    if total > 0.0 {
        let scale = weights.len() as f64 / total;
        weights.iter_mut().for_each(|w| *w = (*w as f64 * scale) as f32);
    }
}

fn sample_weights(sample_weight: &Option<ManagedTensor>, n: usize) -> Result<Option<Vec<f32>>> {
    match sample_weight {
        None => Ok(None),
        Some(tensor) => {
            let weights = tensor.as_slice::<f32>()?;
            if weights.len() != n {
                return Err(Error::SizeMismatch {
                    expected: vec![n],
                    actual: tensor.shape().to_vec(),
                });
            }
            check_param(weights.iter().all(|&w| w >= 0.0), || {
                "sample weights must not be negative".to_string()
            })?;
            Ok(Some(weights.to_vec()))
        }
    }
}

fn check_dim(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}
