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

use ndarray::Array;
use vsearch::cluster::kmeans;
use vsearch::{ManagedTensor, MemoryType, Resources};

const CENTERS: [[f32; 2]; 3] = [[0.0, 0.0], [5.0, 5.0], [10.0, 0.0]];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let res = Resources::new()?;

    // 100 samples scattered around each of the 3 centers
    let n_per_cluster = 100;
    let n_features = 2;
    let n_clusters = CENTERS.len();
    let n_samples = n_per_cluster * n_clusters;

    let mut dataset = Array::<f32, _>::zeros((n_samples, n_features));
    for (c, center) in CENTERS.iter().enumerate() {
        for i in c * n_per_cluster..(c + 1) * n_per_cluster {
            for j in 0..n_features {
                dataset[[i, j]] = center[j] + (rand::random::<f32>() - 0.5) * 2.0;
            }
        }
    }
    println!("Dataset shape: {:?}", dataset.shape());

    let dataset_tensor = ManagedTensor::from(&dataset).to_device(&res)?;

    let params = kmeans::Params::new()?
        .set_n_clusters(n_clusters as i32)
        .set_max_iter(100)
        .set_tol(1e-4)
        .set_seed(42);

    let mut centroids =
        ManagedTensor::zeros::<f32>(&res, &[n_clusters, n_features], MemoryType::Device)?;

    println!("Fitting kmeans with {} clusters...", n_clusters);
    let (inertia, n_iter) = kmeans::fit(&res, &params, &dataset_tensor, &None, &mut centroids)?;

    let mut centroids_host = Array::<f32, _>::zeros((n_clusters, n_features));
    centroids.to_host(&res, &mut centroids_host)?;

    println!("Fitted kmeans with {} iterations, inertia: {:.6}", n_iter, inertia);
    println!("Centroids:");
    for i in 0..n_clusters {
        println!("  Cluster {}: [{:.3}, {:.3}]", i, centroids_host[[i, 0]], centroids_host[[i, 1]]);
    }

    let mut labels = ManagedTensor::zeros::<i32>(&res, &[n_samples], MemoryType::Device)?;
    let predict_inertia = kmeans::predict(
        &res,
        &params,
        &dataset_tensor,
        &None,
        &centroids,
        &mut labels,
        false,
    )?;

    let mut labels_host = Array::<i32, _>::zeros(n_samples);
    labels.to_host(&res, &mut labels_host)?;

    println!("Prediction inertia: {:.6}", predict_inertia);
    let mut cluster_counts = vec![0; n_clusters];
    for &label in labels_host.iter() {
        cluster_counts[label as usize] += 1;
    }
    println!("Cluster sizes:");
    for (i, count) in cluster_counts.iter().enumerate() {
        println!("  Cluster {}: {} samples", i, count);
    }

    let cost = kmeans::cluster_cost(&res, &dataset_tensor, &centroids)?;
    println!("Cluster cost: {:.6}", cost);
    Ok(())
}
