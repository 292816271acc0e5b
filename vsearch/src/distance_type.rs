/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;

use crate::distance::{inner_product, l2_squared};
use crate::error::Error;

/// Metric used to compare vectors.
///
/// Every metric is expressed as a distance: smaller values are closer, so
/// results are always sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceType {
    /// Squared euclidean distance (`"sqeuclidean"`)
    #[default]
    L2Expanded,
    /// Euclidean distance (`"euclidean"`)
    L2SqrtExpanded,
    /// Negated dot product (`"inner_product"`). Equivalent to cosine ranking
    /// when the caller normalizes the vectors; the index never normalizes.
    InnerProduct,
}

impl DistanceType {
    /// Name accepted by `FromStr`
    pub fn name(self) -> &'static str {
        match self {
            DistanceType::L2Expanded => "sqeuclidean",
            DistanceType::L2SqrtExpanded => "euclidean",
            DistanceType::InnerProduct => "inner_product",
        }
    }

    /// Distance used for ranking. Both L2 variants rank on the squared distance,
    /// the square root is only taken when results are reported.
    #[inline]
    pub(crate) fn rank_distance(self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
        match self {
            DistanceType::L2Expanded | DistanceType::L2SqrtExpanded => l2_squared(a, b),
            DistanceType::InnerProduct => -inner_product(a, b),
        }
    }

    /// Converts a ranking distance into the reported distance
    #[inline]
    pub(crate) fn finalize(self, rank_distance: f32) -> f32 {
        match self {
            DistanceType::L2Expanded => rank_distance.max(0.0),
            DistanceType::L2SqrtExpanded => rank_distance.max(0.0).sqrt(),
            DistanceType::InnerProduct => rank_distance,
        }
    }
}

impl FromStr for DistanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqeuclidean" => Ok(DistanceType::L2Expanded),
            "euclidean" => Ok(DistanceType::L2SqrtExpanded),
            "inner_product" => Ok(DistanceType::InnerProduct),
            _ => Err(Error::InvalidParameter(format!(
                "unknown metric '{}', expected one of sqeuclidean, euclidean, inner_product",
                s
            ))),
        }
    }
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_metric() {
        for metric in [
            DistanceType::L2Expanded,
            DistanceType::L2SqrtExpanded,
            DistanceType::InnerProduct,
        ] {
            assert_eq!(metric.name().parse::<DistanceType>().unwrap(), metric);
        }
        assert!(matches!(
            "cosine".parse::<DistanceType>(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_l2_variants_rank_identically() {
        let q = array![0.0f32, 0.0];
        let near = array![1.0f32, 1.0];
        let far = array![3.0f32, 0.0];

        for metric in [DistanceType::L2Expanded, DistanceType::L2SqrtExpanded] {
            assert!(metric.rank_distance(q.view(), near.view()) < metric.rank_distance(q.view(), far.view()));
        }
        assert_eq!(DistanceType::L2Expanded.finalize(9.0), 9.0);
        assert_eq!(DistanceType::L2SqrtExpanded.finalize(9.0), 3.0);
    }

    #[test]
    fn test_inner_product_is_negated() {
        let q = array![1.0f32, 0.0];
        let aligned = array![1.0f32, 0.0];
        let orthogonal = array![0.0f32, 1.0];
        let ip = DistanceType::InnerProduct;
        assert_eq!(ip.rank_distance(q.view(), aligned.view()), -1.0);
        assert_eq!(ip.rank_distance(q.view(), orthogonal.view()), 0.0);
        assert_eq!(ip.finalize(-1.0), -1.0);
    }
}
