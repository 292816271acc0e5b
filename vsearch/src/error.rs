/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::tensor::DataType;

/// Errors returned by index construction, extension and search.
///
/// Every variant is raised at the call boundary before any state is modified,
/// so a failed call leaves its inputs and the index untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A parameter is out of range or inconsistent with another one
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A vector has a different number of features than the index
    #[error("dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An id passed to extend is already used by the index (or repeated in the batch)
    #[error("id {0} is already present in the index")]
    IdCollision(u32),

    /// An output buffer does not have the required shape
    #[error("size mismatch: expected shape {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor has a different element type than required
    #[error("dtype mismatch: expected {expected:?}, got {actual:?}")]
    DtypeMismatch {
        expected: DataType,
        actual: DataType,
    },

    /// Search was called on an index holding no vectors
    #[error("index contains no vectors")]
    EmptyIndex,

    /// The execution backend could not provide memory or threads
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Simple wrapper to turn a failed parameter check into an `InvalidParameter` error
pub fn check_param<F: FnOnce() -> String>(cond: bool, msg: F) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::InvalidParameter(msg()))
    }
}

pub fn check_shape(expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::SizeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

pub fn check_dtype(expected: DataType, actual: DataType) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DtypeMismatch { expected, actual })
    }
}
