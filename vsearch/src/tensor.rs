/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026, NVIDIA CORPORATION.
 * SPDX-License-Identifier: Apache-2.0
 */

use ndarray::{Array2, ArrayBase, ArrayView1, ArrayView2, Data, DataMut, Dimension};

use crate::error::{check_dtype, check_shape, Error, Result};
use crate::resources::{Reservation, Resources};

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Int8,
    UInt8,
    Int32,
    UInt32,
    Int64,
}

impl DataType {
    /// Size of one element in bytes
    pub fn size_of(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Float32 | DataType::Int32 | DataType::UInt32 => 4,
            DataType::Int64 => 8,
        }
    }

    /// Whether vectors of this type can be indexed and searched
    pub fn is_vector_type(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Int8 | DataType::UInt8)
    }
}

/// Where the memory of a tensor lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Host,
    /// Memory charged against the device pool of a `Resources` object
    Device,
}

/// Typed row-major storage backing a ManagedTensor
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float32(Vec<f32>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            TensorData::Float32(_) => DataType::Float32,
            TensorData::Int8(_) => DataType::Int8,
            TensorData::UInt8(_) => DataType::UInt8,
            TensorData::Int32(_) => DataType::Int32,
            TensorData::UInt32(_) => DataType::UInt32,
            TensorData::Int64(_) => DataType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Int8(v) => v.len(),
            TensorData::UInt8(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::UInt32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Element types that can be stored in a ManagedTensor
pub trait IntoDtype: Copy + Default + Send + Sync + 'static {
    fn dtype() -> DataType;
    fn into_data(values: Vec<Self>) -> TensorData;
    fn as_slice(data: &TensorData) -> Option<&[Self]>;
    fn as_mut_slice(data: &mut TensorData) -> Option<&mut [Self]>;
}

macro_rules! impl_into_dtype {
    ($t:ty, $variant:ident) => {
        impl IntoDtype for $t {
            fn dtype() -> DataType {
                DataType::$variant
            }

            fn into_data(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn as_slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn as_mut_slice(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_into_dtype!(f32, Float32);
impl_into_dtype!(i8, Int8);
impl_into_dtype!(u8, UInt8);
impl_into_dtype!(i32, Int32);
impl_into_dtype!(u32, UInt32);
impl_into_dtype!(i64, Int64);

/// A row-major tensor living either in host memory or in device memory.
///
/// Indexes read tensors through the same accessors regardless of placement, so
/// every API that takes a ManagedTensor accepts both host and device tensors.
#[derive(Debug)]
pub struct ManagedTensor {
    data: TensorData,
    shape: Vec<usize>,
    memory: MemoryType,
    _reservation: Option<Reservation>,
}

impl<T: IntoDtype, S: Data<Elem = T>, D: Dimension> From<&ArrayBase<S, D>> for ManagedTensor {
    /// Copies an ndarray (in logical, row-major order) into a host tensor
    fn from(arr: &ArrayBase<S, D>) -> Self {
        ManagedTensor {
            data: T::into_data(arr.iter().copied().collect()),
            shape: arr.shape().to_vec(),
            memory: MemoryType::Host,
            _reservation: None,
        }
    }
}

impl ManagedTensor {
    /// Allocates a zero filled tensor of the given shape
    pub fn zeros<T: IntoDtype>(
        res: &Resources,
        shape: &[usize],
        memory: MemoryType,
    ) -> Result<ManagedTensor> {
        let len = shape.iter().product::<usize>();
        let reservation = match memory {
            MemoryType::Host => None,
            MemoryType::Device => Some(res.reserve(len * T::dtype().size_of())?),
        };
        Ok(ManagedTensor {
            data: T::into_data(vec![T::default(); len]),
            shape: shape.to_vec(),
            memory,
            _reservation: reservation,
        })
    }

    /// Copies this tensor into device memory
    pub fn to_device(&self, res: &Resources) -> Result<ManagedTensor> {
        let reservation = res.reserve(self.size_in_bytes())?;
        Ok(ManagedTensor {
            data: self.data.clone(),
            shape: self.shape.clone(),
            memory: MemoryType::Device,
            _reservation: Some(reservation),
        })
    }

    /// Copies this tensor into a host ndarray of the same shape and element type
    pub fn to_host<T: IntoDtype, S: DataMut<Elem = T>, D: Dimension>(
        &self,
        _res: &Resources,
        arr: &mut ArrayBase<S, D>,
    ) -> Result<()> {
        let src = self.as_slice::<T>()?;
        check_shape(&self.shape, arr.shape())?;
        for (dst, value) in arr.iter_mut().zip(src) {
            *dst = *value;
        }
        Ok(())
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len() * self.dtype().size_of()
    }

    pub(crate) fn as_slice<T: IntoDtype>(&self) -> Result<&[T]> {
        check_dtype(T::dtype(), self.dtype())?;
        T::as_slice(&self.data).ok_or(Error::DtypeMismatch {
            expected: T::dtype(),
            actual: self.dtype(),
        })
    }

    pub(crate) fn as_mut_slice<T: IntoDtype>(&mut self) -> Result<&mut [T]> {
        let actual = self.dtype();
        check_dtype(T::dtype(), actual)?;
        T::as_mut_slice(&mut self.data).ok_or(Error::DtypeMismatch {
            expected: T::dtype(),
            actual,
        })
    }

    /// Shape of a 2-D tensor as (rows, cols)
    pub(crate) fn matrix_shape(&self, name: &str) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            [rows, cols] => Ok((*rows, *cols)),
            shape => Err(Error::InvalidParameter(format!(
                "{} must be a 2-D matrix, got shape {:?}",
                name, shape
            ))),
        }
    }

    pub(crate) fn view2<T: IntoDtype>(&self, name: &str) -> Result<ArrayView2<'_, T>> {
        let shape = self.matrix_shape(name)?;
        let values = self.as_slice::<T>()?;
        ArrayView2::from_shape(shape, values)
            .map_err(|e| Error::InvalidParameter(format!("{}: {}", name, e)))
    }

    pub(crate) fn view1<T: IntoDtype>(&self, name: &str) -> Result<ArrayView1<'_, T>> {
        if self.ndim() != 1 {
            return Err(Error::InvalidParameter(format!(
                "{} must be a 1-D vector, got shape {:?}",
                name, self.shape
            )));
        }
        Ok(ArrayView1::from(self.as_slice::<T>()?))
    }

    /// Converts a float32, int8 or uint8 matrix into an owned float32 matrix
    pub(crate) fn to_f32_matrix(&self, name: &str) -> Result<Array2<f32>> {
        let shape = self.matrix_shape(name)?;
        let values: Vec<f32> = match &self.data {
            TensorData::Float32(v) => v.clone(),
            TensorData::Int8(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::UInt8(v) => v.iter().map(|&x| x as f32).collect(),
            _ => {
                return Err(Error::InvalidParameter(format!(
                    "{} has unsupported dtype {:?}, expected Float32, Int8 or UInt8",
                    name,
                    self.dtype()
                )))
            }
        };
        Array2::from_shape_vec(shape, values)
            .map_err(|e| Error::InvalidParameter(format!("{}: {}", name, e)))
    }
}
