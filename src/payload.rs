//! Fixed-shape array payloads exchanged over channels.
//!
//! A channel is declared once from an example [`Array`]; its [`Layout`]
//! (shape plus element type) is then fixed for the channel's lifetime.
//! Element types are restricted to plain-old-data numbers so a payload can be
//! copied byte-for-byte into a shared-memory slot.

use crate::error::{Result, WorkerError};
use bytemuck::Pod;
use std::fmt;

/// Runtime tag for an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Short lowercase name, e.g. `i32`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An element type that can travel through a shared-memory channel.
pub trait Element: Pod + PartialEq + fmt::Debug + fmt::Display + Send + 'static {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_element! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Shape and element type of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Vec<usize>,
    dtype: DType,
}

impl Layout {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements. A zero-dimensional shape holds one scalar.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes needed to store one payload of this layout.
    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype.size()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.shape, self.dtype)
    }
}

/// A fixed-shape, row-major array of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T: Element> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Element> Array<T> {
    /// Create an array of the given shape filled with zeros.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![T::zeroed(); len],
        }
    }

    /// Create an array from row-major data.
    ///
    /// Fails if `data.len()` does not match the element count of `shape`.
    pub fn from_vec(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(WorkerError::InvalidShape(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Rebuild an array from slot bytes. `bytes.len()` must be a whole
    /// number of elements matching `shape`.
    pub(crate) fn from_bytes(shape: &[usize], bytes: &[u8]) -> Self {
        let data = match bytemuck::try_cast_slice::<u8, T>(bytes) {
            Ok(elems) => elems.to_vec(),
            Err(_) => bytes
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        };
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.shape.clone(), T::DTYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Apply `f` to every element, keeping the shape.
    pub fn map<U: Element>(&self, f: impl FnMut(T) -> U) -> Array<U> {
        Array {
            shape: self.shape.clone(),
            data: self.data.iter().copied().map(f).collect(),
        }
    }
}

impl<T: Element> fmt::Display for Array<T> {
    /// Nested-bracket rendering, e.g. `[[10 20 30]]` for shape `(1, 3)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_dim<T: Element>(
            f: &mut fmt::Formatter<'_>,
            shape: &[usize],
            data: &[T],
        ) -> fmt::Result {
            match shape.split_first() {
                None => write!(f, "{}", data[0]),
                Some((&n, rest)) => {
                    let stride: usize = rest.iter().product();
                    f.write_str("[")?;
                    for i in 0..n {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write_dim(f, rest, &data[i * stride..(i + 1) * stride])?;
                    }
                    f.write_str("]")
                }
            }
        }

        if self.data.is_empty() && !self.shape.is_empty() {
            return f.write_str("[]");
        }
        write_dim(f, &self.shape, &self.data)
    }
}
