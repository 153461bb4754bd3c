use serde::{Deserialize, Serialize};

/// Enumerates scalar element types the execution backends accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    I1,
    Si32,
    Ui32,
    Si64,
    F16,
    F32,
    Str,
}

impl DType {
    /// Returns `true` when the dtype is a signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        matches!(self, DType::Si32 | DType::Ui32 | DType::Si64)
    }

    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }

    /// Returns the size in bytes when storage size is well-defined.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            DType::I1 => Some(1),
            DType::F16 => Some(2),
            DType::Si32 | DType::Ui32 | DType::F32 => Some(4),
            DType::Si64 => Some(8),
            DType::Str => None,
        }
    }
}

/// Represents a single axis extent in a tensor shape.
///
/// The portable graph format encodes an unknown extent with a negative
/// sentinel; inside the runtime it is the explicit `Dynamic` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic,
}

/// Logical tensor shape as an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    /// Builds a fully-known shape.
    pub fn of_static(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().copied().map(Dimension::Static).collect(),
        }
    }

    /// Maps the portable format's dimension list, negative sentinel included.
    pub fn from_i64_dims(dims: &[i64]) -> Self {
        Self {
            dims: dims
                .iter()
                .map(|&dim| {
                    if dim < 0 {
                        Dimension::Dynamic
                    } else {
                        Dimension::Static(dim as usize)
                    }
                })
                .collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Returns static dimensions when all dims are static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        let mut dims = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            match dim {
                Dimension::Static(value) => dims.push(*value),
                Dimension::Dynamic => return None,
            }
        }
        Some(dims)
    }

    /// Returns element count when all dims are static.
    pub fn element_count(&self) -> Option<usize> {
        let dims = self.static_dims()?;
        let mut count = 1usize;
        for dim in dims {
            count = count.checked_mul(dim)?;
        }
        Some(count)
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    /// Returns total byte length when shape is static and dtype size is known.
    pub fn byte_len(&self) -> Option<usize> {
        let elem_count = self.shape.element_count()?;
        let elem_size = self.dtype.size_in_bytes()?;
        elem_count.checked_mul(elem_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_dims_map_to_dynamic() {
        let shape = Shape::from_i64_dims(&[1, 3, -1, 224]);
        assert_eq!(shape.rank(), 4);
        assert_eq!(shape.dims()[2], Dimension::Dynamic);
        assert!(shape.static_dims().is_none());
        assert!(shape.element_count().is_none());
    }

    #[test]
    fn static_shape_reports_extents() {
        let shape = Shape::of_static(&[2, 3, 4]);
        assert_eq!(shape.static_dims(), Some(vec![2, 3, 4]));
        assert_eq!(shape.element_count(), Some(24));
        let spec = TensorSpec::new(DType::F32, shape);
        assert_eq!(spec.byte_len(), Some(96));
    }

    #[test]
    fn string_dtype_has_no_fixed_size() {
        assert_eq!(DType::Str.size_in_bytes(), None);
        assert_eq!(DType::F16.size_in_bytes(), Some(2));
    }
}
