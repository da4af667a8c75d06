// crates/nb_foundation/src/element.rs

//! Element type registry.
//!
//! Describes every element type a device buffer can hold: scalar width,
//! element count, byte size and the array-interface type string of the
//! scalar base. All metadata is a closed enum matched exhaustively, so
//! there is no runtime type-object dispatch anywhere in the crate.

use crate::error::{NbError, NbResult};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Native scalar storage class of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl ScalarKind {
    /// Width of one scalar in bytes.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Little-endian array-interface type string (`"<f4"`, `"<i8"`, ...).
    pub const fn type_str(self) -> &'static str {
        match self {
            Self::Int32 => "<i4",
            Self::UInt32 => "<u4",
            Self::Int64 => "<i8",
            Self::UInt64 => "<u8",
            Self::Float32 => "<f4",
            Self::Float64 => "<f8",
        }
    }

    /// Parse an array-interface type string.
    ///
    /// The parsing direction is fallible: anything outside the six
    /// supported scalars is an [`NbError::UnsupportedType`].
    pub fn from_type_str(s: &str) -> NbResult<Self> {
        match s {
            "<i4" => Ok(Self::Int32),
            "<u4" => Ok(Self::UInt32),
            "<i8" => Ok(Self::Int64),
            "<u8" => Ok(Self::UInt64),
            "<f4" => Ok(Self::Float32),
            "<f8" => Ok(Self::Float64),
            other => Err(NbError::unsupported_type(other)),
        }
    }

    /// Integer storage class check.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::UInt32 | Self::Int64 | Self::UInt64)
    }

    /// Float storage class check.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// 元素类型（标量与固定布局复合类型）
///
/// Compound kinds store `f32` scalars, matching the native kernel layout.
/// The generic aliases [`ElementType::INT`] and [`ElementType::FLOAT`]
/// canonicalize to the 32-bit kinds, so plain `==` comparison is already
/// comparison of canonical types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// 2-vector of f32
    Vec2,
    /// 3-vector of f32
    Vec3,
    /// 4-vector of f32
    Vec4,
    /// Quaternion (4 x f32)
    Quat,
    /// 2x2 matrix of f32
    Mat2,
    /// 3x3 matrix of f32
    Mat3,
    /// 4x4 matrix of f32
    Mat4,
    /// Spatial 6-vector of f32
    SpatialVector,
    /// Spatial 6x6 matrix of f32
    SpatialMatrix,
    /// Spatial transform (3 translation + 4 quaternion)
    SpatialTransform,
}

impl ElementType {
    /// Canonical kind for a generic integer request.
    pub const INT: Self = Self::Int32;
    /// Canonical kind for a generic float request.
    pub const FLOAT: Self = Self::Float32;

    /// Number of scalars per element.
    pub const fn element_count(self) -> usize {
        match self {
            Self::Int32
            | Self::UInt32
            | Self::Int64
            | Self::UInt64
            | Self::Float32
            | Self::Float64 => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Quat | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
            Self::SpatialVector => 6,
            Self::SpatialMatrix => 36,
            Self::SpatialTransform => 7,
        }
    }

    /// Native scalar storage class.
    pub const fn scalar(self) -> ScalarKind {
        match self {
            Self::Int32 => ScalarKind::Int32,
            Self::UInt32 => ScalarKind::UInt32,
            Self::Int64 => ScalarKind::Int64,
            Self::UInt64 => ScalarKind::UInt64,
            Self::Float64 => ScalarKind::Float64,
            Self::Float32
            | Self::Vec2
            | Self::Vec3
            | Self::Vec4
            | Self::Quat
            | Self::Mat2
            | Self::Mat3
            | Self::Mat4
            | Self::SpatialVector
            | Self::SpatialMatrix
            | Self::SpatialTransform => ScalarKind::Float32,
        }
    }

    /// Size of one element in bytes.
    ///
    /// Invariant: `byte_size == element_count * scalar().width()`.
    #[inline]
    pub const fn byte_size(self) -> usize {
        self.element_count() * self.scalar().width()
    }

    /// Array-interface type string of the scalar base.
    #[inline]
    pub const fn type_str(self) -> &'static str {
        self.scalar().type_str()
    }

    /// Integer element check (scalar integer kinds only).
    #[inline]
    pub const fn is_integer(self) -> bool {
        self.scalar().is_integer() && self.element_count() == 1
    }

    /// Float element check.
    #[inline]
    pub const fn is_float(self) -> bool {
        self.scalar().is_float()
    }

    /// Lower-case display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Quat => "quat",
            Self::Mat2 => "mat22",
            Self::Mat3 => "mat33",
            Self::Mat4 => "mat44",
            Self::SpatialVector => "spatial_vector",
            Self::SpatialMatrix => "spatial_matrix",
            Self::SpatialTransform => "spatial_transform",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural type equality after canonicalization.
///
/// With a closed enum and canonical associated consts this is plain
/// equality.
#[inline]
pub fn types_equal(a: ElementType, b: ElementType) -> bool {
    a == b
}

// ============================================================================
// Spatial POD types
// ============================================================================

/// Spatial 6-vector (angular + linear part).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpatialVector(pub [f32; 6]);

/// Spatial 6x6 matrix, row-major.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SpatialMatrix(pub [f32; 36]);

impl Default for SpatialMatrix {
    fn default() -> Self {
        Self([0.0; 36])
    }
}

/// Spatial transform: translation followed by a quaternion.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpatialTransform(pub [f32; 7]);

// ============================================================================
// Element / HostScalar traits
// ============================================================================

mod sealed {
    pub trait Sealed {}
}

/// Maps a concrete POD type to its [`ElementType`].
///
/// Sealed: the set of element types is closed, and every implementation
/// upholds `size_of::<T>() == ELEMENT_TYPE.byte_size()`.
pub trait Element: Pod + sealed::Sealed {
    /// Element type descriptor for this Rust type.
    const ELEMENT_TYPE: ElementType;
}

macro_rules! impl_element {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}
            impl Element for $t {
                const ELEMENT_TYPE: ElementType = ElementType::$kind;
            }
        )*
    };
}

impl_element! {
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    glam::Vec2 => Vec2,
    glam::Vec3 => Vec3,
    glam::Vec4 => Vec4,
    glam::Quat => Quat,
    glam::Mat2 => Mat2,
    glam::Mat3 => Mat3,
    glam::Mat4 => Mat4,
    SpatialVector => SpatialVector,
    SpatialMatrix => SpatialMatrix,
    SpatialTransform => SpatialTransform,
}

/// Host-side scalar usable as a flat input sequence.
///
/// Sealed to the six supported scalar kinds. Conversion between kinds goes
/// through [`num_traits::NumCast`], which fails cleanly on values with no
/// representation in the target kind (NaN into an integer, for example).
pub trait HostScalar: Pod + num_traits::NumCast + Copy + sealed::Sealed {
    /// Storage class of this scalar.
    const KIND: ScalarKind;
}

macro_rules! impl_host_scalar {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl HostScalar for $t {
                const KIND: ScalarKind = ScalarKind::$kind;
            }
        )*
    };
}

impl_host_scalar! {
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

impl ScalarKind {
    /// Convert a flat host sequence into raw bytes of this storage class.
    ///
    /// Same-kind inputs are a straight byte cast; cross-kind inputs go
    /// element-wise through `NumCast` and fail with
    /// [`NbError::TypeConversion`] on the first unrepresentable value.
    pub fn convert_slice<S: HostScalar>(self, data: &[S]) -> NbResult<Vec<u8>> {
        if S::KIND == self {
            return Ok(bytemuck::cast_slice(data).to_vec());
        }

        fn cast_all<S: HostScalar, T: HostScalar>(data: &[S]) -> NbResult<Vec<u8>> {
            let mut out = Vec::with_capacity(data.len() * std::mem::size_of::<T>());
            for &s in data {
                let v: T = num_traits::cast(s)
                    .ok_or_else(|| NbError::type_conversion(S::KIND.type_str(), T::KIND.type_str()))?;
                out.extend_from_slice(bytemuck::bytes_of(&v));
            }
            Ok(out)
        }

        match self {
            Self::Int32 => cast_all::<S, i32>(data),
            Self::UInt32 => cast_all::<S, u32>(data),
            Self::Int64 => cast_all::<S, i64>(data),
            Self::UInt64 => cast_all::<S, u64>(data),
            Self::Float32 => cast_all::<S, f32>(data),
            Self::Float64 => cast_all::<S, f64>(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ElementType; 16] = [
        ElementType::Int32,
        ElementType::UInt32,
        ElementType::Int64,
        ElementType::UInt64,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Vec2,
        ElementType::Vec3,
        ElementType::Vec4,
        ElementType::Quat,
        ElementType::Mat2,
        ElementType::Mat3,
        ElementType::Mat4,
        ElementType::SpatialVector,
        ElementType::SpatialMatrix,
        ElementType::SpatialTransform,
    ];

    #[test]
    fn test_byte_size_invariant() {
        for t in ALL {
            assert_eq!(t.byte_size(), t.element_count() * t.scalar().width(), "{t}");
        }
    }

    #[test]
    fn test_known_sizes() {
        assert_eq!(ElementType::Vec3.byte_size(), 12);
        assert_eq!(ElementType::Quat.byte_size(), 16);
        assert_eq!(ElementType::Mat3.byte_size(), 36);
        assert_eq!(ElementType::SpatialMatrix.byte_size(), 144);
        assert_eq!(ElementType::SpatialTransform.byte_size(), 28);
        assert_eq!(ElementType::Float64.byte_size(), 8);
    }

    #[test]
    fn test_canonical_aliases() {
        assert_eq!(ElementType::INT, ElementType::Int32);
        assert_eq!(ElementType::FLOAT, ElementType::Float32);
        assert!(types_equal(ElementType::FLOAT, ElementType::Float32));
        assert!(!types_equal(ElementType::FLOAT, ElementType::Float64));
    }

    #[test]
    fn test_type_str_roundtrip() {
        for t in ALL {
            let parsed = ScalarKind::from_type_str(t.type_str()).unwrap();
            assert_eq!(parsed, t.scalar());
        }
        assert!(ScalarKind::from_type_str("<c8").is_err());
    }

    #[test]
    fn test_element_trait_sizes() {
        fn check<T: Element>() {
            assert_eq!(std::mem::size_of::<T>(), T::ELEMENT_TYPE.byte_size());
        }
        check::<i32>();
        check::<u64>();
        check::<f64>();
        check::<glam::Vec2>();
        check::<glam::Vec3>();
        check::<glam::Mat2>();
        check::<glam::Mat3>();
        check::<SpatialVector>();
        check::<SpatialMatrix>();
        check::<SpatialTransform>();
    }

    #[test]
    fn test_int_float_predicates() {
        assert!(ElementType::Int32.is_integer());
        assert!(ElementType::UInt64.is_integer());
        assert!(!ElementType::Vec3.is_integer());
        assert!(ElementType::Float32.is_float());
        assert!(ElementType::Vec3.is_float());
        assert!(!ElementType::Int32.is_float());
    }

    #[test]
    fn test_convert_slice_same_kind() {
        let bytes = ScalarKind::Float32.convert_slice(&[1.0f32, 2.0]).unwrap();
        assert_eq!(bytes.len(), 8);
        let back: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(back, &[1.0, 2.0]);
    }

    #[test]
    fn test_convert_slice_cross_kind() {
        let bytes = ScalarKind::Float32.convert_slice(&[1i32, -2, 3]).unwrap();
        let back: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(back, &[1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_convert_slice_nan_to_int_fails() {
        let err = ScalarKind::Int32.convert_slice(&[f32::NAN]).unwrap_err();
        assert!(matches!(err, NbError::TypeConversion { .. }));
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&ElementType::Vec3).unwrap();
        let back: ElementType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ElementType::Vec3);
    }
}
