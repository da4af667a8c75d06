// crates/nb_foundation/src/error.rs

//! Unified error type for the memory substrate.
//!
//! Every failure surfaces synchronously at the call site and nothing is
//! retried internally: allocation and copy failures reflect backend or
//! resource exhaustion, not transient conditions. Construction paths are
//! all-or-nothing; a failed constructor leaves no partially-owned
//! resource behind.

use thiserror::Error;

/// Unified result type.
pub type NbResult<T> = Result<T, NbError>;

/// Nimbus 错误类型
#[derive(Error, Debug)]
pub enum NbError {
    /// Element or scalar type outside the supported set.
    #[error("unsupported element type: {tag}")]
    UnsupportedType {
        /// Offending type tag or type string.
        tag: String,
    },

    /// Flat scalar sequence not divisible into whole elements.
    #[error("shape mismatch: {total} scalars do not divide into elements of {element_count}")]
    ShapeMismatch {
        /// Total number of scalars supplied.
        total: usize,
        /// Scalars per element of the requested type.
        element_count: usize,
    },

    /// Scalar value has no representation in the target storage class.
    #[error("type conversion failed: {from} -> {to}")]
    TypeConversion {
        /// Source type name.
        from: String,
        /// Target type name.
        to: String,
    },

    /// Device allocator could not satisfy the request.
    #[error("allocation of {bytes} bytes failed on {device}")]
    AllocationFailure {
        /// Device name.
        device: String,
        /// Requested size in bytes.
        bytes: usize,
    },

    /// Source and destination byte extents differ.
    #[error("copy failure: source extent {src_bytes} B != destination extent {dst_bytes} B")]
    CopyFailure {
        /// Source extent in bytes.
        src_bytes: usize,
        /// Destination extent in bytes.
        dst_bytes: usize,
    },

    /// Byte extent not evenly divisible by the new element size.
    #[error("alignment error: extent {extent} B is not divisible by element size {elem_size} B")]
    AlignmentError {
        /// Total byte extent of the source buffer.
        extent: usize,
        /// Byte size of the requested element type.
        elem_size: usize,
    },

    /// Operands live on different devices.
    #[error("device mismatch: expected {expected}, found {actual}")]
    DeviceMismatch {
        /// Device required by the operation.
        expected: String,
        /// Device actually found.
        actual: String,
    },
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl NbError {
    /// Unsupported type tag.
    pub fn unsupported_type(tag: impl Into<String>) -> Self {
        Self::UnsupportedType { tag: tag.into() }
    }

    /// Shape mismatch.
    pub fn shape_mismatch(total: usize, element_count: usize) -> Self {
        Self::ShapeMismatch {
            total,
            element_count,
        }
    }

    /// Type conversion failure.
    pub fn type_conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::TypeConversion {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Allocation failure.
    pub fn allocation_failure(device: impl Into<String>, bytes: usize) -> Self {
        Self::AllocationFailure {
            device: device.into(),
            bytes,
        }
    }

    /// Copy extent mismatch.
    pub fn copy_failure(src_bytes: usize, dst_bytes: usize) -> Self {
        Self::CopyFailure {
            src_bytes,
            dst_bytes,
        }
    }

    /// Reinterpret alignment failure.
    pub fn alignment(extent: usize, elem_size: usize) -> Self {
        Self::AlignmentError { extent, elem_size }
    }

    /// Device mismatch.
    pub fn device_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DeviceMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

impl NbError {
    /// Check that a scalar count divides into whole elements.
    #[inline]
    pub fn check_shape(total: usize, element_count: usize) -> NbResult<()> {
        if element_count == 0 || total % element_count != 0 {
            Err(Self::shape_mismatch(total, element_count))
        } else {
            Ok(())
        }
    }

    /// Check that source and destination byte extents match.
    #[inline]
    pub fn check_extent(src_bytes: usize, dst_bytes: usize) -> NbResult<()> {
        if src_bytes != dst_bytes {
            Err(Self::copy_failure(src_bytes, dst_bytes))
        } else {
            Ok(())
        }
    }
}

/// Early-return on a failed condition with the given error.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
