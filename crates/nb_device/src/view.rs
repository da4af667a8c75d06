// crates/nb_device/src/view.rs

//! Non-owning buffer views.
//!
//! Every aliasing case is a borrowed type here, distinct from the owning
//! [`NdArray`](crate::array::NdArray): the borrow checker guarantees a
//! view cannot outlive the storage it aliases, and no view carries any
//! drop logic, so an alias can never free (or double free) backing
//! memory.

use crate::array::NdArray;
use crate::backend::RawAddr;
use crate::device::Device;
use nb_foundation::{ensure, types_equal, Element, ElementType, HostScalar, NbError, NbResult};
use std::marker::PhantomData;

/// Protocol version of the external array-interface contract.
pub const ARRAY_INTERFACE_VERSION: u32 = 3;

/// Reinterpret-cast view over an [`NdArray`]'s memory.
///
/// Same address, different element type; length and extent rescaled by
/// the byte-size ratio.
#[derive(Debug, Clone, Copy)]
pub struct NdView<'a> {
    source: &'a NdArray,
    elem: ElementType,
    len: usize,
}

impl<'a> NdView<'a> {
    pub(crate) fn over(source: &'a NdArray, elem: ElementType, len: usize) -> Self {
        Self { source, elem, len }
    }

    /// Number of elements under the view's type.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Empty check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type of the view.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.elem
    }

    /// Device of the aliased storage.
    #[inline]
    pub fn device(&self) -> Device {
        self.source.device()
    }

    /// Byte extent; always equal to the source's logical extent.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.len * self.elem.byte_size()
    }

    /// Aliased raw address.
    #[inline]
    pub fn addr(&self) -> RawAddr {
        self.source.addr()
    }

    /// Read-only typed view of host-resident aliased memory.
    pub fn as_slice<T: Element>(&self) -> NbResult<&'a [T]> {
        ensure!(
            self.device().is_host(),
            NbError::device_mismatch("host", self.device().to_string())
        );
        ensure!(
            types_equal(T::ELEMENT_TYPE, self.elem),
            NbError::type_conversion(self.elem.name(), T::ELEMENT_TYPE.name())
        );
        if self.len == 0 {
            return Ok(&[]);
        }
        // SAFETY: aliases the source array's live host allocation; extent
        // equality was established at reinterpret time.
        Ok(unsafe { std::slice::from_raw_parts(self.addr() as *const T, self.len) })
    }

    /// Copy the viewed bytes into a fresh owning array on the same device.
    pub fn to_owned_array(&self) -> NbResult<NdArray> {
        let ctx = self.source.context();
        let dest = NdArray::zeros(ctx, self.len, self.elem, self.device())?;
        // SAFETY: both regions are live allocations of this context with
        // identical byte extents.
        unsafe {
            ctx.copy_raw(
                dest.device(),
                dest.addr(),
                self.device(),
                self.addr(),
                self.byte_size(),
            );
        }
        Ok(dest)
    }
}

/// 非拥有的主机内存包装（copy=false 路径）
///
/// Wraps caller-owned host memory as a typed source without copying.
/// The wrap cannot outlive the slice it aliases.
#[derive(Debug, Clone, Copy)]
pub struct HostArrayRef<'a> {
    bytes: &'a [u8],
    elem: ElementType,
    len: usize,
}

impl<'a> HostArrayRef<'a> {
    /// Wrap a typed host slice.
    pub fn new<T: Element>(data: &'a [T]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            elem: T::ELEMENT_TYPE,
            len: data.len(),
        }
    }

    /// Wrap a flat scalar sequence as elements of `elem`.
    ///
    /// Aliasing cannot convert storage classes, so the scalar kind must
    /// already match `elem`'s ([`NbError::TypeConversion`] otherwise);
    /// the count must divide into whole elements
    /// ([`NbError::ShapeMismatch`]).
    pub fn from_scalars<S: HostScalar>(data: &'a [S], elem: ElementType) -> NbResult<Self> {
        ensure!(
            S::KIND == elem.scalar(),
            NbError::type_conversion(S::KIND.type_str(), elem.type_str())
        );
        NbError::check_shape(data.len(), elem.element_count())?;
        Ok(Self {
            bytes: bytemuck::cast_slice(data),
            elem,
            len: data.len() / elem.element_count(),
        })
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Empty check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.elem
    }

    /// Always [`Device::Host`].
    #[inline]
    pub fn device(&self) -> Device {
        Device::Host
    }

    /// Aliased bytes.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Aliased raw address.
    #[inline]
    pub fn addr(&self) -> RawAddr {
        self.bytes.as_ptr() as RawAddr
    }
}

/// Read-only interop descriptor for external numeric-array consumers.
///
/// Mirrors the array-interface protocol: raw address, read-only flag,
/// `(length, element_count)` shape, scalar type string and protocol
/// version. A boundary contract over live memory, not a copy.
#[derive(Debug, Clone, Copy)]
pub struct ArrayInterface<'a> {
    /// Raw host address of the first element.
    pub addr: RawAddr,
    /// Always true; consumers must not write through this descriptor.
    pub read_only: bool,
    /// `(length, scalars per element)`.
    pub shape: (usize, usize),
    /// Little-endian scalar type string.
    pub type_str: &'static str,
    /// Protocol version.
    pub version: u32,
    pub(crate) _marker: PhantomData<&'a [u8]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DeviceContext;

    #[test]
    fn test_host_ref_wraps_without_copy() {
        let data = [1.0f32, 2.0, 3.0];
        let wrap = HostArrayRef::new(&data);
        assert_eq!(wrap.len(), 3);
        assert_eq!(wrap.element_type(), ElementType::Float32);
        assert_eq!(wrap.addr(), data.as_ptr() as RawAddr);
    }

    #[test]
    fn test_host_ref_from_scalars_shape() {
        let data = [0.0f32; 7];
        let err = HostArrayRef::from_scalars(&data, ElementType::Vec3).unwrap_err();
        assert!(matches!(err, NbError::ShapeMismatch { .. }));

        let ok = HostArrayRef::from_scalars(&data[..6], ElementType::Vec3).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn test_host_ref_from_scalars_kind_mismatch() {
        let data = [0.0f64; 6];
        let err = HostArrayRef::from_scalars(&data, ElementType::Vec3).unwrap_err();
        assert!(matches!(err, NbError::TypeConversion { .. }));
    }

    #[test]
    fn test_view_to_owned_array() {
        let ctx = DeviceContext::new();
        let arr =
            NdArray::from_slice(&ctx, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], Device::Host).unwrap();
        let view = arr.reinterpret(ElementType::Vec3).unwrap();
        let owned = view.to_owned_array().unwrap();
        assert_eq!(owned.len(), 2);
        assert_ne!(owned.addr(), arr.addr());
        let v = owned.as_slice::<glam::Vec3>().unwrap();
        assert_eq!(v[1], glam::Vec3::new(4.0, 5.0, 6.0));
    }
}
