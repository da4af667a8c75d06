// crates/nb_device/src/array.rs

//! Typed device array: the owning buffer type.
//!
//! An [`NdArray`] is a length-bounded, strongly-typed memory region on one
//! device. Ownership is encoded in the type system: an `NdArray` always
//! owns its allocation and frees it exactly once on drop, while every
//! aliasing case (reinterpret casts, host wraps) is a separate borrowed
//! view type that cannot outlive its backing storage (see
//! [`crate::view`]).

use crate::backend::RawAddr;
use crate::context::DeviceContext;
use crate::device::Device;
use crate::view::{ArrayInterface, HostArrayRef, NdView, ARRAY_INTERFACE_VERSION};
use bytemuck::Zeroable;
use nb_foundation::{ensure, types_equal, Element, ElementType, HostScalar, NbError, NbResult};
use std::fmt;
use std::sync::Arc;

/// Strongly-typed, single-device owning buffer.
pub struct NdArray {
    addr: RawAddr,
    len: usize,
    /// Allocated extent in bytes; `>= len * elem.byte_size()`.
    capacity: usize,
    elem: ElementType,
    device: Device,
    ctx: Arc<DeviceContext>,
}

impl NdArray {
    /// Allocate a zero-initialized array of `len` elements on `device`.
    ///
    /// All-or-nothing: on [`NbError::AllocationFailure`] no partial state
    /// is left behind.
    pub fn zeros(
        ctx: &Arc<DeviceContext>,
        len: usize,
        elem: ElementType,
        device: Device,
    ) -> NbResult<Self> {
        // Extent overflow is an allocation failure: no address space can
        // satisfy the request.
        let bytes = len
            .checked_mul(elem.byte_size())
            .ok_or_else(|| NbError::allocation_failure(device.to_string(), usize::MAX))?;
        let addr = ctx.alloc(device, bytes)?;
        Ok(Self {
            addr,
            len,
            capacity: bytes,
            elem,
            device,
            ctx: Arc::clone(ctx),
        })
    }

    /// Copy a typed host slice into a fresh owning array on `device`.
    ///
    /// A cross-device upload is performed when `device` is an accelerator.
    pub fn from_slice<T: Element>(
        ctx: &Arc<DeviceContext>,
        data: &[T],
        device: Device,
    ) -> NbResult<Self> {
        Self::from_host_ref(ctx, &HostArrayRef::new(data), device)
    }

    /// Copy a non-owning host wrap into a fresh owning array on `device`.
    pub fn from_host_ref(
        ctx: &Arc<DeviceContext>,
        src: &HostArrayRef<'_>,
        device: Device,
    ) -> NbResult<Self> {
        let arr = Self::zeros(ctx, src.len(), src.element_type(), device)?;
        ctx.backend(device)?.upload(arr.addr, src.as_bytes());
        Ok(arr)
    }

    /// Reshape a flat scalar sequence into elements of `elem` and copy it
    /// into a fresh owning array on `device`.
    ///
    /// Fails with [`NbError::ShapeMismatch`] when the scalar count does not
    /// divide into whole elements, and with [`NbError::TypeConversion`]
    /// when a value has no representation in `elem`'s storage class.
    pub fn from_scalars<S: HostScalar>(
        ctx: &Arc<DeviceContext>,
        data: &[S],
        elem: ElementType,
        device: Device,
    ) -> NbResult<Self> {
        NbError::check_shape(data.len(), elem.element_count())?;
        let len = data.len() / elem.element_count();
        let bytes = elem.scalar().convert_slice(data)?;
        let arr = Self::zeros(ctx, len, elem, device)?;
        ctx.backend(device)?.upload(arr.addr, &bytes);
        Ok(arr)
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

    /// Logical byte extent: `len * element byte size`.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.len * self.elem.byte_size()
    }

    /// Allocated extent in bytes.
    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }

    /// Element type descriptor.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.elem
    }

    /// Device this array lives on.
    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Raw address, meaningful only relative to [`device`](Self::device).
    #[inline]
    pub fn addr(&self) -> RawAddr {
        self.addr
    }

    /// Owning context.
    #[inline]
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    /// Overwrite the full logical byte range with zero, through the
    /// memset primitive matching this array's device.
    pub fn zero(&mut self) {
        self.ctx
            .memset(self.device, self.addr, 0, self.byte_size());
    }

    /// Typed copy of a flat scalar sequence into this array.
    ///
    /// Equivalent to wrapping `data` in a temporary buffer of this array's
    /// element type and copying it in; shape and conversion failures are
    /// reported before anything is written.
    pub fn assign<S: HostScalar>(&mut self, data: &[S]) -> NbResult<()> {
        NbError::check_shape(data.len(), self.elem.element_count())?;
        let bytes = self.elem.scalar().convert_slice(data)?;
        NbError::check_extent(bytes.len(), self.byte_size())?;
        self.ctx.backend(self.device)?.upload(self.addr, &bytes);
        Ok(())
    }

    /// Move this array to `device`.
    ///
    /// Identity when already resident there. Otherwise allocates a fresh
    /// owning array on the target, performs a blocking copy, and
    /// synchronizes outstanding transfers before returning. The result
    /// has identical length and element type and shares no storage with
    /// the source.
    pub fn to(self, device: Device) -> NbResult<Self> {
        if self.device == device {
            return Ok(self);
        }
        let ctx = Arc::clone(&self.ctx);
        let mut dest = Self::zeros(&ctx, self.len, self.elem, device)?;
        ctx.copy(&mut dest, &self)?;
        ctx.synchronize();
        Ok(dest)
    }

    /// Alias this array's memory under a different element type.
    ///
    /// The view's length and extent are rescaled by the byte-size ratio;
    /// fails with [`NbError::AlignmentError`] when the byte extent does
    /// not divide evenly. Views never own memory, so no alias can double
    /// free.
    pub fn reinterpret(&self, elem: ElementType) -> NbResult<NdView<'_>> {
        let extent = self.byte_size();
        ensure!(
            extent % elem.byte_size() == 0,
            NbError::alignment(extent, elem.byte_size())
        );
        Ok(NdView::over(self, elem, extent / elem.byte_size()))
    }

    /// Read-only typed view of a host-resident array.
    ///
    /// Fails with [`NbError::DeviceMismatch`] on accelerator arrays and
    /// with [`NbError::TypeConversion`] when `T` does not match the
    /// element type after canonicalization.
    pub fn as_slice<T: Element>(&self) -> NbResult<&[T]> {
        ensure!(
            self.device.is_host(),
            NbError::device_mismatch("host", self.device.to_string())
        );
        ensure!(
            types_equal(T::ELEMENT_TYPE, self.elem),
            NbError::type_conversion(self.elem.name(), T::ELEMENT_TYPE.name())
        );
        if self.len == 0 {
            return Ok(&[]);
        }
        // SAFETY: host allocation of at least len * byte_size bytes, and
        // the Element impl guarantees size_of::<T>() == elem.byte_size().
        Ok(unsafe { std::slice::from_raw_parts(self.addr as *const T, self.len) })
    }

    /// Materialize contents as a host vector.
    ///
    /// Host arrays read back directly; accelerator arrays are downloaded
    /// through a blocking transfer followed by a synchronize.
    pub fn to_host_vec<T: Element>(&self) -> NbResult<Vec<T>> {
        if self.device.is_host() {
            return Ok(self.as_slice::<T>()?.to_vec());
        }
        ensure!(
            types_equal(T::ELEMENT_TYPE, self.elem),
            NbError::type_conversion(self.elem.name(), T::ELEMENT_TYPE.name())
        );
        let mut out = vec![T::zeroed(); self.len];
        self.ctx
            .backend(self.device)?
            .download(self.addr, bytemuck::cast_slice_mut(&mut out));
        self.ctx.synchronize();
        Ok(out)
    }

    /// Read-only interop descriptor for external numeric-array consumers.
    ///
    /// Host-resident arrays only; this is a boundary contract over the
    /// array's memory, not a copy.
    pub fn array_interface(&self) -> NbResult<ArrayInterface<'_>> {
        ensure!(
            self.device.is_host(),
            NbError::device_mismatch("host", self.device.to_string())
        );
        Ok(ArrayInterface {
            addr: self.addr,
            read_only: true,
            shape: (self.len, self.elem.element_count()),
            type_str: self.elem.type_str(),
            version: ARRAY_INTERFACE_VERSION,
            _marker: std::marker::PhantomData,
        })
    }
}

impl Drop for NdArray {
    fn drop(&mut self) {
        // Exactly-once release of the owned allocation; zero-capacity
        // arrays never allocated.
        if self.capacity > 0 {
            self.ctx.free(self.device, self.addr, self.capacity);
        }
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("len", &self.len)
            .field("elem", &self.elem)
            .field("device", &self.device)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Bare element-type placeholder for kernel-style signatures.
///
/// Carries no memory and no context; there is nothing to free by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySig {
    /// Element type of the declared array parameter.
    pub elem: ElementType,
}

impl ArraySig {
    /// Declare an array parameter of the given element type.
    pub const fn new(elem: ElementType) -> Self {
        Self { elem }
    }
}

impl fmt::Display for ArraySig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "array<{}>", self.elem)
    }
}
