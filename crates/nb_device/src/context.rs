// crates/nb_device/src/context.rs

//! Device context: process-wide binding of devices to backends.
//!
//! One context binds the host backend, the accelerator backend and the
//! active-device slot. Every device-touching call goes through an explicit
//! context reference; the process-wide "current device" assumption of the
//! native backend is mirrored only at the backend boundary.

use crate::array::NdArray;
use crate::backend::{BackendStats, DeviceBackend, HostBackend, RawAddr, SimAccelBackend};
use crate::device::Device;
use nb_foundation::{ensure, NbError, NbResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// 设备上下文（主机 + 加速器后端绑定）
pub struct DeviceContext {
    host: Arc<dyn DeviceBackend>,
    accel: Arc<dyn DeviceBackend>,
    accel_device: Device,
    active: Mutex<Device>,
}

impl DeviceContext {
    /// Create a context over the built-in host backend and the simulated
    /// accelerator at ordinal 0.
    pub fn new() -> Arc<Self> {
        Self::with_backends(
            Arc::new(HostBackend::new()),
            Arc::new(SimAccelBackend::new(0)),
            0,
        )
    }

    /// Create a context over explicit backends.
    ///
    /// `accel_ordinal` is the logical ordinal of the accelerator backend;
    /// a production context passes its driver-level device index here.
    pub fn with_backends(
        host: Arc<dyn DeviceBackend>,
        accel: Arc<dyn DeviceBackend>,
        accel_ordinal: u32,
    ) -> Arc<Self> {
        log::debug!(
            "device context: host backend '{}', accel backend '{}' (ordinal {})",
            host.name(),
            accel.name(),
            accel_ordinal
        );
        Arc::new(Self {
            host,
            accel,
            accel_device: Device::Accel(accel_ordinal),
            active: Mutex::new(Device::Host),
        })
    }

    /// The accelerator device this context is bound to.
    #[inline]
    pub fn accel_device(&self) -> Device {
        self.accel_device
    }

    /// Backend serving `device`.
    ///
    /// Fails with [`NbError::DeviceMismatch`] when an accelerator ordinal
    /// is not the one this context is bound to: dispatching it to the
    /// bound backend would break the device/allocator pairing.
    pub fn backend(&self, device: Device) -> NbResult<&Arc<dyn DeviceBackend>> {
        match device {
            Device::Host => Ok(&self.host),
            Device::Accel(_) => {
                ensure!(
                    device == self.accel_device,
                    NbError::device_mismatch(self.accel_device.to_string(), device.to_string())
                );
                Ok(&self.accel)
            }
        }
    }

    /// Allocate `bytes` on `device`.
    pub fn alloc(&self, device: Device, bytes: usize) -> NbResult<RawAddr> {
        self.backend(device)?.alloc(bytes)
    }

    /// Release an allocation previously returned by [`alloc`](Self::alloc)
    /// on the same device, with its original size.
    pub fn free(&self, device: Device, addr: RawAddr, bytes: usize) {
        match self.backend(device) {
            Ok(backend) => backend.free(addr, bytes),
            Err(err) => log::error!("free skipped: {err}"),
        }
    }

    /// Fill `bytes` at `addr` on `device` with `value`.
    pub fn memset(&self, device: Device, addr: RawAddr, value: u8, bytes: usize) {
        match self.backend(device) {
            Ok(backend) => backend.memset(addr, value, bytes),
            Err(err) => log::error!("memset skipped: {err}"),
        }
    }

    /// Typed copy between arrays on any pair of devices.
    ///
    /// Validates equal element counts and equal byte extents before
    /// dispatching to the host-host, host-accel, accel-host or accel-accel
    /// transfer path. The copy completes, from the caller's perspective,
    /// only after the next [`synchronize`](Self::synchronize).
    pub fn copy(&self, dst: &mut NdArray, src: &NdArray) -> NbResult<()> {
        if dst.len() != src.len() {
            return Err(NbError::copy_failure(src.byte_size(), dst.byte_size()));
        }
        NbError::check_extent(src.byte_size(), dst.byte_size())?;
        // SAFETY: both addresses come from live arrays allocated through
        // this context, with extents validated above.
        unsafe {
            self.copy_raw(
                dst.device(),
                dst.addr(),
                src.device(),
                src.addr(),
                src.byte_size(),
            );
        }
        Ok(())
    }

    /// Raw transfer dispatch.
    ///
    /// # Safety
    ///
    /// Host addresses must point to valid memory of at least `bytes`;
    /// accelerator addresses must be live allocations of this context's
    /// accelerator backend.
    pub(crate) unsafe fn copy_raw(
        &self,
        dst_device: Device,
        dst_addr: RawAddr,
        src_device: Device,
        src_addr: RawAddr,
        bytes: usize,
    ) {
        if bytes == 0 {
            return;
        }
        match (dst_device, src_device) {
            (Device::Host, Device::Host) => {
                self.host.copy_within(dst_addr, src_addr, bytes);
            }
            (Device::Accel(_), Device::Host) => {
                let src = std::slice::from_raw_parts(src_addr as *const u8, bytes);
                self.accel.upload(dst_addr, src);
            }
            (Device::Host, Device::Accel(_)) => {
                let dst = std::slice::from_raw_parts_mut(dst_addr as *mut u8, bytes);
                self.accel.download(src_addr, dst);
            }
            (Device::Accel(_), Device::Accel(_)) => {
                self.accel.copy_within(dst_addr, src_addr, bytes);
            }
        }
    }

    /// Block until outstanding accelerator work has drained.
    pub fn synchronize(&self) {
        self.host.synchronize();
        self.accel.synchronize();
    }

    /// Make `device` the process-wide active device. Idempotent; required
    /// before any destructive accelerator call, and re-asserted after
    /// backend calls that may have switched contexts.
    pub fn make_active(&self, device: Device) {
        let backend = match self.backend(device) {
            Ok(backend) => backend,
            Err(err) => {
                log::error!("make_active skipped: {err}");
                return;
            }
        };
        let mut active = self.active.lock();
        backend.make_active();
        *active = device;
    }

    /// Device this context last made active.
    pub fn active_device(&self) -> Device {
        *self.active.lock()
    }

    /// Host backend counter snapshot.
    pub fn host_stats(&self) -> BackendStats {
        self.host.stats()
    }

    /// Accelerator backend counter snapshot.
    pub fn accel_stats(&self) -> BackendStats {
        self.accel.stats()
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("host", &self.host.name())
            .field("accel", &self.accel.name())
            .field("accel_device", &self.accel_device)
            .field("active", &*self.active.lock())
            .finish()
    }
}
