// crates/nb_device/src/backend.rs

//! Device backend interface and the built-in backends.
//!
//! [`DeviceBackend`] is the consumed native contract: raw allocate/free,
//! memset, transfer primitives, and the mesh resource entry points. The
//! host backend is a real implementation over `std::alloc`; the simulated
//! accelerator backend owns a distinct address space in host RAM with
//! accelerator-style alignment, so transfer and active-device discipline
//! can be exercised without hardware. A production accelerator backend
//! implements the same trait behind its driver API.

use nb_foundation::{NbError, NbResult};
use parking_lot::Mutex;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Opaque memory address, meaningful only relative to its backend.
pub type RawAddr = u64;

/// Backend-allocated mesh resource identifier.
pub type MeshId = u64;

/// Host allocation alignment (cache line / AVX-512).
pub const HOST_ALIGN: usize = 64;

/// Accelerator allocation alignment (coalesced access granularity).
pub const ACCEL_ALIGN: usize = 256;

/// Snapshot of a backend's allocation and resource counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Successful allocations.
    pub allocs: u64,
    /// Free calls.
    pub frees: u64,
    /// Cumulative bytes released through free.
    pub freed_bytes: u64,
    /// Currently live bytes.
    pub live_bytes: u64,
    /// Mesh resources created.
    pub meshes_created: u64,
    /// Mesh resources destroyed.
    pub meshes_destroyed: u64,
    /// Mesh refit calls.
    pub refits: u64,
}

/// Native backend entry points for one device kind.
///
/// Addresses crossing this boundary are raw and unchecked, exactly like a
/// driver API: `free`, `memset` and the transfer primitives require
/// addresses previously returned by `alloc` on the same backend (or, for
/// `upload`/`download`, valid host slices).
pub trait DeviceBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Allocate `bytes` of zero-initialized memory.
    fn alloc(&self, bytes: usize) -> NbResult<RawAddr>;

    /// Release an allocation. `bytes` must be the originally requested size.
    fn free(&self, addr: RawAddr, bytes: usize);

    /// Fill `bytes` at `addr` with `value`.
    fn memset(&self, addr: RawAddr, value: u8, bytes: usize);

    /// Copy a host slice into backend memory at `dst`.
    fn upload(&self, dst: RawAddr, src: &[u8]);

    /// Copy backend memory at `src` into a host slice.
    fn download(&self, src: RawAddr, dst: &mut [u8]);

    /// Copy between two regions of this backend's memory.
    fn copy_within(&self, dst: RawAddr, src: RawAddr, bytes: usize);

    /// Block until outstanding backend work has drained.
    fn synchronize(&self) {}

    /// Make this backend's device the process-wide active device.
    /// Idempotent.
    fn make_active(&self) {}

    /// Build a mesh resource over raw point/velocity/index addresses.
    /// A null (0) velocity address means no velocities. `points` must
    /// address at least `point_count` 3-float positions.
    fn mesh_create(
        &self,
        points: RawAddr,
        velocities: RawAddr,
        indices: RawAddr,
        point_count: usize,
        triangle_count: usize,
    ) -> NbResult<MeshId>;

    /// Re-derive a mesh resource from current buffer contents in place.
    fn mesh_refit(&self, id: MeshId);

    /// Destroy a mesh resource. Must be called exactly once per id.
    fn mesh_destroy(&self, id: MeshId);

    /// Counter snapshot.
    fn stats(&self) -> BackendStats;
}

// ============================================================================
// Shared internals
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    allocs: AtomicU64,
    frees: AtomicU64,
    freed_bytes: AtomicU64,
    live_bytes: AtomicU64,
    meshes_created: AtomicU64,
    meshes_destroyed: AtomicU64,
    refits: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BackendStats {
        BackendStats {
            allocs: self.allocs.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            freed_bytes: self.freed_bytes.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            meshes_created: self.meshes_created.load(Ordering::Relaxed),
            meshes_destroyed: self.meshes_destroyed.load(Ordering::Relaxed),
            refits: self.refits.load(Ordering::Relaxed),
        }
    }
}

/// Aligned raw heap over `std::alloc`, counter-instrumented.
#[derive(Debug)]
struct AlignedHeap {
    align: usize,
    device_name: &'static str,
    counters: Counters,
}

impl AlignedHeap {
    fn new(align: usize, device_name: &'static str) -> Self {
        Self {
            align,
            device_name,
            counters: Counters::default(),
        }
    }

    fn layout_for(&self, bytes: usize) -> NbResult<Layout> {
        Layout::from_size_align(bytes, self.align)
            .map_err(|_| NbError::allocation_failure(self.device_name, bytes))
    }

    fn alloc(&self, bytes: usize) -> NbResult<RawAddr> {
        if bytes == 0 {
            return Ok(0);
        }
        let layout = self.layout_for(bytes)?;
        // Zeroed allocation keeps freshly constructed buffers deterministic.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(NbError::allocation_failure(self.device_name, bytes));
        }
        debug_assert_eq!(ptr as usize % self.align, 0);
        self.counters.allocs.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
        Ok(ptr as RawAddr)
    }

    fn free(&self, addr: RawAddr, bytes: usize) {
        if addr == 0 || bytes == 0 {
            return;
        }
        // Layout must match the allocation; bytes is the original request.
        let Ok(layout) = Layout::from_size_align(bytes, self.align) else {
            log::error!("free: invalid layout ({bytes} B, align {})", self.align);
            return;
        };
        unsafe { dealloc(addr as *mut u8, layout) };
        self.counters.frees.fetch_add(1, Ordering::Relaxed);
        self.counters
            .freed_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.counters
            .live_bytes
            .fetch_sub(bytes as u64, Ordering::Relaxed);
    }

    fn memset(&self, addr: RawAddr, value: u8, bytes: usize) {
        if addr == 0 || bytes == 0 {
            return;
        }
        unsafe { std::ptr::write_bytes(addr as *mut u8, value, bytes) };
    }

    fn upload(&self, dst: RawAddr, src: &[u8]) {
        if src.is_empty() {
            return;
        }
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len()) };
    }

    fn download(&self, src: RawAddr, dst: &mut [u8]) {
        if dst.is_empty() {
            return;
        }
        unsafe { std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len()) };
    }

    fn copy_within(&self, dst: RawAddr, src: RawAddr, bytes: usize) {
        if bytes == 0 {
            return;
        }
        // Regions may overlap when aliasing views are the source.
        unsafe { std::ptr::copy(src as *const u8, dst as *mut u8, bytes) };
    }
}

#[derive(Debug)]
struct MeshRecord {
    points: RawAddr,
    point_count: usize,
    /// Axis-aligned bounds over the point buffer, refreshed by refit.
    bounds: ([f32; 3], [f32; 3]),
}

/// Registry of live mesh resources for the built-in backends.
#[derive(Debug, Default)]
struct MeshTable {
    next_id: AtomicU64,
    records: Mutex<HashMap<MeshId, MeshRecord>>,
}

impl MeshTable {
    /// Reads `point_count * 3` f32 coordinates at `points`.
    fn compute_bounds(points: RawAddr, point_count: usize) -> ([f32; 3], [f32; 3]) {
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        if points == 0 || point_count == 0 {
            return (lo, hi);
        }
        let coords =
            unsafe { std::slice::from_raw_parts(points as *const f32, point_count * 3) };
        for p in coords.chunks_exact(3) {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(p[axis]);
                hi[axis] = hi[axis].max(p[axis]);
            }
        }
        (lo, hi)
    }

    fn create(&self, points: RawAddr, point_count: usize) -> MeshId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let bounds = Self::compute_bounds(points, point_count);
        self.records.lock().insert(
            id,
            MeshRecord {
                points,
                point_count,
                bounds,
            },
        );
        id
    }

    fn refit(&self, id: MeshId) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(&id) {
            record.bounds = Self::compute_bounds(record.points, record.point_count);
        }
    }

    fn destroy(&self, id: MeshId) -> bool {
        self.records.lock().remove(&id).is_some()
    }
}

// ============================================================================
// Host backend
// ============================================================================

/// Host (CPU) backend over `std::alloc`, 64-byte aligned.
#[derive(Debug)]
pub struct HostBackend {
    heap: AlignedHeap,
    meshes: MeshTable,
}

impl HostBackend {
    /// Create a host backend.
    pub fn new() -> Self {
        Self {
            heap: AlignedHeap::new(HOST_ALIGN, "host"),
            meshes: MeshTable::default(),
        }
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn alloc(&self, bytes: usize) -> NbResult<RawAddr> {
        self.heap.alloc(bytes)
    }

    fn free(&self, addr: RawAddr, bytes: usize) {
        self.heap.free(addr, bytes);
    }

    fn memset(&self, addr: RawAddr, value: u8, bytes: usize) {
        self.heap.memset(addr, value, bytes);
    }

    fn upload(&self, dst: RawAddr, src: &[u8]) {
        self.heap.upload(dst, src);
    }

    fn download(&self, src: RawAddr, dst: &mut [u8]) {
        self.heap.download(src, dst);
    }

    fn copy_within(&self, dst: RawAddr, src: RawAddr, bytes: usize) {
        self.heap.copy_within(dst, src, bytes);
    }

    fn mesh_create(
        &self,
        points: RawAddr,
        _velocities: RawAddr,
        _indices: RawAddr,
        point_count: usize,
        _triangle_count: usize,
    ) -> NbResult<MeshId> {
        let id = self.meshes.create(points, point_count);
        self.heap
            .counters
            .meshes_created
            .fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn mesh_refit(&self, id: MeshId) {
        self.meshes.refit(id);
        self.heap.counters.refits.fetch_add(1, Ordering::Relaxed);
    }

    fn mesh_destroy(&self, id: MeshId) {
        if self.meshes.destroy(id) {
            self.heap
                .counters
                .meshes_destroyed
                .fetch_add(1, Ordering::Relaxed);
        } else {
            log::warn!("mesh_destroy: unknown host mesh id {id}");
        }
    }

    fn stats(&self) -> BackendStats {
        self.heap.counters.snapshot()
    }
}

// ============================================================================
// Simulated accelerator backend
// ============================================================================

/// Sentinel for "some other context is active" after a simulated clobber.
const CLOBBERED: u32 = u32::MAX;

/// 模拟加速器后端（独立地址空间，256 字节对齐）
///
/// Backed by host RAM but treated as a foreign address space: everything
/// reaches it through the transfer primitives. Mesh create/refit clobber
/// the backend's active-device slot, the way driver-side execution can
/// switch contexts, so callers must re-assert [`DeviceBackend::make_active`]
/// per the destructive-call discipline.
#[derive(Debug)]
pub struct SimAccelBackend {
    ordinal: u32,
    active: AtomicU32,
    heap: AlignedHeap,
    meshes: MeshTable,
}

impl SimAccelBackend {
    /// Create a simulated accelerator with the given ordinal.
    pub fn new(ordinal: u32) -> Self {
        Self {
            ordinal,
            active: AtomicU32::new(CLOBBERED),
            heap: AlignedHeap::new(ACCEL_ALIGN, "accel"),
            meshes: MeshTable::default(),
        }
    }

    /// Device ordinal of this backend.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Ordinal the backend currently considers active, if any.
    ///
    /// `None` after a backend call clobbered the context and before the
    /// next `make_active`.
    pub fn active_ordinal(&self) -> Option<u32> {
        match self.active.load(Ordering::Relaxed) {
            CLOBBERED => None,
            ordinal => Some(ordinal),
        }
    }
}

impl DeviceBackend for SimAccelBackend {
    fn name(&self) -> &'static str {
        "accel"
    }

    fn alloc(&self, bytes: usize) -> NbResult<RawAddr> {
        self.heap.alloc(bytes)
    }

    fn free(&self, addr: RawAddr, bytes: usize) {
        self.heap.free(addr, bytes);
    }

    fn memset(&self, addr: RawAddr, value: u8, bytes: usize) {
        self.heap.memset(addr, value, bytes);
    }

    fn upload(&self, dst: RawAddr, src: &[u8]) {
        self.heap.upload(dst, src);
    }

    fn download(&self, src: RawAddr, dst: &mut [u8]) {
        self.heap.download(src, dst);
    }

    fn copy_within(&self, dst: RawAddr, src: RawAddr, bytes: usize) {
        self.heap.copy_within(dst, src, bytes);
    }

    fn make_active(&self) {
        self.active.store(self.ordinal, Ordering::Relaxed);
    }

    fn mesh_create(
        &self,
        points: RawAddr,
        _velocities: RawAddr,
        _indices: RawAddr,
        point_count: usize,
        _triangle_count: usize,
    ) -> NbResult<MeshId> {
        let id = self.meshes.create(points, point_count);
        self.heap
            .counters
            .meshes_created
            .fetch_add(1, Ordering::Relaxed);
        // Backend execution may leave a different context active.
        self.active.store(CLOBBERED, Ordering::Relaxed);
        Ok(id)
    }

    fn mesh_refit(&self, id: MeshId) {
        self.meshes.refit(id);
        self.heap.counters.refits.fetch_add(1, Ordering::Relaxed);
        self.active.store(CLOBBERED, Ordering::Relaxed);
    }

    fn mesh_destroy(&self, id: MeshId) {
        debug_assert_eq!(
            self.active.load(Ordering::Relaxed),
            self.ordinal,
            "mesh_destroy while another device context is active"
        );
        if self.meshes.destroy(id) {
            self.heap
                .counters
                .meshes_destroyed
                .fetch_add(1, Ordering::Relaxed);
        } else {
            log::warn!("mesh_destroy: unknown accel mesh id {id}");
        }
    }

    fn stats(&self) -> BackendStats {
        self.heap.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_alloc_free_counters() {
        let backend = HostBackend::new();
        let addr = backend.alloc(128).unwrap();
        assert_ne!(addr, 0);
        assert_eq!(addr as usize % HOST_ALIGN, 0);
        assert_eq!(backend.stats().allocs, 1);
        assert_eq!(backend.stats().live_bytes, 128);

        backend.free(addr, 128);
        let stats = backend.stats();
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.freed_bytes, 128);
        assert_eq!(stats.live_bytes, 0);
    }

    #[test]
    fn test_zero_sized_alloc() {
        let backend = HostBackend::new();
        assert_eq!(backend.alloc(0).unwrap(), 0);
        backend.free(0, 0);
        assert_eq!(backend.stats(), BackendStats::default());
    }

    #[test]
    fn test_memset_and_download() {
        let backend = HostBackend::new();
        let addr = backend.alloc(16).unwrap();
        backend.memset(addr, 0xAB, 16);
        let mut out = [0u8; 16];
        backend.download(addr, &mut out);
        assert!(out.iter().all(|&b| b == 0xAB));
        backend.free(addr, 16);
    }

    #[test]
    fn test_accel_alignment() {
        let backend = SimAccelBackend::new(0);
        let addr = backend.alloc(64).unwrap();
        assert_eq!(addr as usize % ACCEL_ALIGN, 0);
        backend.free(addr, 64);
    }

    #[test]
    fn test_accel_active_clobbered_by_refit() {
        let backend = SimAccelBackend::new(2);
        backend.make_active();
        assert_eq!(backend.active_ordinal(), Some(2));

        let points: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let addr = backend.alloc(std::mem::size_of_val(&points)).unwrap();
        backend.upload(addr, bytemuck::cast_slice(&points));

        let id = backend.mesh_create(addr, 0, 0, 3, 1).unwrap();
        assert_eq!(backend.active_ordinal(), None);

        backend.make_active();
        backend.mesh_refit(id);
        assert_eq!(backend.active_ordinal(), None);

        backend.make_active();
        backend.mesh_destroy(id);
        backend.free(addr, std::mem::size_of_val(&points));
        let stats = backend.stats();
        assert_eq!(stats.meshes_created, 1);
        assert_eq!(stats.meshes_destroyed, 1);
        assert_eq!(stats.refits, 1);
    }
}
