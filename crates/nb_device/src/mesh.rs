// crates/nb_device/src/mesh.rs

//! Mesh resource handle: a backend-allocated spatial index over
//! buffer-backed triangle geometry.
//!
//! The handle owns only the native identifier; the source buffers are
//! borrowed, so the handle cannot outlive them. Release is deterministic
//! and scope-exit-triggered, with the active-device assertion performed
//! before every destructive accelerator call.

use crate::array::NdArray;
use crate::backend::MeshId;
use crate::context::DeviceContext;
use crate::device::Device;
use nb_foundation::{ensure, types_equal, ElementType, NbError, NbResult};
use std::sync::Arc;

/// Spatial index over triangle geometry stored in device arrays.
///
/// Lifecycle: `new` → `refit`* → drop. Each stage follows the
/// active-device discipline for accelerator resources.
#[derive(Debug)]
pub struct Mesh<'a> {
    id: MeshId,
    device: Device,
    ctx: Arc<DeviceContext>,
    points: &'a NdArray,
    velocities: Option<&'a NdArray>,
    indices: &'a NdArray,
    triangle_count: usize,
}

impl<'a> Mesh<'a> {
    /// Build a mesh resource from point, optional velocity, and triangle
    /// index buffers.
    ///
    /// All buffers must share one device ([`NbError::DeviceMismatch`]
    /// otherwise, with no native resource created), and the point buffer
    /// must hold 3-float positions, since the native entry point reads
    /// `point_count * 3` floats. An index count that is not a multiple of
    /// 3 is truncated to whole triangles, matching the native contract;
    /// the truncation is logged since it usually means a malformed index
    /// buffer.
    pub fn new(
        points: &'a NdArray,
        velocities: Option<&'a NdArray>,
        indices: &'a NdArray,
    ) -> NbResult<Self> {
        ensure!(
            types_equal(points.element_type(), ElementType::Vec3),
            NbError::type_conversion(points.element_type().name(), ElementType::Vec3.name())
        );
        let device = points.device();
        ensure!(
            indices.device() == device,
            NbError::device_mismatch(device.to_string(), indices.device().to_string())
        );
        if let Some(vel) = velocities {
            ensure!(
                vel.device() == device,
                NbError::device_mismatch(device.to_string(), vel.device().to_string())
            );
        }

        if indices.len() % 3 != 0 {
            log::warn!(
                "mesh index buffer length {} is not a multiple of 3; truncating to {} triangles",
                indices.len(),
                indices.len() / 3
            );
        }
        let triangle_count = indices.len() / 3;

        let ctx = Arc::clone(points.context());
        if device.is_accel() {
            ctx.make_active(device);
        }
        let id = ctx.backend(device)?.mesh_create(
            points.addr(),
            velocities.map_or(0, NdArray::addr),
            indices.addr(),
            points.len(),
            triangle_count,
        )?;
        // Creation may leave a different context active.
        if device.is_accel() {
            ctx.make_active(device);
        }

        Ok(Self {
            id,
            device,
            ctx,
            points,
            velocities,
            indices,
            triangle_count,
        })
    }

    /// Native resource identifier.
    #[inline]
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Device the resource lives on.
    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of whole triangles the index buffer describes.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    /// Point buffer the resource was built over.
    #[inline]
    pub fn points(&self) -> &NdArray {
        self.points
    }

    /// Velocity buffer, if any.
    #[inline]
    pub fn velocities(&self) -> Option<&NdArray> {
        self.velocities
    }

    /// Index buffer the resource was built over.
    #[inline]
    pub fn indices(&self) -> &NdArray {
        self.indices
    }

    /// Re-derive the spatial index from current buffer contents in place.
    ///
    /// On accelerator resources the active device is re-asserted after the
    /// native call returns: backend execution may have switched contexts.
    pub fn refit(&mut self) {
        // The device was validated at construction time.
        if let Ok(backend) = self.ctx.backend(self.device) {
            backend.mesh_refit(self.id);
        }
        if self.device.is_accel() {
            self.ctx.make_active(self.device);
        }
    }
}

impl Drop for Mesh<'_> {
    fn drop(&mut self) {
        // The correct device must be active before the native destroy, or
        // an unrelated device's resource table could be corrupted.
        if self.device.is_accel() {
            self.ctx.make_active(self.device);
        }
        if let Ok(backend) = self.ctx.backend(self.device) {
            backend.mesh_destroy(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_foundation::ElementType;

    fn geometry(
        ctx: &Arc<DeviceContext>,
        device: Device,
    ) -> (NdArray, NdArray) {
        let points = NdArray::from_slice(
            ctx,
            &[
                glam::Vec3::ZERO,
                glam::Vec3::X,
                glam::Vec3::Y,
                glam::Vec3::Z,
            ],
            device,
        )
        .unwrap();
        let indices = NdArray::from_slice(ctx, &[0i32, 1, 2, 0, 2, 3], device).unwrap();
        (points, indices)
    }

    #[test]
    fn test_mesh_create_host() {
        let ctx = DeviceContext::new();
        let (points, indices) = geometry(&ctx, Device::Host);
        let mesh = Mesh::new(&points, None, &indices).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.device(), Device::Host);
        assert_ne!(mesh.id(), 0);
    }

    #[test]
    fn test_mesh_device_mismatch() {
        let ctx = DeviceContext::new();
        let points = NdArray::zeros(&ctx, 3, ElementType::Vec3, Device::Host).unwrap();
        let indices = NdArray::zeros(&ctx, 3, ElementType::Int32, ctx.accel_device()).unwrap();
        let err = Mesh::new(&points, None, &indices).unwrap_err();
        assert!(matches!(err, NbError::DeviceMismatch { .. }));
        // No native resource was created on either backend.
        assert_eq!(ctx.host_stats().meshes_created, 0);
        assert_eq!(ctx.accel_stats().meshes_created, 0);
    }

    #[test]
    fn test_mesh_index_truncation() {
        let ctx = DeviceContext::new();
        let points = NdArray::zeros(&ctx, 4, ElementType::Vec3, Device::Host).unwrap();
        let indices = NdArray::from_slice(&ctx, &[0i32, 1, 2, 0, 2, 3, 1], Device::Host).unwrap();
        let mesh = Mesh::new(&points, None, &indices).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_mesh_destroy_exactly_once() {
        let ctx = DeviceContext::new();
        let (points, indices) = geometry(&ctx, Device::Host);
        {
            let _mesh = Mesh::new(&points, None, &indices).unwrap();
            assert_eq!(ctx.host_stats().meshes_created, 1);
            assert_eq!(ctx.host_stats().meshes_destroyed, 0);
        }
        assert_eq!(ctx.host_stats().meshes_destroyed, 1);
    }
}
