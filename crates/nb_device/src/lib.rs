// crates/nb_device/src/lib.rs

//! Nimbus Device Layer (Layer 2)
//!
//! Device-aware memory substrate for numerical simulation:
//!
//! - [`device`]: logical [`device::Device`] identifier
//! - [`backend`]: the consumed [`backend::DeviceBackend`] contract plus the
//!   built-in host and simulated accelerator backends
//! - [`context`]: [`context::DeviceContext`] binding devices to backends
//!   and tracking the active device
//! - [`array`]: [`array::NdArray`], the owning typed buffer
//! - [`view`]: borrowed aliasing views and the external array-interface
//!   descriptor
//! - [`mesh`]: [`mesh::Mesh`], the RAII native spatial-index handle
//!
//! # Layering
//!
//! ```text
//! Layer 3: kernel / simulation layers (external consumers)
//! Layer 2: nb_device   -> DeviceContext, NdArray, Mesh (this crate)
//! Layer 1: nb_foundation -> ElementType, NbError
//! ```
//!
//! # Design principles
//!
//! 1. **Ownership by type**: owning arrays free exactly once on drop;
//!    every alias is a borrowed view with no drop logic
//! 2. **Explicit context**: no global device state; the process-wide
//!    active-device notion exists only at the backend boundary
//! 3. **Synchronous surface**: only `to()` and `synchronize()` block on
//!    accelerator queues

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array;
pub mod backend;
pub mod context;
pub mod device;
pub mod mesh;
pub mod view;

pub use array::{ArraySig, NdArray};
pub use backend::{
    BackendStats, DeviceBackend, HostBackend, MeshId, RawAddr, SimAccelBackend, ACCEL_ALIGN,
    HOST_ALIGN,
};
pub use context::DeviceContext;
pub use device::Device;
pub use mesh::Mesh;
pub use view::{ArrayInterface, HostArrayRef, NdView, ARRAY_INTERFACE_VERSION};

/// Prelude module.
pub mod prelude {
    //! Common type imports.
    pub use crate::array::NdArray;
    pub use crate::context::DeviceContext;
    pub use crate::device::Device;
    pub use crate::mesh::Mesh;
    pub use crate::view::{HostArrayRef, NdView};
    pub use nb_foundation::prelude::*;
}
