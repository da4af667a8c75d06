// crates/nb_foundation/src/lib.rs

//! Nimbus Foundation Layer (Layer 1)
//!
//! Pure-metadata base of the device memory substrate:
//!
//! - [`element`]: closed element type registry (scalars, vectors, matrices,
//!   spatial kinds), the [`element::Element`] / [`element::HostScalar`]
//!   traits and the spatial POD types
//! - [`error`]: unified [`error::NbError`] type and `NbResult` alias
//!
//! # Design principles
//!
//! 1. **Closed type set**: element metadata is an exhaustively matched enum,
//!    never a runtime type tag
//! 2. **No device knowledge**: everything device-facing lives in `nb_device`
//! 3. **All-or-nothing errors**: failed constructors leave no partial state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod element;
pub mod error;

pub use element::{
    types_equal, Element, ElementType, HostScalar, ScalarKind, SpatialMatrix, SpatialTransform,
    SpatialVector,
};
pub use error::{NbError, NbResult};

/// Prelude module.
pub mod prelude {
    //! Common type imports.
    pub use crate::element::{Element, ElementType, HostScalar, ScalarKind};
    pub use crate::error::{NbError, NbResult};
    pub use crate::ensure;
}
