// crates/nb_device/src/device.rs

//! Logical device identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical device an allocation lives on.
///
/// Addresses are opaque and meaningful only relative to their device;
/// the accelerator ordinal distinguishes devices in multi-accelerator
/// processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// Host (CPU) address space.
    Host,
    /// Accelerator address space, by ordinal.
    Accel(u32),
}

impl Device {
    /// Host check.
    #[inline]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }

    /// Accelerator check.
    #[inline]
    pub const fn is_accel(self) -> bool {
        matches!(self, Self::Accel(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Accel(ordinal) => write!(f, "accel:{ordinal}"),
        }
    }
}
