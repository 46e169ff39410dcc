//! Workspace placeholder crate.
//!
//! Exposes feature flags that map onto the individual workspace crates so a
//! host application can depend on `stream-core-workspace` alone and get the
//! wired [`CoreService`](core_service::CoreService) façade.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
