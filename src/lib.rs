//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-sync`, `core-store`).
//! Host applications can depend on `fieldsync-workspace` and enable the
//! documented features without needing to wire each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "secure-store"))]
pub use core_service::*;
