//! FFI boundary with the addon framework
//!
//! - [`callbacks`] - the C callback table and its adapters onto the engine traits
//! - [`exports`] - the `framehook_*` C exports

pub mod callbacks;
pub mod exports;

pub use callbacks::{AttachError, FrameworkCallbacks};
