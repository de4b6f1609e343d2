//! framehook Plugin - FFI Layer
//!
//! This crate provides the C ABI the addon framework links against. It
//! compiles to a cdylib (.dll); the C header is generated by cbindgen at
//! build time.
//!
//! Call order: `framehook_attach` with the callback table, then
//! `framehook_install`, then `framehook_shutdown` when the framework unloads.

pub mod ffi;

pub use framehook_core::shutdown;
