//! framehook SDK - shared type definitions
//!
//! This crate contains the plain data types and binary constants shared by
//! the interception layer and the addon framework it drives. It has no
//! dependencies and no platform code, so every type here is usable from
//! tests on any host.
//!
//! # Modules
//!
//! - [`dispatch`] - DXGI swap chain dispatch-table slot indices
//! - [`messages`] - Window message constants, [`WindowMessage`] and [`Disposition`]
//! - [`link`] - Shared resource record and event/resource identifiers
//! - [`types`] - Opaque identities and the FFI stats snapshot

pub mod dispatch;
pub mod link;
pub mod messages;
pub mod types;

pub use dispatch::{HookSlot, PRESENT1_SLOT, PRESENT_SLOT, RESIZE_BUFFERS_SLOT};
pub use link::{LinkData, EV_WINDOW_RESIZED, LINK_RESOURCE_ID};
pub use messages::{Disposition, WindowMessage, WM_DESTROY, WM_PASSTHROUGH_FIRST, WM_PASSTHROUGH_LAST, WM_USER};
pub use types::{FrameStats, SurfaceId, WindowHandle};
