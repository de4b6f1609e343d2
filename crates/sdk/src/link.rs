//! Shared resource record and identifiers
//!
//! The addon framework publishes a link record that addons read every frame.
//! The interception layer only ever writes the leading dimension fields.

/// Resource id of the shared link record in the data-link table
pub const LINK_RESOURCE_ID: &str = "DL_NEXUS_LINK";

/// Event raised after the swap chain buffers were resized
pub const EV_WINDOW_RESIZED: &str = "EV_WINDOW_RESIZED";

/// Leading fields of the shared link record
///
/// The full record is owned by the framework; only this prefix is part of
/// the contract with the interception layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct LinkData {
    pub width: u32,
    pub height: u32,
    pub scaling: f32,
}
