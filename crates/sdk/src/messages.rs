//! Window message definitions
//!
//! The relay works on a platform-neutral copy of the `WNDPROC` arguments so
//! that consumers and tests never touch Win32 types.

use crate::types::WindowHandle;

/// `WM_DESTROY`
pub const WM_DESTROY: u32 = 0x0002;

/// `WM_USER`, first code available for private window classes
pub const WM_USER: u32 = 0x0400;

/// First code of the range reserved for messages the framework re-posts to the host.
///
/// A message in `WM_PASSTHROUGH_FIRST..=WM_PASSTHROUGH_LAST` carries the
/// original code plus this base and is delivered to the host's procedure
/// with the base subtracted.
pub const WM_PASSTHROUGH_FIRST: u32 = WM_USER + 7997;

/// Last code (inclusive) of the pass-through range
pub const WM_PASSTHROUGH_LAST: u32 = WM_PASSTHROUGH_FIRST + WM_USER;

/// Result of offering a message to a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Disposition {
    /// Not claimed, offer to the next consumer
    #[default]
    Continue = 0,

    /// Claimed, stop the chain and do not forward to the host
    Handled = 1,
}

/// Arguments of one window procedure invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct WindowMessage {
    pub hwnd: WindowHandle,
    pub msg: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl WindowMessage {
    pub const fn new(hwnd: WindowHandle, msg: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            hwnd,
            msg,
            wparam,
            lparam,
        }
    }

    /// Whether the code lies in the reserved pass-through range
    pub const fn is_passthrough(&self) -> bool {
        self.msg >= WM_PASSTHROUGH_FIRST && self.msg <= WM_PASSTHROUGH_LAST
    }

    /// Restore the host's original code for pass-through messages
    pub const fn remap_passthrough(self) -> Self {
        if self.is_passthrough() {
            Self {
                msg: self.msg - WM_PASSTHROUGH_FIRST,
                ..self
            }
        } else {
            self
        }
    }
}
