//! Opaque identities and FFI snapshots

use std::fmt;

/// Identity of a host swap chain
///
/// Only ever compared; the pointer value is never dereferenced outside the
/// detour call that received it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct SurfaceId(pub usize);

impl SurfaceId {
    pub const NONE: SurfaceId = SurfaceId(0);

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        SurfaceId(ptr as usize)
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceId({:#x})", self.0)
    }
}

/// Native window handle (`HWND`) as an integer
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct WindowHandle(pub usize);

impl WindowHandle {
    pub const NULL: WindowHandle = WindowHandle(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

/// Snapshot of the frame counters, exported over FFI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FrameStats {
    /// Presents observed by either present entry point
    pub observed: u64,
    /// Presents on which host frame work ran
    pub rendered: u64,
    /// Presents forwarded without host frame work
    pub skipped: u64,
}
