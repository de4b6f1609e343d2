//! DXGI dispatch-table slot indices
//!
//! These offsets are the binary contract with `dxgi.h` / `dxgi1_2.h` and must
//! match the interface version the host renders with exactly.

/// `IDXGISwapChain::Present`
pub const PRESENT_SLOT: usize = 8;

/// `IDXGISwapChain::ResizeBuffers`
pub const RESIZE_BUFFERS_SLOT: usize = 13;

/// `IDXGISwapChain1::Present1`
pub const PRESENT1_SLOT: usize = 22;

/// Logical entry point intercepted by the installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSlot {
    Present,
    Present1,
    ResizeBuffers,
}

impl HookSlot {
    /// Dispatch-table index of the entry point on its owning interface
    pub const fn vtable_index(self) -> usize {
        match self {
            HookSlot::Present => PRESENT_SLOT,
            HookSlot::Present1 => PRESENT1_SLOT,
            HookSlot::ResizeBuffers => RESIZE_BUFFERS_SLOT,
        }
    }

    /// Display name used in logs
    pub const fn name(self) -> &'static str {
        match self {
            HookSlot::Present => "IDXGISwapChain::Present",
            HookSlot::Present1 => "IDXGISwapChain1::Present1",
            HookSlot::ResizeBuffers => "IDXGISwapChain::ResizeBuffers",
        }
    }

    /// Whether installation may proceed without this entry point
    pub const fn is_optional(self) -> bool {
        matches!(self, HookSlot::Present1)
    }
}
