//! Windows glue: D3D11/DXGI objects, the host window procedure and the
//! detour entry points the registry redirects to

mod detours;
mod source;
mod surface;
mod window;
mod wndproc;

pub use detours::detour_set;
pub use source::TempSwapChain;
pub use surface::DxgiSurfaceProbe;
pub use window::DummyWindow;
pub use wndproc::{relay_wndproc, Win32WindowAttach};

use crate::config::HookConfig;
use crate::context::{init_hook_context, HookContext};
use crate::hooks::{install_render_hooks, registry, InstallError, InstalledHooks};

/// Build the hook context and intercept the swap chain
pub fn install(config: &HookConfig) -> Result<InstalledHooks, InstallError> {
    init_hook_context(|| {
        tracing::debug!("Creating hook context");
        HookContext::new(
            Box::new(framehook_engine::try_framework),
            Box::new(DxgiSurfaceProbe),
            Box::new(Win32WindowAttach::new()),
            config.frame_settings(),
        )
    });

    install_render_hooks(registry(), config, &detour_set(), TempSwapChain::new)
}
