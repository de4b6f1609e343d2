//! framehook Core - Interception and Frame Multiplexing
//!
//! This crate intercepts the host's swap chain (Present, Present1 and
//! ResizeBuffers) and its window procedure, and drives the addon framework
//! from inside those calls.
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - Dispatch slots, message constants and shared records
//! - [`engine`] - Collaborator interfaces and the framework slot
//!
//! # Layout
//!
//! Everything except [`dxgi`] is platform-neutral and driven through traits,
//! so the pipelines are tested on any host. [`dxgi`] supplies the Windows
//! implementations and the `extern "system"` detours.

use tracing::{info, warn};

pub use framehook_engine as engine;
pub use framehook_sdk as sdk;

pub mod binding;
pub mod config;
pub mod context;
pub mod counters;
#[cfg(windows)]
pub mod dxgi;
pub mod frame;
pub mod hooks;
pub mod relay;
pub mod resize;
pub mod services;

pub use binding::{BindError, BindingInfo, DeviceBinding};
pub use config::{ConfigError, ConfigResult, HookConfig, BYPASS_ARG};
pub use context::{hook_context, init_hook_context, HookContext};
pub use counters::FrameCounters;
pub use frame::{FramePipeline, FrameSettings, PresentEntry};
pub use hooks::{registry, HookError, InstallError, InstalledHooks};
pub use relay::MessageRelay;
pub use resize::ResizePipeline;
pub use services::ServiceCell;

use framehook_sdk::FrameStats;

/// Install the render hooks for the current process
///
/// Returns the set of entry points intercepted. Only Windows hosts have a
/// swap chain to intercept.
pub fn install(config: &HookConfig) -> Result<InstalledHooks, InstallError> {
    #[cfg(windows)]
    {
        dxgi::install(config)
    }
    #[cfg(not(windows))]
    {
        let _ = config;
        Err(InstallError::Device(
            "DXGI interception requires Windows".to_string(),
        ))
    }
}

/// Disable every redirection and release the bound device
///
/// Registry entries stay in place so detours still running on other threads
/// can reach their trampolines.
pub fn shutdown() {
    info!("framehook shutting down...");

    if let Err(e) = registry().disable_all() {
        warn!("Failed to disable render hooks: {}", e);
    }

    if let Some(context) = hook_context() {
        context.binding.release();
    }
}

/// Counters for the frames seen so far, zeroed if nothing is installed
pub fn frame_stats() -> FrameStats {
    hook_context()
        .map(HookContext::frame_stats)
        .unwrap_or_default()
}
