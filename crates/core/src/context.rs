//! Process-wide hook context
//!
//! Detours are plain `extern "system"` functions with no user data, so the
//! state they share lives in one explicitly constructed context, set once
//! before any redirection is enabled.

use std::sync::{Arc, OnceLock};

use framehook_sdk::FrameStats;

use crate::binding::{BindingInfo, DeviceBinding, SurfaceProbe, WindowAttach};
use crate::frame::{FramePipeline, FrameSettings};
use crate::relay::MessageRelay;
use crate::resize::ResizePipeline;
use crate::services::{ServiceCell, ServiceResolver};

pub struct HookContext {
    pub services: Arc<ServiceCell>,
    pub binding: Arc<DeviceBinding>,
    pub frame: FramePipeline,
    pub resize: ResizePipeline,
    pub relay: MessageRelay,
}

impl HookContext {
    pub fn new(
        resolver: ServiceResolver,
        probe: Box<dyn SurfaceProbe>,
        window_attach: Box<dyn WindowAttach>,
        settings: FrameSettings,
    ) -> Self {
        let services = Arc::new(ServiceCell::new(resolver));
        let binding = Arc::new(DeviceBinding::new(probe, window_attach));

        Self {
            frame: FramePipeline::new(services.clone(), binding.clone(), settings),
            resize: ResizePipeline::new(services.clone(), binding.clone()),
            relay: MessageRelay::new(services.clone()),
            services,
            binding,
        }
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.frame.counters().snapshot()
    }

    pub fn binding_info(&self) -> BindingInfo {
        self.binding.snapshot()
    }
}

static HOOK_CONTEXT: OnceLock<HookContext> = OnceLock::new();

/// Get the context, building it with `init` on first call
pub fn init_hook_context(init: impl FnOnce() -> HookContext) -> &'static HookContext {
    HOOK_CONTEXT.get_or_init(init)
}

/// Get the context if it was initialized
pub fn hook_context() -> Option<&'static HookContext> {
    HOOK_CONTEXT.get()
}
