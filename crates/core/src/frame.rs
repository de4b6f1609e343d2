//! Present pipeline
//!
//! Shared by `Present` and `Present1`. Frame-generation runtimes may call
//! either entry several times per displayed frame, from different threads,
//! without serialization; every call is counted exactly once and host work
//! only runs against a bound device.

use std::sync::Arc;

use framehook_sdk::SurfaceId;

use crate::binding::DeviceBinding;
use crate::counters::FrameCounters;
use crate::services::ServiceCell;

/// Entry point a present arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentEntry {
    Present,
    Present1,
}

/// Per-frame diagnostics settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    /// Skipped presents logged before they are only counted
    pub skip_log_limit: u64,
    /// Presents between heartbeat logs (0 disables)
    pub heartbeat_interval: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            skip_log_limit: 5,
            heartbeat_interval: 120,
        }
    }
}

pub struct FramePipeline {
    services: Arc<ServiceCell>,
    binding: Arc<DeviceBinding>,
    counters: FrameCounters,
    settings: FrameSettings,
}

impl FramePipeline {
    pub fn new(
        services: Arc<ServiceCell>,
        binding: Arc<DeviceBinding>,
        settings: FrameSettings,
    ) -> Self {
        Self {
            services,
            binding,
            counters: FrameCounters::new(),
            settings,
        }
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.counters
    }

    /// Run one present through the framework, then `forward` it to the host
    ///
    /// Returns whatever `forward` returns; nothing here can fail the present.
    ///
    /// # Safety
    /// `surface` must identify the live swap chain being presented.
    pub unsafe fn on_present<R>(
        &self,
        entry: PresentEntry,
        surface: SurfaceId,
        forward: impl FnOnce() -> R,
    ) -> R {
        let frame = self.counters.observe();

        let Some(framework) = self.services.get() else {
            self.counters.record_skipped();
            return forward();
        };

        self.heartbeat(frame, entry);

        if !self.binding.is_bound_to(surface) {
            if let Err(e) = self.binding.rebind(surface, framework.loader.as_ref()) {
                tracing::warn!(
                    "Binding {:?} failed, frames skipped until it changes: {}",
                    surface,
                    e
                );
            }
        }

        if self.binding.is_ready() {
            framework.loader.process_queue();
            framework.textures.advance();
            framework.ui.render();
            self.counters.record_rendered();
        } else {
            let skipped_before = self.counters.record_skipped();
            if skipped_before < self.settings.skip_log_limit {
                tracing::warn!(
                    "Frame {} skipped ({:?}): no device bound for {:?}",
                    frame,
                    entry,
                    surface
                );
            }
        }

        forward()
    }

    fn heartbeat(&self, frame: u64, entry: PresentEntry) {
        let interval = self.settings.heartbeat_interval;
        if interval == 0 || frame % interval != 0 {
            return;
        }

        tracing::debug!(
            thread = ?std::thread::current().id(),
            ?entry,
            rendered = self.counters.rendered(),
            skipped = self.counters.skipped(),
            "Present heartbeat at frame {}",
            frame
        );
    }
}
