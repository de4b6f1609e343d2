//! ResizeBuffers pipeline
//!
//! Addons read the link record on their own schedule, so the new dimensions
//! are written into it before the resize event is raised.

use std::sync::Arc;

use framehook_sdk::EV_WINDOW_RESIZED;

use crate::binding::DeviceBinding;
use crate::services::ServiceCell;

pub struct ResizePipeline {
    services: Arc<ServiceCell>,
    binding: Arc<DeviceBinding>,
}

impl ResizePipeline {
    pub fn new(services: Arc<ServiceCell>, binding: Arc<DeviceBinding>) -> Self {
        Self { services, binding }
    }

    /// Propagate new buffer dimensions, then `forward` the resize to the host
    ///
    /// Dimensions are passed through as given, including 0 ("use the
    /// window's client size").
    pub fn on_resize<R>(&self, width: u32, height: u32, forward: impl FnOnce() -> R) -> R {
        let framework = self.services.get();

        // Render targets go before the buffers they point into change size
        if let Some(framework) = &framework {
            framework.ui.shutdown();
        }

        self.binding.set_dimensions(width, height);

        if let Some(framework) = &framework {
            match framework.link_data() {
                Some(link) => {
                    // SAFETY: the data link hands out a live, framework-owned LinkData
                    unsafe {
                        let link = link.as_ptr();
                        (*link).width = width;
                        (*link).height = height;
                    }
                }
                None => tracing::debug!("Link record not available, dimensions not shared"),
            }

            framework.events.raise(EV_WINDOW_RESIZED);
            tracing::debug!("Buffers resized to {}x{}", width, height);
        }

        forward()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::mock::mock_binding;
    use crate::services::mock::{failing_cell, recording_framework, resolved_cell, Consumer};
    use framehook_engine::{Framework, InputChain, MessageConsumer, UiLayer};
    use parking_lot::Mutex;
    use std::sync::OnceLock;

    /// UI layer that notes the cached dimensions it sees at shutdown
    #[derive(Default)]
    struct DimensionProbe {
        binding: OnceLock<Arc<DeviceBinding>>,
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl UiLayer for DimensionProbe {
        fn render(&self) {}
        fn shutdown(&self) {
            if let Some(binding) = self.binding.get() {
                self.seen.lock().push(binding.dimensions());
            }
        }
    }

    #[test]
    fn test_record_written_before_event() {
        let (framework, recorder) = recording_framework();
        let (binding, _) = mock_binding();
        let pipeline = ResizePipeline::new(resolved_cell(framework), Arc::new(binding));

        let result = pipeline.on_resize(2560, 1440, || "forwarded");

        assert_eq!(result, "forwarded");
        assert_eq!(*recorder.log.link_at_raise.lock(), [(2560, 1440)]);
        assert_eq!(
            recorder.log.take(),
            ["ui.shutdown", "raise:EV_WINDOW_RESIZED"]
        );
        assert_eq!(pipeline.binding.dimensions(), (2560, 1440));
    }

    #[test]
    fn test_scaling_is_untouched() {
        let (framework, recorder) = recording_framework();
        unsafe { (*recorder.link.get()).scaling = 1.5 };
        let (binding, _) = mock_binding();
        let pipeline = ResizePipeline::new(resolved_cell(framework), Arc::new(binding));

        pipeline.on_resize(800, 600, || ());

        let link = recorder.link();
        assert_eq!((link.width, link.height, link.scaling), (800, 600, 1.5));
    }

    #[test]
    fn test_zero_dimensions_pass_through() {
        let (framework, recorder) = recording_framework();
        let (binding, _) = mock_binding();
        let pipeline = ResizePipeline::new(resolved_cell(framework), Arc::new(binding));

        pipeline.on_resize(0, 0, || ());
        assert_eq!(*recorder.log.link_at_raise.lock(), [(0, 0)]);
    }

    #[test]
    fn test_forwards_without_framework() {
        let (binding, _) = mock_binding();
        let pipeline = ResizePipeline::new(failing_cell(), Arc::new(binding));

        assert_eq!(pipeline.on_resize(1024, 768, || 7), 7);
        assert_eq!(pipeline.binding.dimensions(), (1024, 768));
    }

    #[test]
    fn test_ui_shuts_down_before_dimensions_change() {
        let (recording, recorder) = recording_framework();
        let ui = Arc::new(DimensionProbe::default());
        let consumer = |name: &'static str| -> Arc<dyn MessageConsumer> {
            Arc::new(Consumer {
                name,
                log: recorder.log.clone(),
            })
        };
        let framework = Framework::new(
            recording.loader.clone(),
            recording.textures.clone(),
            ui.clone(),
            recording.events.clone(),
            recording.data_link.clone(),
            InputChain::new(
                consumer("loader"),
                consumer("raw_input"),
                consumer("ui"),
                consumer("input_binds"),
            ),
            recording.shutdown.clone(),
        );

        let (binding, _) = mock_binding();
        let binding = Arc::new(binding);
        binding.set_dimensions(1280, 720);
        let _ = ui.binding.set(binding.clone());
        let pipeline = ResizePipeline::new(resolved_cell(Arc::new(framework)), binding);

        pipeline.on_resize(1920, 1080, || ());
        pipeline.on_resize(0, 0, || ());

        assert_eq!(*ui.seen.lock(), [(1280, 720), (1920, 1080)]);
        assert_eq!(pipeline.binding.dimensions(), (0, 0));
        assert_eq!(*recorder.log.link_at_raise.lock(), [(1920, 1080), (0, 0)]);
    }
}
