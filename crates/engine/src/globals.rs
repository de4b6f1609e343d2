//! Global framework storage
//!
//! The framework's collaborators are registered once, before any hook is
//! installed, and stored here. Access is thread-safe via OnceLock.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use framehook_sdk::{LinkData, LINK_RESOURCE_ID};

use crate::error::ContextError;
use crate::services::{
    AddonLoader, DataLink, EventBus, MessageConsumer, MessageObserver, ShutdownSignal,
    TextureService, UiLayer,
};

/// Window message consumers in their fixed priority order
pub struct InputChain {
    pub loader: Arc<dyn MessageConsumer>,
    pub raw_input: Arc<dyn MessageConsumer>,
    pub ui: Arc<dyn MessageConsumer>,
    pub input_binds: Arc<dyn MessageConsumer>,
}

impl InputChain {
    pub fn new(
        loader: Arc<dyn MessageConsumer>,
        raw_input: Arc<dyn MessageConsumer>,
        ui: Arc<dyn MessageConsumer>,
        input_binds: Arc<dyn MessageConsumer>,
    ) -> Self {
        Self {
            loader,
            raw_input,
            ui,
            input_binds,
        }
    }

    /// Consumers in the order messages are offered to them
    pub fn ordered(&self) -> [(&'static str, &dyn MessageConsumer); 4] {
        [
            ("loader", self.loader.as_ref()),
            ("raw_input", self.raw_input.as_ref()),
            ("ui", self.ui.as_ref()),
            ("input_binds", self.input_binds.as_ref()),
        ]
    }
}

/// Collaborators of the addon framework
pub struct Framework {
    pub loader: Arc<dyn AddonLoader>,
    pub textures: Arc<dyn TextureService>,
    pub ui: Arc<dyn UiLayer>,
    pub events: Arc<dyn EventBus>,
    pub data_link: Arc<dyn DataLink>,
    pub input: InputChain,
    pub shutdown: Arc<dyn ShutdownSignal>,

    /// Pointer-position correction run before messages reach the host (optional)
    pub pointer_fix: Option<Arc<dyn MessageObserver>>,
}

/// Global framework storage
static FRAMEWORK: OnceLock<Arc<Framework>> = OnceLock::new();

/// Register the framework
///
/// Called once by the framework before hooks are installed. Returns error
/// if already initialized.
pub fn init_framework(framework: Framework) -> Result<(), ContextError> {
    FRAMEWORK
        .set(Arc::new(framework))
        .map_err(|_| ContextError::AlreadyInitialized)?;
    tracing::info!("Framework collaborators registered");
    Ok(())
}

/// Get the registered framework, if any
pub fn try_framework() -> Option<Arc<Framework>> {
    FRAMEWORK.get().cloned()
}

/// Check if the framework is registered
pub fn is_framework_initialized() -> bool {
    FRAMEWORK.get().is_some()
}

impl Framework {
    /// Create a new Framework
    ///
    /// # Arguments
    /// * `loader` - Addon loader
    /// * `textures` - Texture streaming service
    /// * `ui` - UI layer
    /// * `events` - Event bus
    /// * `data_link` - Shared resource table
    /// * `input` - Window message consumers
    /// * `shutdown` - Framework shutdown entry point
    pub fn new(
        loader: Arc<dyn AddonLoader>,
        textures: Arc<dyn TextureService>,
        ui: Arc<dyn UiLayer>,
        events: Arc<dyn EventBus>,
        data_link: Arc<dyn DataLink>,
        input: InputChain,
        shutdown: Arc<dyn ShutdownSignal>,
    ) -> Self {
        Self {
            loader,
            textures,
            ui,
            events,
            data_link,
            input,
            shutdown,
            pointer_fix: None,
        }
    }

    /// Set the pointer-position correction
    pub fn with_pointer_fix(mut self, observer: Arc<dyn MessageObserver>) -> Self {
        self.pointer_fix = Some(observer);
        self
    }

    /// Resolve the shared link record
    pub fn link_data(&self) -> Option<NonNull<LinkData>> {
        self.data_link
            .resource(LINK_RESOURCE_ID)
            .map(NonNull::<c_void>::cast)
    }
}
