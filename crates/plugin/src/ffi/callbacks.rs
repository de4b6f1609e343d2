//! C callback table adapted onto the engine's collaborator traits

use std::ffi::{c_char, c_void, CString};
use std::ptr::NonNull;
use std::sync::Arc;

use framehook_engine::{
    AddonLoader, ContextError, DataLink, EventBus, Framework, InputChain, MessageConsumer,
    MessageObserver, ShutdownSignal, TextureService, UiLayer,
};
use framehook_sdk::{Disposition, WindowMessage};

pub type NotifyFn = unsafe extern "C" fn(user_data: *mut c_void);
pub type RaiseFn = unsafe extern "C" fn(user_data: *mut c_void, topic: *const c_char);
pub type ResourceFn = unsafe extern "C" fn(user_data: *mut c_void, id: *const c_char) -> *mut c_void;
/// Returns true when the message was handled
pub type ConsumeFn = unsafe extern "C" fn(user_data: *mut c_void, message: *const WindowMessage) -> bool;
pub type ObserveFn = unsafe extern "C" fn(user_data: *mut c_void, message: *const WindowMessage);
pub type ShutdownFn = unsafe extern "C" fn(user_data: *mut c_void, reason: u32);

/// Framework entry points, passed to `framehook_attach`
///
/// Every callback except `pointer_fix` is required. Each receives
/// `user_data` as its first argument. Callbacks may be invoked from any
/// thread that presents or pumps the host window.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FrameworkCallbacks {
    pub user_data: *mut c_void,

    pub loader_initialize: Option<NotifyFn>,
    pub loader_process_queue: Option<NotifyFn>,
    pub textures_advance: Option<NotifyFn>,
    pub ui_render: Option<NotifyFn>,
    pub ui_shutdown: Option<NotifyFn>,
    pub raise_event: Option<RaiseFn>,
    pub get_resource: Option<ResourceFn>,

    pub consume_loader: Option<ConsumeFn>,
    pub consume_raw_input: Option<ConsumeFn>,
    pub consume_ui: Option<ConsumeFn>,
    pub consume_input_binds: Option<ConsumeFn>,

    pub shutdown: Option<ShutdownFn>,
    pub pointer_fix: Option<ObserveFn>,
}

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("Callback table is null")]
    NullTable,

    #[error("Missing required callback: {0}")]
    MissingCallback(&'static str),

    #[error(transparent)]
    Context(#[from] ContextError),
}

fn require<T>(callback: Option<T>, name: &'static str) -> Result<T, AttachError> {
    callback.ok_or(AttachError::MissingCallback(name))
}

/// Opaque framework pointer handed back on every call
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// SAFETY: the framework guarantees its callbacks are callable from any thread
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct CallbackLoader {
    user_data: UserData,
    initialize: NotifyFn,
    process_queue: NotifyFn,
}

impl AddonLoader for CallbackLoader {
    fn initialize(&self) {
        unsafe { (self.initialize)(self.user_data.0) }
    }

    fn process_queue(&self) {
        unsafe { (self.process_queue)(self.user_data.0) }
    }
}

struct CallbackTextures {
    user_data: UserData,
    advance: NotifyFn,
}

impl TextureService for CallbackTextures {
    fn advance(&self) {
        unsafe { (self.advance)(self.user_data.0) }
    }
}

struct CallbackUi {
    user_data: UserData,
    render: NotifyFn,
    shutdown: NotifyFn,
}

impl UiLayer for CallbackUi {
    fn render(&self) {
        unsafe { (self.render)(self.user_data.0) }
    }

    fn shutdown(&self) {
        unsafe { (self.shutdown)(self.user_data.0) }
    }
}

struct CallbackEvents {
    user_data: UserData,
    raise: RaiseFn,
}

impl EventBus for CallbackEvents {
    fn raise(&self, topic: &str) {
        match CString::new(topic) {
            Ok(topic) => unsafe { (self.raise)(self.user_data.0, topic.as_ptr()) },
            Err(e) => tracing::warn!("Event topic {:?} not raised: {}", topic, e),
        }
    }
}

struct CallbackDataLink {
    user_data: UserData,
    resource: ResourceFn,
}

impl DataLink for CallbackDataLink {
    fn resource(&self, id: &str) -> Option<NonNull<c_void>> {
        let id = CString::new(id).ok()?;
        NonNull::new(unsafe { (self.resource)(self.user_data.0, id.as_ptr()) })
    }
}

struct CallbackConsumer {
    user_data: UserData,
    consume: ConsumeFn,
}

impl MessageConsumer for CallbackConsumer {
    fn consume(&self, message: &WindowMessage) -> Disposition {
        if unsafe { (self.consume)(self.user_data.0, message) } {
            Disposition::Handled
        } else {
            Disposition::Continue
        }
    }
}

struct CallbackShutdown {
    user_data: UserData,
    shutdown: ShutdownFn,
}

impl ShutdownSignal for CallbackShutdown {
    fn shutdown(&self, reason: u32) {
        unsafe { (self.shutdown)(self.user_data.0, reason) }
    }
}

struct CallbackObserver {
    user_data: UserData,
    observe: ObserveFn,
}

impl MessageObserver for CallbackObserver {
    fn observe(&self, message: &WindowMessage) {
        unsafe { (self.observe)(self.user_data.0, message) }
    }
}

impl FrameworkCallbacks {
    /// Validate the table and wrap each entry in its collaborator trait
    pub fn into_framework(self) -> Result<Framework, AttachError> {
        let user_data = UserData(self.user_data);

        let consumer = |callback: Option<ConsumeFn>,
                        name: &'static str|
         -> Result<Arc<dyn MessageConsumer>, AttachError> {
            Ok(Arc::new(CallbackConsumer {
                user_data,
                consume: require(callback, name)?,
            }))
        };

        let input = InputChain::new(
            consumer(self.consume_loader, "consume_loader")?,
            consumer(self.consume_raw_input, "consume_raw_input")?,
            consumer(self.consume_ui, "consume_ui")?,
            consumer(self.consume_input_binds, "consume_input_binds")?,
        );

        let framework = Framework::new(
            Arc::new(CallbackLoader {
                user_data,
                initialize: require(self.loader_initialize, "loader_initialize")?,
                process_queue: require(self.loader_process_queue, "loader_process_queue")?,
            }),
            Arc::new(CallbackTextures {
                user_data,
                advance: require(self.textures_advance, "textures_advance")?,
            }),
            Arc::new(CallbackUi {
                user_data,
                render: require(self.ui_render, "ui_render")?,
                shutdown: require(self.ui_shutdown, "ui_shutdown")?,
            }),
            Arc::new(CallbackEvents {
                user_data,
                raise: require(self.raise_event, "raise_event")?,
            }),
            Arc::new(CallbackDataLink {
                user_data,
                resource: require(self.get_resource, "get_resource")?,
            }),
            input,
            Arc::new(CallbackShutdown {
                user_data,
                shutdown: require(self.shutdown, "shutdown")?,
            }),
        );

        Ok(match self.pointer_fix {
            Some(observe) => {
                framework.with_pointer_fix(Arc::new(CallbackObserver { user_data, observe }))
            }
            None => framework,
        })
    }
}
