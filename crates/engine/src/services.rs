//! Collaborator interfaces
//!
//! Each trait is the whole surface the interception layer needs from one
//! framework subsystem. Implementations live in the framework.

use std::ffi::c_void;
use std::ptr::NonNull;

use framehook_sdk::{Disposition, WindowMessage};

/// Addon loader
pub trait AddonLoader: Send + Sync {
    /// A usable rendering device now exists
    fn initialize(&self);

    /// Drain pending load/unload work
    fn process_queue(&self);
}

/// Texture streaming
pub trait TextureService: Send + Sync {
    /// Advance pending texture uploads by one frame
    fn advance(&self);
}

/// UI layer
pub trait UiLayer: Send + Sync {
    /// Render one UI frame into the current back buffer
    fn render(&self);

    /// Release render targets ahead of a buffer resize
    fn shutdown(&self);
}

/// Event bus
pub trait EventBus: Send + Sync {
    fn raise(&self, topic: &str);
}

/// Shared resource table
pub trait DataLink: Send + Sync {
    /// Look up a shared resource by id
    fn resource(&self, id: &str) -> Option<NonNull<c_void>>;
}

/// One link in the window message chain
pub trait MessageConsumer: Send + Sync {
    /// Offer a message; [`Disposition::Handled`] keeps it from the host
    fn consume(&self, message: &WindowMessage) -> Disposition;
}

/// Framework shutdown entry point
pub trait ShutdownSignal: Send + Sync {
    /// Begin shutdown; `reason` is the message code that triggered it
    fn shutdown(&self, reason: u32);
}

/// Sees every message that reaches the host's window procedure
pub trait MessageObserver: Send + Sync {
    fn observe(&self, message: &WindowMessage);
}
