//! framehook Engine - Collaborator Interfaces and Global Storage
//!
//! This crate handles:
//! - The narrow interfaces through which the interception layer drives the
//!   addon framework (loader, textures, UI, event bus, data link, input)
//! - Storing the framework's collaborators in a process-wide, init-once slot
//!
//! # Architecture
//!
//! The framework registers its collaborators once, before hooks are
//! installed, via [`init_framework`]. Detours resolve them lazily through
//! [`try_framework`]; a missing framework degrades every detour to plain
//! forwarding.
//!
//! # Thread Safety
//!
//! Every collaborator is `Send + Sync`: present may run on more than one
//! thread when the host uses frame generation.

pub mod error;
pub mod globals;
pub mod services;

pub use error::ContextError;
pub use globals::{init_framework, is_framework_initialized, try_framework, Framework, InputChain};
pub use services::{
    AddonLoader, DataLink, EventBus, MessageConsumer, MessageObserver, ShutdownSignal,
    TextureService, UiLayer,
};
