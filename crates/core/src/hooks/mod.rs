//! Hook system
//!
//! - Jump-chain resolution, so interceptors installed by other tools are
//!   composed with rather than overwritten
//! - Inline detours built with iced-x86, placed in near trampolines
//! - The interception registry, one entry per rendering entry point
//! - Installation of the render hooks from a throwaway swap chain

pub mod freeze;
pub mod inline;
pub mod installer;
pub mod jmp;
pub mod registry;
pub mod trampoline;

pub use freeze::ThreadFreeze;
pub use inline::{HookError, InlineDetour, InlinePatcher};
pub use installer::{install_render_hooks, DetourSet, DispatchSource, InstallError, InstalledHooks};
pub use jmp::follow_jmp_chain;
pub use registry::{registry, InterceptKey, InterceptionRegistry, Patcher, Redirection};
