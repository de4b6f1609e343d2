//! Interception registry
//!
//! One entry per logical entry point (Present, Present1, ResizeBuffers),
//! keyed by the resolved target address. Entries are created disabled and
//! switched on together by [`InterceptionRegistry::enable_all`].

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};
use std::sync::LazyLock;

use framehook_sdk::HookSlot;

use super::freeze::ThreadFreeze;
use super::inline::{HookError, InlinePatcher};

new_key_type! {
    /// Handle for a registered interception
    pub struct InterceptKey;
}

/// Builds redirections for a target
pub trait Patcher: Send + Sync {
    /// Prepare a redirection from `target` to `detour` without enabling it
    ///
    /// # Safety
    /// `target` must be the entry of a function and `detour` a function with
    /// the same signature and calling convention.
    unsafe fn create(
        &self,
        target: *const u8,
        detour: *const (),
    ) -> Result<Box<dyn Redirection>, HookError>;
}

/// An installed (possibly disabled) redirection
pub trait Redirection: Send + Sync {
    /// Patched function entry
    fn target(&self) -> *const u8;

    /// Entry that runs the original function
    fn trampoline(&self) -> *const ();

    /// Route calls of the target to the detour
    ///
    /// # Safety
    /// No thread may be executing the patched bytes.
    unsafe fn enable(&self) -> Result<(), HookError>;

    /// Restore the original bytes
    ///
    /// # Safety
    /// No thread may be executing the patched bytes.
    unsafe fn disable(&self) -> Result<(), HookError>;
}

/// Internal storage for an interception
struct InterceptEntry {
    slot: HookSlot,
    redirection: Box<dyn Redirection>,
    detour: *const (),
    enabled: bool,
}

// SAFETY: entries are protected by RwLock; `detour` is a function address
unsafe impl Send for InterceptEntry {}
unsafe impl Sync for InterceptEntry {}

/// Registered interceptions of the rendering entry points
pub struct InterceptionRegistry {
    patcher: Box<dyn Patcher>,
    entries: RwLock<SlotMap<InterceptKey, InterceptEntry>>,
}

/// Process-wide registry backed by inline detours
static REGISTRY: LazyLock<InterceptionRegistry> =
    LazyLock::new(|| InterceptionRegistry::new(Box::new(InlinePatcher)));

/// Get the process-wide registry
pub fn registry() -> &'static InterceptionRegistry {
    &REGISTRY
}

impl InterceptionRegistry {
    pub fn new(patcher: Box<dyn Patcher>) -> Self {
        Self {
            patcher,
            entries: RwLock::new(SlotMap::with_key()),
        }
    }

    /// Register a disabled redirection of `target` to `detour` for `slot`
    ///
    /// # Safety
    /// See [`Patcher::create`].
    pub unsafe fn create(
        &self,
        slot: HookSlot,
        target: *const u8,
        detour: *const (),
    ) -> Result<InterceptKey, HookError> {
        tracing::debug!(
            "Creating interception '{}' at {:p} -> {:p}",
            slot.name(),
            target,
            detour
        );

        let mut entries = self.entries.write();

        if entries
            .values()
            .any(|e| e.slot == slot || e.redirection.target() == target)
        {
            return Err(HookError::AlreadyCreated(target as usize));
        }

        let redirection = self.patcher.create(target, detour)?;
        let key = entries.insert(InterceptEntry {
            slot,
            redirection,
            detour,
            enabled: false,
        });

        Ok(key)
    }

    /// Enable every registered redirection while other threads are frozen
    ///
    /// All-or-nothing: if one fails, those enabled by this call are disabled
    /// again before the error is returned.
    pub fn enable_all(&self) -> Result<(), HookError> {
        let mut entries = self.entries.write();
        // Sized up front: nothing may allocate once threads are frozen
        let mut enabled_now = Vec::with_capacity(entries.len());

        let result = {
            let _freeze = ThreadFreeze::new();
            let mut result = Ok(());

            for (key, entry) in entries.iter_mut().filter(|(_, e)| !e.enabled) {
                match unsafe { entry.redirection.enable() } {
                    Ok(()) => {
                        entry.enabled = true;
                        enabled_now.push(key);
                    }
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }

            if result.is_err() {
                for key in &enabled_now {
                    if let Some(entry) = entries.get_mut(*key) {
                        if unsafe { entry.redirection.disable() }.is_ok() {
                            entry.enabled = false;
                        }
                    }
                }
            }

            result
        };

        // Logging may take locks a frozen thread holds, so only after thaw
        match &result {
            Ok(()) => {
                for key in &enabled_now {
                    if let Some(entry) = entries.get(*key) {
                        tracing::info!(
                            "Enabled interception '{}' at {:p}",
                            entry.slot.name(),
                            entry.redirection.target()
                        );
                    }
                }
            }
            Err(e) => tracing::error!("Enabling interceptions failed, rolled back: {}", e),
        }

        result
    }

    /// Restore the original code of every enabled redirection
    ///
    /// Entries stay registered: a detour already running still needs its
    /// trampoline.
    pub fn disable_all(&self) -> Result<(), HookError> {
        let mut entries = self.entries.write();
        let mut first_error = None;

        {
            let _freeze = ThreadFreeze::new();
            for entry in entries.values_mut().filter(|e| e.enabled) {
                match unsafe { entry.redirection.disable() } {
                    Ok(()) => entry.enabled = false,
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => {
                tracing::warn!("Disabling interceptions failed: {}", e);
                Err(e)
            }
            None => {
                tracing::info!("Disabled all interceptions");
                Ok(())
            }
        }
    }

    /// Drop every disabled entry
    ///
    /// Enabled entries are kept; the caller disables first.
    pub fn remove_all(&self) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| {
            if !entry.enabled {
                tracing::debug!("Removed interception '{}'", entry.slot.name());
            }
            entry.enabled
        });
    }

    /// Trampoline to the original function for `slot`
    pub fn original(&self, slot: HookSlot) -> Option<*const ()> {
        self.entries
            .read()
            .values()
            .find(|e| e.slot == slot)
            .map(|e| e.redirection.trampoline())
    }

    /// Detour registered for `slot`
    pub fn detour(&self, slot: HookSlot) -> Option<*const ()> {
        self.entries
            .read()
            .values()
            .find(|e| e.slot == slot)
            .map(|e| e.detour)
    }

    /// Check if `slot` has an enabled redirection
    pub fn is_enabled(&self, slot: HookSlot) -> bool {
        self.entries
            .read()
            .values()
            .any(|e| e.slot == slot && e.enabled)
    }

    /// Check if `slot` is registered, enabled or not
    pub fn is_registered(&self, slot: HookSlot) -> bool {
        self.entries.read().values().any(|e| e.slot == slot)
    }

    /// Slot registered for a resolved target address
    pub fn slot_for_target(&self, target: *const u8) -> Option<HookSlot> {
        self.entries
            .read()
            .values()
            .find(|e| e.redirection.target() == target)
            .map(|e| e.slot)
    }

    /// Resolved target address of `slot`
    pub fn target(&self, slot: HookSlot) -> Option<*const u8> {
        self.entries
            .read()
            .values()
            .find(|e| e.slot == slot)
            .map(|e| e.redirection.target())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
