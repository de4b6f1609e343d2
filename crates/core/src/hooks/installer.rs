//! Render hook installation
//!
//! Dispatch tables are shared by every swap chain of a process, so the
//! entries read from a throwaway swap chain are the ones the host calls.
//! The throwaway objects exist only for the duration of the read.

use bitflags::bitflags;
use parking_lot::Mutex;

use framehook_sdk::HookSlot;

use super::inline::HookError;
use super::jmp::follow_jmp_chain;
use super::registry::InterceptionRegistry;
use crate::config::HookConfig;

bitflags! {
    /// Interceptions that are enabled
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstalledHooks: u32 {
        const PRESENT = 1 << 0;
        const RESIZE_BUFFERS = 1 << 1;
        const PRESENT1 = 1 << 2;
    }
}

impl InstalledHooks {
    /// Enabled interceptions of `registry`
    pub fn current(registry: &InterceptionRegistry) -> Self {
        let mut hooks = Self::empty();
        hooks.set(Self::PRESENT, registry.is_enabled(HookSlot::Present));
        hooks.set(
            Self::RESIZE_BUFFERS,
            registry.is_enabled(HookSlot::ResizeBuffers),
        );
        hooks.set(Self::PRESENT1, registry.is_enabled(HookSlot::Present1));
        hooks
    }
}

/// Error type for hook installation
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Failed to create temporary window: {0}")]
    Window(String),

    #[error("Failed to create temporary device: {0}")]
    Device(String),

    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Dispatch table of a live swap chain
pub trait DispatchSource {
    /// Entry `index` of the swap chain's table
    fn slot(&self, index: usize) -> *const u8;

    /// Entry `index` of the extended (`IDXGISwapChain1`) table
    fn extended_slot(&self, index: usize) -> Result<*const u8, String>;
}

/// Functions the targets are redirected to
#[derive(Debug, Clone, Copy)]
pub struct DetourSet {
    pub present: *const (),
    pub present1: *const (),
    pub resize_buffers: *const (),
}

static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Intercept Present, ResizeBuffers and (optionally) Present1
///
/// Idempotent: returns the current set when the hooks are already enabled,
/// and re-enables the registered set after a shutdown. `open` builds the
/// throwaway swap chain; it is dropped before any code is patched. Mandatory
/// failures of a first installation leave the registry empty and the host
/// unhooked.
pub fn install_render_hooks<S, F>(
    registry: &InterceptionRegistry,
    config: &HookConfig,
    detours: &DetourSet,
    open: F,
) -> Result<InstalledHooks, InstallError>
where
    S: DispatchSource,
    F: FnOnce() -> Result<S, InstallError>,
{
    if config.bypass {
        tracing::info!("Bypass set, render hooks not installed");
        return Ok(InstalledHooks::empty());
    }

    let _guard = INSTALL_LOCK.lock();

    if registry.is_enabled(HookSlot::Present) {
        tracing::debug!("Render hooks already installed");
        return Ok(InstalledHooks::current(registry));
    }

    // Shut down earlier: the entries and trampolines are still registered
    if registry.is_registered(HookSlot::Present) {
        registry.enable_all().map_err(|e| {
            tracing::error!("Re-enabling render hooks failed: {}", e);
            InstallError::from(e)
        })?;
        let installed = InstalledHooks::current(registry);
        tracing::info!("Render hooks re-enabled: {:?}", installed);
        return Ok(installed);
    }

    let source = open().map_err(|e| {
        tracing::error!("Render hook installation aborted: {}", e);
        e
    })?;

    let registered = unsafe { register_targets(registry, config, detours, &source) };
    drop(source);

    if let Err(e) = registered.and_then(|()| registry.enable_all().map_err(InstallError::from)) {
        tracing::error!("Render hook installation failed: {}", e);
        registry.remove_all();
        return Err(e);
    }

    let installed = InstalledHooks::current(registry);
    tracing::info!("Render hooks installed: {:?}", installed);
    Ok(installed)
}

unsafe fn register_targets<S: DispatchSource>(
    registry: &InterceptionRegistry,
    config: &HookConfig,
    detours: &DetourSet,
    source: &S,
) -> Result<(), InstallError> {
    for slot in [HookSlot::Present, HookSlot::ResizeBuffers, HookSlot::Present1] {
        let (entry, detour) = match slot {
            HookSlot::Present => (Ok(source.slot(slot.vtable_index())), detours.present),
            HookSlot::ResizeBuffers => (
                Ok(source.slot(slot.vtable_index())),
                detours.resize_buffers,
            ),
            HookSlot::Present1 => {
                if !config.hook_present1 {
                    tracing::debug!("Present1 interception disabled by config");
                    continue;
                }
                (
                    source
                        .extended_slot(slot.vtable_index())
                        .map_err(InstallError::Device),
                    detours.present1,
                )
            }
        };

        let created = entry
            .and_then(|entry| resolve(entry, slot))
            .and_then(|target| {
                registry
                    .create(slot, target, detour)
                    .map_err(InstallError::from)
            });

        match created {
            Ok(_) => {}
            Err(e) if slot.is_optional() => {
                tracing::warn!("{} not intercepted: {}", slot.name(), e)
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

unsafe fn resolve(entry: *const u8, slot: HookSlot) -> Result<*const u8, InstallError> {
    if entry.is_null() {
        return Err(InstallError::Device(format!(
            "null dispatch entry for {}",
            slot.name()
        )));
    }

    let target = follow_jmp_chain(entry);
    tracing::debug!("{}: entry {:p}, resolved {:p}", slot.name(), entry, target);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::registry::mock::mock_registry;
    use framehook_sdk::{PRESENT1_SLOT, PRESENT_SLOT, RESIZE_BUFFERS_SLOT};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // push rbp ; mov rbp, rsp ; pop rbp ; ret
    const FUNCTION: [u8; 6] = [0x55, 0x48, 0x89, 0xE5, 0x5D, 0xC3];

    /// Functions at offsets 0, 64, 128 and 192 of one buffer
    struct FakeSwapChain {
        code: Vec<u8>,
        extended: bool,
    }

    impl FakeSwapChain {
        fn new(extended: bool) -> Self {
            let mut code = vec![0xCC; 256];
            for offset in [0, 64, 128, 192] {
                code[offset..offset + FUNCTION.len()].copy_from_slice(&FUNCTION);
            }
            Self { code, extended }
        }

        fn at(&self, offset: usize) -> *const u8 {
            unsafe { self.code.as_ptr().add(offset) }
        }
    }

    impl DispatchSource for &FakeSwapChain {
        fn slot(&self, index: usize) -> *const u8 {
            match index {
                PRESENT_SLOT => self.at(0),
                RESIZE_BUFFERS_SLOT => self.at(64),
                _ => std::ptr::null(),
            }
        }

        fn extended_slot(&self, index: usize) -> Result<*const u8, String> {
            match (self.extended, index) {
                (true, PRESENT1_SLOT) => Ok(self.at(128)),
                _ => Err("IDXGISwapChain1 not supported".to_string()),
            }
        }
    }

    fn detours() -> DetourSet {
        DetourSet {
            present: 0x10 as *const (),
            present1: 0x20 as *const (),
            resize_buffers: 0x30 as *const (),
        }
    }

    #[test]
    fn test_installs_all_three() {
        let (registry, _) = mock_registry();
        let chain = FakeSwapChain::new(true);

        let installed =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain))
                .unwrap();

        assert_eq!(installed, InstalledHooks::all());
        assert_eq!(registry.target(HookSlot::Present), Some(chain.at(0)));
        assert_eq!(registry.target(HookSlot::ResizeBuffers), Some(chain.at(64)));
        assert_eq!(registry.target(HookSlot::Present1), Some(chain.at(128)));
        assert_eq!(registry.detour(HookSlot::Present1), Some(0x20 as *const ()));
    }

    #[test]
    fn test_installation_is_idempotent() {
        let (registry, state) = mock_registry();
        let chain = FakeSwapChain::new(true);
        let opened = AtomicUsize::new(0);
        let open = || {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(&chain)
        };

        let first = install_render_hooks(&registry, &HookConfig::default(), &detours(), open);
        let second = install_render_hooks(&registry, &HookConfig::default(), &detours(), open);

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(state.created.load(Ordering::SeqCst), 3);
        assert_eq!(registry.len(), 3);
        assert_eq!(state.active.lock().len(), 3);
    }

    #[test]
    fn test_install_after_shutdown_reenables_registrations() {
        let (registry, state) = mock_registry();
        let chain = FakeSwapChain::new(true);
        let opened = AtomicUsize::new(0);
        let open = || {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(&chain)
        };

        let first =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), open).unwrap();
        registry.disable_all().unwrap();
        assert!(state.active.lock().is_empty());
        assert_eq!(registry.len(), 3);

        let second =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), open).unwrap();

        assert_eq!(first, InstalledHooks::all());
        assert_eq!(second, first);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(state.created.load(Ordering::SeqCst), 3);
        assert_eq!(registry.len(), 3);
        assert_eq!(state.active.lock().len(), 3);
        assert!(registry.is_enabled(HookSlot::Present));
    }

    #[test]
    fn test_failed_reenable_keeps_registrations() {
        let (registry, state) = mock_registry();
        let chain = FakeSwapChain::new(true);

        install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain))
            .unwrap();
        registry.disable_all().unwrap();
        *state.fail_enable_at.lock() = Some(chain.at(64));

        let result =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain));

        assert!(matches!(result, Err(InstallError::Hook(HookError::EnableFailed { .. }))));
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_enabled(HookSlot::Present));
    }

    #[test]
    fn test_bypass_installs_nothing() {
        let (registry, _) = mock_registry();
        let config = HookConfig {
            bypass: true,
            ..Default::default()
        };

        let installed = install_render_hooks(&registry, &config, &detours(), || {
            Err::<&FakeSwapChain, _>(InstallError::Window("must not be called".to_string()))
        })
        .unwrap();

        assert!(installed.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_extended_interface_keeps_mandatory_hooks() {
        let (registry, _) = mock_registry();
        let chain = FakeSwapChain::new(false);

        let installed =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain))
                .unwrap();

        assert_eq!(
            installed,
            InstalledHooks::PRESENT | InstalledHooks::RESIZE_BUFFERS
        );
        assert!(!registry.is_registered(HookSlot::Present1));
    }

    #[test]
    fn test_present1_failure_is_not_fatal() {
        let (registry, state) = mock_registry();
        let chain = FakeSwapChain::new(true);
        *state.fail_create_at.lock() = Some(chain.at(128));

        let installed =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain))
                .unwrap();

        assert!(installed.contains(InstalledHooks::PRESENT));
        assert!(!installed.contains(InstalledHooks::PRESENT1));
    }

    #[test]
    fn test_present1_disabled_by_config() {
        let (registry, _) = mock_registry();
        let chain = FakeSwapChain::new(true);
        let config = HookConfig {
            hook_present1: false,
            ..Default::default()
        };

        let installed = install_render_hooks(&registry, &config, &detours(), || Ok(&chain)).unwrap();
        assert!(!installed.contains(InstalledHooks::PRESENT1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_device_failure_leaves_host_unhooked() {
        let (registry, _) = mock_registry();

        let result = install_render_hooks(&registry, &HookConfig::default(), &detours(), || {
            Err::<&FakeSwapChain, _>(InstallError::Device("no adapter".to_string()))
        });

        assert!(matches!(result, Err(InstallError::Device(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mandatory_failure_removes_partial_registration() {
        let (registry, state) = mock_registry();
        let chain = FakeSwapChain::new(true);
        *state.fail_create_at.lock() = Some(chain.at(64));

        let result =
            install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain));

        assert!(matches!(result, Err(InstallError::Hook(_))));
        assert!(registry.is_empty());
        assert!(state.active.lock().is_empty());
    }

    #[test]
    fn test_jump_chains_are_followed() {
        let (registry, _) = mock_registry();
        let mut chain = FakeSwapChain::new(true);

        // Present entry is a foreign detour: jmp rel32 -> offset 192
        let rel = (192i32 - 5).to_le_bytes();
        chain.code[0] = 0xE9;
        chain.code[1..5].copy_from_slice(&rel);

        install_render_hooks(&registry, &HookConfig::default(), &detours(), || Ok(&chain))
            .unwrap();

        assert_eq!(registry.target(HookSlot::Present), Some(chain.at(192)));
    }
}
