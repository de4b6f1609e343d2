//! Device binding
//!
//! Tracks which host swap chain the framework renders into. The identity
//! check on the hot path is a single atomic load; the rebind itself runs
//! under a mutex. Check and rebind are deliberately not one critical
//! section: two threads presenting a new surface at once may both rebind,
//! which only costs a redundant release and re-acquire.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use framehook_engine::AddonLoader;
use framehook_sdk::{SurfaceId, WindowHandle};

/// Error type for device binding
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Swap chain pointer is null")]
    NullSurface,

    #[error("Failed to get device from swap chain: {0}")]
    Device(String),

    #[error("Failed to read swap chain description: {0}")]
    Descriptor(String),

    #[error("Failed to attach window relay: {0}")]
    Window(String),
}

/// Reference-counted native handle, released on drop
pub trait DeviceHandle: Send + Sync {}

/// Device, immediate context and output window of a swap chain
pub struct AcquiredDevice {
    pub device: Box<dyn DeviceHandle>,
    pub context: Box<dyn DeviceHandle>,
    pub window: WindowHandle,
}

/// Queries a swap chain for its device
pub trait SurfaceProbe: Send + Sync {
    /// # Safety
    /// `surface` must identify a live swap chain for the duration of the call.
    unsafe fn acquire(&self, surface: SurfaceId) -> Result<AcquiredDevice, BindError>;
}

/// Routes a window's messages through the relay
pub trait WindowAttach: Send + Sync {
    /// Start relaying `window`, restoring any previously attached window first
    fn attach(&self, window: WindowHandle) -> Result<(), BindError>;

    /// Restore the original procedure of the attached window
    fn detach(&self);
}

/// State owned by the binding
#[derive(Default)]
struct RenderBinding {
    surface: SurfaceId,
    device: Option<Box<dyn DeviceHandle>>,
    context: Option<Box<dyn DeviceHandle>>,
    window: WindowHandle,
    relay_window: WindowHandle,
    width: u32,
    height: u32,
}

/// Snapshot of the binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingInfo {
    pub surface: SurfaceId,
    pub window: WindowHandle,
    pub relay_window: WindowHandle,
    pub width: u32,
    pub height: u32,
    pub ready: bool,
}

/// The one active rendering binding
pub struct DeviceBinding {
    bound: AtomicUsize,
    ready: AtomicBool,
    rebinds: AtomicU64,
    state: Mutex<RenderBinding>,
    probe: Box<dyn SurfaceProbe>,
    window_attach: Box<dyn WindowAttach>,
}

impl DeviceBinding {
    pub fn new(probe: Box<dyn SurfaceProbe>, window_attach: Box<dyn WindowAttach>) -> Self {
        Self {
            bound: AtomicUsize::new(SurfaceId::NONE.0),
            ready: AtomicBool::new(false),
            rebinds: AtomicU64::new(0),
            state: Mutex::new(RenderBinding::default()),
            probe,
            window_attach,
        }
    }

    /// Check if `surface` is the bound identity
    #[inline]
    pub fn is_bound_to(&self, surface: SurfaceId) -> bool {
        self.bound.load(Ordering::Acquire) == surface.0
    }

    /// Check if a device and context are held
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Number of successful rebinds
    pub fn rebind_count(&self) -> u64 {
        self.rebinds.load(Ordering::Relaxed)
    }

    /// Bind to `surface`, releasing whatever was bound before
    ///
    /// The identity is recorded even when acquisition fails, so a failed
    /// surface is not retried until the host presents a different one.
    /// On success the loader is told a device exists, outside the lock.
    ///
    /// # Safety
    /// See [`SurfaceProbe::acquire`].
    pub unsafe fn rebind(
        &self,
        surface: SurfaceId,
        loader: &dyn AddonLoader,
    ) -> Result<WindowHandle, BindError> {
        let window = {
            let mut state = self.state.lock();

            self.ready.store(false, Ordering::Release);
            self.bound.store(surface.0, Ordering::Release);
            state.surface = surface;

            // Release before acquiring the replacement
            state.context = None;
            state.device = None;
            state.window = WindowHandle::NULL;

            if surface.is_none() {
                return Err(BindError::NullSurface);
            }

            let acquired = self.probe.acquire(surface)?;
            state.device = Some(acquired.device);
            state.context = Some(acquired.context);
            state.window = acquired.window;

            if !acquired.window.is_null() && acquired.window != state.relay_window {
                match self.window_attach.attach(acquired.window) {
                    Ok(()) => state.relay_window = acquired.window,
                    Err(e) => tracing::warn!("Window relay not installed: {}", e),
                }
            }

            self.ready.store(true, Ordering::Release);
            self.rebinds.fetch_add(1, Ordering::Relaxed);
            acquired.window
        };

        tracing::info!("Bound to {:?}, window {:?}", surface, window);
        loader.initialize();
        Ok(window)
    }

    /// Record new back buffer dimensions
    pub fn set_dimensions(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    pub fn snapshot(&self) -> BindingInfo {
        let state = self.state.lock();
        BindingInfo {
            surface: state.surface,
            window: state.window,
            relay_window: state.relay_window,
            width: state.width,
            height: state.height,
            ready: self.is_ready(),
        }
    }

    /// Drop the device, context and window relay
    pub fn release(&self) {
        let mut state = self.state.lock();

        self.ready.store(false, Ordering::Release);
        self.bound.store(SurfaceId::NONE.0, Ordering::Release);
        state.context = None;
        state.device = None;
        state.surface = SurfaceId::NONE;

        if !state.relay_window.is_null() {
            self.window_attach.detach();
            state.relay_window = WindowHandle::NULL;
        }

        tracing::debug!("Device binding released");
    }
}


#[cfg(test)]
mod tests {
    use super::mock::mock_binding;
    use super::*;

    const A: SurfaceId = SurfaceId(0xA0);
    const B: SurfaceId = SurfaceId(0xB0);
    const BROKEN: SurfaceId = SurfaceId(0xC0);

    #[derive(Default)]
    struct CountingLoader(AtomicU64);

    impl AddonLoader for CountingLoader {
        fn initialize(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn process_queue(&self) {}
    }

    #[test]
    fn test_rebind_acquires_and_initializes_loader() {
        let (binding, log) = mock_binding();
        let loader = CountingLoader::default();

        assert!(!binding.is_ready());
        let window = unsafe { binding.rebind(A, &loader) }.unwrap();

        assert_eq!(window, WindowHandle(1));
        assert!(binding.is_ready());
        assert!(binding.is_bound_to(A));
        assert_eq!(loader.0.load(Ordering::SeqCst), 1);
        assert_eq!(log.live.load(Ordering::SeqCst), 2);
        assert_eq!(*log.attached.lock(), [WindowHandle(1)]);
    }

    #[test]
    fn test_rebind_same_identity_is_idempotent() {
        let (binding, log) = mock_binding();
        let loader = CountingLoader::default();

        unsafe {
            binding.rebind(A, &loader).unwrap();
            binding.rebind(A, &loader).unwrap();
        }

        // Old handles released before new ones were taken
        assert_eq!(log.live.load(Ordering::SeqCst), 2);
        assert_eq!(log.acquired.load(Ordering::SeqCst), 2);
        assert!(binding.is_ready());
        assert_eq!(binding.snapshot().surface, A);
        // The window is subclassed once
        assert_eq!(log.attached.lock().len(), 1);
    }

    #[test]
    fn test_rebind_to_new_window_moves_relay() {
        let (binding, log) = mock_binding();
        let loader = CountingLoader::default();

        unsafe {
            binding.rebind(A, &loader).unwrap();
            binding.rebind(B, &loader).unwrap();
        }

        assert_eq!(*log.attached.lock(), [WindowHandle(1), WindowHandle(2)]);
        assert_eq!(binding.snapshot().relay_window, WindowHandle(2));
        assert_eq!(log.live.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_acquisition_holds_nothing() {
        let (binding, log) = mock_binding();
        let loader = CountingLoader::default();

        unsafe { binding.rebind(A, &loader) }.unwrap();
        let result = unsafe { binding.rebind(BROKEN, &loader) };

        assert!(matches!(result, Err(BindError::Device(_))));
        assert!(!binding.is_ready());
        assert_eq!(log.live.load(Ordering::SeqCst), 0);
        // Identity is recorded so the failure is not retried per frame
        assert!(binding.is_bound_to(BROKEN));
        assert_eq!(loader.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_acquisition_clears_window() {
        let (binding, log) = mock_binding();
        let loader = CountingLoader::default();

        unsafe { binding.rebind(A, &loader) }.unwrap();
        assert_eq!(binding.snapshot().window, WindowHandle(1));

        assert!(unsafe { binding.rebind(BROKEN, &loader) }.is_err());

        let info = binding.snapshot();
        assert_eq!(info.surface, BROKEN);
        assert_eq!(info.window, WindowHandle::NULL);
        assert!(!info.ready);
        // The relay stays on the last window it was attached to
        assert_eq!(info.relay_window, WindowHandle(1));
        assert_eq!(log.detached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_null_surface_is_rejected() {
        let (binding, _) = mock_binding();
        let result = unsafe { binding.rebind(SurfaceId::NONE, &CountingLoader::default()) };
        assert!(matches!(result, Err(BindError::NullSurface)));
        assert!(!binding.is_ready());
    }

    #[test]
    fn test_release_detaches_window() {
        let (binding, log) = mock_binding();
        unsafe { binding.rebind(A, &CountingLoader::default()) }.unwrap();
        binding.set_dimensions(1920, 1080);

        binding.release();

        assert!(!binding.is_ready());
        assert!(!binding.is_bound_to(A));
        assert_eq!(log.live.load(Ordering::SeqCst), 0);
        assert_eq!(log.detached.load(Ordering::SeqCst), 1);
        assert_eq!(binding.snapshot().relay_window, WindowHandle::NULL);
        assert_eq!(binding.dimensions(), (1920, 1080));
    }
}
