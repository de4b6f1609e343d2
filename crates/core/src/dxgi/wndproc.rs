//! Window procedure replacement
//!
//! The host window's procedure is swapped for [`relay_wndproc`], which runs
//! the message relay and then calls the procedure it replaced.

use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::atomic::{AtomicIsize, Ordering};

use windows::Win32::Foundation::{GetLastError, SetLastError, HWND, LPARAM, LRESULT, WIN32_ERROR, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CallWindowProcW, DefWindowProcW, SetWindowLongPtrW, GWLP_WNDPROC, WNDPROC,
};

use framehook_sdk::{WindowHandle, WindowMessage};

use crate::binding::{BindError, WindowAttach};
use crate::context::hook_context;

/// Procedure the relay forwards to
static ORIGINAL_WNDPROC: AtomicIsize = AtomicIsize::new(0);

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

/// Subclasses one window at a time
#[derive(Default)]
pub struct Win32WindowAttach {
    /// Window currently routed through the relay, and its original procedure
    attached: Mutex<Option<(WindowHandle, isize)>>,
}

impl Win32WindowAttach {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowAttach for Win32WindowAttach {
    fn attach(&self, window: WindowHandle) -> Result<(), BindError> {
        let mut attached = self.attached.lock();
        if let Some((current, _)) = *attached {
            if current == window {
                return Ok(());
            }
        }
        if let Some((previous, original)) = attached.take() {
            unsafe { SetWindowLongPtrW(hwnd(previous), GWLP_WNDPROC, original) };
        }

        let relay = relay_wndproc as usize as isize;
        let previous = unsafe {
            SetLastError(WIN32_ERROR(0));
            SetWindowLongPtrW(hwnd(window), GWLP_WNDPROC, relay)
        };

        if previous == 0 {
            let error = unsafe { GetLastError() };
            if error != WIN32_ERROR(0) {
                return Err(BindError::Window(format!(
                    "SetWindowLongPtrW({:?}) failed: {:?}",
                    window, error
                )));
            }
        }

        // Recording the relay as the original would make it call itself
        if previous != relay {
            ORIGINAL_WNDPROC.store(previous, Ordering::Release);
        }
        *attached = Some((window, ORIGINAL_WNDPROC.load(Ordering::Acquire)));

        tracing::info!("Window relay installed on {:?}", window);
        Ok(())
    }

    fn detach(&self) {
        if let Some((window, original)) = self.attached.lock().take() {
            unsafe { SetWindowLongPtrW(hwnd(window), GWLP_WNDPROC, original) };
            tracing::info!("Window relay removed from {:?}", window);
        }
    }
}

unsafe fn call_original(message: WindowMessage) -> isize {
    let hwnd = hwnd(message.hwnd);
    let wparam = WPARAM(message.wparam);
    let lparam = LPARAM(message.lparam);

    let original = ORIGINAL_WNDPROC.load(Ordering::Acquire);
    if original == 0 {
        return DefWindowProcW(hwnd, message.msg, wparam, lparam).0;
    }

    let original: WNDPROC = std::mem::transmute(original);
    CallWindowProcW(original, hwnd, message.msg, wparam, lparam).0
}

/// Replacement window procedure
pub unsafe extern "system" fn relay_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let message = WindowMessage::new(WindowHandle(hwnd.0 as usize), msg, wparam.0, lparam.0);
    let forward = |message| unsafe { call_original(message) };

    let result = match hook_context() {
        Some(context) => context.relay.on_message(message, forward),
        None => forward(message),
    };
    LRESULT(result)
}
