//! Invisible window backing the throwaway swap chain

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassExW, UnregisterClassW,
    CS_HREDRAW, CS_VREDRAW, WINDOW_EX_STYLE, WNDCLASSEXW, WS_OVERLAPPEDWINDOW,
};

use crate::hooks::InstallError;

const CLASS_NAME: PCWSTR = w!("framehook_dummy");

unsafe extern "system" fn dummy_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

/// Never shown; destroyed and unregistered on drop
pub struct DummyWindow {
    hwnd: HWND,
    instance: HINSTANCE,
}

impl DummyWindow {
    pub fn new() -> Result<Self, InstallError> {
        unsafe {
            let instance: HINSTANCE = GetModuleHandleW(None)
                .map_err(|e| InstallError::Window(e.to_string()))?
                .into();

            let class = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(dummy_proc),
                hInstance: instance,
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };

            if RegisterClassExW(&class) == 0 {
                let error = GetLastError();
                if error != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(InstallError::Window(format!(
                        "RegisterClassExW failed: {:?}",
                        error
                    )));
                }
            }

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE(0),
                CLASS_NAME,
                w!("framehook"),
                WS_OVERLAPPEDWINDOW,
                0,
                0,
                100,
                100,
                None,
                None,
                Some(instance),
                None,
            )
            .map_err(|e| {
                let _ = UnregisterClassW(CLASS_NAME, Some(instance));
                InstallError::Window(e.to_string())
            })?;

            Ok(Self { hwnd, instance })
        }
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }
}

impl Drop for DummyWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.hwnd);
            let _ = UnregisterClassW(CLASS_NAME, Some(self.instance));
        }
    }
}
