//! Detour entry points for the swap chain methods
//!
//! Each detour looks up its trampoline in the registry and hands the call to
//! the matching pipeline. The host always gets the original's return value.

use std::ffi::c_void;

use windows::core::HRESULT;
use windows::Win32::Foundation::E_FAIL;
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT;

use framehook_sdk::{HookSlot, SurfaceId};

use crate::context::hook_context;
use crate::frame::PresentEntry;
use crate::hooks::{registry, DetourSet};

type PresentFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;
type Present1Fn = unsafe extern "system" fn(*mut c_void, u32, u32, *const c_void) -> HRESULT;
type ResizeBuffersFn =
    unsafe extern "system" fn(*mut c_void, u32, u32, u32, DXGI_FORMAT, u32) -> HRESULT;

/// Trampoline for `slot`, typed as `F`
unsafe fn original<F: Copy>(slot: HookSlot) -> Option<F> {
    let trampoline = registry().original(slot);
    if trampoline.is_none() {
        tracing::error!("No trampoline for {}", slot.name());
    }
    trampoline.map(|ptr| std::mem::transmute_copy::<*const (), F>(&ptr))
}

unsafe extern "system" fn present_detour(this: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    let Some(original) = original::<PresentFn>(HookSlot::Present) else {
        return E_FAIL;
    };
    let forward = || original(this, sync_interval, flags);

    match hook_context() {
        Some(context) => context
            .frame
            .on_present(PresentEntry::Present, SurfaceId::from_ptr(this), forward),
        None => forward(),
    }
}

unsafe extern "system" fn present1_detour(
    this: *mut c_void,
    sync_interval: u32,
    flags: u32,
    parameters: *const c_void,
) -> HRESULT {
    let Some(original) = original::<Present1Fn>(HookSlot::Present1) else {
        return E_FAIL;
    };
    let forward = || original(this, sync_interval, flags, parameters);

    match hook_context() {
        Some(context) => context
            .frame
            .on_present(PresentEntry::Present1, SurfaceId::from_ptr(this), forward),
        None => forward(),
    }
}

unsafe extern "system" fn resize_buffers_detour(
    this: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
    flags: u32,
) -> HRESULT {
    let Some(original) = original::<ResizeBuffersFn>(HookSlot::ResizeBuffers) else {
        return E_FAIL;
    };
    let forward = || original(this, buffer_count, width, height, format, flags);

    match hook_context() {
        Some(context) => context.resize.on_resize(width, height, forward),
        None => forward(),
    }
}

pub fn detour_set() -> DetourSet {
    DetourSet {
        present: present_detour as *const (),
        present1: present1_detour as *const (),
        resize_buffers: resize_buffers_detour as *const (),
    }
}
