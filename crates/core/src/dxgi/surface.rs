//! Device acquisition from the host's swap chain

use std::ffi::c_void;

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11DeviceContext};
use windows::Win32::Graphics::Dxgi::IDXGISwapChain;

use framehook_sdk::{SurfaceId, WindowHandle};

use crate::binding::{AcquiredDevice, BindError, DeviceHandle, SurfaceProbe};

/// Owned COM reference; released on drop
struct ComHandle<T: Interface>(T);

// SAFETY: D3D11 devices are free-threaded; the immediate context is only
// used by the framework from inside present
unsafe impl<T: Interface> Send for ComHandle<T> {}
unsafe impl<T: Interface> Sync for ComHandle<T> {}

impl<T: Interface> DeviceHandle for ComHandle<T> {}

/// Queries D3D11 swap chains
#[derive(Debug, Default, Clone, Copy)]
pub struct DxgiSurfaceProbe;

impl SurfaceProbe for DxgiSurfaceProbe {
    unsafe fn acquire(&self, surface: SurfaceId) -> Result<AcquiredDevice, BindError> {
        let raw = surface.0 as *mut c_void;
        let swap_chain = IDXGISwapChain::from_raw_borrowed(&raw).ok_or(BindError::NullSurface)?;

        let device: ID3D11Device = swap_chain
            .GetDevice()
            .map_err(|e| BindError::Device(e.to_string()))?;
        let context: ID3D11DeviceContext = device
            .GetImmediateContext()
            .map_err(|e| BindError::Device(e.to_string()))?;
        let desc = swap_chain
            .GetDesc()
            .map_err(|e| BindError::Descriptor(e.to_string()))?;

        Ok(AcquiredDevice {
            device: Box::new(ComHandle(device)),
            context: Box::new(ComHandle(context)),
            window: WindowHandle(desc.OutputWindow.0 as usize),
        })
    }
}
