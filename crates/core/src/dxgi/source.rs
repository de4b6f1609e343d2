//! Throwaway swap chain used to read the DXGI dispatch tables

use std::ffi::c_void;

use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_NULL, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDeviceAndSwapChain, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_FLAG,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_MODE_SCALING_UNSPECIFIED,
    DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain, IDXGISwapChain1, DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD,
    DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use super::window::DummyWindow;
use crate::hooks::{DispatchSource, InstallError};

/// Swap chain on a null driver and an invisible window
///
/// Fields drop in declaration order: COM objects first, the window last.
pub struct TempSwapChain {
    swap_chain: IDXGISwapChain,
    _context: ID3D11DeviceContext,
    _device: ID3D11Device,
    _window: DummyWindow,
}

impl TempSwapChain {
    pub fn new() -> Result<Self, InstallError> {
        let window = DummyWindow::new()?;

        let desc = DXGI_SWAP_CHAIN_DESC {
            BufferDesc: DXGI_MODE_DESC {
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                ScanlineOrdering: DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED,
                Scaling: DXGI_MODE_SCALING_UNSPECIFIED,
                ..Default::default()
            },
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                ..Default::default()
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: 1,
            OutputWindow: window.hwnd(),
            Windowed: true.into(),
            SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
            ..Default::default()
        };

        let mut swap_chain = None;
        let mut device = None;
        let mut context = None;

        unsafe {
            D3D11CreateDeviceAndSwapChain(
                None,
                D3D_DRIVER_TYPE_NULL,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_FLAG(0),
                Some(&[D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_0]),
                D3D11_SDK_VERSION,
                Some(&desc),
                Some(&mut swap_chain),
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| InstallError::Device(format!("D3D11CreateDeviceAndSwapChain: {}", e)))?;

        match (swap_chain, device, context) {
            (Some(swap_chain), Some(device), Some(context)) => {
                tracing::debug!("Temporary swap chain at {:p}", swap_chain.as_raw());
                Ok(Self {
                    swap_chain,
                    _context: context,
                    _device: device,
                    _window: window,
                })
            }
            _ => Err(InstallError::Device(
                "D3D11CreateDeviceAndSwapChain returned no objects".to_string(),
            )),
        }
    }
}

/// Entry `index` of a COM object's dispatch table
unsafe fn vtable_entry(object: *mut c_void, index: usize) -> *const u8 {
    let vtable = *(object as *const *const *const u8);
    *vtable.add(index)
}

impl DispatchSource for TempSwapChain {
    fn slot(&self, index: usize) -> *const u8 {
        unsafe { vtable_entry(self.swap_chain.as_raw(), index) }
    }

    fn extended_slot(&self, index: usize) -> Result<*const u8, String> {
        let swap_chain1: IDXGISwapChain1 = self.swap_chain.cast().map_err(|e| e.to_string())?;
        Ok(unsafe { vtable_entry(swap_chain1.as_raw(), index) })
    }
}
