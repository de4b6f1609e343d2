//! C-compatible exports called by the addon framework

use std::ffi::c_char;
use std::sync::OnceLock;

use tracing::instrument;
use tracing_subscriber::EnvFilter;

use framehook_core::HookConfig;
use framehook_sdk::FrameStats;

use super::callbacks::{AttachError, FrameworkCallbacks};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Filter variable consulted before the configured level
const LOG_ENV: &str = "FRAMEHOOK_LOG";

static CONFIG: OnceLock<HookConfig> = OnceLock::new();

/// Configuration for this process, loaded once
///
/// Also installs the log subscriber, so the configured level applies.
fn config() -> &'static HookConfig {
    CONFIG.get_or_init(|| {
        let mut config = HookConfig::load_or_default();
        config.apply_args(std::env::args());
        init_logging(config.debug);
        config
    })
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // A host that already installed a subscriber keeps it
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

unsafe fn attach(callbacks: *const FrameworkCallbacks) -> Result<(), AttachError> {
    let table = callbacks.as_ref().ok_or(AttachError::NullTable)?;
    framehook_engine::init_framework(table.into_framework()?)?;
    Ok(())
}

/// Register the framework's callbacks
///
/// Must be called once, before `framehook_install`.
///
/// # Safety
/// - `callbacks` must be null or point to a valid `FrameworkCallbacks`
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn framehook_attach(
    callbacks: *const FrameworkCallbacks,
    error: *mut c_char,
    maxlen: usize,
) -> bool {
    config();

    match attach(callbacks) {
        Ok(()) => {
            tracing::info!("Framework attached");
            true
        }
        Err(e) => {
            tracing::error!("Failed to attach framework: {}", e);
            write_error(error, maxlen, &e.to_string());
            false
        }
    }
}

/// Intercept the host's swap chain
///
/// Returns the installed hooks as bits (1 Present, 2 ResizeBuffers,
/// 4 Present1). Zero means nothing was hooked: bypass, or a failure that
/// was logged.
#[no_mangle]
#[instrument(skip_all)]
pub extern "C" fn framehook_install() -> u32 {
    let config = config();

    match std::panic::catch_unwind(|| framehook_core::install(config)) {
        Ok(Ok(installed)) => {
            tracing::info!("Render hooks installed: {:?}", installed);
            installed.bits()
        }
        Ok(Err(e)) => {
            tracing::error!("Render hooks not installed: {}", e);
            0
        }
        Err(_) => {
            tracing::error!("Panic during render hook installation");
            0
        }
    }
}

/// Disable the render hooks and release the bound device
#[no_mangle]
#[instrument(skip_all)]
pub extern "C" fn framehook_shutdown() -> bool {
    match std::panic::catch_unwind(crate::shutdown) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!("Panic during shutdown");
            false
        }
    }
}

/// Copy the frame counters into `out`
///
/// # Safety
/// - `out` must be a valid, writable `FrameStats` pointer or null
#[no_mangle]
pub unsafe extern "C" fn framehook_frame_stats(out: *mut FrameStats) -> bool {
    if out.is_null() {
        return false;
    }
    out.write(framehook_core::frame_stats());
    true
}

#[no_mangle]
pub extern "C" fn framehook_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

/// Helper to write an error message to a C buffer
///
/// # Safety
/// - `error` must be a valid pointer or null
/// - `maxlen` must accurately reflect the buffer size
unsafe fn write_error(error: *mut c_char, maxlen: usize, msg: &str) {
    if !error.is_null() && maxlen > 0 {
        let bytes = msg.as_bytes();
        let len = bytes.len().min(maxlen - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), error as *mut u8, len);
        *error.add(len) = 0;
    }
}
