//! Inline function detours
//!
//! The first instructions of the target are moved into a trampoline and
//! replaced by a 5-byte relative jump to a relay placed next to the
//! trampoline. The relay jumps to the detour through an absolute address, so
//! the detour itself can live anywhere in the address space.
//!
//! Block layout (allocated within ±2GB of the target):
//!
//! ```text
//! +0   relay:      jmp [rip+0] ; <detour>
//! +16  trampoline: <relocated stolen instructions> ; jmp target+stolen
//! ```

use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Code, Decoder, DecoderOptions, FlowControl, Instruction,
    InstructionBlock,
};
use parking_lot::Mutex;

use super::registry::{Patcher, Redirection};
use super::trampoline::{self, alloc_trampoline};

/// Error type for hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Failed to create detour: {0}")]
    DetourCreation(String),

    /// Carries no owned text: raised while other threads are suspended
    #[error("Failed to enable hook at {address:x}: {source}")]
    EnableFailed {
        address: usize,
        #[source]
        source: region::Error,
    },

    #[error("Failed to disable hook at {address:x}: {source}")]
    DisableFailed {
        address: usize,
        #[source]
        source: region::Error,
    },

    #[error("Invalid address: {0:x}")]
    InvalidAddress(usize),

    #[error("Target {0:x} is already hooked")]
    AlreadyCreated(usize),

    #[error("Function at {0:x} is too short to patch")]
    NotEnoughSpace(usize),

    #[error("No trampoline memory near {0:x}")]
    AllocationFailed(usize),

    #[error("Instruction relocation failed: {0}")]
    RelocationFailed(String),
}

/// Size of the patch written at the target (`jmp rel32`)
pub const PATCH_LEN: usize = 5;

/// Bytes decoded from the target when choosing what to steal
const SCAN_LEN: usize = 32;

/// Relay size, including padding up to the trampoline
const RELAY_LEN: usize = 16;

/// Whole block: relay plus trampoline
const BLOCK_LEN: usize = 128;

const BITNESS: u32 = usize::BITS;

const NOP: u8 = 0x90;

/// Creates [`InlineDetour`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePatcher;

impl Patcher for InlinePatcher {
    unsafe fn create(
        &self,
        target: *const u8,
        detour: *const (),
    ) -> Result<Box<dyn Redirection>, HookError> {
        Ok(Box::new(InlineDetour::new(target, detour)?))
    }
}

/// One patched function
///
/// Building a detour writes only to the freshly allocated block; the target
/// is untouched until [`Redirection::enable`].
pub struct InlineDetour {
    target: *mut u8,
    trampoline: *const (),
    original: Vec<u8>,
    patch: Vec<u8>,
    write_lock: Mutex<()>,
}

// SAFETY: the raw pointers address process-lifetime code; writes are serialized by `write_lock`
unsafe impl Send for InlineDetour {}
unsafe impl Sync for InlineDetour {}

impl InlineDetour {
    /// Prepare a detour from `target` to `detour`
    ///
    /// # Safety
    /// `target` must be the entry of a function; no thread may be executing
    /// its first `PATCH_LEN` bytes once the detour is enabled.
    pub unsafe fn new(target: *const u8, detour: *const ()) -> Result<Self, HookError> {
        if target.is_null() {
            return Err(HookError::InvalidAddress(0));
        }
        if detour.is_null() {
            return Err(HookError::DetourCreation("null detour".to_string()));
        }

        let stolen = steal_instructions(target)?;
        let stolen_len: usize = stolen.iter().map(Instruction::len).sum();

        let block = alloc_trampoline(target, BLOCK_LEN)
            .ok_or(HookError::AllocationFailed(target as usize))?;
        let relay = block.as_ptr();
        let trampoline = relay.add(RELAY_LEN);

        write_relay(relay, detour as usize);
        let relocated = relocate(&stolen, target as u64 + stolen_len as u64, trampoline as u64)?;
        if relocated.len() > BLOCK_LEN - RELAY_LEN {
            return Err(HookError::RelocationFailed(format!(
                "{} relocated bytes do not fit the trampoline",
                relocated.len()
            )));
        }
        std::ptr::copy_nonoverlapping(relocated.as_ptr(), trampoline, relocated.len());

        let original = std::slice::from_raw_parts(target, stolen_len).to_vec();
        let patch = jump_patch(target as usize, relay as usize, stolen_len)?;

        tracing::debug!(
            "Prepared detour {:p}: {} bytes stolen, relay {:p}, trampoline {:p}",
            target,
            stolen_len,
            relay,
            trampoline
        );

        Ok(Self {
            target: target as *mut u8,
            trampoline: trampoline as *const (),
            original,
            patch,
            write_lock: Mutex::new(()),
        })
    }

    /// Runs with other threads suspended: must neither allocate nor log
    unsafe fn write(&self, bytes: &[u8]) -> Result<(), region::Error> {
        let _guard = self.write_lock.lock();

        let _protection = region::protect_with_handle(
            self.target,
            bytes.len(),
            region::Protection::READ_WRITE_EXECUTE,
        )?;

        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.target, bytes.len());
        flush_instruction_cache(self.target, bytes.len());
        Ok(())
    }
}

impl Redirection for InlineDetour {
    fn target(&self) -> *const u8 {
        self.target
    }

    fn trampoline(&self) -> *const () {
        self.trampoline
    }

    unsafe fn enable(&self) -> Result<(), HookError> {
        self.write(&self.patch)
            .map_err(|source| HookError::EnableFailed {
                address: self.target as usize,
                source,
            })
    }

    unsafe fn disable(&self) -> Result<(), HookError> {
        self.write(&self.original)
            .map_err(|source| HookError::DisableFailed {
                address: self.target as usize,
                source,
            })
    }
}

/// Decode whole instructions from `target` until `PATCH_LEN` bytes are covered
unsafe fn steal_instructions(target: *const u8) -> Result<Vec<Instruction>, HookError> {
    let region = region::query(target).map_err(|_| HookError::InvalidAddress(target as usize))?;
    if !region.is_readable() {
        return Err(HookError::InvalidAddress(target as usize));
    }
    let available = (region.as_range().end - target as usize).min(SCAN_LEN);
    let bytes = std::slice::from_raw_parts(target, available);

    let mut decoder = Decoder::with_ip(BITNESS, bytes, target as u64, DecoderOptions::NONE);
    let mut stolen = Vec::new();
    let mut len = 0;

    while len < PATCH_LEN {
        if !decoder.can_decode() {
            return Err(HookError::NotEnoughSpace(target as usize));
        }
        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return Err(HookError::RelocationFailed(format!(
                "undecodable instruction at {:x}",
                instruction.ip()
            )));
        }

        len += instruction.len();
        let flow = instruction.flow_control();
        stolen.push(instruction);

        // Bytes after a function exit may belong to something else
        if len < PATCH_LEN
            && matches!(
                flow,
                FlowControl::Return
                    | FlowControl::UnconditionalBranch
                    | FlowControl::IndirectBranch
                    | FlowControl::Interrupt
            )
        {
            return Err(HookError::NotEnoughSpace(target as usize));
        }
    }

    Ok(stolen)
}

/// Re-encode `stolen` at `ip`, followed by a jump back to `resume`
fn relocate(stolen: &[Instruction], resume: u64, ip: u64) -> Result<Vec<u8>, HookError> {
    let jump_code = if BITNESS == 64 {
        Code::Jmp_rel32_64
    } else {
        Code::Jmp_rel32_32
    };
    let jump_back = Instruction::with_branch(jump_code, resume)
        .map_err(|e| HookError::RelocationFailed(e.to_string()))?;

    let mut instructions = stolen.to_vec();
    instructions.push(jump_back);

    let block = InstructionBlock::new(&instructions, ip);
    BlockEncoder::encode(BITNESS, block, BlockEncoderOptions::NONE)
        .map(|result| result.code_buffer)
        .map_err(|e| HookError::RelocationFailed(e.to_string()))
}

/// Write the jump from the relay to the detour
#[cfg(target_pointer_width = "64")]
unsafe fn write_relay(relay: *mut u8, detour: usize) {
    // jmp qword ptr [rip+0]
    let mut code = [0xCCu8; RELAY_LEN];
    code[..6].copy_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
    code[6..14].copy_from_slice(&(detour as u64).to_le_bytes());
    std::ptr::copy_nonoverlapping(code.as_ptr(), relay, RELAY_LEN);
}

#[cfg(not(target_pointer_width = "64"))]
unsafe fn write_relay(relay: *mut u8, detour: usize) {
    // Every address is reachable with rel32 in 32-bit mode
    let mut code = [0xCCu8; RELAY_LEN];
    code[0] = 0xE9;
    let rel = detour.wrapping_sub(relay as usize + PATCH_LEN) as u32;
    code[1..5].copy_from_slice(&rel.to_le_bytes());
    std::ptr::copy_nonoverlapping(code.as_ptr(), relay, RELAY_LEN);
}

/// `jmp rel32` from `from` to `to`, padded with NOPs to `len`
fn jump_patch(from: usize, to: usize, len: usize) -> Result<Vec<u8>, HookError> {
    if trampoline::distance(from, to) >= trampoline::MAX_RANGE {
        return Err(HookError::AllocationFailed(from));
    }
    let rel = (to as i64 - (from + PATCH_LEN) as i64) as i32;

    let mut patch = vec![NOP; len];
    patch[0] = 0xE9;
    patch[1..PATCH_LEN].copy_from_slice(&rel.to_le_bytes());
    Ok(patch)
}

#[cfg(windows)]
unsafe fn flush_instruction_cache(address: *const u8, len: usize) {
    use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows::Win32::System::Threading::GetCurrentProcess;

    // Not logged: called while other threads are suspended
    let _ = FlushInstructionCache(GetCurrentProcess(), Some(address.cast()), len);
}

#[cfg(not(windows))]
unsafe fn flush_instruction_cache(_address: *const u8, _len: usize) {}

/// Allocate an executable scratch function for tests
#[cfg(test)]
pub(crate) fn scratch_function(code: &[u8]) -> std::ptr::NonNull<u8> {
    let anchor = scratch_function as fn(&[u8]) -> std::ptr::NonNull<u8> as *const u8;
    let block = alloc_trampoline(anchor, code.len().max(32)).expect("scratch memory");
    unsafe {
        std::ptr::write_bytes(block.as_ptr(), 0xCC, code.len().max(32));
        std::ptr::copy_nonoverlapping(code.as_ptr(), block.as_ptr(), code.len());
    }
    block
}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;

    // mov eax, 42 ; ret
    const RETURN_42: [u8; 6] = [0xB8, 0x2A, 0x00, 0x00, 0x00, 0xC3];

    extern "C" fn return_7() -> i32 {
        7
    }

    fn call(ptr: *const u8) -> i32 {
        let f: extern "C" fn() -> i32 = unsafe { std::mem::transmute(ptr) };
        f()
    }

    #[test]
    fn test_detour_redirects_and_trampoline_calls_original() {
        let target = scratch_function(&RETURN_42).as_ptr();
        let detour = unsafe { InlineDetour::new(target, return_7 as *const ()) }.unwrap();

        assert_eq!(call(target), 42);

        unsafe { detour.enable().unwrap() };
        assert_eq!(call(target), 7);
        assert_eq!(call(detour.trampoline() as *const u8), 42);

        unsafe { detour.disable().unwrap() };
        assert_eq!(call(target), 42);
    }

    #[test]
    fn test_disable_restores_exact_bytes() {
        // push rbp ; mov rbp, rsp ; mov eax, 42 ; pop rbp ; ret
        let code = [0x55, 0x48, 0x89, 0xE5, 0xB8, 0x2A, 0x00, 0x00, 0x00, 0x5D, 0xC3];
        let target = scratch_function(&code).as_ptr();
        let detour = unsafe { InlineDetour::new(target, return_7 as *const ()) }.unwrap();

        // 1 + 3 + 5 bytes must be stolen to cover the patch
        assert_eq!(detour.original, &code[..9]);

        unsafe { detour.enable().unwrap() };
        let patched = unsafe { std::slice::from_raw_parts(target, 9) };
        assert_eq!(patched[0], 0xE9);
        assert!(patched[PATCH_LEN..].iter().all(|&b| b == NOP));
        assert_eq!(call(detour.trampoline() as *const u8), 42);

        unsafe { detour.disable().unwrap() };
        let restored = unsafe { std::slice::from_raw_parts(target, code.len()) };
        assert_eq!(restored, &code);
    }

    #[test]
    fn test_short_function_is_rejected() {
        // xor eax, eax ; ret
        let target = scratch_function(&[0x31, 0xC0, 0xC3]).as_ptr();
        let result = unsafe { InlineDetour::new(target, return_7 as *const ()) };
        assert!(matches!(result, Err(HookError::NotEnoughSpace(_))));
    }

    #[test]
    fn test_null_target_is_rejected() {
        let result = unsafe { InlineDetour::new(std::ptr::null(), return_7 as *const ()) };
        assert!(matches!(result, Err(HookError::InvalidAddress(0))));
    }

    #[test]
    fn test_jump_patch_encoding() {
        let patch = jump_patch(0x1000, 0x2000, 7).unwrap();
        assert_eq!(patch, [0xE9, 0xFB, 0x0F, 0x00, 0x00, NOP, NOP]);
    }
}
