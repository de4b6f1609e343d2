//! Jump-chain resolution
//!
//! Other overlays and capture tools may already have detoured an entry point.
//! Hooking the first instruction of such a function would overwrite their
//! jump; following it and hooking the function it lands on composes with
//! them instead.

use std::ops::Range;

use iced_x86::{Decoder, DecoderOptions, FlowControl, Instruction, OpKind, Register};

/// Longest chain followed before giving up
const MAX_CHAIN_DEPTH: usize = 16;

/// Maximum encoded length of one x86 instruction
const MAX_INSTRUCTION_LEN: usize = 15;

const BITNESS: u32 = usize::BITS;

/// Resolve the function a code address finally lands on
///
/// Follows unconditional direct jumps (`jmp rel8/rel32`) and memory-indirect
/// jumps through absolute or RIP-relative slots (`jmp [rip+disp]`). Stops at
/// the first other instruction, at unreadable memory, or after
/// `MAX_CHAIN_DEPTH` hops.
///
/// # Safety
/// `address` must point into mapped code.
pub unsafe fn follow_jmp_chain(address: *const u8) -> *const u8 {
    let mut current = address;

    for _ in 0..MAX_CHAIN_DEPTH {
        match jump_target(current) {
            Some(next) if !next.is_null() && next != current => {
                tracing::trace!("Following jump {:p} -> {:p}", current, next);
                current = next;
            }
            _ => break,
        }
    }

    current
}

/// Destination of the jump at `address`, if the instruction there is one
unsafe fn jump_target(address: *const u8) -> Option<*const u8> {
    let readable = readable_range(address as usize)?;
    let len = (readable.end - address as usize).min(MAX_INSTRUCTION_LEN);
    let bytes = std::slice::from_raw_parts(address, len);

    let mut decoder = Decoder::with_ip(BITNESS, bytes, address as u64, DecoderOptions::NONE);
    let instruction = decoder.decode();
    if instruction.is_invalid() {
        return None;
    }

    match instruction.flow_control() {
        FlowControl::UnconditionalBranch => match instruction.op0_kind() {
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                Some(instruction.near_branch_target() as usize as *const u8)
            }
            _ => None,
        },
        FlowControl::IndirectBranch if instruction.op0_kind() == OpKind::Memory => {
            let slot = indirect_slot(&instruction)?;
            let slot_range = readable_range(slot)?;
            if slot_range.end - slot < std::mem::size_of::<usize>() {
                return None;
            }
            Some((slot as *const *const u8).read_unaligned())
        }
        _ => None,
    }
}

/// Address of the pointer a memory-indirect jump reads
fn indirect_slot(instruction: &Instruction) -> Option<usize> {
    if instruction.is_ip_rel_memory_operand() {
        Some(instruction.ip_rel_memory_address() as usize)
    } else if instruction.memory_base() == Register::None
        && instruction.memory_index() == Register::None
    {
        Some(instruction.memory_displacement64() as usize)
    } else {
        None
    }
}

fn readable_range(address: usize) -> Option<Range<usize>> {
    let region = region::query(address as *const u8).ok()?;
    region.is_readable().then(|| region.as_range())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel32(from: usize, to: usize) -> [u8; 4] {
        ((to as isize - (from + 5) as isize) as i32).to_le_bytes()
    }

    #[test]
    fn test_plain_function_is_its_own_target() {
        // mov [rsp+8], rbx ; ret
        let code = vec![0x48, 0x89, 0x5C, 0x24, 0x08, 0xC3, 0x90, 0x90];
        let start = code.as_ptr();
        assert_eq!(unsafe { follow_jmp_chain(start) }, start);
    }

    #[test]
    fn test_follows_rel32_then_rel8() {
        let mut code = vec![0x90u8; 64];
        let base = code.as_ptr() as usize;

        // 0: jmp rel32 -> 32
        code[0] = 0xE9;
        code[1..5].copy_from_slice(&rel32(base, base + 32));
        // 32: jmp short -> 36
        code[32] = 0xEB;
        code[33] = 0x02;
        // 36: ret
        code[36] = 0xC3;

        let resolved = unsafe { follow_jmp_chain(code.as_ptr()) };
        assert_eq!(resolved as usize, base + 36);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_follows_rip_relative_indirect_jump() {
        let landing = vec![0x55u8, 0x48, 0x89, 0xE5, 0xC3, 0x90, 0x90, 0x90];

        // jmp qword ptr [rip+0] ; <absolute address>
        let mut code = vec![0xFF, 0x25, 0x00, 0x00, 0x00, 0x00];
        code.extend_from_slice(&(landing.as_ptr() as u64).to_le_bytes());
        code.extend_from_slice(&[0xCC; 8]);

        let resolved = unsafe { follow_jmp_chain(code.as_ptr()) };
        assert_eq!(resolved, landing.as_ptr());
    }

    #[test]
    fn test_self_loop_stops() {
        // jmp $
        let code = vec![0xEB, 0xFE, 0x90, 0x90];
        assert_eq!(unsafe { follow_jmp_chain(code.as_ptr()) }, code.as_ptr());
    }

    #[test]
    fn test_chain_depth_is_bounded() {
        // 40 x "jmp short +0" falls through one instruction per hop
        let mut code = Vec::new();
        for _ in 0..40 {
            code.extend_from_slice(&[0xEB, 0x00]);
        }
        code.push(0xC3);

        let base = code.as_ptr() as usize;
        let resolved = unsafe { follow_jmp_chain(code.as_ptr()) };
        assert_eq!(resolved as usize, base + 2 * MAX_CHAIN_DEPTH);
    }

    #[test]
    fn test_register_indirect_jump_is_not_followed() {
        // jmp rax
        let code = vec![0xFF, 0xE0, 0x90, 0x90];
        assert_eq!(unsafe { follow_jmp_chain(code.as_ptr()) }, code.as_ptr());
    }
}
