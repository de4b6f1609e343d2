//! Near-memory arena for relay/trampoline blocks
//!
//! A patched target reaches its block with a 5-byte `jmp rel32`, so every
//! block must sit within ±2GB of its target. Pages are probed outward from
//! the target, nearest first, and carved into 16-byte aligned blocks.
//! Nothing is ever freed: a thread may still be executing inside a block.

use parking_lot::Mutex;
use std::ptr::NonNull;

/// Size of each arena page
const PAGE_SIZE: usize = 4096;

/// Distance between probe addresses (Windows allocation granularity)
const PROBE_STEP: usize = 0x1_0000;

/// Alignment of every block
const BLOCK_ALIGN: usize = 16;

/// Farthest a block may sit from its target
pub const MAX_RANGE: usize = 0x7FFF_0000;

static ARENA: Mutex<NearArena> = Mutex::new(NearArena { pages: Vec::new() });

/// One executable page and how much of it is handed out
struct ArenaPage {
    base: usize,
    cursor: usize,
}

struct NearArena {
    pages: Vec<ArenaPage>,
}

/// Distance between two addresses
pub fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

/// Probe addresses around `target`, alternating below and above, nearest first
fn probe_addresses(target: usize) -> impl Iterator<Item = usize> {
    let origin = target & !(PROBE_STEP - 1);
    let steps = MAX_RANGE / PROBE_STEP;

    (1..steps)
        .flat_map(move |step| {
            let offset = step * PROBE_STEP;
            [origin.checked_sub(offset), origin.checked_add(offset)]
        })
        .flatten()
        .filter(|&address| address != 0)
}

impl NearArena {
    fn carve(&mut self, target: usize, size: usize) -> Option<NonNull<u8>> {
        let size = size.next_multiple_of(BLOCK_ALIGN);
        if size == 0 || size > PAGE_SIZE {
            return None;
        }

        let reusable = self.pages.iter().position(|page| {
            page.cursor + size <= PAGE_SIZE && distance(page.base, target) < MAX_RANGE
        });

        let index = match reusable {
            Some(index) => index,
            None => {
                let base = probe_addresses(target)
                    .find_map(|hint| os::map_near(hint, target))?;
                tracing::debug!("Trampoline page at {:#x} for target {:#x}", base, target);
                self.pages.push(ArenaPage { base, cursor: 0 });
                self.pages.len() - 1
            }
        };

        let page = &mut self.pages[index];
        let block = page.base + page.cursor;
        page.cursor += size;
        NonNull::new(block as *mut u8)
    }
}

#[cfg(unix)]
mod os {
    use super::{distance, MAX_RANGE, PAGE_SIZE};
    use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
    use std::num::NonZeroUsize;

    /// Map one RWX page at or near `hint`, kept only if it lands in range of `target`
    pub fn map_near(hint: usize, target: usize) -> Option<usize> {
        let length = NonZeroUsize::new(PAGE_SIZE)?;
        let mapped = unsafe {
            mmap_anonymous(
                NonZeroUsize::new(hint),
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
            )
        }
        .ok()?;

        let base = mapped.as_ptr() as usize;
        if distance(base, target) < MAX_RANGE {
            Some(base)
        } else {
            let _ = unsafe { munmap(mapped, PAGE_SIZE) };
            None
        }
    }
}

#[cfg(windows)]
mod os {
    use super::{distance, MAX_RANGE, PAGE_SIZE};
    use std::ffi::c_void;
    use windows::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE,
    };

    /// Commit one RWX page at `hint`, kept only if it lands in range of `target`
    pub fn map_near(hint: usize, target: usize) -> Option<usize> {
        let mapped = unsafe {
            VirtualAlloc(
                Some(hint as *const c_void),
                PAGE_SIZE,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        if mapped.is_null() {
            return None;
        }

        let base = mapped as usize;
        if distance(base, target) < MAX_RANGE {
            Some(base)
        } else {
            let _ = unsafe { VirtualFree(mapped, 0, MEM_RELEASE) };
            None
        }
    }
}

/// Reserve `size` bytes of executable memory within ±2GB of `target`
pub fn alloc_trampoline(target: *const u8, size: usize) -> Option<NonNull<u8>> {
    let block = ARENA.lock().carve(target as usize, size);
    if block.is_none() {
        tracing::error!("No trampoline memory within range of {:p}", target);
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_code() -> *const u8 {
        own_code as fn() -> *const u8 as *const u8
    }

    #[test]
    fn test_block_is_aligned_and_in_range() {
        let target = own_code();
        let block = alloc_trampoline(target, 128).unwrap().as_ptr() as usize;

        assert_eq!(block % BLOCK_ALIGN, 0);
        assert!(distance(block, target as usize) < MAX_RANGE);
    }

    #[test]
    fn test_blocks_do_not_overlap() {
        let target = own_code();
        let mut blocks: Vec<usize> = (0..3)
            .map(|_| alloc_trampoline(target, 40).unwrap().as_ptr() as usize)
            .collect();
        blocks.sort_unstable();

        // 40 rounds up to 48
        assert!(blocks.windows(2).all(|pair| pair[1] - pair[0] >= 48));
    }

    #[test]
    fn test_unservable_sizes_are_rejected() {
        assert!(alloc_trampoline(own_code(), PAGE_SIZE + 1).is_none());
        assert!(alloc_trampoline(own_code(), 0).is_none());
    }

    #[test]
    fn test_probes_start_next_to_target() {
        let target = 0x7ff6_1234_5678;
        let mut probes = probe_addresses(target);

        assert_eq!(probes.next(), Some(0x7ff6_1233_0000));
        assert_eq!(probes.next(), Some(0x7ff6_1235_0000));
        assert!(probes.all(|address| distance(address, target) < MAX_RANGE));
    }

    #[test]
    fn test_probes_skip_below_zero() {
        let first: Vec<usize> = probe_addresses(0x1_8000).take(3).collect();
        assert_eq!(first, vec![0x2_0000, 0x3_0000, 0x4_0000]);
    }
}
