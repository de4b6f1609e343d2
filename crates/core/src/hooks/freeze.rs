//! Suspend other threads while code is patched
//!
//! Present can be running on a render thread while its entry is rewritten.
//! Holding every other thread of the process suspended for the duration of
//! the write keeps them from executing a half-written jump.

/// Other threads of the process, suspended until drop
pub struct ThreadFreeze {
    #[cfg(windows)]
    threads: Vec<windows::Win32::Foundation::HANDLE>,

    /// Thread ids from the snapshot, freed only after the threads resume
    #[cfg(windows)]
    ids: Vec<u32>,
}

impl ThreadFreeze {
    /// Suspend every thread of the process except the calling one
    #[cfg(windows)]
    pub fn new() -> Self {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            GetCurrentProcessId, GetCurrentThreadId, OpenThread, SuspendThread,
            THREAD_SUSPEND_RESUME,
        };

        let process = unsafe { GetCurrentProcessId() };
        let current = unsafe { GetCurrentThreadId() };

        // Everything that allocates happens before the first suspension: a
        // suspended thread may hold the process heap lock.
        let ids = match thread_ids(process, current) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Thread snapshot failed, patching without freeze: {}", e);
                return Self {
                    threads: Vec::new(),
                    ids: Vec::new(),
                };
            }
        };
        let mut threads = Vec::with_capacity(ids.len());

        for &id in &ids {
            unsafe {
                if let Ok(thread) = OpenThread(THREAD_SUSPEND_RESUME, false, id) {
                    if SuspendThread(thread) != u32::MAX {
                        threads.push(thread);
                    } else {
                        let _ = CloseHandle(thread);
                    }
                }
            }
        }

        Self { threads, ids }
    }

    #[cfg(not(windows))]
    pub fn new() -> Self {
        Self {}
    }
}

/// Ids of the other threads of `process`
#[cfg(windows)]
fn thread_ids(process: u32, current: u32) -> windows::core::Result<Vec<u32>> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
    };

    let mut ids = Vec::new();
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)?;
        let mut entry = THREADENTRY32 {
            dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
            ..Default::default()
        };

        let mut more = Thread32First(snapshot, &mut entry).is_ok();
        while more {
            if entry.th32OwnerProcessID == process && entry.th32ThreadID != current {
                ids.push(entry.th32ThreadID);
            }
            more = Thread32Next(snapshot, &mut entry).is_ok();
        }

        let _ = CloseHandle(snapshot);
    }
    Ok(ids)
}

impl Default for ThreadFreeze {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
impl Drop for ThreadFreeze {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::ResumeThread;

        let suspended = self.threads.len();
        let listed = self.ids.len();
        for thread in self.threads.drain(..) {
            unsafe {
                ResumeThread(thread);
                let _ = CloseHandle(thread);
            }
        }
        tracing::trace!("Resumed {} of {} threads", suspended, listed);
    }
}

#[cfg(all(test, windows))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_freeze_completes_while_another_thread_allocates() {
        let stop = Arc::new(AtomicBool::new(false));
        let rounds = Arc::new(AtomicU64::new(0));

        let worker = {
            let stop = stop.clone();
            let rounds = rounds.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let buffer: Vec<u8> = Vec::with_capacity(4096);
                    std::hint::black_box(buffer);
                    rounds.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        // The worker is regularly suspended inside the heap; every freeze
        // must still come back
        for _ in 0..200 {
            let freeze = ThreadFreeze::new();
            drop(freeze);
        }

        stop.store(true, Ordering::Relaxed);
        worker.join().unwrap();
        assert!(rounds.load(Ordering::Relaxed) > 0);
    }
}
