//! Executable code arena.
//!
//! A bump allocator over `mmap`'d read-write-execute pages. Allocations
//! are 16-byte aligned and never recycled; translated chunks live for the
//! life of the process. W^X sealing is future work; the single mutation
//! path through [`CodeArena::commit`] is where a remap would slot in.

use std::io;
use std::ptr;

/// A fixed-size region of executable memory with a bump pointer.
pub struct CodeArena {
    base: *mut u8,
    size: usize,
    used: usize,
}

// The arena hands out raw pointers but is only mutated under the engine's
// lock.
unsafe impl Send for CodeArena {}

impl CodeArena {
    /// Map a fresh arena of `size` bytes.
    pub fn new(size: usize) -> io::Result<CodeArena> {
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(CodeArena {
            base: base as *mut u8,
            size,
            used: 0,
        })
    }

    /// Bytes remaining.
    pub fn remaining(&self) -> usize {
        self.size - self.used
    }

    /// Copy `code` into the arena and return its entry pointer. Fails when
    /// the arena is exhausted.
    pub fn commit(&mut self, code: &[u8]) -> io::Result<*const u8> {
        let aligned = (self.used + 15) & !15;
        if aligned + code.len() > self.size {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "code arena exhausted",
            ));
        }
        let dst = unsafe { self.base.add(aligned) };
        unsafe {
            ptr::copy_nonoverlapping(code.as_ptr(), dst, code.len());
        }
        self.used = aligned + code.len();
        flush_icache(dst, code.len());
        Ok(dst as *const u8)
    }
}

impl Drop for CodeArena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }
    }
}

/// Make freshly written instructions visible to the instruction fetcher.
#[allow(unused_variables)]
fn flush_icache(start: *const u8, len: usize) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        // Clean the data cache and invalidate the instruction cache, line
        // by line, then synchronize.
        let line = 64usize;
        let mut p = start as usize & !(line - 1);
        let end = start as usize + len;
        while p < end {
            core::arch::asm!("dc cvau, {0}", in(reg) p);
            p += line;
        }
        core::arch::asm!("dsb ish");
        let mut p = start as usize & !(line - 1);
        while p < end {
            core::arch::asm!("ic ivau, {0}", in(reg) p);
            p += line;
        }
        core::arch::asm!("dsb ish", "isb");
    }
    #[cfg(target_arch = "riscv64")]
    unsafe {
        core::arch::asm!("fence.i");
    }
}

/// One contiguous region of guest memory, handed to generated code through
/// the CPU state's memory-base slot.
pub struct GuestMemory {
    base: *mut u8,
    size: usize,
}

unsafe impl Send for GuestMemory {}
unsafe impl Sync for GuestMemory {}

impl GuestMemory {
    /// Map `size` bytes of zeroed guest memory.
    pub fn new(size: usize) -> io::Result<GuestMemory> {
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(GuestMemory {
            base: base as *mut u8,
            size,
        })
    }

    /// Host address of guest address zero.
    pub fn base(&self) -> u64 {
        self.base as u64
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read-only view of a guest address range.
    pub fn slice(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let addr = addr as usize;
        if addr.checked_add(len)? > self.size {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(self.base.add(addr), len) })
    }

    /// Copy `bytes` to `addr` (used by loaders and tests).
    pub fn write(&self, addr: u64, bytes: &[u8]) -> bool {
        let addr = addr as usize;
        match addr.checked_add(bytes.len()) {
            Some(end) if end <= self.size => {
                unsafe {
                    ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(addr), bytes.len());
                }
                true
            }
            _ => false,
        }
    }

    /// Read a little-endian u64 at `addr`.
    pub fn read_u64(&self, addr: u64) -> Option<u64> {
        self.slice(addr, 8)
            .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
    }
}

impl Drop for GuestMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }
    }
}
