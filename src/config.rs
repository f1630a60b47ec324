/*
 * Descriptor Layer Configuration
 *
 * Compile-time layout of the descriptor window and device tunables.
 *
 * Layout:
 * =======
 *
 * FDTABLE  .. FILEDATA                 one descriptor page per slot
 * FILEDATA .. FILEDATA + MAX_FD pages  one data page per slot
 *
 * Both windows are derived from FDTABLE, MAX_FD and PGSIZE. They are not
 * configurable on their own.
 */

use x86_64::VirtAddr;

/// Maximum number of descriptors an environment may hold open at once
pub const MAX_FD: usize = 32;

/// Page size in bytes
pub const PGSIZE: u64 = 4096;

/// Bottom of the descriptor window
pub const FDTABLE: u64 = 0xD000_0000;

/// Bottom of the per-descriptor data window
pub const FILEDATA: u64 = FDTABLE + MAX_FD as u64 * PGSIZE;

/// Ring size of a pipe, in bytes
///
/// Kept small on purpose so that short reads and writer back-pressure show
/// up in ordinary use.
pub const PIPEBUF: usize = 32;

/// Longest file name reported by stat
pub const MAXNAMELEN: usize = 128;

/// Largest chunk handed to the console in a single cputs call
pub const CONS_CHUNK: usize = 127;

/// Verbose descriptor diagnostics (`fd-debug` feature)
pub const DEBUG: bool = cfg!(feature = "fd-debug");

/// Address of the descriptor page for slot `index`
#[inline]
pub fn index2fd(index: usize) -> VirtAddr {
    VirtAddr::new(FDTABLE + index as u64 * PGSIZE)
}

/// Address of the data page for slot `index`
#[inline]
pub fn index2data(index: usize) -> VirtAddr {
    VirtAddr::new(FILEDATA + index as u64 * PGSIZE)
}
