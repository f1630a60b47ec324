/*
 * Device Backends
 *
 * The devices every environment registers, in lookup order:
 *
 * - file ('f'): regular files served by the file server
 * - pipe ('p'): in-memory pipes living in a shared data page
 * - console ('c'): the system console
 */

pub mod console;
pub mod file;
pub mod pipe;

pub use console::{Console, ConsoleDevice, DEV_CONS};
pub use file::{DEV_FILE, FileDevice, FileServer};
pub use pipe::{DEV_PIPE, PipeDevice};

use x86_64::structures::paging::PageTableFlags;

use crate::memory::{PTE_SHARE, PTE_USER_RW};

/// Permissions for descriptor and data pages created by the devices
///
/// Marked shared so a spawned child sees the same open files.
pub const FD_PAGE_PERM: PageTableFlags = PTE_USER_RW.union(PTE_SHARE);
