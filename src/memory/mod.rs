/*
 * Memory Interface
 *
 * The page-level primitives this library needs from the kernel, and an
 * in-memory address space implementing them for hosted use.
 */

pub mod address_space;
pub mod soft_table;

pub use address_space::{AddressSpace, PTE_SHARE, PTE_SYSCALL, PTE_USER_RW, pdx, ptx};
pub use soft_table::SoftAddressSpace;

pub use x86_64::VirtAddr;
pub use x86_64::structures::paging::PageTableFlags;
