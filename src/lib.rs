/*
 * CLUU File Descriptor Layer
 *
 * User-space descriptor/device abstraction for CLUU environments.
 *
 * The kernel gives an environment nothing but page allocation, mapping and
 * unmapping, plus read-only introspection of its own page tables. There is
 * no descriptor-table syscall. This library builds one on top of that:
 *
 * - Every descriptor slot owns one page in a fixed window of the address
 *   space (FDTABLE) plus one optional data page (FILEDATA).
 * - A slot is open exactly when its descriptor page is mapped. There is no
 *   other in-use bit.
 * - I/O on a descriptor is routed through the Device trait to one of the
 *   registered backends (file, pipe, console).
 *
 * Everything runs single-threaded and cooperatively. Devices that need to
 * wait (pipes, console input) yield to the scheduler from inside their
 * callbacks.
 */

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod abi;
pub mod config;
pub mod devices;
pub mod io;
pub mod memory;
pub mod utils;

#[cfg(test)]
mod testing;

pub use io::{
    DevId, Device, DeviceRegistry, EnvId, Errno, Fd, FdContext, FdSlot, FdTable, OpenMode, Stat,
};
pub use memory::{AddressSpace, SoftAddressSpace};
