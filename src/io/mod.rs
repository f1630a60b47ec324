/*
 * Input/Output System
 *
 * Descriptor table, device abstraction and the read/write/seek/close
 * operations built on them.
 */

pub mod device;
pub mod dispatch;
pub mod fd;
pub mod registry;

// Re-export device abstraction types
pub use device::{
    DevId, Device, Errno, S_IFCHR, S_IFDIR, S_IFIFO, S_IFMT, S_IFREG, S_ISCHR, S_ISDIR, S_ISFIFO,
    S_ISREG, Stat,
};
pub use fd::{EnvId, Fd, FdContext, FdSlot, FdTable, FileDescriptorTable, OpenMode, fd2data, fd2num};
pub use registry::{DeviceRegistry, MAX_DEVICES};
