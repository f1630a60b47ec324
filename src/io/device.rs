/*
 * Device Abstraction Layer
 *
 * Every descriptor names the device that owns it. A device is a
 * process-wide, immutable capability object: an id, a name, and some
 * subset of read/write/close/stat/trunc. Devices never keep per-descriptor
 * state; whatever they need lives in the descriptor record and in its data
 * page, both reachable through FdContext.
 *
 * Missing capabilities report ENOTSUP. The one exception is close: a device
 * with nothing to release closes successfully.
 */

use core::fmt;

use super::fd::FdContext;
use crate::config::MAXNAMELEN;

/// Device identifier stored in every descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DevId(pub u32);

impl fmt::Display for DevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match char::from_u32(self.0) {
            Some(c) if c.is_ascii_graphic() => write!(f, "'{}'", c),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// Device trait for everything a descriptor can point at
pub trait Device: Send + Sync {
    /// Unique id, matched against `Fd::dev_id`
    fn id(&self) -> DevId;

    /// Human-readable name for diagnostics
    fn name(&self) -> &'static str;

    /// Read up to buf.len() bytes into buf
    ///
    /// Returns the number of bytes read; 0 means end of stream.
    /// Short reads are allowed.
    fn read(&self, _fd: &mut FdContext<'_>, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Write up to buf.len() bytes from buf
    ///
    /// Returns the number of bytes written.
    fn write(&self, _fd: &mut FdContext<'_>, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Release device resources held by the descriptor
    ///
    /// The descriptor page itself is unmapped by the caller afterwards,
    /// whatever this returns.
    fn close(&self, _fd: &mut FdContext<'_>) -> Result<(), Errno> {
        Ok(())
    }

    /// Fill in the device-specific parts of `st`
    ///
    /// `st_dev` is already set and the other fields are cleared.
    fn stat(&self, _fd: &mut FdContext<'_>, _st: &mut Stat) -> Result<(), Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Change the size of the underlying object
    fn trunc(&self, _fd: &mut FdContext<'_>, _size: u64) -> Result<(), Errno> {
        Err(Errno::ENOTSUP)
    }
}

/// POSIX errno values
///
/// Subset of standard POSIX error codes. The ABI surface returns them
/// negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    EPERM = 1,         // Operation not permitted
    ENOENT = 2,        // No such file or directory
    EIO = 5,           // I/O error
    ENOMEM = 12,       // Out of memory
    EACCES = 13,       // Permission denied
    EFAULT = 14,       // Bad address
    EEXIST = 17,       // File exists
    EISDIR = 21,       // Is a directory
    EINVAL = 22,       // Invalid argument
    EMFILE = 24,       // Too many open files
    ENAMETOOLONG = 36, // File name too long
    ENOTSUP = 95,      // Operation not supported
}

impl Errno {
    /// Raw errno value
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Negated value, as returned across the ABI
    pub fn as_neg(self) -> i32 {
        -(self as i32)
    }

    /// Map a negated ABI value back to an Errno
    pub fn from_neg(ret: i32) -> Option<Self> {
        let errno = match ret.checked_neg()? {
            1 => Errno::EPERM,
            2 => Errno::ENOENT,
            5 => Errno::EIO,
            12 => Errno::ENOMEM,
            13 => Errno::EACCES,
            14 => Errno::EFAULT,
            17 => Errno::EEXIST,
            21 => Errno::EISDIR,
            22 => Errno::EINVAL,
            24 => Errno::EMFILE,
            36 => Errno::ENAMETOOLONG,
            95 => Errno::ENOTSUP,
            _ => return None,
        };
        Some(errno)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Errno::EPERM => "operation not permitted",
            Errno::ENOENT => "no such file or directory",
            Errno::EIO => "i/o error",
            Errno::ENOMEM => "out of memory",
            Errno::EACCES => "permission denied",
            Errno::EFAULT => "bad address",
            Errno::EEXIST => "file exists",
            Errno::EISDIR => "is a directory",
            Errno::EINVAL => "invalid parameter",
            Errno::EMFILE => "too many open files",
            Errno::ENAMETOOLONG => "file name too long",
            Errno::ENOTSUP => "operation not supported",
        };
        f.write_str(msg)
    }
}

/// Minimal stat structure
///
/// File type lives in st_mode so that isatty() and friends can be answered
/// with the S_IS* helpers below.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub st_name: heapless::String<MAXNAMELEN>, // Name, if the device has one
    pub st_size: u64,                          // Size in bytes
    pub st_mode: u32,                          // File type and mode
    pub st_dev: DevId,                         // Owning device
}

impl Stat {
    /// Replace st_name, truncating at MAXNAMELEN
    pub fn set_name(&mut self, name: &str) {
        self.st_name.clear();
        for c in name.chars() {
            if self.st_name.push(c).is_err() {
                break;
            }
        }
    }

    /// True when st_mode names a directory
    pub fn is_dir(&self) -> bool {
        S_ISDIR(self.st_mode)
    }
}

// File type constants (POSIX)
pub const S_IFMT: u32 = 0o170000; // File type mask
pub const S_IFCHR: u32 = 0o020000; // Character device
pub const S_IFREG: u32 = 0o100000; // Regular file
pub const S_IFDIR: u32 = 0o040000; // Directory
pub const S_IFIFO: u32 = 0o010000; // FIFO/pipe

/// Check if mode indicates a character device
#[inline]
#[allow(non_snake_case)]
pub fn S_ISCHR(mode: u32) -> bool {
    (mode & S_IFMT) == S_IFCHR
}

/// Check if mode indicates a regular file
#[inline]
#[allow(non_snake_case)]
pub fn S_ISREG(mode: u32) -> bool {
    (mode & S_IFMT) == S_IFREG
}

/// Check if mode indicates a directory
#[inline]
#[allow(non_snake_case)]
pub fn S_ISDIR(mode: u32) -> bool {
    (mode & S_IFMT) == S_IFDIR
}

/// Check if mode indicates a FIFO
#[inline]
#[allow(non_snake_case)]
pub fn S_ISFIFO(mode: u32) -> bool {
    (mode & S_IFMT) == S_IFIFO
}
