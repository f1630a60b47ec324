/*
 * Regular File Device
 *
 * Descriptors for files kept by the file server. The server owns the data
 * and the open-file state; the descriptor only remembers the server's file
 * id (in Fd::private) and the current offset.
 *
 * Reads and writes happen at the descriptor's offset and advance it, so
 * seek() positions the next transfer. A transfer whose end would not fit
 * in a u64 offset is refused before the server sees it.
 *
 * Duplicates made by dup() share the descriptor page, so the server's open
 * file is only flushed and released when the last of them closes.
 */

use super::FD_PAGE_PERM;
use crate::config::MAXNAMELEN;
use crate::io::{DevId, Device, Errno, Fd, FdContext, FdTable, OpenMode, Stat};
use crate::memory::AddressSpace;

/// Regular file device id
pub const DEV_FILE: DevId = DevId(b'f' as u32);

/// File server requests
///
/// Implementations talk to the file server environment; how is up to them.
pub trait FileServer: Send + Sync {
    /// Open `path` with `mode`, returning the server's file id
    fn open(&self, path: &str, mode: OpenMode) -> Result<u64, Errno>;

    /// Read from `offset` into buf, returning the byte count (0 at EOF,
    /// never more than buf.len())
    fn read_at(&self, file_id: u64, offset: u64, buf: &mut [u8]) -> Result<usize, Errno>;

    /// Write buf at `offset`, returning the byte count (at most buf.len())
    fn write_at(&self, file_id: u64, offset: u64, buf: &[u8]) -> Result<usize, Errno>;

    /// Fill in name, size and mode
    fn stat(&self, file_id: u64, st: &mut Stat) -> Result<(), Errno>;

    /// Change the file size
    fn set_size(&self, file_id: u64, size: u64) -> Result<(), Errno>;

    /// Write back dirty state and release the server's open file
    fn flush(&self, file_id: u64) -> Result<(), Errno>;
}

/// Regular file device implementation
pub struct FileDevice<S> {
    server: S,
}

impl<S: FileServer> FileDevice<S> {
    pub fn new(server: S) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Open a file and return its descriptor number
    pub fn open<A: AddressSpace>(
        &self,
        table: &mut FdTable<'_, A>,
        path: &str,
        mode: OpenMode,
    ) -> Result<i32, Errno> {
        if path.len() >= MAXNAMELEN {
            return Err(Errno::ENAMETOOLONG);
        }

        let slot = table.fd_alloc()?;
        let file_id = self.server.open(path, mode)?;

        let mut fd = Fd::new(DEV_FILE, mode);
        fd.private = file_id;

        table.activate(slot, fd, FD_PAGE_PERM).inspect_err(|_| {
            let _ = self.server.flush(file_id);
        })
    }
}

/// EINVAL if `len` bytes past the descriptor's offset overflow a u64
fn check_range(fd: &Fd, len: usize) -> Result<(), Errno> {
    fd.offset
        .checked_add(len as u64)
        .map(|_| ())
        .ok_or(Errno::EINVAL)
}

impl<S: FileServer> Device for FileDevice<S> {
    fn id(&self) -> DevId {
        DEV_FILE
    }

    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, fd: &mut FdContext<'_>, buf: &mut [u8]) -> Result<usize, Errno> {
        check_range(fd.fd, buf.len())?;
        let n = self.server.read_at(fd.fd.private, fd.fd.offset, buf)?;
        fd.fd.offset += n.min(buf.len()) as u64;
        Ok(n)
    }

    fn write(&self, fd: &mut FdContext<'_>, buf: &[u8]) -> Result<usize, Errno> {
        check_range(fd.fd, buf.len())?;
        let n = self.server.write_at(fd.fd.private, fd.fd.offset, buf)?;
        fd.fd.offset += n.min(buf.len()) as u64;
        Ok(n)
    }

    fn close(&self, fd: &mut FdContext<'_>) -> Result<(), Errno> {
        if fd.is_shared() {
            return Ok(());
        }
        self.server.flush(fd.fd.private)
    }

    fn stat(&self, fd: &mut FdContext<'_>, st: &mut Stat) -> Result<(), Errno> {
        self.server.stat(fd.fd.private, st)
    }

    fn trunc(&self, fd: &mut FdContext<'_>, size: u64) -> Result<(), Errno> {
        self.server.set_size(fd.fd.private, size)
    }
}
