/*
 * Console Device
 *
 * Descriptor access to the system console. Input comes from the kernel's
 * non-blocking cgetc: while nothing is pending the device yields to the
 * scheduler. Output goes out through cputs in bounded chunks.
 *
 * Ctrl-D on input reads as end of file.
 */

use super::FD_PAGE_PERM;
use crate::config::CONS_CHUNK;
use crate::io::{DevId, Device, Errno, Fd, FdContext, FdTable, OpenMode, S_IFCHR, Stat};
use crate::memory::AddressSpace;

/// Console device id
pub const DEV_CONS: DevId = DevId(b'c' as u32);

/// End-of-input character (Ctrl-D)
const CTRL_D: u8 = 0x04;

/// Console primitives provided by the kernel
pub trait Console: Send + Sync {
    /// Write bytes to the console
    fn cputs(&self, s: &[u8]);

    /// Next input byte, if one is pending. Never blocks.
    fn cgetc(&self) -> Option<u8>;
}

/// Console device implementation
pub struct ConsoleDevice<'c> {
    console: &'c dyn Console,
    yield_now: fn(),
}

impl<'c> ConsoleDevice<'c> {
    /// Create a console device
    ///
    /// # Arguments
    /// * `console` - Kernel console primitives
    /// * `yield_now` - Gives up the CPU while waiting for input
    pub fn new(console: &'c dyn Console, yield_now: fn()) -> Self {
        Self { console, yield_now }
    }

    /// Open a new read/write console descriptor
    pub fn open<A: AddressSpace>(&self, table: &mut FdTable<'_, A>) -> Result<i32, Errno> {
        let slot = table.fd_alloc()?;
        table.activate(slot, Fd::new(DEV_CONS, OpenMode::RDWR), FD_PAGE_PERM)
    }

    /// Check whether `fdnum` refers to the console
    pub fn is_console<A: AddressSpace>(table: &FdTable<'_, A>, fdnum: i32) -> Result<bool, Errno> {
        Ok(table.get(fdnum)?.dev_id == DEV_CONS)
    }
}

impl Device for ConsoleDevice<'_> {
    fn id(&self) -> DevId {
        DEV_CONS
    }

    fn name(&self) -> &'static str {
        "cons"
    }

    fn read(&self, _fd: &mut FdContext<'_>, buf: &mut [u8]) -> Result<usize, Errno> {
        if buf.is_empty() {
            return Ok(0);
        }

        let c = loop {
            match self.console.cgetc() {
                Some(c) => break c,
                None => (self.yield_now)(),
            }
        };

        if c == CTRL_D {
            return Ok(0);
        }
        buf[0] = c;
        Ok(1)
    }

    fn write(&self, _fd: &mut FdContext<'_>, buf: &[u8]) -> Result<usize, Errno> {
        for chunk in buf.chunks(CONS_CHUNK) {
            self.console.cputs(chunk);
        }
        Ok(buf.len())
    }

    fn stat(&self, _fd: &mut FdContext<'_>, st: &mut Stat) -> Result<(), Errno> {
        st.set_name("<cons>");
        st.st_mode = S_IFCHR | 0o666; // Character device, rw-rw-rw-
        Ok(())
    }
}
