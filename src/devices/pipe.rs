/*
 * Pipe Device
 *
 * A pipe is one data page mapped behind two descriptors: the read end and
 * the write end. The page holds the ring state:
 *
 *   0..8     rpos (u64, little endian)  bytes consumed so far
 *   8..16    wpos (u64, little endian)  bytes produced so far
 *   16..     PIPEBUF-byte ring
 *
 * Peer detection:
 * ===============
 *
 * Every descriptor that refers to a pipe end maps both its descriptor page
 * and the shared data page. While the other end is open, the data page has
 * more references than this end's descriptor page. When the counts are
 * equal, the other end is gone.
 *
 * Readers and writers that can't make progress yield until the peer does
 * something.
 */

use x86_64::VirtAddr;

use super::FD_PAGE_PERM;
use crate::config::PIPEBUF;
use crate::io::{
    DevId, Device, Errno, Fd, FdContext, FdSlot, FdTable, OpenMode, S_IFIFO, Stat, fd2data, fd2num,
};
use crate::memory::AddressSpace;

/// Pipe device id
pub const DEV_PIPE: DevId = DevId(b'p' as u32);

const RPOS: usize = 0;
const WPOS: usize = 8;
const RING: usize = 16;

/// Ring positions stored at the start of the data page
#[derive(Debug, Clone, Copy)]
struct PipeState {
    rpos: u64,
    wpos: u64,
}

impl PipeState {
    fn load(vm: &dyn AddressSpace, va: VirtAddr) -> Result<Self, Errno> {
        let mut raw = [0u8; 8];
        vm.read_page(va, RPOS, &mut raw)?;
        let rpos = u64::from_le_bytes(raw);
        vm.read_page(va, WPOS, &mut raw)?;
        let wpos = u64::from_le_bytes(raw);
        Ok(Self { rpos, wpos })
    }

    fn store(&self, vm: &mut dyn AddressSpace, va: VirtAddr) -> Result<(), Errno> {
        vm.write_page(va, RPOS, &self.rpos.to_le_bytes())?;
        vm.write_page(va, WPOS, &self.wpos.to_le_bytes())
    }

    fn ring_offset(pos: u64) -> usize {
        RING + (pos % PIPEBUF as u64) as usize
    }

    fn unread(&self) -> u64 {
        self.wpos - self.rpos
    }
}

/// Pipe device implementation
pub struct PipeDevice {
    yield_now: fn(),
}

impl PipeDevice {
    /// Create a pipe device
    ///
    /// # Arguments
    /// * `yield_now` - Gives up the CPU while the peer has work to do
    pub fn new(yield_now: fn()) -> Self {
        Self { yield_now }
    }

    /// Create a pipe
    ///
    /// Returns `[read_end, write_end]`. On failure nothing stays mapped.
    pub fn pipe<A: AddressSpace>(&self, table: &mut FdTable<'_, A>) -> Result<[i32; 2], Errno> {
        let rd = table.fd_alloc()?;
        table.activate(rd, Fd::new(DEV_PIPE, OpenMode::RDONLY), FD_PAGE_PERM)?;

        match Self::open_write_end(table, rd) {
            Ok(wr) => Ok([fd2num(rd), fd2num(wr)]),
            Err(err) => {
                let vm = table.vm_mut();
                let _ = vm.page_unmap(fd2data(rd));
                let _ = vm.page_unmap(rd.addr());
                Err(err)
            }
        }
    }

    fn open_write_end<A: AddressSpace>(
        table: &mut FdTable<'_, A>,
        rd: FdSlot,
    ) -> Result<FdSlot, Errno> {
        let wr = table.fd_alloc()?;
        table.activate(wr, Fd::new(DEV_PIPE, OpenMode::WRONLY), FD_PAGE_PERM)?;

        let va = fd2data(rd);
        let vm = table.vm_mut();
        let shared = vm
            .page_alloc(va, FD_PAGE_PERM)
            .and_then(|_| vm.page_map(va, fd2data(wr), FD_PAGE_PERM));
        if let Err(err) = shared {
            let _ = vm.page_unmap(wr.addr());
            return Err(err);
        }

        Ok(wr)
    }

    /// Check whether the other end of the pipe at `fdnum` has been closed
    pub fn is_closed<A: AddressSpace>(table: &FdTable<'_, A>, fdnum: i32) -> Result<bool, Errno> {
        let slot = table.fd_lookup(fdnum)?;
        Ok(peer_closed(table.vm(), slot.addr(), fd2data(slot)))
    }
}

fn peer_closed(vm: &dyn AddressSpace, fd_page: VirtAddr, data_page: VirtAddr) -> bool {
    vm.page_ref(fd_page) == vm.page_ref(data_page)
}

impl Device for PipeDevice {
    fn id(&self) -> DevId {
        DEV_PIPE
    }

    fn name(&self) -> &'static str {
        "pipe"
    }

    /// Returns as soon as at least one byte has been read; 0 once the
    /// writer is gone and the ring is empty.
    fn read(&self, fd: &mut FdContext<'_>, buf: &mut [u8]) -> Result<usize, Errno> {
        let va = fd.data_page();
        let mut i = 0;

        while i < buf.len() {
            let mut p = PipeState::load(&*fd.vm, va)?;
            if p.rpos == p.wpos {
                if i > 0 {
                    return Ok(i);
                }
                if peer_closed(&*fd.vm, fd.fd_page(), va) {
                    return Ok(0);
                }
                (self.yield_now)();
                continue;
            }

            let mut byte = [0u8; 1];
            fd.vm.read_page(va, PipeState::ring_offset(p.rpos), &mut byte)?;
            buf[i] = byte[0];
            p.rpos += 1;
            p.store(&mut *fd.vm, va)?;
            i += 1;
        }

        Ok(i)
    }

    /// Blocks while the ring is full. If the reader goes away, returns how
    /// much was written up to that point.
    fn write(&self, fd: &mut FdContext<'_>, buf: &[u8]) -> Result<usize, Errno> {
        let va = fd.data_page();
        let mut i = 0;

        while i < buf.len() {
            let mut p = PipeState::load(&*fd.vm, va)?;
            if p.wpos >= p.rpos + PIPEBUF as u64 {
                if peer_closed(&*fd.vm, fd.fd_page(), va) {
                    return Ok(i);
                }
                (self.yield_now)();
                continue;
            }

            fd.vm.write_page(va, PipeState::ring_offset(p.wpos), &buf[i..=i])?;
            p.wpos += 1;
            p.store(&mut *fd.vm, va)?;
            i += 1;
        }

        Ok(i)
    }

    fn close(&self, fd: &mut FdContext<'_>) -> Result<(), Errno> {
        let va = fd.data_page();
        fd.vm.page_unmap(va)
    }

    fn stat(&self, fd: &mut FdContext<'_>, st: &mut Stat) -> Result<(), Errno> {
        let p = PipeState::load(&*fd.vm, fd.data_page())?;
        st.set_name("<pipe>");
        st.st_size = p.unread();
        st.st_mode = S_IFIFO | 0o600;
        Ok(())
    }
}
