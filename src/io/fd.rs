/*
 * File Descriptor Table
 *
 * Per-environment descriptor table. Descriptor numbers are small integers
 * 0..MAX_FD; number i owns the page at FDTABLE + i * PGSIZE and the data
 * page at FILEDATA + i * PGSIZE.
 *
 * Existence:
 * ==========
 *
 * A descriptor is open exactly when its descriptor page is mapped, at both
 * the directory and the page level. Nothing else records "in use".
 *
 * The Fd record is stored at the start of the descriptor page. dup() maps
 * the same page at a second slot, so both numbers share one record,
 * offset included.
 *
 * Opening is two-phase:
 *
 * 1. fd_alloc() picks the lowest unmapped slot. It maps nothing.
 * 2. The device's open routine maps the slot, usually via activate().
 *
 * Calling fd_alloc() twice without mapping in between returns the same
 * slot twice. Environments are single-threaded, so nothing can run between
 * the two phases unless the caller lets it.
 */

use bitflags::bitflags;
use core::fmt;
use x86_64::VirtAddr;
use x86_64::structures::paging::PageTableFlags;

use super::device::{DevId, Errno};
use super::registry::DeviceRegistry;
use crate::config::{DEBUG, FDTABLE, FILEDATA, MAX_FD, PGSIZE, index2data, index2fd};
use crate::memory::AddressSpace;

/// Environment identifier, used to tag diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EnvId(pub u32);

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:08x}]", self.0)
    }
}

bitflags! {
    /// Descriptor open mode
    ///
    /// The access mode is the value under ACCMODE, compared as a whole:
    /// RDONLY (0) forbids writes, WRONLY forbids reads, anything else
    /// allows both. Unknown bits are kept as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenMode: u32 {
        const WRONLY = 0x0001;
        const RDWR = 0x0002;
        const ACCMODE = 0x0003;

        const CREAT = 0x0100; // create if nonexistent
        const TRUNC = 0x0200; // truncate to zero length
        const EXCL = 0x0400;  // error if already exists
        const MKDIR = 0x0800; // create directory, not regular file

        const _ = !0;
    }
}

impl OpenMode {
    /// Read-only access (no bits set)
    pub const RDONLY: Self = Self::empty();

    /// Access-mode part of the value
    pub fn access(self) -> Self {
        self & Self::ACCMODE
    }

    pub fn can_read(self) -> bool {
        self.access() != Self::WRONLY
    }

    pub fn can_write(self) -> bool {
        self.access() != Self::RDONLY
    }
}

/// Bytes taken by an encoded record at the start of a descriptor page
const FD_RECORD_LEN: usize = 24;

/// Per-descriptor record
///
/// Lives in the descriptor page itself, so every slot that maps the same
/// page (see dup()) sees one record and one offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fd {
    pub dev_id: DevId,
    pub omode: OpenMode,
    pub offset: u64,
    /// Owned by the device (file id for regular files)
    pub private: u64,
}

impl Fd {
    pub const fn new(dev_id: DevId, omode: OpenMode) -> Self {
        Self {
            dev_id,
            omode,
            offset: 0,
            private: 0,
        }
    }

    /// Page layout: dev_id u32, omode u32, offset u64, private u64 (LE)
    fn encode(&self) -> [u8; FD_RECORD_LEN] {
        let mut raw = [0u8; FD_RECORD_LEN];
        raw[0..4].copy_from_slice(&self.dev_id.0.to_le_bytes());
        raw[4..8].copy_from_slice(&self.omode.bits().to_le_bytes());
        raw[8..16].copy_from_slice(&self.offset.to_le_bytes());
        raw[16..24].copy_from_slice(&self.private.to_le_bytes());
        raw
    }

    fn decode(raw: &[u8; FD_RECORD_LEN]) -> Self {
        let u32_at = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        let u64_at = |i: usize| (u64::from(u32_at(i + 4)) << 32) | u64::from(u32_at(i));
        Self {
            dev_id: DevId(u32_at(0)),
            omode: OpenMode::from_bits_retain(u32_at(4)),
            offset: u64_at(8),
            private: u64_at(16),
        }
    }
}

/// Reference to a descriptor slot by its page address
///
/// Slots handed out by the table are always page-aligned and in range;
/// `from_addr` accepts anything, and fd_close() treats a slot whose address
/// doesn't match the page of its own number as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdSlot {
    addr: VirtAddr,
}

impl FdSlot {
    fn from_index(index: usize) -> Self {
        Self {
            addr: index2fd(index),
        }
    }

    /// Slot for an arbitrary descriptor-page address
    pub fn from_addr(addr: VirtAddr) -> Self {
        Self { addr }
    }

    /// Descriptor page address
    pub fn addr(self) -> VirtAddr {
        self.addr
    }
}

/// Descriptor number of a slot
///
/// Not range-checked; out-of-window addresses give numbers that
/// fd_lookup() rejects.
pub fn fd2num(slot: FdSlot) -> i32 {
    let delta = slot.addr.as_u64() as i64 - FDTABLE as i64;
    i32::try_from(delta.div_euclid(PGSIZE as i64)).unwrap_or(-1)
}

/// Data page paired with a slot
pub fn fd2data(slot: FdSlot) -> VirtAddr {
    let page = slot.addr.align_down(PGSIZE).as_u64();
    VirtAddr::new_truncate(page.wrapping_sub(FDTABLE).wrapping_add(FILEDATA))
}

/// What a device callback gets to work with
///
/// The descriptor record plus the environment's address space, for devices
/// that keep state in the descriptor's data page.
pub struct FdContext<'a> {
    num: i32,
    pub fd: &'a mut Fd,
    pub vm: &'a mut dyn AddressSpace,
}

impl FdContext<'_> {
    /// Descriptor number
    pub fn num(&self) -> i32 {
        self.num
    }

    /// Descriptor page address
    pub fn fd_page(&self) -> VirtAddr {
        index2fd(self.num as usize)
    }

    /// Data page address
    pub fn data_page(&self) -> VirtAddr {
        index2data(self.num as usize)
    }

    /// Whether another slot still maps this descriptor page
    pub fn is_shared(&self) -> bool {
        self.vm.page_ref(self.fd_page()) > 1
    }
}

/// Per-environment file descriptor table
///
/// Owns the environment's address space handle and borrows the device
/// registry built at startup.
pub struct FileDescriptorTable<'d, A: AddressSpace> {
    env_id: EnvId,
    vm: A,
    devices: &'d DeviceRegistry<'d>,
}

/// Short name used throughout the crate
pub type FdTable<'d, A> = FileDescriptorTable<'d, A>;

impl<'d, A: AddressSpace> FileDescriptorTable<'d, A> {
    /// Create a table over `vm`
    ///
    /// Nothing is open until some device maps a slot.
    pub fn new(env_id: EnvId, vm: A, devices: &'d DeviceRegistry<'d>) -> Self {
        Self {
            env_id,
            vm,
            devices,
        }
    }

    pub fn env_id(&self) -> EnvId {
        self.env_id
    }

    pub fn vm(&self) -> &A {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut A {
        &mut self.vm
    }

    pub fn devices(&self) -> &'d DeviceRegistry<'d> {
        self.devices
    }

    /// Find the lowest-numbered slot whose page isn't mapped
    ///
    /// Does NOT map anything. The caller must map the returned slot before
    /// calling fd_alloc() again, or the same slot is handed out twice.
    ///
    /// Returns EMFILE when every slot is in use.
    pub fn fd_alloc(&self) -> Result<FdSlot, Errno> {
        (0..MAX_FD)
            .find(|&i| !self.vm.is_mapped(index2fd(i)))
            .map(FdSlot::from_index)
            .ok_or(Errno::EMFILE)
    }

    /// Check that `fdnum` is in range and mapped
    ///
    /// Returns EINVAL for out-of-range numbers and for closed descriptors.
    pub fn fd_lookup(&self, fdnum: i32) -> Result<FdSlot, Errno> {
        self.open_index(fdnum).map(FdSlot::from_index)
    }

    pub(super) fn open_index(&self, fdnum: i32) -> Result<usize, Errno> {
        let index = match usize::try_from(fdnum) {
            Ok(index) if index < MAX_FD => index,
            _ => {
                if DEBUG {
                    log::debug!("{} bad fd {}", self.env_id, fdnum);
                }
                return Err(Errno::EINVAL);
            }
        };

        if !self.vm.is_mapped(index2fd(index)) {
            if DEBUG {
                log::debug!("{} closed fd {}", self.env_id, fdnum);
            }
            return Err(Errno::EINVAL);
        }

        Ok(index)
    }

    /// Second phase of opening: map `slot` and record `fd` in it
    ///
    /// `perm` must include write access, since the record is stored in the
    /// page. Returns the descriptor number, or EINVAL if `slot` is foreign
    /// or already open.
    pub fn activate(&mut self, slot: FdSlot, fd: Fd, perm: PageTableFlags) -> Result<i32, Errno> {
        let num = fd2num(slot);
        let index = match usize::try_from(num) {
            Ok(index) if index < MAX_FD && FdSlot::from_index(index) == slot => index,
            _ => return Err(Errno::EINVAL),
        };

        if self.vm.is_mapped(slot.addr()) {
            log::warn!("{} activate {} -- already open", self.env_id, num);
            return Err(Errno::EINVAL);
        }

        self.vm.page_alloc(slot.addr(), perm)?;
        if let Err(err) = self.store(index, &fd) {
            let _ = self.vm.page_unmap(slot.addr());
            return Err(err);
        }
        Ok(num)
    }

    /// Record of an open descriptor
    pub fn get(&self, fdnum: i32) -> Result<Fd, Errno> {
        let index = self.open_index(fdnum)?;
        self.load(index)
    }

    /// Close the descriptor in `slot` and unmap its page
    ///
    /// If `must_exist` is false, a closed, nonexistent or stale slot is
    /// silently accepted. If true, those cases return EINVAL. A stale slot
    /// (an address inside a mapped page but not its start) is refused rather
    /// than closed, since it doesn't name the descriptor the caller holds.
    ///
    /// The device's close result is returned; the page is unmapped either
    /// way.
    pub fn fd_close(&mut self, slot: FdSlot, must_exist: bool) -> Result<(), Errno> {
        let index = match self.open_index(fd2num(slot)) {
            Ok(index) if FdSlot::from_index(index) == slot => index,
            Ok(_) if must_exist => return Err(Errno::EINVAL),
            Err(err) if must_exist => return Err(err),
            _ => return Ok(()),
        };

        let ret = match self.load(index) {
            Ok(fd) => match self.devices.lookup(self.env_id, fd.dev_id) {
                Ok(dev) => self.with_context(index, |ctx| dev.close(ctx)),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        // Might already be gone if the device's close unmapped it
        let _ = self.vm.page_unmap(slot.addr());

        ret
    }

    /// Number of open descriptors
    pub fn count(&self) -> usize {
        (0..MAX_FD)
            .filter(|&i| self.vm.is_mapped(index2fd(i)))
            .count()
    }

    /// Check if a file descriptor is open
    pub fn is_valid(&self, fdnum: i32) -> bool {
        self.open_index(fdnum).is_ok()
    }

    /// Read the record out of slot `index`'s descriptor page
    pub(super) fn load(&self, index: usize) -> Result<Fd, Errno> {
        let mut raw = [0u8; FD_RECORD_LEN];
        self.vm.read_page(index2fd(index), 0, &mut raw)?;
        Ok(Fd::decode(&raw))
    }

    fn store(&mut self, index: usize, fd: &Fd) -> Result<(), Errno> {
        self.vm.write_page(index2fd(index), 0, &fd.encode())
    }

    /// Run `f` on slot `index`'s record, then write the record back
    ///
    /// The record isn't written back if `f` unmapped the descriptor page.
    pub(super) fn with_context<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut FdContext<'_>) -> Result<T, Errno>,
    ) -> Result<T, Errno> {
        let mut fd = self.load(index)?;
        let ret = f(&mut FdContext {
            num: index as i32,
            fd: &mut fd,
            vm: &mut self.vm,
        });

        if !self.vm.is_mapped(index2fd(index)) {
            return ret;
        }
        let stored = self.store(index, &fd);
        ret.and_then(|value| stored.map(|()| value))
    }
}
